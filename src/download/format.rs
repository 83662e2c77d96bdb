//! Human-readable byte counts and the per-download progress session.

use crate::constants::SPEED_SAMPLE_WINDOW;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Formats a byte count with 1024-based units and one decimal place.
///
/// Whole values drop the decimal, and zero is rendered without a space.
///
/// ```rust
/// use updraft::download::bytes_to_string;
///
/// assert_eq!(bytes_to_string(0), "0B");
/// assert_eq!(bytes_to_string(1536), "1.5 KB");
/// assert_eq!(bytes_to_string(1_073_741_824), "1 GB");
/// ```
#[must_use]
pub fn bytes_to_string(bytes: u64) -> String {
    if bytes == 0 {
        return format!("0{}", UNITS[0]);
    }

    let mut place = 0usize;
    let mut scale = 1u64;
    while place + 1 < UNITS.len() && bytes / scale >= 1024 {
        scale *= 1024;
        place += 1;
    }

    let value = ((bytes as f64 / scale as f64) * 10.0).round() / 10.0;
    if value.fract() == 0.0 {
        format!("{value:.0} {}", UNITS[place])
    } else {
        format!("{value:.1} {}", UNITS[place])
    }
}

/// Formats a transfer rate, e.g. `"2.4 MB/s"`.
#[must_use]
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", bytes_to_string(bytes_per_second))
}

/// Formats `received / total`, or just `received` when the length is unknown.
#[must_use]
pub fn format_size(received: u64, total: Option<u64>) -> String {
    match total {
        Some(total) => format!("{} / {}", bytes_to_string(received), bytes_to_string(total)),
        None => bytes_to_string(received),
    }
}

/// One progress tick as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received: u64,
    pub total: Option<u64>,
    /// `None` until at least one second has elapsed since the first tick
    pub speed: Option<String>,
    pub size: String,
    /// `None` when the server did not announce a length
    pub percent: Option<u8>,
}

/// Mutable state of a single download.
///
/// Owned by the downloader for the lifetime of one transfer and dropped
/// once the terminal event has been sent.
#[derive(Debug)]
pub struct DownloadSession {
    temp_path: PathBuf,
    started: Option<Instant>,
    received: u64,
    total: Option<u64>,
    speed: Option<String>,
    cancel: CancellationToken,
}

impl DownloadSession {
    pub fn new(temp_path: PathBuf, total: Option<u64>, cancel: CancellationToken) -> Self {
        Self {
            temp_path,
            started: None,
            received: 0,
            total,
            speed: None,
            cancel,
        }
    }

    pub fn temp_path(&self) -> &PathBuf {
        &self.temp_path
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Accounts for `chunk_len` new bytes observed at `now`.
    ///
    /// The first tick starts the clock. Speed is recomputed from the
    /// cumulative byte count once the elapsed time reaches one second and
    /// is carried over between recomputations.
    pub fn record(&mut self, chunk_len: u64, now: Instant) -> DownloadProgress {
        self.received += chunk_len;
        let started = *self.started.get_or_insert(now);

        let elapsed = now.saturating_duration_since(started);
        if elapsed >= SPEED_SAMPLE_WINDOW {
            let secs = elapsed.as_secs().max(1);
            self.speed = Some(format_speed(self.received / secs));
        }

        let percent = self.total.filter(|total| *total > 0).map(|total| {
            let percent = self.received.saturating_mul(100) / total;
            percent.min(100) as u8
        });

        DownloadProgress {
            received: self.received,
            total: self.total,
            speed: self.speed.clone(),
            size: format_size(self.received, self.total),
            percent,
        }
    }
}
