//! Test utilities for updraft
//!
//! Fixtures shared by unit tests and the integration suite: logging setup,
//! zip archive builders, a scripted stand-in for the patch tool, and a
//! one-shot HTTP server for download tests.
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration tests.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use zip::write::SimpleFileOptions;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, else `RUST_LOG`; does nothing when neither is
/// set. Safe to call from every test.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// Writes a zip archive with the given `(name, content)` entries.
///
/// Names ending in `/` become directory entries. Names are stored verbatim,
/// so traversal entries such as `../../x` can be produced on purpose.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) -> zip::result::ZipResult<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options)?;
        } else {
            writer.start_file(*name, options)?;
            writer.write_all(content.as_bytes())?;
        }
    }
    writer.finish()?;
    Ok(())
}

/// Writes an executable shell script that mimics the patch tool.
///
/// Each invocation appends its arguments as one line to `record`, prints
/// `stdout_lines`, writes one line to stderr, and exits with `exit_code`.
#[cfg(unix)]
pub fn write_patch_tool(dir: &Path, record: &Path, stdout_lines: &[&str], exit_code: i32) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let mut script = String::from("#!/bin/sh\n");
    script.push_str(&format!("echo \"$*\" >> '{}'\n", record.display()));
    for line in stdout_lines {
        script.push_str(&format!("echo '{line}'\n"));
    }
    script.push_str("echo 'fake tool diagnostics' >&2\n");
    script.push_str(&format!("exit {exit_code}\n"));

    let path = dir.join("fake-butler");
    {
        let mut file = std::fs::File::create(&path)?;
        file.write_all(script.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Serves `body` to a single HTTP request on an ephemeral local port.
///
/// Returns the URL `http://127.0.0.1:<port>/<path>` and the server task.
/// When `file_name` is set, the response carries a `Content-Disposition`
/// header naming it.
pub async fn serve_once(path: &str, body: Vec<u8>, file_name: Option<&str>) -> io::Result<(String, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}/{}", listener.local_addr()?, path.trim_start_matches('/'));
    let disposition = file_name.map(|name| format!("Content-Disposition: attachment; filename=\"{name}\"\r\n"));

    let handle = tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            body.len(),
            disposition.unwrap_or_default()
        );
        let _ = socket.write_all(header.as_bytes()).await;
        let _ = socket.write_all(&body).await;
        let _ = socket.shutdown().await;
    });

    Ok((url, handle))
}
