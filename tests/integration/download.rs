//! Downloads served by a local one-shot HTTP server.

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;
use updraft::core::{UpdateError, UpdateResult};
use updraft::descriptor::{Checksum, UpdateDescriptor};
use updraft::download::{DownloadEvent, DownloadOptions, DownloadOutcome, DownloadStatus, Downloader, InstallAction};
use updraft::launch::{LaunchRequest, Launcher};
use updraft::test_utils::{serve_once, write_zip};

#[derive(Default)]
struct RecordingLauncher {
    requests: Mutex<Vec<LaunchRequest>>,
}

impl Launcher for RecordingLauncher {
    fn launch(&self, request: &LaunchRequest) -> UpdateResult<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

struct Fixture {
    temp: TempDir,
    launcher: Arc<RecordingLauncher>,
    downloader: Downloader,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let bootstrapper = temp.path().join("dist").join("updraft-bootstrap");
        std::fs::create_dir_all(bootstrapper.parent().unwrap()).unwrap();
        std::fs::write(&bootstrapper, b"#!/bin/sh\n").unwrap();

        let options = DownloadOptions {
            download_dir: Some(temp.path().join("downloads")),
            extraction_dir: temp.path().join("app"),
            current_exe: temp.path().join("app").join("app"),
            bootstrapper,
            clear_app_directory: true,
            run_as_admin: false,
            forwarded_args: vec!["--after-update".to_string()],
        };
        let launcher = Arc::new(RecordingLauncher::default());
        let downloader = Downloader::new(options, launcher.clone()).unwrap();
        Self {
            temp,
            launcher,
            downloader,
        }
    }

    fn downloads(&self) -> PathBuf {
        self.temp.path().join("downloads")
    }
}

fn descriptor(url: &str, checksum: Option<Checksum>) -> UpdateDescriptor {
    let mut descriptor =
        UpdateDescriptor::from_json(&format!(r#"{{"version":"2.0.0.0","downloadUrl":"{url}"}}"#)).unwrap();
    descriptor.checksum = checksum;
    descriptor
}

async fn collect(mut rx: mpsc::UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_archive_download_is_verified_and_handed_to_bootstrapper() {
    let fixture = Fixture::new();
    let archive = fixture.temp.path().join("source.zip");
    write_zip(&archive, &[("app", "v2"), ("data/", ""), ("data/readme.txt", "hello")]).unwrap();
    let body = std::fs::read(&archive).unwrap();
    let digest = hex::encode(Sha256::digest(&body));

    let (url, server) = serve_once("get/latest", body.clone(), Some("app-2.0.0.0.zip")).await.unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let outcome =
        fixture.downloader.start(&descriptor(&url, Some(Checksum::new(digest.to_uppercase(), Some("SHA256")))), tx).await;
    server.await.unwrap();

    let DownloadOutcome::Completed {
        path,
        action,
    } = outcome
    else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(path, fixture.downloads().join("app-2.0.0.0.zip"));
    assert_eq!(std::fs::read(&path).unwrap(), body);

    let staged = fixture.downloads().join(format!("updraft-bootstrap{}", std::env::consts::EXE_SUFFIX));
    assert_eq!(action, InstallAction::Bootstrap {
        bootstrapper: staged.clone(),
    });
    assert!(staged.is_file());

    let requests = fixture.launcher.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].program, staged);
    assert_eq!(requests[0].args[0], path.display().to_string());
    assert!(requests[0].args.contains(&"-c".to_string()));
    assert_eq!(requests[0].args.last().map(String::as_str), Some("--after-update"));

    let events = collect(rx).await;
    let last_progress = events.iter().rev().find_map(|event| match event {
        DownloadEvent::Progress(progress) => Some(progress.clone()),
        DownloadEvent::Finished(_) => None,
    });
    let last_progress = last_progress.expect("at least one progress event");
    assert_eq!(last_progress.received, body.len() as u64);
    assert_eq!(last_progress.percent, Some(100));
    assert_eq!(events.last(), Some(&DownloadEvent::Finished(DownloadStatus::Completed)));
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_no_file() {
    let fixture = Fixture::new();
    let (url, server) = serve_once("app-2.0.0.0.zip", b"not the archive".to_vec(), None).await.unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let checksum = Checksum::new("d41d8cd98f00b204e9800998ecf8427e", None);
    let outcome = fixture.downloader.start(&descriptor(&url, Some(checksum)), tx).await;
    server.await.unwrap();

    assert!(matches!(outcome, DownloadOutcome::Failed(UpdateError::IntegrityError { .. })));
    let leftovers: Vec<_> = std::fs::read_dir(fixture.downloads()).unwrap().collect();
    assert!(leftovers.is_empty(), "download dir not cleaned: {leftovers:?}");
    assert!(fixture.launcher.requests.lock().unwrap().is_empty());

    let events = collect(rx).await;
    assert!(matches!(events.last(), Some(DownloadEvent::Finished(DownloadStatus::Failed(_)))));
}

#[tokio::test]
async fn test_patch_bundle_named_from_url() {
    let fixture = Fixture::new();
    let body = b"patch-bytes".to_vec();
    let digest = hex::encode(md5::Md5::digest(&body));
    let (url, server) = serve_once("files/2.0.0.0.pwr", body, None).await.unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = fixture.downloader.start(&descriptor(&url, Some(Checksum::new(digest, None))), tx).await;
    server.await.unwrap();

    let expected = fixture.downloads().join("2.0.0.0.pwr");
    assert_eq!(outcome.status(), DownloadStatus::Completed);
    assert!(matches!(outcome, DownloadOutcome::Completed { action: InstallAction::PatchBundle { ref path }, .. } if *path == expected));
    assert!(fixture.launcher.requests.lock().unwrap().is_empty());
}
