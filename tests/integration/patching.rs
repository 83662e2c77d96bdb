//! Patch mode end to end with a scripted stand-in for the patch tool.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use updraft::bootstrap::lock::{LockRetryPolicy, NoLockInspector};
use updraft::bootstrap::patch::{PatchDriver, PatchSummary};
use updraft::bootstrap::wait::ProcessProbe;
use updraft::bootstrap::{BootstrapArgs, BootstrapEvent, BootstrapState, Bootstrapper, ChannelSink, UpdateApplied};
use updraft::core::{UpdateError, UpdateResult};
use updraft::launch::{LaunchRequest, Launcher};
use updraft::test_utils::{init_test_logging, write_patch_tool};

const SUCCESS: &[&str] = &[
    r#"{"type":"log","time":1,"level":"info","message":"patching"}"#,
    r#"{"type":"progress","time":2,"progress":0.25,"eta":3.0,"bps":1024}"#,
    r#"{"type":"progress","time":3,"progress":1.0,"eta":0.0,"bps":1024}"#,
    r#"{"type":"result","time":4,"success":true}"#,
];

struct NotRunning;

impl ProcessProbe for NotRunning {
    fn is_running(&self, _executable: &Path) -> bool {
        false
    }
}

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

struct Setup {
    temp: TempDir,
    install: std::path::PathBuf,
    record: std::path::PathBuf,
}

fn setup() -> Setup {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("install");
    std::fs::create_dir_all(&install).unwrap();
    let record = temp.path().join("calls.txt");
    Setup {
        temp,
        install,
        record,
    }
}

fn write_patches(dir: &Path, names: &[&str]) -> Vec<std::path::PathBuf> {
    let patches = dir.join("patches");
    std::fs::create_dir_all(&patches).unwrap();
    names
        .iter()
        .map(|name| {
            let path = patches.join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            path
        })
        .collect()
}

fn patch_args(list: &str, install: &Path) -> BootstrapArgs {
    BootstrapArgs {
        update_path: list.to_string(),
        extraction_path: install.to_path_buf(),
        target_executable: install.join("app"),
        clear_target_dir: false,
        patch_mode: true,
        forwarded_args: vec!["--patched".to_string()],
    }
}

fn bootstrapper(
    tool: &Path,
    launcher: Arc<RecordingLauncher>,
) -> (Bootstrapper, mpsc::UnboundedReceiver<BootstrapEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let bootstrapper = Bootstrapper::new(Arc::new(ChannelSink::new(tx)))
        .with_probe(Arc::new(NotRunning))
        .with_inspector(Arc::new(NoLockInspector))
        .with_launcher(launcher)
        .with_applier(Arc::new(PatchDriver::new(tool)))
        .with_policy(LockRetryPolicy::immediate(0))
        .with_poll_interval(Duration::from_millis(1));
    (bootstrapper, rx)
}

#[tokio::test]
async fn test_patches_run_in_order_and_missing_ones_are_skipped() {
    init_test_logging(None);
    let s = setup();
    let tool = write_patch_tool(s.temp.path(), &s.record, SUCCESS, 0).unwrap();
    let patches = write_patches(s.temp.path(), &["1.1.pwr", "1.2.pwr"]);
    let missing = s.temp.path().join("patches").join("1.3.pwr");
    let list = format!("{},{},{}", patches[0].display(), missing.display(), patches[1].display());

    let launcher = Arc::new(RecordingLauncher::default());
    let (mut bootstrapper, mut rx) = bootstrapper(&tool, launcher.clone());
    let report = bootstrapper.run(&patch_args(&list, &s.install)).await.unwrap();

    assert_eq!(report.applied, UpdateApplied::Patched(PatchSummary {
        applied: 2,
        skipped: 1
    }));
    assert!(report.relaunched);
    assert_eq!(bootstrapper.state(), BootstrapState::Terminated);

    let staging = s.temp.path().join("patches").join("staging");
    let calls: Vec<String> = std::fs::read_to_string(&s.record).unwrap().lines().map(str::to_string).collect();
    assert_eq!(calls, vec![
        format!("apply --staging-dir={} {} {} --json", staging.display(), patches[0].display(), s.install.display()),
        format!("apply --staging-dir={} {} {} --json", staging.display(), patches[1].display(), s.install.display()),
    ]);

    let mut percents = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let BootstrapEvent::Progress {
            percent,
            ..
        } = event
        {
            percents.push(percent);
        }
    }
    assert_eq!(percents.iter().filter(|p| **p == 25).count(), 2);
    assert_eq!(percents.last(), Some(&100));

    let requests = launcher.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].args, vec!["--patched"]);
}

#[tokio::test]
async fn test_failed_patch_is_fatal_and_skips_relaunch() {
    let s = setup();
    let tool = write_patch_tool(
        s.temp.path(),
        &s.record,
        &[
            r#"{"type":"error","time":1,"message":"signature mismatch"}"#,
            r#"{"type":"result","time":2,"success":false}"#,
        ],
        1,
    )
    .unwrap();
    let patches = write_patches(s.temp.path(), &["1.1.pwr", "1.2.pwr"]);
    let list = format!("{},{}", patches[0].display(), patches[1].display());

    let launcher = Arc::new(RecordingLauncher::default());
    let (mut bootstrapper, _rx) = bootstrapper(&tool, launcher.clone());
    let err = bootstrapper.run(&patch_args(&list, &s.install)).await.unwrap_err();

    assert!(matches!(err, UpdateError::PatchToolError { ref reason, .. } if reason.contains("signature mismatch")));
    assert_eq!(bootstrapper.state(), BootstrapState::FatalError);
    assert_eq!(std::fs::read_to_string(&s.record).unwrap().lines().count(), 1);
    assert!(launcher.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_staging_files_are_cleared_before_each_patch() {
    let s = setup();
    let tool = write_patch_tool(s.temp.path(), &s.record, SUCCESS, 0).unwrap();
    let patches = write_patches(s.temp.path(), &["2.0.pwr"]);
    let staging = s.temp.path().join("patches").join("staging");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("leftover.bin"), "x").unwrap();

    let (mut bootstrapper, _rx) = bootstrapper(&tool, Arc::new(RecordingLauncher::default()));
    bootstrapper.run(&patch_args(&patches[0].display().to_string(), &s.install)).await.unwrap();

    assert!(!staging.join("leftover.bin").exists());
}
