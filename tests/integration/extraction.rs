//! Archive extraction through the bootstrapper and the lock retry loop.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use updraft::bootstrap::lock::{LockHolder, LockInspector, LockRetryPolicy, NoLockInspector, retry_on_lock};
use updraft::bootstrap::wait::ProcessProbe;
use updraft::bootstrap::{BootstrapArgs, BootstrapEvent, BootstrapState, Bootstrapper, ChannelSink, ProgressSink};
use updraft::core::{UpdateError, UpdateResult};
use updraft::launch::{LaunchRequest, Launcher};
use updraft::test_utils::write_zip;

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

fn bootstrapper(launcher: Arc<RecordingLauncher>) -> (Bootstrapper, mpsc::UnboundedReceiver<BootstrapEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let bootstrapper = Bootstrapper::new(Arc::new(ChannelSink::new(tx)))
        .with_probe(Arc::new(NotRunning))
        .with_inspector(Arc::new(NoLockInspector))
        .with_launcher(launcher)
        .with_policy(LockRetryPolicy::immediate(2))
        .with_poll_interval(Duration::from_millis(1));
    (bootstrapper, rx)
}

fn archive_args(archive: &Path, root: &Path, clear: bool) -> BootstrapArgs {
    BootstrapArgs {
        update_path: archive.display().to_string(),
        extraction_path: root.to_path_buf(),
        target_executable: root.join("app"),
        clear_target_dir: clear,
        patch_mode: false,
        forwarded_args: Vec::new(),
    }
}

#[tokio::test]
async fn test_traversal_entry_rejects_archive_before_writing() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("install");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("app"), "v1").unwrap();

    let archive = temp.path().join("evil.zip");
    write_zip(&archive, &[("app", "v2"), ("../../outside.txt", "pwned")]).unwrap();

    let launcher = Arc::new(RecordingLauncher::default());
    let (mut bootstrapper, mut rx) = bootstrapper(launcher.clone());
    let err = bootstrapper.run(&archive_args(&archive, &root, false)).await.unwrap_err();

    assert!(matches!(err, UpdateError::UnsafeArchiveEntry { ref entry } if entry.contains("outside.txt")));
    assert_eq!(bootstrapper.state(), BootstrapState::FatalError);
    assert_eq!(std::fs::read_to_string(root.join("app")).unwrap(), "v1");
    assert!(!temp.path().join("outside.txt").exists());
    assert!(launcher.requests.lock().unwrap().is_empty());

    let mut reported = false;
    while let Ok(event) = rx.try_recv() {
        if let BootstrapEvent::Error(message) = event {
            reported = message.contains("outside.txt");
        }
    }
    assert!(reported, "fatal error was not reported to the sink");
}

#[tokio::test]
async fn test_clear_removes_stale_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("install");
    std::fs::create_dir_all(root.join("plugins")).unwrap();
    std::fs::write(root.join("plugins").join("old.so"), "old").unwrap();
    std::fs::write(root.join("stale.txt"), "stale").unwrap();

    let archive = temp.path().join("update.zip");
    write_zip(&archive, &[("app", "v2"), ("plugins/", ""), ("plugins/new.so", "new")]).unwrap();

    let (mut bootstrapper, _rx) = bootstrapper(Arc::new(RecordingLauncher::default()));
    bootstrapper.run(&archive_args(&archive, &root, true)).await.unwrap();

    assert!(!root.join("stale.txt").exists());
    assert!(!root.join("plugins").join("old.so").exists());
    assert_eq!(std::fs::read_to_string(root.join("plugins").join("new.so")).unwrap(), "new");
    assert_eq!(bootstrapper.state(), BootstrapState::Terminated);
}

#[tokio::test]
async fn test_wrong_extension_is_invalid_arguments() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("update.tar.gz");
    std::fs::write(&archive, "x").unwrap();

    let (mut bootstrapper, mut rx) = bootstrapper(Arc::new(RecordingLauncher::default()));
    let err = bootstrapper.run(&archive_args(&archive, temp.path(), false)).await.unwrap_err();

    assert!(matches!(err, UpdateError::InvalidArguments { .. }));
    assert_eq!(bootstrapper.state(), BootstrapState::Idle);
    assert!(rx.try_recv().is_err());
}

fn lock_error() -> io::Error {
    #[cfg(windows)]
    {
        io::Error::from_raw_os_error(32)
    }
    #[cfg(not(windows))]
    {
        io::Error::from_raw_os_error(26)
    }
}

struct FixedHolder;

impl LockInspector for FixedHolder {
    fn holders(&self, _path: &Path) -> Option<Vec<LockHolder>> {
        Some(vec![LockHolder {
            pid: 4242,
            name: "editor".to_string(),
        }])
    }
}

#[derive(Default)]
struct CountingSink {
    prompts: AtomicU32,
    answer: bool,
}

impl ProgressSink for CountingSink {
    fn progress(&self, _percent: u8, _detail: &str) {}

    fn confirm_lock_release(&self, _path: &Path, holder: &LockHolder) -> bool {
        assert_eq!(holder.to_string(), "editor (pid 4242)");
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

#[test]
fn test_lock_retry_gives_up_after_policy() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("app");
    let attempts = AtomicU32::new(0);

    let result: UpdateResult<()> =
        retry_on_lock(&path, &LockRetryPolicy::immediate(2), &NoLockInspector, &CountingSink::default(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(lock_error())
        });

    assert!(matches!(result, Err(UpdateError::LockContention { .. })));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn test_declined_lock_prompt_stops_retrying() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("app");
    let attempts = AtomicU32::new(0);
    let sink = CountingSink {
        prompts: AtomicU32::new(0),
        answer: false,
    };
    let policy = LockRetryPolicy {
        inspect_after: 1,
        ..LockRetryPolicy::immediate(5)
    };

    let result: UpdateResult<()> = retry_on_lock(&path, &policy, &FixedHolder, &sink, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(lock_error())
    });

    assert!(matches!(result, Err(UpdateError::LockContention { .. })));
    assert_eq!(sink.prompts.load(Ordering::SeqCst), 1);
    assert!(attempts.load(Ordering::SeqCst) < 6);
}
