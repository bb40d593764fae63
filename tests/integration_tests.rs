use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use inwatch::{FileEvent, NotifierError, Watch, WatchError, WatchEvent, WatchOptions, WatchState};
use regex::Regex;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Writes a shell script standing in for inotifywait. `$ROOT` is set to the
/// last argument, which is the watch root.
#[cfg(unix)]
fn fake_notifier(dir: &Path, body: &str, keep_running: bool) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("fake-inotifywait");
    let tail = if keep_running { "exec sleep 30" } else { "" };
    fs::write(&script, format!("#!/bin/sh\nfor ROOT; do :; done\n{}\n{}\n", body, tail))
        .expect("Failed to write fake notifier");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("Failed to chmod fake notifier");
    script
}

async fn next_file_event(watch: &mut Watch) -> FileEvent {
    match watch.recv_timeout(TIMEOUT).await {
        Ok(Some(WatchEvent::File(event))) => event,
        Ok(other) => panic!("Expected file event, got {:?}", other),
        Err(_) => panic!("Timeout waiting for file event"),
    }
}

#[tokio::test]
async fn test_scan_only_reports_existing_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("nested/deeper")).expect("Failed to create dirs");
    fs::write(root.join("a.txt"), "a").expect("Failed to write test file");
    fs::write(root.join("nested/b.rs"), "b").expect("Failed to write test file");
    fs::write(root.join("nested/deeper/c.tmp"), "c").expect("Failed to write test file");

    let options = WatchOptions::default()
        .scan_only(true)
        .reject(Regex::new(r"\.tmp$").unwrap());
    let mut watch = Watch::new(root, options);
    watch.ready().await.expect("Scan should succeed");

    let mut seen = BTreeSet::new();
    while let Some(event) = watch.recv().await {
        match event {
            WatchEvent::File(event) => {
                seen.insert(event);
            }
            WatchEvent::Error(err) => panic!("Unexpected error: {}", err),
        }
    }

    assert_eq!(seen, BTreeSet::from([FileEvent::add("a.txt"), FileEvent::add("nested/b.rs")]));
    assert_eq!(watch.state(), WatchState::Stopped);
}

#[tokio::test]
async fn test_skip_initial_still_tracks_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("a.txt"), "a").expect("Failed to write test file");

    let mut watch = Watch::new(temp_dir.path(), WatchOptions::default().scan_only(true).skip_initial(true));
    watch.ready().await.expect("Scan should succeed");

    assert_eq!(watch.recv().await, None);
    assert_eq!(watch.tracked_files(), vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn test_missing_root_fails_ready() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut watch = Watch::new(temp_dir.path().join("missing"), WatchOptions::default());

    let err = watch.ready().await.unwrap_err();
    assert!(matches!(err, WatchError::Configuration { .. }), "{:?}", err);
    assert_eq!(watch.recv().await, None);
    assert_eq!(watch.state(), WatchState::Stopped);
}

#[cfg(unix)]
#[tokio::test]
async fn test_add_change_remove_scenario() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let bin_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("a.txt"), "a").expect("Failed to write test file");

    let script = fake_notifier(
        bin_dir.path(),
        r#"printf 'MODIFY|%s/|a.txt|1700000000\n' "$ROOT"
rm "$ROOT/a.txt"
printf 'DELETE|%s/|a.txt|1700000001\n' "$ROOT""#,
        true,
    );

    let mut watch = Watch::new(temp_dir.path(), WatchOptions::default().exec_path(script.to_string_lossy()));
    watch.ready().await.expect("Scan should succeed");

    assert_eq!(next_file_event(&mut watch).await, FileEvent::add("a.txt"));
    assert_eq!(next_file_event(&mut watch).await, FileEvent::change("a.txt"));
    assert_eq!(next_file_event(&mut watch).await, FileEvent::remove("a.txt"));
    assert_eq!(watch.state(), WatchState::Active);
    assert!(watch.tracked_files().is_empty());

    watch.stop().await.expect("Stop should succeed");
}

#[cfg(unix)]
#[tokio::test]
async fn test_directory_move_in_and_delete() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let bin_dir = TempDir::new().expect("Failed to create temp dir");

    let script = fake_notifier(
        bin_dir.path(),
        r#"mkdir -p "$ROOT/sub/inner"
echo x > "$ROOT/sub/x.txt"
echo y > "$ROOT/sub/y.txt"
echo z > "$ROOT/sub/inner/z.txt"
printf 'MOVED_TO,ISDIR|%s/|sub|\n' "$ROOT"
printf 'DELETE,ISDIR|%s/|sub|\n' "$ROOT""#,
        true,
    );

    let mut watch = Watch::new(temp_dir.path(), WatchOptions::default().exec_path(script.to_string_lossy()));
    watch.ready().await.expect("Scan should succeed");

    let mut added = BTreeSet::new();
    for _ in 0..3 {
        added.insert(next_file_event(&mut watch).await);
    }
    assert_eq!(
        added,
        BTreeSet::from([
            FileEvent::add("sub/inner/z.txt"),
            FileEvent::add("sub/x.txt"),
            FileEvent::add("sub/y.txt"),
        ])
    );

    let mut removed = BTreeSet::new();
    for _ in 0..3 {
        removed.insert(next_file_event(&mut watch).await);
    }
    assert_eq!(
        removed,
        BTreeSet::from([
            FileEvent::remove("sub/inner/z.txt"),
            FileEvent::remove("sub/x.txt"),
            FileEvent::remove("sub/y.txt"),
        ])
    );
    assert!(watch.tracked_files().is_empty());

    watch.stop().await.expect("Stop should succeed");
}

#[cfg(unix)]
#[tokio::test]
async fn test_rejected_files_are_never_tracked() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let bin_dir = TempDir::new().expect("Failed to create temp dir");

    let script = fake_notifier(
        bin_dir.path(),
        r#"printf 'CREATE|%s/|f.tmp|\n' "$ROOT"
printf 'MODIFY|%s/|f.tmp|\n' "$ROOT"
printf 'CREATE|%s/|marker.txt|\n' "$ROOT""#,
        true,
    );

    let options = WatchOptions::default()
        .reject(Regex::new(r"\.tmp$").unwrap())
        .exec_path(script.to_string_lossy());
    let mut watch = Watch::new(temp_dir.path(), options);
    watch.ready().await.expect("Scan should succeed");

    assert_eq!(next_file_event(&mut watch).await, FileEvent::add("marker.txt"));
    assert_eq!(watch.tracked_files(), vec!["marker.txt".to_string()]);

    watch.stop().await.expect("Stop should succeed");
}

#[cfg(unix)]
#[tokio::test]
async fn test_notifier_exit_is_reported_without_stopping() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let bin_dir = TempDir::new().expect("Failed to create temp dir");
    let script = fake_notifier(bin_dir.path(), "echo 'Failed to watch' >&2\nexit 1", false);

    let mut watch = Watch::new(temp_dir.path(), WatchOptions::default().exec_path(script.to_string_lossy()));
    watch.ready().await.expect("Scan should succeed");

    match watch.recv_timeout(TIMEOUT).await {
        Ok(Some(WatchEvent::Error(WatchError::Notifier(NotifierError::Exited { stderr, .. })))) => {
            assert_eq!(stderr.as_deref(), Some("Failed to watch"));
        }
        other => panic!("Expected notifier exit, got {:?}", other),
    }
    assert_eq!(watch.state(), WatchState::Active);

    watch.stop().await.expect("Stop should succeed");
    assert_eq!(watch.state(), WatchState::Stopped);
}

#[tokio::test]
async fn test_missing_notifier_is_reported() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let options = WatchOptions::default().exec_path("/definitely/not/inotifywait");
    let mut watch = Watch::new(temp_dir.path(), options);
    watch.ready().await.expect("Scan should succeed");

    match watch.recv_timeout(TIMEOUT).await {
        Ok(Some(WatchEvent::Error(err))) => assert!(err.is_notifier_fatal()),
        other => panic!("Expected spawn error, got {:?}", other),
    }
    watch.stop().await.expect("Stop should succeed");
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_is_idempotent_and_silences_events() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let bin_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("a.txt"), "a").expect("Failed to write test file");

    let script = fake_notifier(
        bin_dir.path(),
        r#"i=0
while [ $i -lt 200 ]; do printf 'MODIFY|%s/|a.txt|\n' "$ROOT"; i=$((i+1)); done"#,
        true,
    );

    let mut watch = Watch::new(temp_dir.path(), WatchOptions::default().exec_path(script.to_string_lossy()));
    watch.ready().await.expect("Scan should succeed");
    assert_eq!(next_file_event(&mut watch).await, FileEvent::add("a.txt"));

    let first = watch.stop().await;
    let second = watch.stop().await;
    assert!(first.is_ok());
    assert_eq!(first, second);

    assert_eq!(watch.recv().await, None);
    assert!(watch.try_recv().is_err());
    assert_eq!(watch.state(), WatchState::Stopped);
}

// Single-threaded, so the driver has not run yet when stop() is called.
#[tokio::test(flavor = "current_thread")]
async fn test_stop_during_scan_aborts_ready() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("a.txt"), "a").expect("Failed to write test file");

    let mut watch = Watch::new(temp_dir.path(), WatchOptions::default());
    assert_eq!(watch.state(), WatchState::Scanning);

    watch.stop().await.expect("Stop should succeed");

    let err = watch.ready().await.unwrap_err();
    assert!(matches!(err, WatchError::Aborted(_)), "{:?}", err);
    assert_eq!(watch.recv().await, None);
    assert_eq!(watch.state(), WatchState::Stopped);
    assert!(watch.tracked_files().is_empty());
}

#[tokio::test]
async fn test_live_inotifywait() {
    if std::process::Command::new("inotifywait").arg("--help").output().is_err() {
        eprintln!("inotifywait not installed; skipping");
        return;
    }

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut watch = Watch::new(temp_dir.path(), WatchOptions::default());
    watch.ready().await.expect("Scan should succeed");

    // inotifywait sets up its watches after it starts.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let file = temp_dir.path().join("live.txt");
    fs::write(&file, "hello").expect("Failed to write test file");

    assert_eq!(next_file_event(&mut watch).await, FileEvent::add("live.txt"));

    fs::remove_file(&file).expect("Failed to remove test file");
    loop {
        let event = next_file_event(&mut watch).await;
        if event == FileEvent::remove("live.txt") {
            break;
        }
        assert_eq!(event, FileEvent::change("live.txt"));
    }

    watch.stop().await.expect("Stop should succeed");
}
