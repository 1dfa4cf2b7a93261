//! Mirror watcher lifecycle against a live file-system watcher.

use std::path::Path;
use std::time::{Duration, Instant};
use strata::config::StrataConfig;
use strata::mirror::MirrorWatcher;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn config(temp: &TempDir) -> StrataConfig {
    let mut config = StrataConfig::default();
    config.staging_root = temp.path().join("stage");
    config.mirror.sources = vec![temp.path().join("LAB-01")];
    config.mirror.stand_prefixes = vec!["LAB".to_string()];
    config.mirror.poll_interval_ms = 20;
    std::fs::create_dir_all(temp.path().join("LAB-01")).unwrap();
    config
}

async fn wait_for_content(path: &Path, expected: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if std::fs::read_to_string(path).map(|s| s == expected).unwrap_or(false) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_stops_the_watcher_cleanly() {
    let temp = TempDir::new().unwrap();
    let watcher = MirrorWatcher::from_config(&config(&temp)).unwrap();
    let token = CancellationToken::new();

    let task = tokio::spawn(watcher.run(token.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("watcher did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn new_files_are_mirrored_under_their_stand() {
    let temp = TempDir::new().unwrap();
    let watcher = MirrorWatcher::from_config(&config(&temp)).unwrap();
    let token = CancellationToken::new();
    let task = tokio::spawn(watcher.run(token.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let serial_dir = temp.path().join("LAB-01").join("SN1");
    std::fs::create_dir_all(&serial_dir).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(serial_dir.join("run1.csv"), "a\n1\n").unwrap();

    let mirrored = temp.path().join("stage/LAB-01/SN1/run1.csv");
    let seen = wait_for_content(&mirrored, "a\n1\n", Duration::from_secs(5)).await;

    token.cancel();
    task.await.unwrap().unwrap();

    assert!(seen, "expected {} to be mirrored", mirrored.display());
}
