//! Mirror watcher: replicates source trees into the staging tree.
//!
//! One notify watcher per source root runs on a blocking task. Each loop
//! polls its event channel with a timeout and checks the cancellation token;
//! events are handled one at a time, so a copy in progress always finishes
//! before the loop notices shutdown.

mod handler;

pub use handler::{
    is_lock_contention, retry_locked, CopyRetry, MirrorHandler, SourceEvent, SourceEventKind,
};

use crate::config::StrataConfig;
use crate::error::{Result, StrataError};
use crate::paths::absolute_path;
use notify::Config as NotifyConfig;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct MirrorWatcher {
    handlers: Vec<MirrorHandler>,
    poll_interval: Duration,
}

impl MirrorWatcher {
    pub fn new(handlers: Vec<MirrorHandler>, poll_interval: Duration) -> Self {
        Self {
            handlers,
            poll_interval,
        }
    }

    /// Build handlers for every configured source root.
    ///
    /// Fails when no source is configured or a source is not a directory.
    pub fn from_config(config: &StrataConfig) -> Result<Self> {
        let mirror = &config.mirror;
        if mirror.sources.is_empty() {
            return Err(StrataError::Config("mirror.sources is empty".to_string()));
        }

        let dest_root = config.mirror_destination();
        std::fs::create_dir_all(dest_root)?;
        let dest_root = absolute_path(dest_root);

        let retry = CopyRetry {
            attempts: mirror.copy_attempts,
            backoff: mirror.copy_backoff(),
        };

        let mut handlers = Vec::with_capacity(mirror.sources.len());
        for source in &mirror.sources {
            if !source.is_dir() {
                return Err(StrataError::Config(format!(
                    "mirror source is not a directory: {}",
                    source.display()
                )));
            }
            handlers.push(MirrorHandler::new(
                absolute_path(source),
                dest_root.clone(),
                mirror.stand_prefixes.clone(),
                retry,
            ));
        }

        Ok(Self::new(handlers, mirror.poll_interval()))
    }

    /// Watch every root until `token` is cancelled.
    ///
    /// Returns the first watcher setup error, after all roots have stopped.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let mut tasks = Vec::with_capacity(self.handlers.len());
        for handler in self.handlers {
            let token = token.clone();
            let poll = self.poll_interval;
            tasks.push(tokio::task::spawn_blocking(move || {
                let result = watch_root(&handler, poll, &token);
                if result.is_err() {
                    // One failed root stops the others.
                    token.cancel();
                }
                result
            }));
        }

        let mut first_error = None;
        for task in tasks {
            let result = task.await.map_err(StrataError::from).and_then(|r| r);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn watch_root(handler: &MirrorHandler, poll: Duration, token: &CancellationToken) -> Result<()> {
    let root = handler.src_root();
    let (watch_tx, watch_rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(watch_tx, NotifyConfig::default())?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "Watching");

    loop {
        if token.is_cancelled() {
            break;
        }
        match watch_rx.recv_timeout(poll) {
            Ok(Ok(event)) => {
                for event in SourceEvent::from_notify(event) {
                    handler.handle(&event);
                }
            }
            Ok(Err(err)) => warn!(root = %root.display(), error = %err, "Watcher error"),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stop producing, then handle what was already delivered.
    drop(watcher);
    let mut drained = 0usize;
    while let Ok(res) = watch_rx.try_recv() {
        if let Ok(event) = res {
            for event in SourceEvent::from_notify(event) {
                handler.handle(&event);
                drained += 1;
            }
        }
    }

    info!(root = %root.display(), drained, "Stopped watching");
    Ok(())
}
