//! Background consumer of the upstream change feed.
//!
//! The controller pulls batches from a [`ChangeFeed`] and applies them to the
//! local [`DocumentStore`]. Its state moves through
//! `idle → syncing → (retrying ⇄ syncing) → stopped` and can be observed
//! through [`ReplicationFeedController::subscribe`].

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tarn_config::replication::ReplicationConfig;
use tarn_events::{EventSinkHandle, MirrorEvent, ReplicationStage};
use tarn_registry::{Change, PackageDocument, Seq};
use tarn_utils::keyed::KeyedLock;
use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tracing::{debug, info, trace, warn};

use crate::{
    error::MirrorError,
    reconcile::write_with_retry,
    store::{ChangeFeed, DocumentStore},
    MirrorResult,
};

/// Multiplicative retry delay, reset after every success.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    factor: f64,
    max: Duration,
    current: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            current: initial,
        }
    }

    pub fn from_config(config: &ReplicationConfig) -> MirrorResult<Self> {
        Ok(Self::new(
            config.initial_backoff()?,
            config.backoff_factor,
            config.max_backoff()?,
        ))
    }

    /// Delay to wait now. The following one grows by the factor, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self.current.mul_f64(self.factor).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Replication progress in percent, with two decimals, never above 100.
pub fn progress_percent(current: u64, target: u64) -> f64 {
    if target == 0 {
        return 100.0;
    }
    let percent = (current as f64 / target as f64 * 10000.0).floor() / 100.0;
    percent.min(100.0)
}

/// Settings of a [`ReplicationFeedController`].
#[derive(Debug, Clone)]
pub struct ReplicationSettings {
    pub batch_size: u32,
    pub backoff: BackoffPolicy,
}

impl ReplicationSettings {
    pub fn from_config(config: &ReplicationConfig) -> MirrorResult<Self> {
        Ok(Self {
            batch_size: config.batch_size,
            backoff: BackoffPolicy::from_config(config)?,
        })
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ReplicationFeedController {
    feed: Arc<dyn ChangeFeed>,
    local: Arc<dyn DocumentStore>,
    locks: Arc<KeyedLock>,
    events: EventSinkHandle,
    settings: ReplicationSettings,
    state: watch::Sender<ReplicationStage>,
    running: Mutex<Option<Running>>,
}

impl ReplicationFeedController {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        local: Arc<dyn DocumentStore>,
        locks: Arc<KeyedLock>,
        events: EventSinkHandle,
        settings: ReplicationSettings,
    ) -> Self {
        let (state, _) = watch::channel(ReplicationStage::Idle);
        Self {
            feed,
            local,
            locks,
            events,
            settings,
            state,
            running: Mutex::new(None),
        }
    }

    /// Checkpoint key of the consumed feed.
    pub fn source(&self) -> &str {
        self.feed.source()
    }

    pub fn state(&self) -> ReplicationStage {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReplicationStage> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.as_ref().is_some_and(|r| !r.task.is_finished()))
            .unwrap_or(false)
    }

    /// Starts consuming the feed in a background task.
    ///
    /// Returns `false` if the controller is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.clone().run(shutdown_rx));
        *running = Some(Running {
            shutdown,
            task,
        });
        true
    }

    /// Stops the background task and waits for it to finish.
    ///
    /// A batch being applied completes first. Safe to call at any time,
    /// including before [`start`](Self::start) or more than once.
    pub async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            if let Err(err) = running.task.await {
                warn!("replication task ended abnormally: {err}");
            }
        }
        self.set_state(ReplicationStage::Stopped);
    }

    fn set_state(&self, stage: ReplicationStage) {
        let changed = self.state.send_if_modified(|current| {
            if *current == stage {
                return false;
            }
            *current = stage;
            true
        });
        if changed {
            debug!(%stage, "replication state changed");
            self.events.emit(MirrorEvent::Replication {
                stage,
            });
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let source = self.feed.source().to_string();
        let mut backoff = self.settings.backoff.clone();
        backoff.reset();

        let mut since = match self.local.checkpoint(&source).await {
            Ok(Some(seq)) => seq,
            Ok(None) => Seq::zero(),
            Err(err) => {
                warn!(%source, "could not read checkpoint, starting from scratch: {err}");
                Seq::zero()
            }
        };
        let mut target: Option<u64> = None;
        let mut applied_total = 0usize;

        info!(%source, %since, "replication started");
        self.set_state(ReplicationStage::Syncing);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = if target.is_none() {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    info = self.feed.info() => info.map(|info| {
                        let seq = info.update_seq.numeric();
                        debug!(update_seq = seq, "replication target");
                        target = Some(seq);
                    }),
                }
            } else {
                let changes = tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    changes = self.feed.changes(&since, self.settings.batch_size) => changes,
                };
                match changes {
                    Ok(batch) => {
                        match self.apply_batch(&batch.results, &mut target).await {
                            Ok(count) => {
                                applied_total += count;
                                since = batch.last_seq;
                                if count > 0 {
                                    self.save_checkpoint(&source, &since).await;
                                }
                                Ok(())
                            }
                            Err(err) => Err(err),
                        }
                    }
                    Err(err) => Err(err),
                }
            };

            match result {
                Ok(()) => {
                    backoff.reset();
                    self.set_state(ReplicationStage::Syncing);
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    let err = MirrorError::ReplicationError(err.to_string());
                    warn!(?delay, "{err}");
                    self.set_state(ReplicationStage::Retrying);
                    self.events.emit(MirrorEvent::ReplicationRetry {
                        delay,
                        error: err.to_string(),
                    });

                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        info!(%source, %since, applied = applied_total, "replication stopped");
        self.set_state(ReplicationStage::Stopped);
    }

    async fn save_checkpoint(&self, source: &str, seq: &Seq) {
        if let Err(err) = self.local.set_checkpoint(source, seq).await {
            warn!(source, %seq, "failed to persist checkpoint: {err}");
        }
    }

    /// Applies every change of a batch, reporting progress after each one.
    async fn apply_batch(
        &self,
        changes: &[Change],
        target: &mut Option<u64>,
    ) -> MirrorResult<usize> {
        let mut applied = 0;
        for change in changes {
            self.apply_change(change).await?;
            applied += 1;

            let current = change.seq.numeric();
            let goal = target.get_or_insert(current);
            if current > *goal {
                *goal = current;
            }
            self.events.emit(MirrorEvent::SyncProgress {
                seq: change.seq.to_string(),
                percent: progress_percent(current, *goal),
                applied,
            });
        }
        Ok(applied)
    }

    async fn apply_change(&self, change: &Change) -> MirrorResult<()> {
        let name = change.id.as_str();
        if !change.is_package() {
            trace!(name, "skipping non-package change");
            return Ok(());
        }

        let _guard = self.locks.lock(name).await;

        if change.deleted {
            if self.local.remove(name).await? {
                info!(name, "removed package deleted upstream");
                self.events.emit(MirrorEvent::DocumentDeleted {
                    name: name.to_string(),
                });
            }
            return Ok(());
        }

        let Some(raw) = &change.doc else {
            trace!(name, "change without document");
            return Ok(());
        };

        let mut remote: PackageDocument = match serde_json::from_value(raw.clone()) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(name, "skipping unreadable upstream document: {err}");
                return Ok(());
            }
        };
        if remote.name.is_empty() {
            remote.name = name.to_string();
        }
        remote.revision = None;
        remote.first_import = false;
        remote.purge_invalid_versions();
        remote.refresh_latest();

        let current = self.local.get(name).await?;
        if let Some(local) = &current {
            if !remote.is_fresher_or_equal(local) {
                trace!(name, "local copy is newer than replicated one");
                return Ok(());
            }
        }

        write_with_retry(self.local.as_ref(), name, current, |_| remote.clone()).await?;
        trace!(name, versions = remote.versions.len(), "replicated document");
        Ok(())
    }
}
