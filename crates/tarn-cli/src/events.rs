use std::sync::mpsc::Receiver;

use nu_ansi_term::Color::{Cyan, Green, Yellow};
use tarn_events::{MirrorEvent, TarballOrigin};
use tarn_utils::bytes::format_bytes;
use tracing::{debug, info, trace, warn};

use crate::utils::Colored;

/// Owns the thread rendering [`MirrorEvent`]s.
///
/// The mirror holds the sending side; drop it before calling
/// [`finish`](EventGuard::finish) or the join never returns.
pub struct EventGuard {
    handle: Option<std::thread::JoinHandle<()>>,
}

impl EventGuard {
    pub fn finish(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

/// Whole-percent step of a progress value, used to throttle progress lines.
fn progress_step(percent: f64) -> u64 {
    percent.clamp(0.0, 100.0).floor() as u64
}

fn render(event: MirrorEvent, last_step: &mut Option<u64>) {
    match event {
        MirrorEvent::DocumentCached { name } => {
            debug!("{} served from cache", Colored(Cyan, &name));
        }
        MirrorEvent::DocumentImported { name, version } => {
            debug!(
                "{} imported at {}",
                Colored(Cyan, &name),
                version.as_deref().unwrap_or("<none>")
            );
        }
        MirrorEvent::DocumentMerged {
            name,
            version_count,
        } => {
            debug!(
                "{} refreshed ({version_count} versions)",
                Colored(Cyan, &name)
            );
        }
        MirrorEvent::DocumentDeleted { name } => {
            debug!("{} deleted upstream", Colored(Cyan, &name));
        }
        MirrorEvent::TarballServed {
            name,
            version,
            origin,
            size,
        } => {
            let from = match origin {
                TarballOrigin::Upstream => "upstream",
                TarballOrigin::Cache => "cache",
            };
            debug!(
                "{}@{version} from {from} ({})",
                Colored(Cyan, &name),
                format_bytes(size, 2)
            );
        }
        MirrorEvent::TarballCacheFallback {
            name,
            version,
            reason,
        } => {
            debug!(
                "{}@{version} falling back to cache: {reason}",
                Colored(Cyan, &name)
            );
        }
        MirrorEvent::PatchFailed {
            name,
            version,
            error,
        } => {
            debug!(
                "{}@{version} could not be recorded locally: {error}",
                Colored(Cyan, &name)
            );
        }
        MirrorEvent::Replication { stage } => {
            info!("Replication {}", Colored(Green, stage));
        }
        MirrorEvent::SyncProgress {
            seq,
            percent,
            applied,
        } => {
            let step = progress_step(percent);
            if *last_step != Some(step) {
                *last_step = Some(step);
                info!("Synced {percent:.2}% (seq {seq}, {applied} applied)");
            } else {
                trace!("seq {seq}: {percent:.2}%");
            }
        }
        MirrorEvent::ReplicationRetry { delay, error } => {
            warn!(
                "Replication failed, retrying in {}: {error}",
                Colored(Yellow, format!("{:.1}s", delay.as_secs_f64()))
            );
        }
    }
}

pub fn spawn_event_handler(receiver: Receiver<MirrorEvent>) -> EventGuard {
    let handle = std::thread::spawn(move || {
        let mut last_step = None;
        while let Ok(event) = receiver.recv() {
            render(event, &mut last_step);
        }
    });

    EventGuard {
        handle: Some(handle),
    }
}
