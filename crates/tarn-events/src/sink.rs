use std::sync::mpsc::{self, Receiver, Sender};

use crate::MirrorEvent;

/// Trait for consuming events.
///
/// Each frontend provides its own implementation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MirrorEvent);
}

/// Channel-based event sink.
///
/// Sends events through a standard mpsc channel, drained by the CLI's
/// event handler thread.
pub struct ChannelSink {
    sender: Sender<MirrorEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<MirrorEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender,
            },
            receiver,
        )
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: MirrorEvent) {
        let _ = self.sender.send(event);
    }
}

/// No-op event sink for tests or headless operation.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: MirrorEvent) {}
}

/// Collector sink that stores all events for inspection.
#[derive(Default)]
pub struct CollectorSink {
    events: std::sync::Mutex<Vec<MirrorEvent>>,
}

impl CollectorSink {
    pub fn events(&self) -> Vec<MirrorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectorSink {
    fn emit(&self, event: MirrorEvent) {
        self.events.lock().unwrap().push(event);
    }
}
