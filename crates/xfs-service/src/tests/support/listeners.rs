//! Listeners that forward what they receive over channels.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::cdm::{CdmServiceListener, CountsChanged, Position};

/// Labels every cash dispenser event it receives and sends the label to
/// the test thread.
pub struct ChannelListener {
    labels: Mutex<Sender<String>>,
    gate: Option<Mutex<Receiver<()>>>,
}

impl ChannelListener {
    /// A listener that forwards immediately.
    pub fn new() -> (Arc<Self>, Receiver<String>) {
        let (sender, receiver) = mpsc::channel();
        let listener = Self {
            labels: Mutex::new(sender),
            gate: None,
        };
        (Arc::new(listener), receiver)
    }

    /// A listener that holds every event until the returned sender fires
    /// once per event.
    pub fn gated() -> (Arc<Self>, Receiver<String>, Sender<()>) {
        let (sender, receiver) = mpsc::channel();
        let (release, gate) = mpsc::channel();
        let listener = Self {
            labels: Mutex::new(sender),
            gate: Some(Mutex::new(gate)),
        };
        (Arc::new(listener), receiver, release)
    }

    fn forward(&self, label: String) {
        if let Some(gate) = &self.gate {
            gate.lock()
                .expect("gate mutex poisoned")
                .recv()
                .expect("gate released");
        }
        // The test may have stopped listening; late labels are irrelevant.
        let _ = self
            .labels
            .lock()
            .expect("label mutex poisoned")
            .send(label);
    }
}

impl CdmServiceListener for ChannelListener {
    fn on_safe_door_open(&self) {
        self.forward("safe_door_open".to_owned());
    }

    fn on_safe_door_closed(&self) {
        self.forward("safe_door_closed".to_owned());
    }

    fn on_items_taken(&self, position: Position) {
        self.forward(format!("items_taken:{position:?}"));
    }

    fn on_counts_changed(&self, counts: &CountsChanged) {
        self.forward(format!("counts_changed:{:?}", counts.cash_unit_numbers));
    }

    fn on_items_presented(&self) {
        self.forward("items_presented".to_owned());
    }
}
