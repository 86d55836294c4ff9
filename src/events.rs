//! Progress and error events emitted during transcription.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

/// Event delivered to subscribers while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionEvent {
    /// Current best hypothesis for the whole utterance (not a delta).
    Progress { text: String, is_final: bool },
    /// A failure was observed; the session also fails with a typed error.
    Error { message: String },
}

/// Fan-out hub for transcription events.
///
/// Subscribers that dropped their receiver are pruned on the next emit.
#[derive(Default)]
pub struct EventHub {
    senders: Mutex<Vec<Sender<TranscriptionEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<TranscriptionEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(tx);
        }
        rx
    }

    pub fn emit(&self, event: TranscriptionEvent) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}
