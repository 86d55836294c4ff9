//! Transcription sessions: buffer and file recognition with streaming
//! reconciliation.
//!
//! The recognizer pushes partial results through a callback that may fire
//! many times; a session funnels those updates through a channel consumed on
//! the submitting thread, so the outer call resolves exactly once, on the
//! first terminal update or error.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::buffer::PcmBuffer;
use crate::error::{HarkError, Result};
use crate::events::{EventHub, TranscriptionEvent};
use crate::recognizer::{
    AuthorizationStatus, RecognitionUpdate, Recognizer, SpeechRecognizer, UpdateHandler,
};

/// Result text substituted when the recognizer yields an empty final
/// hypothesis. An empty transcript is not an error.
pub const NO_SPEECH_SENTINEL: &str = "No speech detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Requesting,
    Recognizing,
    Completed,
    Failed,
}

/// Drives a recognizer backend and reconciles its streaming callbacks into
/// single awaited results.
///
/// At most one session runs at a time; overlapping submissions fail with
/// [`HarkError::SessionBusy`] instead of corrupting recognizer state.
pub struct Transcriber<R: Recognizer> {
    recognizer: Mutex<R>,
    events: EventHub,
    busy: AtomicBool,
}

impl Transcriber<SpeechRecognizer> {
    /// Builds a transcriber over the platform speech recognizer.
    pub fn native() -> Result<Self> {
        Ok(Self::new(SpeechRecognizer::new()?))
    }
}

impl<R: Recognizer> Transcriber<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer: Mutex::new(recognizer),
            events: EventHub::new(),
            busy: AtomicBool::new(false),
        }
    }

    /// Subscribes to progress and error events of subsequent sessions.
    pub fn subscribe(&self) -> Receiver<TranscriptionEvent> {
        self.events.subscribe()
    }

    /// Transcribes a flat interleaved f32 PCM buffer.
    ///
    /// Partial hypotheses are emitted as [`TranscriptionEvent::Progress`]
    /// while the call blocks; the returned text is the final hypothesis, or
    /// [`NO_SPEECH_SENTINEL`] when the recognizer heard nothing.
    pub fn transcribe_buffer(
        &self,
        samples: &[f32],
        sample_rate: f64,
        channels: u16,
    ) -> Result<String> {
        let _guard = self.acquire_session()?;

        // Validation failures report on both channels and never reach
        // the recognizer.
        let buffer = match PcmBuffer::from_interleaved(samples, sample_rate, channels) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.events.emit(TranscriptionEvent::Error {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        debug!(
            samples = samples.len(),
            sample_rate,
            channels,
            frames = buffer.frame_count(),
            "buffer transcription requested"
        );

        self.run_session(|recognizer, handler| recognizer.recognize_buffer(&buffer, handler))
    }

    /// Transcribes an audio file. Partial results are not reported.
    pub fn transcribe_file<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let _guard = self.acquire_session()?;

        let path = path.as_ref();
        if !path.exists() {
            return Err(HarkError::FileNotFound(path.to_path_buf()));
        }

        debug!(path = %path.display(), "file transcription requested");

        self.run_session(|recognizer, handler| recognizer.recognize_file(path, handler))
    }

    /// Requests speech recognition permission, returning the platform status.
    pub fn request_permissions(&self) -> AuthorizationStatus {
        match self.recognizer.lock() {
            Ok(mut recognizer) => recognizer.request_authorization(),
            Err(_) => AuthorizationStatus::Unknown,
        }
    }

    fn acquire_session(&self) -> Result<SessionGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(SessionGuard { flag: &self.busy })
        } else {
            warn!("transcription session rejected: one already in flight");
            Err(HarkError::SessionBusy)
        }
    }

    /// Runs one session to its single resolution.
    ///
    /// `start` kicks the backend off with a handler that forwards every
    /// update into the session channel. The loop below is the only consumer:
    /// it returns on the first terminal update, after which the receiver is
    /// dropped and any late callbacks go nowhere.
    fn run_session<F>(&self, start: F) -> Result<String>
    where
        F: FnOnce(&mut R, UpdateHandler) -> Result<()>,
    {
        let mut state = SessionState::Requesting;
        debug!(?state, "session");

        let (tx, rx) = mpsc::channel::<RecognitionUpdate>();
        let tx = Mutex::new(tx);
        let handler: UpdateHandler = Arc::new(move |update| {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(update);
            }
        });

        {
            let mut recognizer = self
                .recognizer
                .lock()
                .map_err(|_| HarkError::recognition("recognizer mutex poisoned"))?;
            if let Err(err) = start(&mut recognizer, handler) {
                state = SessionState::Failed;
                debug!(?state, "session");
                self.events.emit(TranscriptionEvent::Error {
                    message: err.to_string(),
                });
                return Err(err);
            }
        }

        state = SessionState::Recognizing;
        debug!(?state, "session");

        loop {
            match rx.recv() {
                Ok(RecognitionUpdate::Hypothesis { text, is_final: false }) => {
                    self.events.emit(TranscriptionEvent::Progress {
                        text,
                        is_final: false,
                    });
                }
                Ok(RecognitionUpdate::Hypothesis { text, is_final: true }) => {
                    state = SessionState::Completed;
                    debug!(?state, "session");
                    self.events.emit(TranscriptionEvent::Progress {
                        text: text.clone(),
                        is_final: true,
                    });
                    return Ok(if text.is_empty() {
                        NO_SPEECH_SENTINEL.to_string()
                    } else {
                        text
                    });
                }
                Ok(RecognitionUpdate::Failed { message }) => {
                    state = SessionState::Failed;
                    debug!(?state, "session");
                    self.events.emit(TranscriptionEvent::Error {
                        message: message.clone(),
                    });
                    return Err(HarkError::recognition(message));
                }
                Err(_) => {
                    state = SessionState::Failed;
                    debug!(?state, "session");
                    let message = "recognition ended without a final result";
                    self.events.emit(TranscriptionEvent::Error {
                        message: message.to_string(),
                    });
                    return Err(HarkError::recognition(message));
                }
            }
        }
    }
}

/// Releases the single-inflight flag on every exit path.
struct SessionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
