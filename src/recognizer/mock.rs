//! Scripted stand-in recognizer for platforms without native support.
//!
//! Delivers updates from a spawned thread the way the native recognizer
//! delivers them from its callback queue, so the reconciliation path is
//! exercised identically. Used as the platform backend off macOS and as
//! the test recognizer everywhere.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::buffer::PcmBuffer;
use crate::error::{HarkError, Result};
use crate::recognizer::{AuthorizationStatus, RecognitionUpdate, Recognizer, UpdateHandler};

const DEMO_TEXT: &str = "Hello world, this is a demo of speech recognition.";

pub struct MockRecognizer {
    partials: Option<Vec<String>>,
    final_text: Option<String>,
    fail_with: Option<String>,
    no_terminal: bool,
    trailing_finals: usize,
    delay: Duration,
    unavailable: Option<String>,
    authorization: AuthorizationStatus,
    invocations: Arc<AtomicUsize>,
}

impl MockRecognizer {
    pub fn new() -> Result<Self> {
        Ok(Self::default())
    }

    /// Partial hypotheses to deliver before the terminal update.
    pub fn with_partials<S: Into<String>>(mut self, partials: Vec<S>) -> Self {
        self.partials = Some(partials.into_iter().map(Into::into).collect());
        self
    }

    /// Terminal hypothesis text. Without a script, the transcript is derived
    /// from the audio (silence yields an empty final hypothesis).
    pub fn with_final<S: Into<String>>(mut self, text: S) -> Self {
        self.final_text = Some(text.into());
        self
    }

    /// Injects a mid-stream recognition error after the partials.
    pub fn with_error<S: Into<String>>(mut self, message: S) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Ends the stream after the partials without any terminal update, the
    /// way a recognizer that dies mid-utterance does.
    pub fn with_no_terminal(mut self) -> Self {
        self.no_terminal = true;
        self
    }

    /// Re-sends the terminal update `n` extra times after completion, to
    /// exercise the exactly-once resolution guarantee.
    pub fn with_trailing_finals(mut self, n: usize) -> Self {
        self.trailing_finals = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes `recognize_*` fail before any streaming starts.
    pub fn unavailable<S: Into<String>>(mut self, message: S) -> Self {
        self.unavailable = Some(message.into());
        self
    }

    pub fn with_authorization(mut self, status: AuthorizationStatus) -> Self {
        self.authorization = status;
        self
    }

    /// Shared counter of `recognize_*` entries, for asserting the recognizer
    /// was never reached.
    pub fn invocation_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.invocations)
    }

    fn derive_final(&self, silent: bool) -> String {
        match &self.final_text {
            Some(text) => text.clone(),
            None if silent => String::new(),
            None => DEMO_TEXT.to_string(),
        }
    }

    fn derive_partials(&self, silent: bool, report_partials: bool) -> Vec<String> {
        if !report_partials {
            return Vec::new();
        }
        if let Some(partials) = &self.partials {
            return partials.clone();
        }
        if silent || self.final_text.is_some() {
            return Vec::new();
        }
        // Growing prefixes, the way the native recognizer re-reports the
        // whole utterance as it refines.
        let words: Vec<&str> = DEMO_TEXT.split_whitespace().collect();
        (1..words.len()).map(|n| words[..n].join(" ")).collect()
    }

    fn stream(&mut self, silent: bool, report_partials: bool, handler: UpdateHandler) {
        let partials = self.derive_partials(silent, report_partials);
        let fail_with = self.fail_with.clone();
        let no_terminal = self.no_terminal;
        let final_text = self.derive_final(silent);
        let trailing = self.trailing_finals;
        let delay = self.delay;

        thread::spawn(move || {
            for partial in partials {
                thread::sleep(delay);
                handler(RecognitionUpdate::Hypothesis {
                    text: partial,
                    is_final: false,
                });
            }
            thread::sleep(delay);

            // Dropping the handler here closes the session channel with
            // nothing terminal ever sent.
            if no_terminal {
                return;
            }

            if let Some(message) = fail_with {
                handler(RecognitionUpdate::Failed { message });
                return;
            }

            for _ in 0..=trailing {
                handler(RecognitionUpdate::Hypothesis {
                    text: final_text.clone(),
                    is_final: true,
                });
            }
        });
    }

    fn check_available(&self) -> Result<()> {
        match &self.unavailable {
            Some(message) => Err(HarkError::unavailable(message.clone())),
            None => Ok(()),
        }
    }

    fn read_wav(path: &Path) -> Result<PcmBuffer> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| HarkError::invalid_input(format!("unreadable audio file: {e}")))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>(),
            hound::SampleFormat::Int => reader
                .samples::<i16>()
                .map(|s| s.map(|s| f32::from(s) / f32::from(i16::MAX)))
                .collect::<std::result::Result<_, _>>(),
        }
        .map_err(|e| HarkError::invalid_input(format!("unreadable audio file: {e}")))?;

        PcmBuffer::from_interleaved(&samples, f64::from(spec.sample_rate), spec.channels)
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self {
            partials: None,
            final_text: None,
            fail_with: None,
            no_terminal: false,
            trailing_finals: 0,
            delay: Duration::from_millis(1),
            unavailable: None,
            authorization: AuthorizationStatus::Authorized,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Recognizer for MockRecognizer {
    fn recognize_buffer(&mut self, buffer: &PcmBuffer, handler: UpdateHandler) -> Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        debug!(
            frames = buffer.frame_count(),
            channels = buffer.channel_count(),
            "stand-in recognizer streaming buffer"
        );
        self.stream(buffer.is_silence(), true, handler);
        Ok(())
    }

    fn recognize_file(&mut self, path: &Path, handler: UpdateHandler) -> Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let silent = if path.extension().is_some_and(|ext| ext == "wav") {
            Self::read_wav(path)?.is_silence()
        } else {
            false
        };

        debug!(path = %path.display(), "stand-in recognizer streaming file");
        self.stream(silent, false, handler);
        Ok(())
    }

    fn request_authorization(&mut self) -> AuthorizationStatus {
        self.authorization
    }
}
