//! Recognizer backends with platform-specific implementations.
//!
//! - macOS: Native Speech framework via objc2-speech
//! - Other platforms: Scripted stand-in with the same observable semantics
//!
//! The stand-in is compiled everywhere and doubles as the test recognizer.

use std::path::Path;
use std::sync::Arc;

use crate::buffer::PcmBuffer;
use crate::error::Result;

#[cfg(target_os = "macos")]
mod macos;

pub mod mock;

/// One push-style callback invocation from the recognizer.
///
/// A `Hypothesis` carries the current best text for the whole utterance,
/// not a delta; many may arrive before the terminal one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionUpdate {
    Hypothesis { text: String, is_final: bool },
    Failed { message: String },
}

/// Handler invoked for each update, possibly from a recognizer-owned thread.
pub type UpdateHandler = Arc<dyn Fn(RecognitionUpdate) + Send + Sync>;

/// Permission state of the speech recognizer, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    Restricted,
    NotDetermined,
    Unknown,
}

impl AuthorizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "authorized",
            Self::Denied => "denied",
            Self::Restricted => "restricted",
            Self::NotDetermined => "notDetermined",
            Self::Unknown => "unknown",
        }
    }
}

/// A speech recognizer backend.
///
/// Callers must not start a second recognition while one is streaming;
/// [`crate::Transcriber`] enforces that with its busy flag.
pub trait Recognizer: Send {
    /// Starts recognition of a bounded buffer.
    ///
    /// The buffer is appended to a request and end-of-audio is signaled
    /// immediately. Errors returned here mean the recognizer never started;
    /// later failures arrive through `handler` as [`RecognitionUpdate::Failed`].
    fn recognize_buffer(&mut self, buffer: &PcmBuffer, handler: UpdateHandler) -> Result<()>;

    /// Starts recognition of an audio file. Partial results are not reported;
    /// a single terminal update is expected.
    fn recognize_file(&mut self, path: &Path, handler: UpdateHandler) -> Result<()>;

    /// Requests speech recognition permission from the platform.
    fn request_authorization(&mut self) -> AuthorizationStatus;
}

// Re-export the appropriate implementation as SpeechRecognizer
#[cfg(target_os = "macos")]
pub use macos::SpeechRecognizerImpl as SpeechRecognizer;

#[cfg(not(target_os = "macos"))]
pub use mock::MockRecognizer as SpeechRecognizer;
