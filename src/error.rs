//! Error types for transcription operations.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarkError>;

#[derive(Error, Debug)]
pub enum HarkError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Speech recognizer not available: {0}")]
    RecognizerUnavailable(String),

    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("A transcription session is already in flight")]
    SessionBusy,

    #[error("Audio file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Locale not supported: {0}")]
    LocaleUnsupported(String),

    #[error("Speech analyzer not available: {0}")]
    AnalyzerUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarkError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::RecognizerUnavailable(msg.into())
    }

    pub fn recognition<S: Into<String>>(msg: S) -> Self {
        Self::RecognitionFailed(msg.into())
    }
}
