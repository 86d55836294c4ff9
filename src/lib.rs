//! Hark - speech-to-text transcription with native speech recognition
//!
//! Marshals caller-supplied audio (interleaved f32 PCM buffers or file
//! paths) into the host platform's on-device speech recognizer and
//! reconciles its streaming partial-result callbacks into a single blocking
//! result, with progress and error events on a subscription channel.
//!
//! On macOS the recognizer is the native Speech framework; elsewhere a
//! scripted stand-in with the same observable semantics is used, which also
//! serves as the test recognizer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hark::Transcriber;
//!
//! let transcriber = Transcriber::native()?;
//! let events = transcriber.subscribe();
//!
//! let samples: Vec<f32> = vec![0.0; 16000]; // one second of 16 kHz mono
//! let text = transcriber.transcribe_buffer(&samples, 16000.0, 1)?;
//! println!("Transcription: {text}");
//! # Ok::<(), hark::HarkError>(())
//! ```

pub mod analyzer;
pub mod buffer;
pub mod error;
pub mod events;
pub mod recognizer;
pub mod transcriber;

pub use analyzer::{analyzer_available, AnalyzerBackend, AnalyzerSession, ScriptedAnalyzer};
pub use buffer::PcmBuffer;
pub use error::{HarkError, Result};
pub use events::TranscriptionEvent;
pub use recognizer::{AuthorizationStatus, RecognitionUpdate, Recognizer, SpeechRecognizer};
pub use transcriber::{Transcriber, NO_SPEECH_SENTINEL};
