//! File transcription through the newer on-device analyzer API.
//!
//! The analyzer gates every request through a locale/model state machine
//! before any audio is read: locale support is checked against a dynamically
//! queried set, and a missing language model is downloaded and installed
//! first. Analysis then streams hypotheses of which only the final-flagged
//! ones are collected.
//!
//! The native analyzer ships as a Swift-only API, so the platform wiring
//! stops at the [`AnalyzerBackend`] seam; the OS gate itself is real.

use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, info};

use crate::error::{HarkError, Result};
use crate::recognizer::{RecognitionUpdate, UpdateHandler};
use crate::transcriber::NO_SPEECH_SENTINEL;

/// Minimum OS release carrying the analyzer API.
const ANALYZER_MIN_MAJOR: u32 = 26;

/// Backend seam of the analyzer path.
pub trait AnalyzerBackend: Send {
    /// Locales the analyzer can transcribe, as BCP-47 identifiers.
    fn supported_locales(&mut self) -> Result<Vec<String>>;

    /// Locales whose language model is installed on the device.
    fn installed_locales(&mut self) -> Result<Vec<String>>;

    /// Downloads and installs the language model for `locale`.
    fn download_and_install(&mut self, locale: &str) -> Result<()>;

    /// Streams the file through the analyzer; the handler receives volatile
    /// and final hypotheses and is dropped when analysis finishes.
    fn analyze_file(&mut self, path: &Path, handler: UpdateHandler) -> Result<()>;
}

/// One analyzer transcription pipeline bound to a target locale.
#[derive(Debug)]
pub struct AnalyzerSession<B: AnalyzerBackend> {
    backend: B,
    locale: String,
}

impl AnalyzerSession<ScriptedAnalyzer> {
    /// Session over the platform analyzer for the default locale.
    ///
    /// Fails with [`HarkError::AnalyzerUnavailable`] on hosts without the
    /// analyzer API. The native analyzer is Swift-only, so on supported
    /// hosts the scripted backend stands in behind the same gates.
    pub fn native() -> Result<Self> {
        require_analyzer()?;
        Ok(Self::with_default_locale(ScriptedAnalyzer::new()))
    }
}

impl<B: AnalyzerBackend> AnalyzerSession<B> {
    pub fn new<S: Into<String>>(backend: B, locale: S) -> Self {
        Self {
            backend,
            locale: locale.into(),
        }
    }

    /// Session for the default `en-US` locale.
    pub fn with_default_locale(backend: B) -> Self {
        Self::new(backend, "en-US")
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Transcribes a file: locale gate, model gate (downloading if needed),
    /// analysis, then concatenation of final hypotheses only.
    pub fn transcribe_file<P: AsRef<Path>>(&mut self, path: P) -> Result<String> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HarkError::FileNotFound(path.to_path_buf()));
        }

        debug!(path = %path.display(), locale = %self.locale, "analyzer locale check");
        let supported = self.backend.supported_locales()?;
        if !supported.iter().any(|l| locale_eq(l, &self.locale)) {
            return Err(HarkError::LocaleUnsupported(self.locale.clone()));
        }

        debug!(locale = %self.locale, "analyzer model check");
        let installed = self.backend.installed_locales()?;
        if !installed.iter().any(|l| locale_eq(l, &self.locale)) {
            info!(locale = %self.locale, "language model not installed, downloading");
            self.backend.download_and_install(&self.locale)?;
        }

        let (tx, rx) = mpsc::channel::<RecognitionUpdate>();
        let tx = Mutex::new(tx);
        let handler: UpdateHandler = Arc::new(move |update| {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(update);
            }
        });

        debug!(path = %path.display(), "analyzing audio file");
        self.backend.analyze_file(path, handler)?;

        // Collect: volatile hypotheses are discarded, finals concatenated.
        // The channel closing is normal completion here, unlike the
        // recognizer path where it means the stream died early.
        let mut transcript = String::new();
        loop {
            match rx.recv() {
                Ok(RecognitionUpdate::Hypothesis { text, is_final: true }) => {
                    transcript.push_str(&text);
                }
                Ok(RecognitionUpdate::Hypothesis { is_final: false, .. }) => {}
                Ok(RecognitionUpdate::Failed { message }) => {
                    return Err(HarkError::recognition(message));
                }
                Err(_) => break,
            }
        }

        Ok(if transcript.is_empty() {
            NO_SPEECH_SENTINEL.to_string()
        } else {
            transcript
        })
    }
}

/// BCP-47 comparison: underscores and hyphens are interchangeable and the
/// match is case-insensitive, so `en_US` equals `en-US`.
fn locale_eq(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.replace('_', "-").to_ascii_lowercase();
    norm(a) == norm(b)
}

/// Whether the analyzer API exists on this host.
pub fn analyzer_available() -> bool {
    #[cfg(target_os = "macos")]
    {
        os_version::current().is_some_and(|(major, _)| major >= ANALYZER_MIN_MAJOR)
    }
    #[cfg(not(target_os = "macos"))]
    {
        false
    }
}

/// Errors with [`HarkError::AnalyzerUnavailable`] on hosts without the API.
pub fn require_analyzer() -> Result<()> {
    if analyzer_available() {
        Ok(())
    } else {
        Err(HarkError::AnalyzerUnavailable(format!(
            "speech analyzer requires macOS {ANALYZER_MIN_MAJOR}.0 or later"
        )))
    }
}

#[cfg(target_os = "macos")]
mod os_version {
    use std::process::Command;
    use std::sync::OnceLock;

    /// (major, minor) from `sw_vers -productVersion`, cached for the process.
    pub fn current() -> Option<(u32, u32)> {
        static CACHED: OnceLock<Option<(u32, u32)>> = OnceLock::new();
        *CACHED.get_or_init(|| {
            let output = Command::new("sw_vers")
                .arg("-productVersion")
                .output()
                .ok()?;
            if !output.status.success() {
                return None;
            }
            parse(std::str::from_utf8(&output.stdout).ok()?)
        })
    }

    pub fn parse(version: &str) -> Option<(u32, u32)> {
        let mut parts = version.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        Some((major, minor))
    }

}

/// Scripted analyzer backend: the stand-in for hosts without the native
/// analyzer and the test double everywhere.
#[derive(Debug)]
pub struct ScriptedAnalyzer {
    supported: Vec<String>,
    installed: Vec<String>,
    results: Vec<(String, bool)>,
    fail_with: Option<String>,
    downloads: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supporting<S: Into<String>>(mut self, locales: Vec<S>) -> Self {
        self.supported = locales.into_iter().map(Into::into).collect();
        self
    }

    pub fn installed<S: Into<String>>(mut self, locales: Vec<S>) -> Self {
        self.installed = locales.into_iter().map(Into::into).collect();
        self
    }

    /// Hypotheses to stream, as `(text, is_final)` pairs.
    pub fn with_results<S: Into<String>>(mut self, results: Vec<(S, bool)>) -> Self {
        self.results = results
            .into_iter()
            .map(|(text, is_final)| (text.into(), is_final))
            .collect();
        self
    }

    pub fn with_error<S: Into<String>>(mut self, message: S) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Handle recording every model download the session triggers.
    pub fn download_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.downloads)
    }
}

impl Default for ScriptedAnalyzer {
    fn default() -> Self {
        Self {
            supported: vec!["en-US".to_string()],
            installed: vec!["en-US".to_string()],
            results: Vec::new(),
            fail_with: None,
            downloads: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl AnalyzerBackend for ScriptedAnalyzer {
    fn supported_locales(&mut self) -> Result<Vec<String>> {
        Ok(self.supported.clone())
    }

    fn installed_locales(&mut self) -> Result<Vec<String>> {
        Ok(self.installed.clone())
    }

    fn download_and_install(&mut self, locale: &str) -> Result<()> {
        if let Ok(mut downloads) = self.downloads.lock() {
            downloads.push(locale.to_string());
        }
        self.installed.push(locale.to_string());
        Ok(())
    }

    fn analyze_file(&mut self, _path: &Path, handler: UpdateHandler) -> Result<()> {
        let results = self.results.clone();
        let fail_with = self.fail_with.clone();

        thread::spawn(move || {
            for (text, is_final) in results {
                handler(RecognitionUpdate::Hypothesis { text, is_final });
            }
            if let Some(message) = fail_with {
                handler(RecognitionUpdate::Failed { message });
            }
            // Dropping the handler closes the collection channel.
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_comparison_is_bcp47_tolerant() {
        assert!(locale_eq("en_US", "en-US"));
        assert!(locale_eq("EN-us", "en-US"));
        assert!(!locale_eq("en-GB", "en-US"));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn analyzer_gate_is_closed_off_macos() {
        assert!(!analyzer_available());
        assert!(matches!(
            require_analyzer().unwrap_err(),
            HarkError::AnalyzerUnavailable(_)
        ));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn native_session_fails_behind_closed_gate() {
        assert!(matches!(
            AnalyzerSession::native().unwrap_err(),
            HarkError::AnalyzerUnavailable(_)
        ));
    }
}
