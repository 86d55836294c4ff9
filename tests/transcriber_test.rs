//! End-to-end session behavior over the scripted backends.

use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hark::analyzer::{AnalyzerSession, ScriptedAnalyzer};
use hark::recognizer::mock::MockRecognizer;
use hark::{
    AuthorizationStatus, HarkError, Transcriber, TranscriptionEvent, NO_SPEECH_SENTINEL,
};

fn drain(events: &std::sync::mpsc::Receiver<TranscriptionEvent>) -> Vec<TranscriptionEvent> {
    events.try_iter().collect()
}

#[test]
fn silent_buffer_resolves_to_sentinel() {
    // 16000 samples, mono, all zeros: the recognizer reports an empty final
    // hypothesis, which maps to the sentinel rather than "" or an error.
    let transcriber = Transcriber::new(MockRecognizer::new().unwrap());
    let events = transcriber.subscribe();

    let samples = vec![0.0f32; 16000];
    let text = transcriber.transcribe_buffer(&samples, 16000.0, 1).unwrap();
    assert_eq!(text, NO_SPEECH_SENTINEL);

    // The terminal progress event still carries the raw empty hypothesis.
    let all = drain(&events);
    assert_eq!(
        all.last(),
        Some(&TranscriptionEvent::Progress {
            text: String::new(),
            is_final: true,
        })
    );
}

#[test]
fn one_resolution_despite_callback_fanout() {
    let recognizer = MockRecognizer::new()
        .unwrap()
        .with_partials(vec!["the", "the quick", "the quick brown"])
        .with_final("the quick brown fox")
        .with_trailing_finals(3);
    let transcriber = Transcriber::new(recognizer);
    let events = transcriber.subscribe();

    let samples = vec![0.2f32; 8000];
    let text = transcriber.transcribe_buffer(&samples, 16000.0, 1).unwrap();
    assert_eq!(text, "the quick brown fox");

    let all = drain(&events);
    let finals = all
        .iter()
        .filter(|e| matches!(e, TranscriptionEvent::Progress { is_final: true, .. }))
        .count();
    let partials = all
        .iter()
        .filter(|e| matches!(e, TranscriptionEvent::Progress { is_final: false, .. }))
        .count();
    assert_eq!(finals, 1, "terminal resolution must happen exactly once");
    assert_eq!(partials, 3);
}

#[test]
fn progress_events_carry_whole_utterance_hypotheses() {
    let recognizer = MockRecognizer::new()
        .unwrap()
        .with_partials(vec!["hello", "hello world"])
        .with_final("hello world.");
    let transcriber = Transcriber::new(recognizer);
    let events = transcriber.subscribe();

    let samples = vec![0.2f32; 8000];
    transcriber.transcribe_buffer(&samples, 16000.0, 1).unwrap();

    let texts: Vec<String> = drain(&events)
        .into_iter()
        .map(|e| match e {
            TranscriptionEvent::Progress { text, .. } => text,
            TranscriptionEvent::Error { message } => panic!("unexpected error: {message}"),
        })
        .collect();
    assert_eq!(texts, ["hello", "hello world", "hello world."]);
}

#[test]
fn malformed_input_never_reaches_the_recognizer() {
    let recognizer = MockRecognizer::new().unwrap();
    let invocations = recognizer.invocation_handle();
    let transcriber = Transcriber::new(recognizer);

    assert!(matches!(
        transcriber.transcribe_buffer(&[], 16000.0, 1).unwrap_err(),
        HarkError::InvalidInput(_)
    ));
    assert!(matches!(
        transcriber
            .transcribe_buffer(&[0.0; 64], 16000.0, 4)
            .unwrap_err(),
        HarkError::InvalidInput(_)
    ));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[test]
fn midstream_error_fails_session_and_emits_event() {
    let recognizer = MockRecognizer::new()
        .unwrap()
        .with_partials(vec!["partial"])
        .with_error("recognition service interrupted");
    let transcriber = Transcriber::new(recognizer);
    let events = transcriber.subscribe();

    let samples = vec![0.2f32; 8000];
    let err = transcriber
        .transcribe_buffer(&samples, 16000.0, 1)
        .unwrap_err();
    match err {
        HarkError::RecognitionFailed(message) => {
            assert!(message.contains("interrupted"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    let all = drain(&events);
    assert!(matches!(
        all.last(),
        Some(TranscriptionEvent::Error { .. })
    ));
}

#[test]
fn stream_dying_without_final_fails_session_and_emits_event() {
    // The recognizer drops its callback after the partials with nothing
    // terminal sent; the session must resolve with a typed error instead
    // of waiting forever.
    let recognizer = MockRecognizer::new()
        .unwrap()
        .with_partials(vec!["cut", "cut off"])
        .with_no_terminal();
    let transcriber = Transcriber::new(recognizer);
    let events = transcriber.subscribe();

    let samples = vec![0.2f32; 8000];
    let err = transcriber
        .transcribe_buffer(&samples, 16000.0, 1)
        .unwrap_err();
    match err {
        HarkError::RecognitionFailed(message) => {
            assert!(message.contains("without a final result"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let all = drain(&events);
    let partials = all
        .iter()
        .filter(|e| matches!(e, TranscriptionEvent::Progress { is_final: false, .. }))
        .count();
    assert_eq!(partials, 2);
    assert!(matches!(
        all.last(),
        Some(TranscriptionEvent::Error { .. })
    ));
}

#[test]
fn overlapping_submission_is_rejected_busy() {
    let recognizer = MockRecognizer::new()
        .unwrap()
        .with_partials(vec!["slow"])
        .with_final("slow result")
        .with_delay(Duration::from_millis(50));
    let transcriber = Arc::new(Transcriber::new(recognizer));

    let first = {
        let transcriber = Arc::clone(&transcriber);
        thread::spawn(move || {
            let samples = vec![0.2f32; 8000];
            transcriber.transcribe_buffer(&samples, 16000.0, 1)
        })
    };

    // Give the first session time to acquire the flag.
    thread::sleep(Duration::from_millis(20));
    let samples = vec![0.2f32; 8000];
    assert!(matches!(
        transcriber
            .transcribe_buffer(&samples, 16000.0, 1)
            .unwrap_err(),
        HarkError::SessionBusy
    ));

    assert_eq!(first.join().unwrap().unwrap(), "slow result");

    // Flag released: a fresh session goes through.
    let text = transcriber.transcribe_buffer(&samples, 16000.0, 1).unwrap();
    assert_eq!(text, "slow result");
}

#[test]
fn missing_file_is_a_typed_error() {
    let transcriber = Transcriber::new(MockRecognizer::new().unwrap());
    assert!(matches!(
        transcriber
            .transcribe_file("/nonexistent/clip.wav")
            .unwrap_err(),
        HarkError::FileNotFound(_)
    ));
}

#[test]
fn silent_wav_file_resolves_to_sentinel() {
    let file = tempfile::Builder::new()
        .suffix(".wav")
        .tempfile()
        .unwrap();

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
    for _ in 0..16000 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();

    let transcriber = Transcriber::new(MockRecognizer::new().unwrap());
    let text = transcriber.transcribe_file(file.path()).unwrap();
    assert_eq!(text, NO_SPEECH_SENTINEL);
}

#[test]
fn file_sessions_report_no_partials() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"not audio, existence is enough for the stand-in")
        .unwrap();

    let recognizer = MockRecognizer::new().unwrap().with_final("from the file");
    let transcriber = Transcriber::new(recognizer);
    let events = transcriber.subscribe();

    let text = transcriber.transcribe_file(file.path()).unwrap();
    assert_eq!(text, "from the file");

    let all = drain(&events);
    assert_eq!(
        all,
        [TranscriptionEvent::Progress {
            text: "from the file".into(),
            is_final: true,
        }]
    );
}

#[test]
fn permission_status_maps_to_original_strings() {
    let recognizer = MockRecognizer::new()
        .unwrap()
        .with_authorization(AuthorizationStatus::Denied);
    let transcriber = Transcriber::new(recognizer);
    assert_eq!(transcriber.request_permissions().as_str(), "denied");
}

// --- analyzer path -------------------------------------------------------

fn existing_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"audio stand-in").unwrap();
    file
}

#[test]
fn analyzer_rejects_unsupported_locale() {
    let file = existing_file();
    let backend = ScriptedAnalyzer::new().supporting(vec!["en-US", "de-DE"]);
    let mut session = AnalyzerSession::new(backend, "fr-FR");

    match session.transcribe_file(file.path()).unwrap_err() {
        HarkError::LocaleUnsupported(locale) => assert_eq!(locale, "fr-FR"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn analyzer_locale_check_tolerates_bcp47_spelling() {
    let file = existing_file();
    let backend = ScriptedAnalyzer::new()
        .supporting(vec!["en_US"])
        .installed(vec!["en_US"])
        .with_results(vec![("hello", true)]);
    let mut session = AnalyzerSession::with_default_locale(backend);
    assert_eq!(session.transcribe_file(file.path()).unwrap(), "hello");
}

#[test]
fn analyzer_downloads_missing_model_before_analysis() {
    let file = existing_file();
    let backend = ScriptedAnalyzer::new()
        .supporting(vec!["en-US"])
        .installed(Vec::<String>::new())
        .with_results(vec![("downloaded then analyzed", true)]);
    let downloads = backend.download_log();
    let mut session = AnalyzerSession::with_default_locale(backend);

    let text = session.transcribe_file(file.path()).unwrap();
    assert_eq!(text, "downloaded then analyzed");
    assert_eq!(*downloads.lock().unwrap(), ["en-US"]);
}

#[test]
fn analyzer_skips_download_when_model_installed() {
    let file = existing_file();
    let backend = ScriptedAnalyzer::new().with_results(vec![("already there", true)]);
    let downloads = backend.download_log();
    let mut session = AnalyzerSession::with_default_locale(backend);

    session.transcribe_file(file.path()).unwrap();
    assert!(downloads.lock().unwrap().is_empty());
}

#[test]
fn analyzer_collects_only_final_results() {
    let file = existing_file();
    let backend = ScriptedAnalyzer::new().with_results(vec![
        ("volat", false),
        ("volatile draft ", false),
        ("First sentence. ", true),
        ("second dra", false),
        ("Second sentence.", true),
    ]);
    let mut session = AnalyzerSession::with_default_locale(backend);

    let text = session.transcribe_file(file.path()).unwrap();
    assert_eq!(text, "First sentence. Second sentence.");
}

#[test]
fn analyzer_empty_output_resolves_to_sentinel() {
    let file = existing_file();
    let backend = ScriptedAnalyzer::new().with_results(vec![("noise", false)]);
    let mut session = AnalyzerSession::with_default_locale(backend);
    assert_eq!(
        session.transcribe_file(file.path()).unwrap(),
        NO_SPEECH_SENTINEL
    );
}

#[test]
fn analyzer_stream_error_aborts_session() {
    let file = existing_file();
    let backend = ScriptedAnalyzer::new()
        .with_results(vec![("partial ", true)])
        .with_error("asset invalidated mid-analysis");
    let mut session = AnalyzerSession::with_default_locale(backend);

    assert!(matches!(
        session.transcribe_file(file.path()).unwrap_err(),
        HarkError::RecognitionFailed(_)
    ));
}

#[test]
fn analyzer_missing_file_fails_before_locale_check() {
    let backend = ScriptedAnalyzer::new().supporting(Vec::<String>::new());
    let mut session = AnalyzerSession::with_default_locale(backend);
    assert!(matches!(
        session.transcribe_file("/nonexistent/clip.m4a").unwrap_err(),
        HarkError::FileNotFound(_)
    ));
}
