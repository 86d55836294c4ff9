//! Transcribe a WAV file through the platform recognizer.
//!
//! Usage: transcribe-wav <file.wav>
//!
//! Prints partial hypotheses as they stream in, then the final transcript.

use std::env;
use std::thread;

use anyhow::{bail, Context, Result};
use hark::{Transcriber, TranscriptionEvent};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => bail!("usage: transcribe-wav <file.wav>"),
    };

    let mut reader = hound::WavReader::open(&path)
        .with_context(|| format!("failed to open {path}"))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|s| f32::from(s) / f32::from(i16::MAX)))
            .collect::<Result<_, _>>()?,
    };

    eprintln!(
        "{}: {} samples, {} Hz, {} channel(s)",
        path,
        samples.len(),
        spec.sample_rate,
        spec.channels
    );

    let transcriber = Transcriber::native()?;
    let events = transcriber.subscribe();

    let printer = thread::spawn(move || {
        for event in events {
            match event {
                TranscriptionEvent::Progress { text, is_final: false } => {
                    eprintln!("  ... {text}");
                }
                TranscriptionEvent::Progress { .. } => {}
                TranscriptionEvent::Error { message } => {
                    eprintln!("  recognition error: {message}");
                }
            }
        }
    });

    let result =
        transcriber.transcribe_buffer(&samples, f64::from(spec.sample_rate), spec.channels);

    drop(transcriber);
    let _ = printer.join();

    match result {
        Ok(text) => {
            println!("{text}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
