//! macOS speech recognition using the native Speech framework.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use block2::RcBlock;
use objc2::rc::Retained;
use objc2::AllocAnyThread;
use objc2_avf_audio::{AVAudioCommonFormat, AVAudioFormat, AVAudioPCMBuffer};
use objc2_foundation::{NSError, NSLocale, NSOperationQueue, NSString, NSURL};
use objc2_speech::{
    SFSpeechAudioBufferRecognitionRequest, SFSpeechRecognitionResult, SFSpeechRecognitionTask,
    SFSpeechRecognizer, SFSpeechRecognizerAuthorizationStatus, SFSpeechURLRecognitionRequest,
};
use tracing::debug;

use crate::buffer::PcmBuffer;
use crate::error::{HarkError, Result};
use crate::recognizer::{AuthorizationStatus, RecognitionUpdate, Recognizer, UpdateHandler};

pub struct SpeechRecognizerImpl {
    recognizer: Retained<SFSpeechRecognizer>,
    task: Option<Retained<SFSpeechRecognitionTask>>,
    // Keep the result handler block alive for the duration of the task
    _handler: Option<RcBlock<dyn Fn(*mut SFSpeechRecognitionResult, *mut NSError)>>,
}

// The recognizer is only driven from the owning session thread; callbacks
// run on the recognizer's own NSOperationQueue.
unsafe impl Send for SpeechRecognizerImpl {}

impl SpeechRecognizerImpl {
    pub fn new() -> Result<Self> {
        // Create speech recognizer with the current locale
        let recognizer = unsafe {
            let locale = NSLocale::currentLocale();
            SFSpeechRecognizer::initWithLocale(SFSpeechRecognizer::alloc(), &locale)
        }
        .ok_or_else(|| HarkError::unavailable("no speech recognizer for current locale"))?;

        if !unsafe { recognizer.isAvailable() } {
            return Err(HarkError::unavailable(
                "speech recognition is not available; check system permissions",
            ));
        }

        // Set a custom operation queue for callbacks (no main run loop assumption)
        let queue = NSOperationQueue::new();
        unsafe {
            recognizer.setQueue(&queue);
        }

        Ok(Self {
            recognizer,
            task: None,
            _handler: None,
        })
    }

    fn ensure_available(&self) -> Result<()> {
        if unsafe { self.recognizer.isAvailable() } {
            Ok(())
        } else {
            Err(HarkError::unavailable(
                "speech recognizer not available at this time",
            ))
        }
    }

    /// Bridges the Speech framework result callback into an [`UpdateHandler`].
    fn result_block(
        handler: UpdateHandler,
    ) -> RcBlock<dyn Fn(*mut SFSpeechRecognitionResult, *mut NSError)> {
        RcBlock::new(
            move |result: *mut SFSpeechRecognitionResult, error: *mut NSError| {
                if !error.is_null() {
                    let error = unsafe { &*error };
                    let message = unsafe { error.localizedDescription() }.to_string();
                    handler(RecognitionUpdate::Failed { message });
                    return;
                }

                if result.is_null() {
                    handler(RecognitionUpdate::Failed {
                        message: "no transcription available".to_string(),
                    });
                    return;
                }

                let result = unsafe { &*result };
                let text = unsafe { result.bestTranscription().formattedString() }.to_string();
                let is_final = unsafe { result.isFinal() };
                handler(RecognitionUpdate::Hypothesis { text, is_final });
            },
        )
    }

    /// Copies the planar buffer into a native `AVAudioPCMBuffer`.
    fn native_buffer(buffer: &PcmBuffer) -> Result<Retained<AVAudioPCMBuffer>> {
        let format = unsafe {
            AVAudioFormat::initWithCommonFormat_sampleRate_channels_interleaved(
                AVAudioFormat::alloc(),
                AVAudioCommonFormat::PCMFormatFloat32,
                buffer.sample_rate(),
                buffer.channel_count() as u32,
                false,
            )
        }
        .ok_or_else(|| HarkError::invalid_input("could not create audio format"))?;

        let frame_count = buffer.frame_count() as u32;
        let pcm = unsafe {
            AVAudioPCMBuffer::initWithPCMFormat_frameCapacity(
                AVAudioPCMBuffer::alloc(),
                &format,
                frame_count,
            )
        }
        .ok_or_else(|| HarkError::invalid_input("could not create audio buffer"))?;

        unsafe {
            pcm.setFrameLength(frame_count);
        }

        let channel_data = unsafe { pcm.floatChannelData() };
        if channel_data.is_null() {
            return Err(HarkError::invalid_input(
                "could not access buffer channel data",
            ));
        }

        for channel in 0..buffer.channel_count() {
            let plane = buffer.plane(channel);
            unsafe {
                let dst = *channel_data.add(channel);
                std::ptr::copy_nonoverlapping(plane.as_ptr(), dst, plane.len());
            }
        }

        Ok(pcm)
    }

    fn cancel_current(&mut self) {
        if let Some(ref task) = self.task {
            unsafe {
                task.cancel();
            }
        }
        self.task = None;
        self._handler = None;
    }
}

impl Recognizer for SpeechRecognizerImpl {
    fn recognize_buffer(&mut self, buffer: &PcmBuffer, handler: UpdateHandler) -> Result<()> {
        self.ensure_available()?;
        self.cancel_current();

        let pcm = Self::native_buffer(buffer)?;

        let request = unsafe { SFSpeechAudioBufferRecognitionRequest::new() };
        unsafe {
            request.setShouldReportPartialResults(true);
            request.appendAudioPCMBuffer(&pcm);
            // Bounded buffer, not a live stream: no more audio is coming.
            request.endAudio();
        }

        debug!(
            frames = buffer.frame_count(),
            channels = buffer.channel_count(),
            "starting buffer recognition task"
        );

        let block = Self::result_block(handler);
        let task = unsafe {
            self.recognizer
                .recognitionTaskWithRequest_resultHandler(&request, &block)
        };

        self.task = Some(task);
        self._handler = Some(block);
        Ok(())
    }

    fn recognize_file(&mut self, path: &Path, handler: UpdateHandler) -> Result<()> {
        self.ensure_available()?;
        self.cancel_current();

        let path_str = path.to_string_lossy();
        let url = unsafe { NSURL::fileURLWithPath(&NSString::from_str(&path_str)) };

        let request = unsafe {
            SFSpeechURLRecognitionRequest::initWithURL(SFSpeechURLRecognitionRequest::alloc(), &url)
        };
        unsafe {
            request.setShouldReportPartialResults(false);
        }

        debug!(path = %path.display(), "starting file recognition task");

        let block = Self::result_block(handler);
        let task = unsafe {
            self.recognizer
                .recognitionTaskWithRequest_resultHandler(&request, &block)
        };

        self.task = Some(task);
        self._handler = Some(block);
        Ok(())
    }

    fn request_authorization(&mut self) -> AuthorizationStatus {
        let status = unsafe { SFSpeechRecognizer::authorizationStatus() };

        // Prompt only while undetermined, then wait for the response
        if status.0 == 0 {
            let answered = Arc::new(Mutex::new(false));
            let answered_clone = Arc::clone(&answered);

            let handler = RcBlock::new(move |_status: SFSpeechRecognizerAuthorizationStatus| {
                if let Ok(mut answered) = answered_clone.lock() {
                    *answered = true;
                }
            });

            unsafe {
                SFSpeechRecognizer::requestAuthorization(&handler);
            }

            for _ in 0..50 {
                thread::sleep(Duration::from_millis(100));
                if let Ok(answered) = answered.lock() {
                    if *answered {
                        break;
                    }
                }
            }
        }

        let status = unsafe { SFSpeechRecognizer::authorizationStatus() };
        match status.0 {
            0 => AuthorizationStatus::NotDetermined,
            1 => AuthorizationStatus::Denied,
            2 => AuthorizationStatus::Restricted,
            3 => AuthorizationStatus::Authorized,
            _ => AuthorizationStatus::Unknown,
        }
    }
}

impl Drop for SpeechRecognizerImpl {
    fn drop(&mut self) {
        self.cancel_current();
    }
}
