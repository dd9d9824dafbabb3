//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use omnisearch::voice::{AudioRequest, CompletionFn};
use omnisearch::{
    AnswerSource, AudioBuffer, AudioOutput, Error, GroundedAnswer, GroundingSource,
    ImageAttachment, LegalMethod, Result, SourceScope, SpeechProvider,
};

/// Encode i16 samples as little-endian PCM bytes
#[must_use]
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Speech provider returning canned PCM and counting calls
pub struct FakeSpeech {
    reply: Mutex<Option<Vec<u8>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<AudioRequest>>,
}

impl FakeSpeech {
    /// Provider that always answers with `bytes`
    #[must_use]
    pub fn returning(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Some(bytes)),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Provider that always fails
    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_reply(&self, bytes: Option<Vec<u8>>) {
        *self.reply.lock().unwrap() = bytes;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AudioRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    async fn synthesize(&self, request: &AudioRequest) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        // Stay pending for one poll so concurrent callers overlap
        tokio::task::yield_now().await;

        self.reply
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Provider {
                status: 429,
                body: "quota exceeded".to_string(),
            })
    }
}

/// Output that records what it was asked to play
#[derive(Default)]
pub struct FakeOutput {
    completion: Mutex<Option<CompletionFn>>,
    started: Mutex<Vec<Arc<AudioBuffer>>>,
    halts: AtomicUsize,
    fail: AtomicBool,
}

impl FakeOutput {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent starts fail
    pub fn fail_starts(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Render the current buffer to its end
    pub fn finish(&self) -> bool {
        let completion = self.completion.lock().unwrap().take();
        completion.map(|done| done()).is_some()
    }

    /// Steal the current completion callback without firing it
    pub fn take_completion(&self) -> Option<CompletionFn> {
        self.completion.lock().unwrap().take()
    }

    pub fn started(&self) -> Vec<Arc<AudioBuffer>> {
        self.started.lock().unwrap().clone()
    }

    pub fn halts(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }
}

impl AudioOutput for FakeOutput {
    fn start(&self, buffer: Arc<AudioBuffer>, on_complete: CompletionFn) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Audio("no output device available".to_string()));
        }
        *self.completion.lock().unwrap() = Some(on_complete);
        self.started.lock().unwrap().push(buffer);
        Ok(())
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
        self.completion.lock().unwrap().take();
    }
}

/// Output whose first `halt` parks until the test releases it
pub struct GatedOutput {
    rendering: AtomicBool,
    completion: Mutex<Option<CompletionFn>>,
    starts: AtomicUsize,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl GatedOutput {
    /// Returns the output, a receiver signalled when `halt` parks, and the release sender
    #[must_use]
    pub fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let output = Arc::new(Self {
            rendering: AtomicBool::new(false),
            completion: Mutex::new(None),
            starts: AtomicUsize::new(0),
            gate: Mutex::new(Some((entered_tx, release_rx))),
        });
        (output, entered_rx, release_tx)
    }

    /// Whether a buffer is still being rendered
    pub fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Steal the current completion callback without firing it
    pub fn take_completion(&self) -> Option<CompletionFn> {
        self.completion.lock().unwrap().take()
    }
}

impl AudioOutput for GatedOutput {
    fn start(&self, _buffer: Arc<AudioBuffer>, on_complete: CompletionFn) -> Result<()> {
        *self.completion.lock().unwrap() = Some(on_complete);
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.rendering.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn halt(&self) {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        self.rendering.store(false, Ordering::SeqCst);
    }
}

/// Answer source with a fixed reply
pub struct FakeAnswers {
    reply: Result<GroundedAnswer>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, usize, LegalMethod, SourceScope)>>,
}

impl FakeAnswers {
    #[must_use]
    pub fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(GroundedAnswer {
                text: text.to_string(),
                sources: vec![GroundingSource {
                    title: "Reference".to_string(),
                    uri: "https://example.org/source".to_string(),
                }],
            }),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(Error::Search(message.to_string())),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompt, image count, method and scope of each call
    pub fn seen(&self) -> Vec<(String, usize, LegalMethod, SourceScope)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerSource for FakeAnswers {
    async fn answer(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
        method: LegalMethod,
        scope: SourceScope,
    ) -> Result<GroundedAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((prompt.to_string(), images.len(), method, scope));

        match &self.reply {
            Ok(answer) => Ok(answer.clone()),
            Err(e) => Err(Error::Search(e.to_string())),
        }
    }
}
