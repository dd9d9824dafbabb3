//! Per-message cache of decoded speech
//!
//! Each message index maps to at most one decoded buffer. Entries are tagged
//! with a fingerprint of the text and voice, so an edited message or a voice
//! change resynthesizes. Concurrent requests for the same entry share a
//! single in-flight synthesis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use sha2::{Digest, Sha256};

use super::pcm::{AudioBuffer, PcmFormat, decode_pcm16};
use super::tts::{AudioRequest, SpeechFetcher, Voice};

type Pending = Shared<BoxFuture<'static, Option<Arc<AudioBuffer>>>>;

enum Slot {
    Ready {
        fingerprint: String,
        buffer: Arc<AudioBuffer>,
    },
    InFlight {
        fingerprint: String,
        // Distinguishes this synthesis from a later one for the same text
        flight: u64,
        future: Pending,
    },
}

impl Slot {
    fn fingerprint(&self) -> &str {
        match self {
            Self::Ready { fingerprint, .. } | Self::InFlight { fingerprint, .. } => fingerprint,
        }
    }
}

/// Memoized speech buffers keyed by message index
pub struct VoiceCache {
    fetcher: SpeechFetcher,
    format: PcmFormat,
    slots: Mutex<HashMap<usize, Slot>>,
    next_flight: AtomicU64,
}

impl VoiceCache {
    /// Cache decoding provider audio as 24 kHz mono
    #[must_use]
    pub fn new(fetcher: SpeechFetcher) -> Self {
        Self::with_format(fetcher, PcmFormat::TTS)
    }

    #[must_use]
    pub fn with_format(fetcher: SpeechFetcher, format: PcmFormat) -> Self {
        Self {
            fetcher,
            format,
            slots: Mutex::new(HashMap::new()),
            next_flight: AtomicU64::new(0),
        }
    }

    /// Return the buffer for `index`, synthesizing it on first use
    ///
    /// Returns `None` when the text has nothing speakable or synthesis fails;
    /// failures are not cached, so a later call retries.
    pub async fn get_or_create(
        &self,
        index: usize,
        text: &str,
        voice: Voice,
    ) -> Option<Arc<AudioBuffer>> {
        let request = AudioRequest::new(text, voice)?;
        let fingerprint = fingerprint(&request);

        let (flight, future) = {
            let mut slots = self.lock();
            match slots.get(&index) {
                Some(Slot::Ready {
                    fingerprint: fp,
                    buffer,
                }) if *fp == fingerprint => {
                    tracing::trace!(index, "voice cache hit");
                    return Some(Arc::clone(buffer));
                }
                Some(Slot::InFlight {
                    fingerprint: fp,
                    flight,
                    future,
                }) if *fp == fingerprint => {
                    tracing::trace!(index, flight, "joining in-flight synthesis");
                    (*flight, future.clone())
                }
                stale => {
                    if stale.is_some() {
                        tracing::debug!(index, "message changed, resynthesizing");
                    }
                    let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
                    let future = self.synthesize(index, request);
                    slots.insert(
                        index,
                        Slot::InFlight {
                            fingerprint: fingerprint.clone(),
                            flight,
                            future: future.clone(),
                        },
                    );
                    (flight, future)
                }
            }
        };

        let result = future.await;

        let mut slots = self.lock();
        // Only the synthesis that still owns the slot may settle it
        let settled = matches!(
            slots.get(&index),
            Some(Slot::InFlight { flight: current, .. }) if *current == flight
        );
        if settled {
            match &result {
                Some(buffer) => {
                    slots.insert(
                        index,
                        Slot::Ready {
                            fingerprint,
                            buffer: Arc::clone(buffer),
                        },
                    );
                }
                None => {
                    slots.remove(&index);
                }
            }
        }

        result
    }

    /// Cached buffer for `index`, without synthesizing
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Arc<AudioBuffer>> {
        match self.lock().get(&index) {
            Some(Slot::Ready { buffer, .. }) => Some(Arc::clone(buffer)),
            _ => None,
        }
    }

    /// Whether a decoded buffer is stored for `index`
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Whether `get_or_create` would answer from the cache without synthesizing
    #[must_use]
    pub fn is_ready(&self, index: usize, text: &str, voice: Voice) -> bool {
        let Some(request) = AudioRequest::new(text, voice) else {
            return false;
        };
        let fingerprint = fingerprint(&request);
        self.lock().get(&index).is_some_and(|slot| {
            matches!(slot, Slot::Ready { .. }) && slot.fingerprint() == fingerprint
        })
    }

    /// Number of decoded buffers stored
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| matches!(s, Slot::Ready { .. }))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry; in-flight syntheses finish but are not stored
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn synthesize(&self, index: usize, request: AudioRequest) -> Pending {
        let fetcher = self.fetcher.clone();
        let format = self.format;

        async move {
            let bytes = fetcher.fetch_request(&request).await?;
            let buffer = decode_pcm16(&bytes, format);
            tracing::debug!(
                index,
                frames = buffer.frames(),
                sample_rate = buffer.sample_rate(),
                "speech decoded"
            );
            Some(Arc::new(buffer))
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fingerprint(request: &AudioRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.voice().provider_name().as_bytes());
    hasher.update([0]);
    hasher.update(request.text().as_bytes());
    hex::encode(hasher.finalize())
}
