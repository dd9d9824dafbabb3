//! Single-output playback control
//!
//! At most one buffer plays at a time. Starting a new playback stops the
//! current one first; there is no queue.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{oneshot, watch};

use super::output::AudioOutput;
use super::pcm::AudioBuffer;
use crate::Result;

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every frame was rendered
    Completed,
    /// Stopped or superseded before the end
    Interrupted,
}

/// The playback started by one [`PlaybackController::play`] call
#[derive(Debug)]
pub struct PlaybackHandle {
    id: u64,
    message_index: usize,
    done: oneshot::Receiver<()>,
}

impl PlaybackHandle {
    /// Monotonic playback id
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Message being read aloud
    #[must_use]
    pub const fn message_index(&self) -> usize {
        self.message_index
    }

    /// Wait until this playback ends
    pub async fn finished(self) -> PlaybackOutcome {
        match self.done.await {
            Ok(()) => PlaybackOutcome::Completed,
            Err(_) => PlaybackOutcome::Interrupted,
        }
    }
}

struct Active {
    id: u64,
    message_index: usize,
    // Dropping the sender resolves the handle as interrupted
    done: oneshot::Sender<()>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    active: Option<Active>,
}

/// Owns the single audio output and the "currently speaking" indicator
#[derive(Clone)]
pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    // Held across output calls by play and stop; completions take only `state`
    control: Arc<Mutex<()>>,
    state: Arc<Mutex<State>>,
    speaking: Arc<watch::Sender<Option<usize>>>,
}

impl PlaybackController {
    #[must_use]
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        let (speaking, _) = watch::channel(None);
        Self {
            output,
            control: Arc::new(Mutex::new(())),
            state: Arc::new(Mutex::new(State::default())),
            speaking: Arc::new(speaking),
        }
    }

    /// Play `buffer` for message `message_index`, stopping any current playback
    ///
    /// # Errors
    ///
    /// Returns error if the output fails to start; the controller is idle afterwards
    pub fn play(&self, message_index: usize, buffer: Arc<AudioBuffer>) -> Result<PlaybackHandle> {
        let _control = self.control();
        let (done_tx, done_rx) = oneshot::channel();

        let (id, superseded) = {
            let mut state = self.lock();
            state.next_id += 1;
            let id = state.next_id;
            let superseded = state.active.replace(Active {
                id,
                message_index,
                done: done_tx,
            });
            (id, superseded)
        };

        if let Some(previous) = superseded {
            tracing::debug!(
                id = previous.id,
                message_index = previous.message_index,
                "superseding playback"
            );
            self.output.halt();
        }

        self.speaking.send_replace(Some(message_index));

        let state = Arc::clone(&self.state);
        let speaking = Arc::clone(&self.speaking);
        let on_complete = Box::new(move || finish(&state, &speaking, id));

        if let Err(e) = self.output.start(buffer, on_complete) {
            tracing::warn!(error = %e, message_index, "failed to start playback");
            self.clear_if_current(id);
            return Err(e);
        }

        tracing::debug!(id, message_index, "playback started");
        Ok(PlaybackHandle {
            id,
            message_index,
            done: done_rx,
        })
    }

    /// Stop the current playback; returns `false` if nothing was playing
    pub fn stop(&self) -> bool {
        let _control = self.control();
        let stopped = self.lock().active.take();
        self.speaking.send_replace(None);

        match stopped {
            Some(active) => {
                self.output.halt();
                tracing::debug!(id = active.id, "playback stopped");
                true
            }
            None => false,
        }
    }

    /// Whether a buffer is currently playing
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Index of the message being read aloud
    #[must_use]
    pub fn speaking(&self) -> Option<usize> {
        *self.speaking.borrow()
    }

    /// Observe the speaking index
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<usize>> {
        self.speaking.subscribe()
    }

    fn clear_if_current(&self, id: u64) {
        let mut state = self.lock();
        if state.active.as_ref().is_some_and(|a| a.id == id) {
            state.active = None;
            drop(state);
            self.speaking.send_replace(None);
        }
    }

    fn control(&self) -> std::sync::MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Completion callback: only the playback that is still current may go idle
fn finish(state: &Mutex<State>, speaking: &watch::Sender<Option<usize>>, id: u64) {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    match state.active.take_if(|a| a.id == id) {
        Some(active) => {
            drop(state);
            speaking.send_replace(None);
            let _ = active.done.send(());
            tracing::debug!(id, "playback finished");
        }
        None => {
            tracing::trace!(id, "ignoring completion of superseded playback");
        }
    }
}
