//! Process-wide audio output device
//!
//! `cpal` streams are not `Send`, so every stream lives on one dedicated
//! audio thread. [`AudioContext`] talks to it over a command channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::runtime::RuntimeFlavor;

use super::pcm::AudioBuffer;
use crate::{Error, Result};

/// Invoked once when a buffer has been fully rendered
pub type CompletionFn = Box<dyn FnOnce() + Send + 'static>;

/// How often the audio thread checks for finished streams
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Something that can render one buffer at a time
pub trait AudioOutput: Send + Sync {
    /// Start rendering `buffer`, replacing anything already playing
    ///
    /// `on_complete` runs once after the last frame; it is dropped uncalled
    /// if the output is halted or replaced first.
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot render the buffer
    fn start(&self, buffer: Arc<AudioBuffer>, on_complete: CompletionFn) -> Result<()>;

    /// Silence output immediately; no-op when idle
    fn halt(&self);
}

/// Lifecycle of the audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Not yet acquired
    Uninitialized,
    /// Device open, output paused
    Suspended,
    /// Device open, output flowing
    Running,
}

enum Command {
    Play {
        buffer: Arc<AudioBuffer>,
        on_complete: CompletionFn,
        reply: SyncSender<Result<()>>,
    },
    Halt,
    Suspend,
    Resume,
}

struct Engine {
    commands: Sender<Command>,
    state: ContextState,
}

/// Default output device, acquired lazily and kept for the whole process
///
/// Created on the first [`AudioContext::ensure_ready`]; never recreated.
pub struct AudioContext {
    engine: Mutex<Option<Engine>>,
}

impl Default for AudioContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioContext {
    /// Create an unacquired context; no device is touched yet
    #[must_use]
    pub const fn new() -> Self {
        Self {
            engine: Mutex::new(None),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.engine
            .lock()
            .ok()
            .and_then(|e| e.as_ref().map(|e| e.state))
            .unwrap_or(ContextState::Uninitialized)
    }

    /// Acquire the output device on first use and resume it if suspended
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn ensure_ready(&self) -> Result<()> {
        let mut guard = self
            .engine
            .lock()
            .map_err(|_| Error::Audio("audio context lock poisoned".to_string()))?;

        match guard.as_mut() {
            Some(engine) => {
                if engine.state == ContextState::Suspended {
                    engine
                        .commands
                        .send(Command::Resume)
                        .map_err(|_| Error::Audio("audio thread stopped".to_string()))?;
                    engine.state = ContextState::Running;
                    tracing::debug!("audio context resumed");
                }
            }
            None => {
                *guard = Some(spawn_engine()?);
            }
        }

        Ok(())
    }

    /// Pause output without releasing the device
    pub fn suspend(&self) {
        if let Ok(mut guard) = self.engine.lock()
            && let Some(engine) = guard.as_mut()
            && engine.state == ContextState::Running
            && engine.commands.send(Command::Suspend).is_ok()
        {
            engine.state = ContextState::Suspended;
            tracing::debug!("audio context suspended");
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        let guard = self
            .engine
            .lock()
            .map_err(|_| Error::Audio("audio context lock poisoned".to_string()))?;
        let engine = guard
            .as_ref()
            .ok_or_else(|| Error::Audio("audio context not initialized".to_string()))?;
        engine
            .commands
            .send(command)
            .map_err(|_| Error::Audio("audio thread stopped".to_string()))
    }
}

impl AudioOutput for AudioContext {
    fn start(&self, buffer: Arc<AudioBuffer>, on_complete: CompletionFn) -> Result<()> {
        self.ensure_ready()?;

        let (reply, result) = mpsc::sync_channel(1);
        self.send(Command::Play {
            buffer,
            on_complete,
            reply,
        })?;

        wait_reply(&result).ok_or_else(|| Error::Audio("audio thread stopped".to_string()))?
    }

    fn halt(&self) {
        // Nothing to silence before the device exists
        if self.state() != ContextState::Uninitialized {
            let _ = self.send(Command::Halt);
        }
    }
}

/// Block on a reply from the audio thread
///
/// On a multi-threaded tokio runtime the worker is handed off first so other
/// tasks keep running.
fn wait_reply<T>(reply: &Receiver<T>) -> Option<T> {
    let recv = || reply.recv().ok();
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(recv)
        }
        _ => recv(),
    }
}

/// Spawn the audio thread and wait until it has opened the device
fn spawn_engine() -> Result<Engine> {
    let (commands, rx) = mpsc::channel();
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);

    std::thread::Builder::new()
        .name("omnisearch-audio".to_string())
        .spawn(move || run_engine(&rx, &ready_tx))?;

    wait_reply(&ready_rx)
        .ok_or_else(|| Error::Audio("audio thread exited during startup".to_string()))??;

    Ok(Engine {
        commands,
        state: ContextState::Running,
    })
}

struct ActiveStream {
    stream: Stream,
    finished: Arc<AtomicBool>,
    on_complete: Option<CompletionFn>,
}

fn run_engine(rx: &Receiver<Command>, ready: &SyncSender<Result<()>>) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        let _ = ready.send(Err(Error::Audio("no output device available".to_string())));
        return;
    };

    tracing::debug!(
        device = %device.name().unwrap_or_default(),
        "audio context initialized"
    );
    let _ = ready.send(Ok(()));

    let mut current: Option<ActiveStream> = None;
    let mut suspended = false;

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Command::Play {
                buffer,
                on_complete,
                reply,
            }) => {
                // Dropping the old stream silences it and discards its callback
                current = None;
                let result = build_stream(&device, &buffer).and_then(|(stream, finished)| {
                    if !suspended {
                        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
                    }
                    Ok(ActiveStream {
                        stream,
                        finished,
                        on_complete: Some(on_complete),
                    })
                });
                let _ = reply.send(result.map(|active| {
                    current = Some(active);
                }));
            }
            Ok(Command::Halt) => {
                if current.take().is_some() {
                    tracing::debug!("playback halted");
                }
            }
            Ok(Command::Suspend) => {
                suspended = true;
                if let Some(active) = &current
                    && let Err(e) = active.stream.pause()
                {
                    tracing::warn!(error = %e, "failed to pause stream");
                }
            }
            Ok(Command::Resume) => {
                suspended = false;
                if let Some(active) = &current
                    && let Err(e) = active.stream.play()
                {
                    tracing::warn!(error = %e, "failed to resume stream");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if current
            .as_ref()
            .is_some_and(|a| a.finished.load(Ordering::Acquire))
            && let Some(mut active) = current.take()
        {
            let done = active.on_complete.take();
            drop(active);
            tracing::debug!("playback complete");
            if let Some(done) = done {
                done();
            }
        }
    }

    tracing::debug!("audio thread exiting");
}

/// Pick an output config for the buffer's rate, preferring mono
fn select_config(device: &Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
    };

    let supported = supports(1)
        .or_else(|| supports(2))
        .ok_or_else(|| {
            Error::Audio(format!("no output config supports {sample_rate} Hz"))
        })?;

    Ok(supported.with_sample_rate(rate).config())
}

fn build_stream(device: &Device, buffer: &Arc<AudioBuffer>) -> Result<(Stream, Arc<AtomicBool>)> {
    let config = select_config(device, buffer.sample_rate())?;
    let out_channels = usize::from(config.channels);
    let finished = Arc::new(AtomicBool::new(buffer.is_empty()));

    let source = Arc::clone(buffer);
    let finished_cb = Arc::clone(&finished);
    let mut position = 0usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = source.frames();
                let in_channels = source.channel_count();
                for frame in data.chunks_mut(out_channels) {
                    if position >= frames || in_channels == 0 {
                        frame.fill(0.0);
                        finished_cb.store(true, Ordering::Release);
                        continue;
                    }
                    for (c, out) in frame.iter_mut().enumerate() {
                        let channel = c.min(in_channels - 1);
                        *out = source.channel(channel).map_or(0.0, |s| s[position]);
                    }
                    position += 1;
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    tracing::debug!(
        frames = buffer.frames(),
        sample_rate = buffer.sample_rate(),
        channels = out_channels,
        "stream built"
    );

    Ok((stream, finished))
}
