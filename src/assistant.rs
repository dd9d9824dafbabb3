//! Chat orchestration: prompts, answers, sessions and read-aloud

use std::sync::Arc;

use tokio::sync::watch;

use crate::chat::{ChatSession, Message, SessionStore};
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::imagegen::{ImageGenerator, is_image_request};
use crate::search::{AnswerSource, GroundedSearch, ImageAttachment, LegalMethod, SourceScope};
use crate::voice::{
    AudioOutput, GeminiTts, PlaybackController, PlaybackHandle, SpeechFetcher, SpeechProvider,
    Voice, VoiceCache,
};
use crate::{Error, Result};

/// User-adjustable chat settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    pub voice: Voice,
    pub auto_speak: bool,
    pub scope: SourceScope,
    pub method: LegalMethod,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            voice: config.voice.voice,
            auto_speak: config.voice.auto_speak,
            scope: config.scope,
            method: config.method,
        }
    }
}

/// The chat front-end state machine
pub struct Assistant {
    answers: Arc<dyn AnswerSource>,
    image_generator: Option<ImageGenerator>,
    cache: Arc<VoiceCache>,
    playback: PlaybackController,
    store: SessionStore,
    current: String,
    settings: Settings,
    loading: watch::Sender<Option<usize>>,
}

impl Assistant {
    /// Assemble an assistant from its collaborators
    ///
    /// Opens the most recent session, creating one if the store is empty.
    #[must_use]
    pub fn new(
        answers: Arc<dyn AnswerSource>,
        speech: Arc<dyn SpeechProvider>,
        output: Arc<dyn AudioOutput>,
        mut store: SessionStore,
        settings: Settings,
    ) -> Self {
        let current = match store.first() {
            Some(session) => session.id.clone(),
            None => store.create(),
        };
        let (loading, _) = watch::channel(None);

        Self {
            answers,
            image_generator: None,
            cache: Arc::new(VoiceCache::new(SpeechFetcher::new(speech))),
            playback: PlaybackController::new(output),
            store,
            current,
            settings,
            loading,
        }
    }

    /// Build the production assistant backed by Gemini
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API key is missing
    pub fn from_config(config: &Config, output: Arc<dyn AudioOutput>) -> Result<Self> {
        let client = GeminiClient::new(
            config.require_api_key()?,
            &config.api.base_url,
            config.api.timeout,
        )?;

        let answers = Arc::new(GroundedSearch::new(
            client.clone(),
            config.api.text_model.clone(),
        ));
        let speech = Arc::new(GeminiTts::new(client, config.api.tts_model.clone()));
        let store = SessionStore::load(config.sessions_path());

        let assistant = Self::new(answers, speech, output, store, Settings::from(config));
        Ok(match &config.image_url {
            Some(url) => assistant.with_image_generator(ImageGenerator::new(url.clone())),
            None => assistant,
        })
    }

    /// Route image requests to an external generator
    #[must_use]
    pub fn with_image_generator(mut self, generator: ImageGenerator) -> Self {
        self.image_generator = Some(generator);
        self
    }

    /// Send a prompt and append the answer to the current session
    ///
    /// Returns the index of the assistant message. On a search failure the
    /// user message is kept, no answer is added and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns error if the prompt is blank or the answer source fails
    pub async fn submit(&mut self, prompt: &str, images: Vec<ImageAttachment>) -> Result<usize> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::Search("prompt is empty".to_string()));
        }

        self.stop();

        let session = self.current_mut()?;
        session.title_from_prompt(prompt);
        session.push(Message::user(
            prompt,
            images.iter().map(ImageAttachment::to_data_url).collect(),
        ));
        self.persist();

        let reply = match &self.image_generator {
            Some(generator) if is_image_request(prompt) => {
                match generator.generate(prompt).await {
                    Ok(image) => Message::assistant(format!("Visual synthesis complete for: {prompt}"))
                        .with_images(vec![image]),
                    Err(e) => {
                        tracing::warn!(error = %e, "image generation failed");
                        Message::assistant("External image generation failed.")
                    }
                }
            }
            _ => {
                let answer = self
                    .answers
                    .answer(prompt, &images, self.settings.method, self.settings.scope)
                    .await?;
                Message::assistant(answer.text).with_sources(answer.sources)
            }
        };

        let session = self.current_mut()?;
        session.push(reply);
        let index = session.messages.len() - 1;
        self.persist();

        if self.settings.auto_speak {
            if let Some(handle) = self.play_message(index).await {
                tracing::debug!(id = handle.id(), index, "auto-speaking answer");
            }
        } else {
            self.prefetch(index);
        }

        Ok(index)
    }

    /// Synthesize a message's audio in the background without playing it
    pub fn prefetch(&self, index: usize) {
        let Some(text) = self.speakable(index) else {
            return;
        };
        let cache = Arc::clone(&self.cache);
        let voice = self.settings.voice;

        tokio::spawn(async move {
            if cache.get_or_create(index, &text, voice).await.is_none() {
                tracing::debug!(index, "background synthesis produced no audio");
            }
        });
    }

    /// Read message `index` aloud, synthesizing it first if needed
    ///
    /// Returns `None` for non-assistant messages, when no audio could be
    /// produced, or when the output failed to start.
    pub async fn play_message(&self, index: usize) -> Option<PlaybackHandle> {
        let text = self.speakable(index)?;
        self.stop();

        let cached = self.cache.is_ready(index, &text, self.settings.voice);
        if !cached {
            self.loading.send_replace(Some(index));
        }
        let buffer = self
            .cache
            .get_or_create(index, &text, self.settings.voice)
            .await;
        if !cached {
            self.loading.send_replace(None);
        }

        match self.playback.play(index, buffer?) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, index, "playback unavailable");
                None
            }
        }
    }

    /// Stop reading aloud; returns `false` if nothing was playing
    pub fn stop(&self) -> bool {
        self.playback.stop()
    }

    /// Observe which message is being read aloud
    #[must_use]
    pub fn speaking(&self) -> watch::Receiver<Option<usize>> {
        self.playback.subscribe()
    }

    /// Observe which message is waiting for synthesis
    #[must_use]
    pub fn loading(&self) -> watch::Receiver<Option<usize>> {
        self.loading.subscribe()
    }

    #[must_use]
    pub const fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    #[must_use]
    pub fn voice_cache(&self) -> &VoiceCache {
        &self.cache
    }

    /// Session currently shown
    #[must_use]
    pub fn current_session(&self) -> &ChatSession {
        self.store
            .get(&self.current)
            .expect("current session is always stored")
    }

    #[must_use]
    pub fn sessions(&self) -> &[ChatSession] {
        self.store.sessions()
    }

    /// Start a new session and switch to it
    pub fn new_session(&mut self) -> &ChatSession {
        let id = self.store.create();
        self.switch_to(id);
        self.persist();
        self.current_session()
    }

    /// Switch to a session by id, prefix or 1-based position
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if nothing matches
    pub fn open_session(&mut self, key: &str) -> Result<&ChatSession> {
        let id = self
            .store
            .resolve(key)
            .map(|s| s.id.clone())
            .ok_or_else(|| Error::NotFound(format!("session {key}")))?;
        self.switch_to(id);
        Ok(self.current_session())
    }

    /// Delete a session; deleting the current one opens the next newest
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if nothing matches
    pub fn delete_session(&mut self, key: &str) -> Result<ChatSession> {
        let id = self
            .store
            .resolve(key)
            .map(|s| s.id.clone())
            .ok_or_else(|| Error::NotFound(format!("session {key}")))?;
        let removed = self.store.delete(&id)?;

        if id == self.current {
            let next = match self.store.first() {
                Some(session) => session.id.clone(),
                None => self.store.create(),
            };
            self.switch_to(next);
        }
        self.persist();
        Ok(removed)
    }

    #[must_use]
    pub const fn settings(&self) -> Settings {
        self.settings
    }

    pub fn set_voice(&mut self, voice: Voice) {
        self.settings.voice = voice;
    }

    pub fn set_auto_speak(&mut self, enabled: bool) {
        self.settings.auto_speak = enabled;
    }

    pub fn set_scope(&mut self, scope: SourceScope) {
        self.settings.scope = scope;
    }

    pub fn set_method(&mut self, method: LegalMethod) {
        self.settings.method = method;
    }

    fn switch_to(&mut self, id: String) {
        if id != self.current {
            self.stop();
            // Buffers are keyed by message index, which is per session
            self.cache.clear();
            self.current = id;
            tracing::debug!(session = %self.current, "session opened");
        }
    }

    fn speakable(&self, index: usize) -> Option<String> {
        self.current_session()
            .messages
            .get(index)
            .filter(|m| m.is_assistant())
            .map(|m| m.content.clone())
    }

    fn current_mut(&mut self) -> Result<&mut ChatSession> {
        let id = self.current.clone();
        self.store
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    fn persist(&self) {
        if let Err(e) = self.store.save() {
            tracing::warn!(error = %e, "failed to save sessions");
        }
    }
}
