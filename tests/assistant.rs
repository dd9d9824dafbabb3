//! Assistant integration tests
//!
//! Drives prompts, sessions and read-aloud against in-memory fakes

use std::path::PathBuf;
use std::sync::Arc;

use omnisearch::chat::{DEFAULT_TITLE, GREETING};
use omnisearch::{
    Assistant, Error, ImageAttachment, LegalMethod, Role, SessionStore, Settings, SourceScope,
    Voice,
};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

mod common;

use common::{FakeAnswers, FakeOutput, FakeSpeech, pcm_bytes};

struct Harness {
    assistant: Assistant,
    answers: Arc<FakeAnswers>,
    speech: Arc<FakeSpeech>,
    output: Arc<FakeOutput>,
    path: PathBuf,
    _dir: TempDir,
}

fn harness(answers: Arc<FakeAnswers>, settings: Settings) -> Harness {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.json");
    let speech = FakeSpeech::returning(pcm_bytes(&[0, 1024, 2048, 4096]));
    let output = FakeOutput::new();

    let assistant = Assistant::new(
        answers.clone(),
        speech.clone(),
        output.clone(),
        SessionStore::load(&path),
        settings,
    );

    Harness {
        assistant,
        answers,
        speech,
        output,
        path,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_starts_with_greeting_session() {
    let h = harness(FakeAnswers::answering("unused"), Settings::default());
    let session = h.assistant.current_session();

    assert_eq!(h.assistant.sessions().len(), 1);
    assert_eq!(session.title, DEFAULT_TITLE);
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].content, GREETING);
}

#[tokio::test]
async fn test_submit_appends_grounded_answer() {
    let mut h = harness(
        FakeAnswers::answering("Abuja is the capital."),
        Settings::default(),
    );

    let index = assert_ok!(
        h.assistant
            .submit("What is the capital of Nigeria, and when did it move?", Vec::new())
            .await
    );

    let session = h.assistant.current_session();
    assert_eq!(index, 2);
    assert_eq!(session.title, "What is the capital of Nigeria");
    assert_eq!(session.messages[1].role, Role::User);
    assert_eq!(session.messages[2].role, Role::Assistant);
    assert_eq!(session.messages[2].content, "Abuja is the capital.");
    assert_eq!(session.messages[2].sources.len(), 1);
    assert_eq!(h.answers.calls(), 1);
}

#[tokio::test]
async fn test_submit_persists_sessions() {
    let mut h = harness(FakeAnswers::answering("Yes."), Settings::default());
    assert_ok!(h.assistant.submit("Is the store saved?", Vec::new()).await);

    let reloaded = SessionStore::load(&h.path);
    let session = reloaded.first().unwrap();
    assert_eq!(session.messages.len(), 3);
    assert_eq!(session.messages[2].content, "Yes.");
}

#[tokio::test]
async fn test_submit_rejects_blank_prompt() {
    let mut h = harness(FakeAnswers::answering("unused"), Settings::default());

    let err = assert_err!(h.assistant.submit("   ", Vec::new()).await);
    assert!(matches!(err, Error::Search(_)));
    assert_eq!(h.answers.calls(), 0);
    assert_eq!(h.assistant.current_session().messages.len(), 1);
}

#[tokio::test]
async fn test_search_failure_keeps_user_message() {
    let mut h = harness(FakeAnswers::failing("quota exceeded"), Settings::default());

    assert_err!(h.assistant.submit("Find the statute", Vec::new()).await);

    let session = h.assistant.current_session();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].content, "Find the statute");
    assert_eq!(session.title, "Find the statute");
}

#[tokio::test]
async fn test_submit_forwards_settings_and_images() {
    let mut h = harness(FakeAnswers::answering("Analysis."), Settings::default());
    h.assistant.set_method(LegalMethod::Irac);
    h.assistant.set_scope(SourceScope::Nigeria);

    let image = ImageAttachment::from_data_url("data:image/png;base64,iVBORw0KGgo=");
    assert_ok!(h.assistant.submit("Analyze this contract", vec![image]).await);

    let seen = h.answers.seen();
    assert_eq!(
        seen,
        vec![(
            "Analyze this contract".to_string(),
            1,
            LegalMethod::Irac,
            SourceScope::Nigeria
        )]
    );
    assert_eq!(
        h.assistant.current_session().messages[1].images,
        vec!["data:image/png;base64,iVBORw0KGgo=".to_string()]
    );
}

#[tokio::test]
async fn test_auto_speak_plays_answer() {
    let settings = Settings {
        auto_speak: true,
        ..Settings::default()
    };
    let mut h = harness(FakeAnswers::answering("Spoken answer."), settings);

    let index = assert_ok!(h.assistant.submit("Say something", Vec::new()).await);

    assert_eq!(h.output.started().len(), 1);
    assert_eq!(h.output.started()[0].frames(), 4);
    assert_eq!(h.assistant.playback().speaking(), Some(index));
    assert_eq!(h.speech.calls(), 1);
}

#[tokio::test]
async fn test_play_message_reuses_prefetched_audio() {
    let mut h = harness(FakeAnswers::answering("Cached answer."), Settings::default());
    let index = assert_ok!(h.assistant.submit("Question", Vec::new()).await);
    assert!(h.output.started().is_empty());

    let first = h.assistant.play_message(index).await.unwrap();
    assert_eq!(first.message_index(), index);
    let second = h.assistant.play_message(index).await.unwrap();

    assert_eq!(h.speech.calls(), 1);
    assert_eq!(h.output.started().len(), 2);
    assert!(Arc::ptr_eq(&h.output.started()[0], &h.output.started()[1]));
    assert_eq!(
        first.finished().await,
        omnisearch::PlaybackOutcome::Interrupted
    );

    h.output.finish();
    assert_eq!(
        second.finished().await,
        omnisearch::PlaybackOutcome::Completed
    );
    assert_eq!(h.assistant.playback().speaking(), None);
}

/// Play `index`, returning the loading value seen while synthesis is pending
async fn play_observing_loading(h: &Harness, index: usize) -> (bool, Option<usize>) {
    let loading = h.assistant.loading();

    let mut play = Box::pin(h.assistant.play_message(index));
    assert!(futures::poll!(play.as_mut()).is_pending());
    let published = *loading.borrow();

    (play.await.is_some(), published)
}

#[tokio::test]
async fn test_play_message_reports_loading() {
    let mut h = harness(FakeAnswers::answering("Answer."), Settings::default());
    let index = assert_ok!(h.assistant.submit("Question", Vec::new()).await);
    h.assistant.voice_cache().clear();

    let (played, published) = play_observing_loading(&h, index).await;
    assert!(played);
    assert_eq!(published, Some(index));
    assert_eq!(*h.assistant.loading().borrow(), None);
}

#[tokio::test]
async fn test_voice_change_reports_loading() {
    let mut h = harness(FakeAnswers::answering("Answer."), Settings::default());
    let index = assert_ok!(h.assistant.submit("Question", Vec::new()).await);
    assert!(h.assistant.play_message(index).await.is_some());

    h.assistant.set_voice(Voice::Fenrir);
    let (played, published) = play_observing_loading(&h, index).await;

    assert!(played);
    assert_eq!(published, Some(index));
    assert_eq!(h.speech.calls(), 2);
}

#[tokio::test]
async fn test_cached_replay_skips_loading() {
    let mut h = harness(FakeAnswers::answering("Answer."), Settings::default());
    let index = assert_ok!(h.assistant.submit("Question", Vec::new()).await);
    assert!(h.assistant.play_message(index).await.is_some());

    let loading = h.assistant.loading();
    assert!(h.assistant.play_message(index).await.is_some());

    assert!(!loading.has_changed().unwrap());
    assert_eq!(h.speech.calls(), 1);
}

#[tokio::test]
async fn test_play_message_ignores_user_messages() {
    let mut h = harness(FakeAnswers::answering("Answer."), Settings::default());
    assert_ok!(h.assistant.submit("Question", Vec::new()).await);

    assert!(h.assistant.play_message(1).await.is_none());
    assert!(h.assistant.play_message(99).await.is_none());
    assert!(h.output.started().is_empty());
}

#[tokio::test]
async fn test_failed_synthesis_leaves_speaker_idle() {
    let mut h = harness(FakeAnswers::answering("Answer."), Settings::default());
    h.speech.set_reply(None);
    let index = assert_ok!(h.assistant.submit("Question", Vec::new()).await);
    h.assistant.voice_cache().clear();

    assert!(h.assistant.play_message(index).await.is_none());
    assert!(h.output.started().is_empty());
    assert_eq!(h.assistant.playback().speaking(), None);
}

#[tokio::test]
async fn test_new_prompt_stops_playback() {
    let mut h = harness(FakeAnswers::answering("Answer."), Settings::default());
    let index = assert_ok!(h.assistant.submit("First", Vec::new()).await);
    let handle = h.assistant.play_message(index).await.unwrap();

    assert_ok!(h.assistant.submit("Second", Vec::new()).await);

    assert_eq!(
        handle.finished().await,
        omnisearch::PlaybackOutcome::Interrupted
    );
    assert_eq!(h.assistant.playback().speaking(), None);
}

#[tokio::test]
async fn test_voice_change_resynthesizes() {
    let mut h = harness(FakeAnswers::answering("Answer."), Settings::default());
    let index = assert_ok!(h.assistant.submit("Question", Vec::new()).await);

    assert!(h.assistant.play_message(index).await.is_some());
    h.assistant.set_voice(Voice::Fenrir);
    assert!(h.assistant.play_message(index).await.is_some());

    assert_eq!(h.speech.calls(), 2);
    assert_eq!(h.speech.last_request().unwrap().voice(), Voice::Fenrir);
}

#[tokio::test]
async fn test_session_switching() {
    let mut h = harness(FakeAnswers::answering("Answer."), Settings::default());
    let index = assert_ok!(h.assistant.submit("First topic", Vec::new()).await);
    assert!(h.assistant.play_message(index).await.is_some());
    let first_id = h.assistant.current_session().id.clone();

    let second_id = h.assistant.new_session().id.clone();
    assert_ne!(first_id, second_id);
    assert_eq!(h.assistant.sessions().len(), 2);
    assert_eq!(h.assistant.current_session().messages.len(), 1);
    assert!(h.assistant.voice_cache().is_empty());
    assert_eq!(h.assistant.playback().speaking(), None);

    // Newest first, so the original session is second
    let reopened = assert_ok!(h.assistant.open_session("2"));
    assert_eq!(reopened.id, first_id);
    assert_eq!(reopened.title, "First topic");

    let err = assert_err!(h.assistant.open_session("no-such-session"));
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_delete_current_session_opens_next() {
    let mut h = harness(FakeAnswers::answering("Answer."), Settings::default());
    let first_id = h.assistant.current_session().id.clone();
    let second_id = h.assistant.new_session().id.clone();

    let removed = assert_ok!(h.assistant.delete_session(&second_id));
    assert_eq!(removed.id, second_id);
    assert_eq!(h.assistant.current_session().id, first_id);

    // Deleting the last session leaves a fresh one behind
    assert_ok!(h.assistant.delete_session(&first_id));
    assert_eq!(h.assistant.sessions().len(), 1);
    assert_ne!(h.assistant.current_session().id, first_id);

    let reloaded = SessionStore::load(&h.path);
    assert_eq!(reloaded.sessions().len(), 1);
}
