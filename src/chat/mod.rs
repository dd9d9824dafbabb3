//! Chat sessions and messages

mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::SessionStore;

/// Title given to a session before its first prompt
pub const DEFAULT_TITLE: &str = "New Search";

/// Characters of the first prompt used as a session title
pub const TITLE_CHARS: usize = 30;

/// Greeting that opens every new session
pub const GREETING: &str = "OmniSearch is ready. I can perform deep Google searches, analyze documents/images, or apply legal frameworks. What can I find for you?";

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A web citation attached to an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

/// One chat message; decoded audio is never stored here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Attached or generated images as `data:` URLs or links
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<GroundingSource>,
}

impl Message {
    #[must_use]
    pub fn user(content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            images,
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            images: Vec::new(),
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_sources(mut self, sources: Vec<GroundingSource>) -> Self {
        self.sources = sources;
        self
    }

    #[must_use]
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// A titled conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    /// Milliseconds since the Unix epoch
    pub last_modified: i64,
}

impl ChatSession {
    /// Fresh session holding only the greeting
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: vec![Message::assistant(GREETING)],
            last_modified: Utc::now().timestamp_millis(),
        }
    }

    /// Append a message and bump the modification time
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Title from the first prompt while the session only holds its greeting
    pub fn title_from_prompt(&mut self, prompt: &str) {
        if self.messages.len() <= 1 {
            self.title = prompt.chars().take(TITLE_CHARS).collect();
        }
    }

    pub fn touch(&mut self) {
        self.last_modified = Utc::now().timestamp_millis();
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_greeting() {
        let session = ChatSession::new();
        assert_eq!(session.title, DEFAULT_TITLE);
        assert_eq!(session.messages.len(), 1);
        assert!(session.messages[0].is_assistant());
    }

    #[test]
    fn title_only_set_on_first_prompt() {
        let mut session = ChatSession::new();
        session.title_from_prompt("What does section 36 of the constitution guarantee?");
        assert_eq!(session.title, "What does section 36 of the co");

        session.push(Message::user("first", Vec::new()));
        session.title_from_prompt("second prompt");
        assert_eq!(session.title, "What does section 36 of the co");
    }

    #[test]
    fn message_json_omits_empty_lists() {
        let json = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("images").is_none());
        assert!(json.get("sources").is_none());
    }
}
