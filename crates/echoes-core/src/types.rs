//! ============================================================================
//! Core Types for the Echoes Client
//! ============================================================================
//! Defines all data structures for personas, conversation messages, picked
//! audio files, and the client error taxonomy. These types are serialized
//! to JSON where they cross the backend boundary or live in the bundled
//! persona dataset.
//! ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference-audio descriptor attached to a persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSample {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A user-defined conversational character ("Echo").
///
/// Immutable after creation except `voice_model_id`, which the voice
/// pipeline sets once a reference upload succeeds and overwrites only on
/// explicit re-upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    /// Free-text description injected as conversational context.
    pub description_prompt: String,
    /// Reference-audio clips supplied at creation time (may be empty).
    #[serde(default)]
    pub audio_samples: Vec<AudioSample>,
    /// Backend-issued identifier binding this persona to its cloned voice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_model_id: Option<String>,
    /// Seed conversation bundled with the persona, oldest first. Used when
    /// no backend history is available.
    #[serde(default)]
    pub initial_conversation: Vec<ConversationMessage>,
}

impl Persona {
    /// Create a new persona with no cloned voice yet.
    pub fn new(name: impl Into<String>, description_prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description_prompt: description_prompt.into(),
            audio_samples: Vec::new(),
            voice_model_id: None,
            initial_conversation: Vec::new(),
        }
    }
}

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Me,
    Echo,
}

impl Sender {
    /// Role string used by the conversation endpoints.
    pub fn role(&self) -> &'static str {
        match self {
            Sender::Me => "user",
            Sender::Echo => "assistant",
        }
    }

    /// Map a backend role string onto the closed sender tag.
    pub fn from_role(role: &str) -> Self {
        if role.eq_ignore_ascii_case("user") {
            Sender::Me
        } else {
            Sender::Echo
        }
    }
}

/// One message in a conversation log. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Unique within the conversation (session-monotonic).
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Display-formatted send time.
    pub timestamp: String,
    /// Synthesized voice clip for this message, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl ConversationMessage {
    pub fn new(id: impl Into<String>, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sender,
            timestamp: display_time_now(),
            audio_url: None,
        }
    }

    pub fn with_audio_url(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }
}

/// Current wall-clock time in the log's display format.
fn display_time_now() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

/// Local file descriptor produced by the file-selection collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub uri: String,
    pub mime_type: String,
    pub display_name: String,
    pub size_bytes: u64,
}

/// Identity of the signed-in user, created explicitly at sign-in and passed
/// to the flows that need it. There is no hidden global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: String,
    pub email: Option<String>,
}

impl SessionContext {
    /// Identity for offline/local use, without a backend round trip.
    pub fn local(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }
}

/// Error types for the Echoes client
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum EchoError {
    #[error("Persona not found: {0}")]
    PersonaNotFound(String),

    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Reference audio is {actual_bytes} bytes, over the {max_bytes} byte limit")]
    ReferenceTooLarge { actual_bytes: u64, max_bytes: u64 },

    #[error("Persona data invalid: {0}")]
    PersonaData(String),

    #[error("File selection failed: {0}")]
    Picker(String),

    #[error("Upload failed: {message}")]
    Upload {
        message: String,
        http_status: Option<u16>,
    },

    #[error("Synthesis failed: {message}")]
    Synthesis {
        message: String,
        http_status: Option<u16>,
    },

    #[error("Backend error: {message}")]
    Backend {
        message: String,
        http_status: Option<u16>,
    },
}

impl EchoError {
    /// Backend-reported message for network failures, full display text
    /// otherwise.
    pub fn message(&self) -> String {
        match self {
            EchoError::Upload { message, .. }
            | EchoError::Synthesis { message, .. }
            | EchoError::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status attached to the failure, when the backend reported one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            EchoError::Upload { http_status, .. }
            | EchoError::Synthesis { http_status, .. }
            | EchoError::Backend { http_status, .. } => *http_status,
            _ => None,
        }
    }
}
