//! ============================================================================
//! Reply Producers - collaborators that generate an Echo's reply
//! ============================================================================
//! The conversation session talks to a ReplyProducer:
//! - SimulatedReplyProducer: local timer-based fallback (no backend reply
//!   service configured, tests)
//! - VoicedReplyProducer: decorator that voices replies through the
//!   synthesis endpoint when the persona has a cloned voice
//! ============================================================================

mod simulated;
mod voiced;

pub use simulated::SimulatedReplyProducer;
pub use voiced::VoicedReplyProducer;

use async_trait::async_trait;

use crate::types::{ConversationMessage, EchoError};

/// Everything a producer needs for one reply turn.
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub persona_name: String,
    /// Free-text persona description used as conversational context.
    pub persona_prompt: String,
    /// Windowed history, oldest first, excluding the new user text.
    pub history: Vec<ConversationMessage>,
    pub user_text: String,
}

/// A generated reply, optionally voiced.
#[derive(Debug, Clone)]
pub struct EchoReply {
    pub text: String,
    pub audio_url: Option<String>,
}

impl EchoReply {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            audio_url: None,
        }
    }
}

/// Collaborator that turns a user message into the Echo's reply.
#[async_trait]
pub trait ReplyProducer: Send + Sync {
    async fn generate_reply(&self, request: ReplyRequest) -> Result<EchoReply, EchoError>;
}
