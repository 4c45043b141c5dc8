//! ============================================================================
//! ECHOES-CORE: the Echoes client engine
//! ============================================================================
//! This crate handles all non-UI logic for the Echoes companion app:
//! - Persona registry and creation flow
//! - Reference-audio upload pipeline for voice cloning
//! - Conversation sessions with optimistic appends and spawned reply legs
//! - HTTP gateway to the Echoes backend
//! ============================================================================

pub mod config;
pub mod db;
pub mod gateway;
pub mod persona;
pub mod reply;
pub mod session;
pub mod types;
pub mod voice;

// Re-export main types for convenience
pub use config::{backend_config, BackendConfig};
pub use db::{DbStats, PersonaDb};
pub use gateway::{BackendGateway, HealthStatus, UserRecord};
pub use persona::{CreatePersonaInput, PersonaStore};
pub use reply::{EchoReply, ReplyProducer, ReplyRequest, SimulatedReplyProducer, VoicedReplyProducer};
pub use session::{ConversationSession, SessionEvent};
pub use types::*;
pub use voice::{
    FilePicker, ReferenceUploader, UploadOutcome, UploadState, VoiceUploadPipeline,
    MAX_REFERENCE_AUDIO_BYTES,
};
