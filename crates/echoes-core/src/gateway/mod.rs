//! ============================================================================
//! Backend Gateway - HTTP client for the Echoes backend
//! ============================================================================
//! Translates client operations into the backend's REST contract:
//! - POST /api/upload-reference   (multipart reference-audio upload)
//! - POST /api/synthesize         (text-to-speech with a cloned voice)
//! - GET/POST /api/conversation/:echoId
//! - POST /api/echo               (persist a created persona)
//! - GET/POST /api/users/:auth0Id (signed-in user records)
//! - GET  /health
//!
//! The backend's inconsistent field naming (model_id vs reference_id) is
//! normalized here and never leaks to callers. No retries, no caching, no
//! timeout override beyond the client default.
//! ============================================================================

use reqwest::multipart;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::types::{ConversationMessage, EchoError, Sender, SessionContext};
use crate::voice::ReferenceUploader;

/// HTTP client for the Echoes backend
pub struct BackendGateway {
    client: reqwest::Client,
    base_url: String,
}

impl BackendGateway {
    /// Create a gateway for the configured backend.
    pub fn new(config: &BackendConfig) -> Self {
        Self::with_base_url(config.base_url.clone())
    }

    /// Create a gateway for an explicit base URL (tests, dev servers).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Ping the backend.
    pub async fn health(&self) -> Result<HealthStatus, EchoError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| EchoError::Backend {
                message: format!("Failed to reach backend: {}", e),
                http_status: None,
            })?;

        if !response.status().is_success() {
            let (message, http_status) = failure(response).await;
            return Err(EchoError::Backend {
                message,
                http_status,
            });
        }

        response.json().await.map_err(|e| EchoError::Backend {
            message: format!("Failed to parse health response: {}", e),
            http_status: None,
        })
    }

    /// Upload a reference-audio clip for voice cloning. Returns the
    /// canonical voice model id.
    pub async fn upload_reference(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        name: &str,
    ) -> Result<String, EchoError> {
        info!(
            "Uploading reference audio {} ({} bytes)",
            file_name,
            bytes.len()
        );

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| EchoError::Upload {
                message: format!("Invalid mime type '{}': {}", mime_type, e),
                http_status: None,
            })?;
        let form = multipart::Form::new()
            .part("audio", part)
            .text("name", name.to_string());

        let response = self
            .client
            .post(self.url("/api/upload-reference"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| EchoError::Upload {
                message: format!("Failed to reach backend: {}", e),
                http_status: None,
            })?;

        if !response.status().is_success() {
            let (message, http_status) = failure(response).await;
            return Err(EchoError::Upload {
                message,
                http_status,
            });
        }

        let body: UploadReferenceResponse =
            response.json().await.map_err(|e| EchoError::Upload {
                message: format!("Failed to parse upload response: {}", e),
                http_status: None,
            })?;

        body.voice_model_id().ok_or_else(|| EchoError::Upload {
            message: "Upload response carried no reference id".to_string(),
            http_status: None,
        })
    }

    /// Synthesize speech for a piece of text. Returns the backend path of
    /// the generated clip.
    pub async fn synthesize(
        &self,
        text: &str,
        reference_id: Option<&str>,
        format: &str,
    ) -> Result<String, EchoError> {
        debug!("Synthesizing {} chars (format: {})", text.len(), format);

        let request = SynthesizeRequest {
            text,
            reference_id,
            format,
        };

        let response = self
            .client
            .post(self.url("/api/synthesize"))
            .json(&request)
            .send()
            .await
            .map_err(|e| EchoError::Synthesis {
                message: format!("Failed to reach backend: {}", e),
                http_status: None,
            })?;

        if !response.status().is_success() {
            let (message, http_status) = failure(response).await;
            return Err(EchoError::Synthesis {
                message,
                http_status,
            });
        }

        let body: SynthesizeResponse =
            response.json().await.map_err(|e| EchoError::Synthesis {
                message: format!("Failed to parse synthesis response: {}", e),
                http_status: None,
            })?;

        Ok(body.audio_path)
    }

    /// Fetch the most recent conversation history for an Echo.
    pub async fn conversation_history(
        &self,
        echo_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, EchoError> {
        let url = format!(
            "{}/api/conversation/{}?limit={}",
            self.base_url, echo_id, limit
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EchoError::Backend {
                message: format!("Failed to reach backend: {}", e),
                http_status: None,
            })?;

        if !response.status().is_success() {
            let (message, http_status) = failure(response).await;
            return Err(EchoError::Backend {
                message,
                http_status,
            });
        }

        let body: HistoryResponse = response.json().await.map_err(|e| EchoError::Backend {
            message: format!("Failed to parse history response: {}", e),
            http_status: None,
        })?;

        let messages: Vec<ConversationMessage> = body
            .messages
            .into_iter()
            .enumerate()
            .map(|(index, row)| row.into_message(index))
            .collect();

        debug!("Fetched {} history messages for {}", messages.len(), echo_id);
        Ok(messages)
    }

    /// Record one conversation message on the backend.
    pub async fn post_conversation_message(
        &self,
        echo_id: &str,
        sender: Sender,
        content: &str,
    ) -> Result<(), EchoError> {
        let request = PostMessageRequest {
            role: sender.role(),
            content,
        };

        let response = self
            .client
            .post(self.url(&format!("/api/conversation/{}", echo_id)))
            .json(&request)
            .send()
            .await
            .map_err(|e| EchoError::Backend {
                message: format!("Failed to reach backend: {}", e),
                http_status: None,
            })?;

        if !response.status().is_success() {
            let (message, http_status) = failure(response).await;
            return Err(EchoError::Backend {
                message,
                http_status,
            });
        }

        Ok(())
    }

    /// Persist a created persona on the backend. Returns the backend echo id.
    pub async fn create_echo(
        &self,
        ctx: &SessionContext,
        name: &str,
        persona_prompt: &str,
        voice_model_id: &str,
    ) -> Result<String, EchoError> {
        info!("Creating echo '{}' for user {}", name, ctx.user_id);

        let request = CreateEchoRequest {
            user_id: &ctx.user_id,
            name,
            persona_prompt,
            voice_model_id,
        };

        let response = self
            .client
            .post(self.url("/api/echo"))
            .json(&request)
            .send()
            .await
            .map_err(|e| EchoError::Backend {
                message: format!("Failed to reach backend: {}", e),
                http_status: None,
            })?;

        if !response.status().is_success() {
            let (message, http_status) = failure(response).await;
            return Err(EchoError::Backend {
                message,
                http_status,
            });
        }

        let body: CreateEchoResponse = response.json().await.map_err(|e| EchoError::Backend {
            message: format!("Failed to parse echo response: {}", e),
            http_status: None,
        })?;

        body.echo_id().ok_or_else(|| EchoError::Backend {
            message: "Echo response carried no id".to_string(),
            http_status: None,
        })
    }

    /// Get-or-create the signed-in user and return an explicit session
    /// context for the flows that need identity.
    pub async fn sign_in(&self, auth0_id: &str, email: &str) -> Result<SessionContext, EchoError> {
        let request = SignInRequest { email };

        let response = self
            .client
            .post(self.url(&format!("/api/users/{}", auth0_id)))
            .json(&request)
            .send()
            .await
            .map_err(|e| EchoError::Backend {
                message: format!("Failed to reach backend: {}", e),
                http_status: None,
            })?;

        if !response.status().is_success() {
            let (message, http_status) = failure(response).await;
            return Err(EchoError::Backend {
                message,
                http_status,
            });
        }

        let body: SignInResponse = response.json().await.map_err(|e| EchoError::Backend {
            message: format!("Failed to parse user response: {}", e),
            http_status: None,
        })?;

        // The create path returns a stringified record; fall back to the
        // auth0 id when no database id can be extracted.
        let user_id = body
            .user
            .get("_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| auth0_id.to_string());

        Ok(SessionContext {
            user_id,
            email: Some(email.to_string()),
        })
    }

    /// Fetch an existing user record.
    pub async fn get_user(&self, auth0_id: &str) -> Result<UserRecord, EchoError> {
        let response = self
            .client
            .get(self.url(&format!("/api/users/{}", auth0_id)))
            .send()
            .await
            .map_err(|e| EchoError::Backend {
                message: format!("Failed to reach backend: {}", e),
                http_status: None,
            })?;

        if !response.status().is_success() {
            let (message, http_status) = failure(response).await;
            return Err(EchoError::Backend {
                message,
                http_status,
            });
        }

        let body: GetUserResponse = response.json().await.map_err(|e| EchoError::Backend {
            message: format!("Failed to parse user response: {}", e),
            http_status: None,
        })?;

        Ok(body.user)
    }
}

#[async_trait::async_trait]
impl ReferenceUploader for BackendGateway {
    async fn upload_reference(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        name: &str,
    ) -> Result<String, EchoError> {
        BackendGateway::upload_reference(self, file_name, mime_type, bytes, name).await
    }
}

/// Read a failed response and surface the backend's error message plus the
/// HTTP status.
async fn failure(response: reqwest::Response) -> (String, Option<u16>) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    (error_from_body(status, &body), Some(status))
}

/// Pull the `error` field out of a failure body, falling back to the raw
/// body or the bare status.
fn error_from_body(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }
    if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        body.trim().to_string()
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Backend status report from /health.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadReferenceResponse {
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    reference_id: Option<String>,
}

impl UploadReferenceResponse {
    /// Canonical voice model id; `model_id` wins when both are present.
    fn voice_model_id(self) -> Option<String> {
        self.model_id.or(self.reference_id)
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_id: Option<&'a str>,
    format: &'a str,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    audio_path: String,
}

#[derive(Deserialize)]
struct HistoryResponse {
    messages: Vec<HistoryRow>,
}

#[derive(Deserialize)]
struct HistoryRow {
    role: String,
    content: String,
    #[serde(default)]
    timestamp: Option<String>,
}

impl HistoryRow {
    fn into_message(self, index: usize) -> ConversationMessage {
        let mut message = ConversationMessage::new(
            format!("h{}", index),
            Sender::from_role(&self.role),
            self.content,
        );
        if let Some(timestamp) = self.timestamp {
            message.timestamp = timestamp;
        }
        message
    }
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateEchoRequest<'a> {
    user_id: &'a str,
    name: &'a str,
    persona_prompt: &'a str,
    voice_model_id: &'a str,
}

#[derive(Deserialize)]
struct CreateEchoResponse {
    #[serde(default)]
    echo_id: Option<String>,
    #[serde(default)]
    echo: Option<CreatedEcho>,
}

#[derive(Deserialize)]
struct CreatedEcho {
    #[serde(rename = "_id")]
    id: String,
}

impl CreateEchoResponse {
    fn echo_id(self) -> Option<String> {
        self.echo_id.or_else(|| self.echo.map(|e| e.id))
    }
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
struct SignInResponse {
    user: serde_json::Value,
}

/// Stored user record as the backend reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub auth0_user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct GetUserResponse {
    user: UserRecord,
}
