//! Decorator that synthesizes the inner producer's reply with a persona's
//! cloned voice.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{EchoReply, ReplyProducer, ReplyRequest};
use crate::gateway::BackendGateway;
use crate::types::EchoError;

pub struct VoicedReplyProducer<P> {
    inner: P,
    gateway: Arc<BackendGateway>,
    /// Voice model id of the persona being voiced.
    reference_id: String,
    format: String,
}

impl<P> VoicedReplyProducer<P> {
    pub fn new(inner: P, gateway: Arc<BackendGateway>, reference_id: impl Into<String>) -> Self {
        Self {
            inner,
            gateway,
            reference_id: reference_id.into(),
            format: "wav".to_string(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

#[async_trait]
impl<P: ReplyProducer> ReplyProducer for VoicedReplyProducer<P> {
    async fn generate_reply(&self, request: ReplyRequest) -> Result<EchoReply, EchoError> {
        let mut reply = self.inner.generate_reply(request).await?;

        match self
            .gateway
            .synthesize(&reply.text, Some(&self.reference_id), &self.format)
            .await
        {
            Ok(audio_path) => reply.audio_url = Some(audio_path),
            // A reply without its clip is still a reply; keep the text.
            Err(err) => warn!("Voice synthesis failed: {}", err),
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::SimulatedReplyProducer;
    use std::time::Duration;

    // Requires a running backend with a registered reference id.

    #[tokio::test]
    #[ignore]
    async fn test_voiced_reply_live() {
        let gateway = Arc::new(BackendGateway::with_base_url("http://localhost:5000"));
        let producer = VoicedReplyProducer::new(
            SimulatedReplyProducer::with_delay(Duration::from_millis(1)),
            gateway,
            "vm-test",
        );

        let reply = producer
            .generate_reply(ReplyRequest {
                persona_name: "Nana".to_string(),
                persona_prompt: "a kind grandmother".to_string(),
                history: vec![],
                user_text: "say something".to_string(),
            })
            .await
            .unwrap();

        assert!(reply.audio_url.is_some());
    }
}
