//! Local timer-based reply simulation, used as the fallback reply producer
//! and as a test double for the conversation session.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::time::sleep;
use tracing::debug;

use super::{EchoReply, ReplyProducer, ReplyRequest};
use crate::types::EchoError;

/// Reply lines the simulation picks from.
const CANNED_LINES: &[&str] = &[
    "I hear that, and I understand. That reminds me of a little something from the past...",
    "Tell me more, I have all the time in the world now.",
    "I was just thinking about that the other day. Some things never change, do they?",
    "You always did know how to make me smile.",
];

/// Default simulated network delay.
const DEFAULT_DELAY: Duration = Duration::from_millis(1500);

pub struct SimulatedReplyProducer {
    delay: Duration,
}

impl SimulatedReplyProducer {
    pub fn new() -> Self {
        Self {
            delay: DEFAULT_DELAY,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedReplyProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplyProducer for SimulatedReplyProducer {
    async fn generate_reply(&self, request: ReplyRequest) -> Result<EchoReply, EchoError> {
        sleep(self.delay).await;

        let line = {
            let mut rng = rand::thread_rng();
            CANNED_LINES
                .choose(&mut rng)
                .copied()
                .unwrap_or(CANNED_LINES[0])
        };

        debug!(
            "Simulated reply for {} ({} history messages)",
            request.persona_name,
            request.history.len()
        );

        Ok(EchoReply::text_only(format!(
            "(Echoing {}'s style): {}",
            request.persona_name, line
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_carries_persona_name() {
        let producer = SimulatedReplyProducer::with_delay(Duration::from_millis(1));
        let reply = producer
            .generate_reply(ReplyRequest {
                persona_name: "Nana".to_string(),
                persona_prompt: "a kind grandmother".to_string(),
                history: vec![],
                user_text: "hello".to_string(),
            })
            .await
            .unwrap();

        assert!(reply.text.starts_with("(Echoing Nana's style):"));
        assert!(reply.audio_url.is_none());
    }
}
