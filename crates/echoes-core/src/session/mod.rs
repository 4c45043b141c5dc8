//! ============================================================================
//! Conversation Session - message log for one Echo persona
//! ============================================================================
//! Owns the ordered message log, appends the user's message optimistically,
//! and runs each reply leg as a spawned task. Replies append in completion
//! order, which may differ from send order when sends overlap. Teardown
//! detaches the session: late completions are discarded without touching
//! the log.
//! ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::gateway::BackendGateway;
use crate::reply::{ReplyProducer, ReplyRequest};
use crate::types::{ConversationMessage, EchoError, Persona, Sender};

/// How many trailing messages accompany a reply request.
const HISTORY_WINDOW: usize = 20;

/// How much backend history seeds a fresh session.
const HISTORY_FETCH_LIMIT: usize = 10;

/// Notifications delivered to the session's subscriber.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ReplyReceived(ConversationMessage),
    /// Reply generation failed; the user's message stays in the log.
    ReplyFailed(String),
    /// A reply resolved after the session was torn down.
    ReplyDiscarded,
}

/// State shared with in-flight reply legs.
struct SessionShared {
    log: Mutex<Vec<ConversationMessage>>,
    detached: AtomicBool,
    pending: AtomicUsize,
    next_id: AtomicU64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Conversation log and reply mediation for exactly one persona
pub struct ConversationSession {
    persona: Persona,
    producer: Arc<dyn ReplyProducer>,
    shared: Arc<SessionShared>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl ConversationSession {
    /// Session seeded from the persona's bundled conversation.
    pub fn new(persona: Persona, producer: Arc<dyn ReplyProducer>) -> Self {
        let seed = persona.initial_conversation.clone();
        Self::with_history(persona, producer, seed)
    }

    /// Session seeded from an explicit history (oldest first).
    pub fn with_history(
        persona: Persona,
        producer: Arc<dyn ReplyProducer>,
        history: Vec<ConversationMessage>,
    ) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();

        Self {
            persona,
            producer,
            shared: Arc::new(SessionShared {
                log: Mutex::new(history),
                detached: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
                events,
            }),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Session seeded from backend history when reachable, falling back to
    /// the persona's bundled conversation.
    pub async fn initialize(
        persona: Persona,
        producer: Arc<dyn ReplyProducer>,
        gateway: Option<&BackendGateway>,
    ) -> Self {
        let history = match gateway {
            Some(gateway) => {
                match gateway
                    .conversation_history(&persona.id, HISTORY_FETCH_LIMIT)
                    .await
                {
                    Ok(messages) if !messages.is_empty() => messages,
                    Ok(_) => persona.initial_conversation.clone(),
                    Err(err) => {
                        warn!(
                            "History fetch for {} failed, seeding locally: {}",
                            persona.id, err
                        );
                        persona.initial_conversation.clone()
                    }
                }
            }
            None => persona.initial_conversation.clone(),
        };

        Self::with_history(persona, producer, history)
    }

    /// Submit a user message.
    ///
    /// The message is appended to the log before this returns; the reply
    /// leg runs on a spawned task and appends when it completes. Must be
    /// called from within a Tokio runtime.
    pub fn send(&self, text: &str) -> Result<(), EchoError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EchoError::EmptyMessage);
        }

        let id = format!("m{}", self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let message = ConversationMessage::new(id, Sender::Me, text);

        // Optimistic append: the user's message is visible before any
        // network result, and is never rolled back.
        let history = {
            let mut log = self.lock_log();
            let history = snapshot_window(&log);
            log.push(message);
            history
        };

        let request = ReplyRequest {
            persona_name: self.persona.name.clone(),
            persona_prompt: self.persona.description_prompt.clone(),
            history,
            user_text: text.to_string(),
        };

        self.shared.pending.fetch_add(1, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let producer = Arc::clone(&self.producer);
        tokio::spawn(async move {
            let result = producer.generate_reply(request).await;
            shared.pending.fetch_sub(1, Ordering::SeqCst);

            match result {
                Ok(reply) => {
                    let mut log = shared.log.lock().unwrap_or_else(|e| e.into_inner());
                    if shared.detached.load(Ordering::SeqCst) {
                        debug!("Reply resolved after teardown; discarding");
                        drop(log);
                        let _ = shared.events.send(SessionEvent::ReplyDiscarded);
                        return;
                    }

                    let id = format!("m{}", shared.next_id.fetch_add(1, Ordering::Relaxed));
                    let mut message = ConversationMessage::new(id, Sender::Echo, reply.text);
                    if let Some(url) = reply.audio_url {
                        message = message.with_audio_url(url);
                    }
                    log.push(message.clone());
                    drop(log);

                    let _ = shared.events.send(SessionEvent::ReplyReceived(message));
                }
                Err(err) => {
                    if shared.detached.load(Ordering::SeqCst) {
                        let _ = shared.events.send(SessionEvent::ReplyDiscarded);
                        return;
                    }
                    warn!("Reply generation failed: {}", err);
                    let _ = shared.events.send(SessionEvent::ReplyFailed(err.message()));
                }
            }
        });

        Ok(())
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Snapshot of the log, oldest first.
    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.lock_log().clone()
    }

    /// Most recently appended message.
    pub fn latest(&self) -> Option<ConversationMessage> {
        self.lock_log().last().cloned()
    }

    /// Whether any reply leg is still in flight.
    pub fn is_generating(&self) -> bool {
        self.shared.pending.load(Ordering::SeqCst) > 0
    }

    /// Tear the session down: in-flight completions are discarded and the
    /// log never changes again.
    pub fn detach(&self) {
        self.shared.detached.store(true, Ordering::SeqCst);
    }

    pub fn is_detached(&self) -> bool {
        self.shared.detached.load(Ordering::SeqCst)
    }

    /// The session's event stream. Takeable once.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.receiver.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, Vec<ConversationMessage>> {
        self.shared.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Trailing window of the log sent along with a reply request.
fn snapshot_window(log: &[ConversationMessage]) -> Vec<ConversationMessage> {
    let start = log.len().saturating_sub(HISTORY_WINDOW);
    log[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::{EchoReply, SimulatedReplyProducer};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn nana() -> Persona {
        let mut persona = Persona::new("Nana", "a kind grandmother");
        persona.id = "p1".to_string();
        persona
    }

    /// Producer that counts calls and replies instantly.
    struct CountingProducer {
        calls: AtomicUsize,
    }

    impl CountingProducer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReplyProducer for CountingProducer {
        async fn generate_reply(&self, _request: ReplyRequest) -> Result<EchoReply, EchoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EchoReply::text_only("ok"))
        }
    }

    /// Producer whose replies resolve only when the test releases them,
    /// keyed by the user text.
    struct GatedProducer {
        gates: Mutex<HashMap<String, oneshot::Receiver<EchoReply>>>,
    }

    impl GatedProducer {
        fn new() -> Self {
            Self {
                gates: Mutex::new(HashMap::new()),
            }
        }

        fn gate(&self, user_text: &str) -> oneshot::Sender<EchoReply> {
            let (tx, rx) = oneshot::channel();
            self.gates
                .lock()
                .unwrap()
                .insert(user_text.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl ReplyProducer for GatedProducer {
        async fn generate_reply(&self, request: ReplyRequest) -> Result<EchoReply, EchoError> {
            let gate = self
                .gates
                .lock()
                .unwrap()
                .remove(&request.user_text)
                .expect("no gate registered for message");
            gate.await.map_err(|_| EchoError::Backend {
                message: "gate dropped".to_string(),
                http_status: None,
            })
        }
    }

    struct FailingProducer;

    #[async_trait]
    impl ReplyProducer for FailingProducer {
        async fn generate_reply(&self, _request: ReplyRequest) -> Result<EchoReply, EchoError> {
            Err(EchoError::Backend {
                message: "reply service unavailable".to_string(),
                http_status: Some(502),
            })
        }
    }

    #[tokio::test]
    async fn test_optimistic_append_then_reply() {
        let producer = Arc::new(SimulatedReplyProducer::with_delay(Duration::from_millis(5)));
        let session = ConversationSession::new(nana(), producer);
        let mut events = session.take_events().unwrap();

        session.send("I miss you").unwrap();

        // The user's message is in the log before any reply resolves.
        let log = session.messages();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, Sender::Me);
        assert_eq!(log[0].text, "I miss you");
        assert!(session.is_generating());

        match events.recv().await.unwrap() {
            SessionEvent::ReplyReceived(message) => {
                assert_eq!(message.sender, Sender::Echo);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let log = session.messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].sender, Sender::Echo);
        assert!(!session.is_generating());
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_side_effects() {
        let producer = Arc::new(CountingProducer::new());
        let session = ConversationSession::new(nana(), producer.clone());

        for text in ["", "   ", "\n\t"] {
            let err = session.send(text).unwrap_err();
            assert!(matches!(err, EchoError::EmptyMessage));
        }

        assert!(session.messages().is_empty());
        assert!(!session.is_generating());
        assert_eq!(producer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_overlapping_sends_lose_nothing() {
        let producer = GatedProducer::new();
        let producer = Arc::new(producer);
        let gate_a = producer.gate("a");
        let gate_b = producer.gate("b");

        let session = ConversationSession::new(nana(), producer);
        let mut events = session.take_events().unwrap();

        session.send("a").unwrap();
        session.send("b").unwrap();

        // b's reply resolves before a's.
        gate_b.send(EchoReply::text_only("reply to b")).unwrap();
        match events.recv().await.unwrap() {
            SessionEvent::ReplyReceived(message) => assert_eq!(message.text, "reply to b"),
            other => panic!("unexpected event: {:?}", other),
        }
        gate_a.send(EchoReply::text_only("reply to a")).unwrap();
        match events.recv().await.unwrap() {
            SessionEvent::ReplyReceived(message) => assert_eq!(message.text, "reply to a"),
            other => panic!("unexpected event: {:?}", other),
        }

        // Both user messages in issuance order, both replies present, replies
        // in completion order.
        let messages = session.messages();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "reply to b", "reply to a"]);
    }

    #[tokio::test]
    async fn test_reply_failure_keeps_user_message() {
        let session = ConversationSession::new(nana(), Arc::new(FailingProducer));
        let mut events = session.take_events().unwrap();

        session.send("are you there?").unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::ReplyFailed(reason) => {
                assert_eq!(reason, "reply service unavailable");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let log = session.messages();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "are you there?");
        assert!(!session.is_generating());
    }

    #[tokio::test]
    async fn test_teardown_discards_late_reply() {
        let producer = GatedProducer::new();
        let producer = Arc::new(producer);
        let gate = producer.gate("goodbye");

        let session = ConversationSession::new(nana(), producer);
        let mut events = session.take_events().unwrap();

        session.send("goodbye").unwrap();
        session.detach();

        gate.send(EchoReply::text_only("too late")).unwrap();
        match events.recv().await.unwrap() {
            SessionEvent::ReplyDiscarded => {}
            other => panic!("unexpected event: {:?}", other),
        }

        let log = session.messages();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "goodbye");
    }

    #[tokio::test]
    async fn test_nana_scenario() {
        let producer = GatedProducer::new();
        let producer = Arc::new(producer);
        let gate = producer.gate("I miss you");

        let session = ConversationSession::new(nana(), producer);
        let mut events = session.take_events().unwrap();

        session.send("I miss you").unwrap();
        let log = session.messages();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, Sender::Me);
        assert_eq!(log[0].text, "I miss you");

        gate.send(EchoReply::text_only("I miss you too, dear."))
            .unwrap();
        match events.recv().await.unwrap() {
            SessionEvent::ReplyReceived(_) => {}
            other => panic!("unexpected event: {:?}", other),
        }

        let log = session.messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].sender, Sender::Echo);
        assert_eq!(log[1].text, "I miss you too, dear.");
    }

    #[tokio::test]
    async fn test_seeded_from_initial_conversation() {
        let mut persona = nana();
        persona.initial_conversation = vec![
            ConversationMessage::new("c1", Sender::Echo, "Hello dear."),
            ConversationMessage::new("c2", Sender::Me, "Hi Nana."),
        ];

        let session = ConversationSession::new(
            persona,
            Arc::new(SimulatedReplyProducer::with_delay(Duration::from_millis(1))),
        );

        let log = session.messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].text, "Hello dear.");
        assert_eq!(session.latest().unwrap().text, "Hi Nana.");
    }

    #[tokio::test]
    async fn test_initialize_without_gateway_uses_local_seed() {
        let mut persona = nana();
        persona.initial_conversation =
            vec![ConversationMessage::new("c1", Sender::Echo, "Hello dear.")];

        let session = ConversationSession::initialize(
            persona,
            Arc::new(SimulatedReplyProducer::with_delay(Duration::from_millis(1))),
            None,
        )
        .await;

        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_snapshot_window_caps_history() {
        let log: Vec<ConversationMessage> = (0..50)
            .map(|i| ConversationMessage::new(format!("m{}", i), Sender::Me, format!("msg {}", i)))
            .collect();

        let window = snapshot_window(&log);
        assert_eq!(window.len(), HISTORY_WINDOW);
        assert_eq!(window.last().unwrap().text, "msg 49");
    }
}
