use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::PersonaConfig;
use crate::models::chat::{InboundMessage, OutboundReply, Turn};
use crate::services::completion::{CompletionClient, CompletionError};
use crate::services::conversation::{ConversationHistory, ConversationStore};
use crate::services::retry::{RetryOutcome, RetryPolicy, Sleeper};
use crate::transport::ReplySink;

/// Phrases that trigger the canned identity reply (matched on case-folded text).
const IDENTITY_PATTERNS: [&str; 2] = ["who are you", "what are you"];

const START_COMMAND: &str = "/start";

/// Result of the remote completion step once retries are spent.
#[derive(Debug)]
pub enum CompletionOutcome {
    Generated(String),
    Failed { attempts: u32, reason: CompletionError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Start,
    Identity,
    Chat,
}

/// Trim and case-fold for intent matching only; stored and forwarded text stays raw.
fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn classify(raw: &str) -> Intent {
    // Bot commands are case-sensitive, so this looks at the raw first token.
    let is_start = raw
        .split_whitespace()
        .next()
        .map_or(false, |cmd| {
            cmd == START_COMMAND
                || cmd
                    .strip_prefix(START_COMMAND)
                    .map_or(false, |rest| rest.starts_with('@'))
        });

    if is_start {
        return Intent::Start;
    }

    let normalized = normalize(raw);
    if IDENTITY_PATTERNS.iter().any(|p| normalized.contains(p)) {
        Intent::Identity
    } else {
        Intent::Chat
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Turns one inbound message into exactly one outbound reply.
pub struct ReplyOrchestrator {
    store: ConversationStore,
    completion: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    persona: PersonaConfig,
}

impl ReplyOrchestrator {
    pub fn new(
        store: ConversationStore,
        completion: Arc<dyn CompletionClient>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        persona: PersonaConfig,
    ) -> Self {
        Self {
            store,
            completion,
            retry,
            sleeper,
            persona,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Compute the reply and hand it to `sink`. Never fails: any panic in the
    /// pipeline degrades to the fallback text, and send errors are only logged.
    pub async fn handle(&self, message: &InboundMessage, sink: &dyn ReplySink) -> OutboundReply {
        let span = info_span!(
            "inbound_message",
            conversation_id = message.conversation_id,
            request_id = %uuid::Uuid::new_v4()
        );

        async {
            let start = Instant::now();
            info!(
                "Received message: sender={}, len={}",
                message.sender.as_deref().unwrap_or("unknown"),
                message.text.len()
            );

            let text = match AssertUnwindSafe(self.respond(message, sink)).catch_unwind().await {
                Ok(text) => text,
                Err(payload) => {
                    error!("Error while processing message: {}", panic_message(payload.as_ref()));
                    self.persona.fallback_reply.clone()
                }
            };

            let reply = OutboundReply {
                conversation_id: message.conversation_id,
                reply_to_message_id: message.message_id,
                text,
            };

            if let Err(e) = sink.send_reply(&reply).await {
                warn!("Failed to deliver reply: {}", e);
            }

            info!(
                "Replied with {} chars in {}ms",
                reply.text.len(),
                start.elapsed().as_millis()
            );
            reply
        }
        .instrument(span)
        .await
    }

    /// Reply text for `message`, updating the conversation history on the way.
    pub async fn respond(&self, message: &InboundMessage, sink: &dyn ReplySink) -> String {
        let intent = classify(&message.text);
        if intent == Intent::Start {
            debug!("Start command, sending greeting");
            return self.persona.greeting_reply.clone();
        }

        let id = message.conversation_id;
        let handle = self.store.get_or_create(id);
        // Held for the whole turn so this message's user/assistant pair stays adjacent.
        let mut history = handle.lock().await;

        history.push(Turn::user(message.text.clone()));

        let reply = match intent {
            Intent::Identity => {
                debug!("Identity question, using canned reply");
                self.persona.identity_reply.clone()
            }
            _ => {
                sink.send_typing(id).await;
                let request = self.build_request(&history, &message.text);
                match self.complete_with_retry(&request).await {
                    CompletionOutcome::Generated(text) => text,
                    CompletionOutcome::Failed { attempts, reason } => {
                        error!("Completion failed after {} attempts: {}", attempts, reason);
                        self.persona.fallback_reply.clone()
                    }
                }
            }
        };

        history.push(Turn::assistant(reply.clone()));
        reply
    }

    /// `[system] + history before the current message + [current message]`.
    /// Expects the current user turn to already be the last one in `history`.
    pub fn build_request(&self, history: &ConversationHistory, current: &str) -> Vec<Turn> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Turn::system(self.persona.system_prompt.clone()));
        messages.extend(history.preceding().cloned());
        messages.push(Turn::user(current));
        messages
    }

    pub async fn complete_with_retry(&self, messages: &[Turn]) -> CompletionOutcome {
        let completion = self.completion.as_ref();
        let outcome = self
            .retry
            .run(self.sleeper.as_ref(), move |attempt| {
                debug!("Completion attempt {}", attempt);
                completion.complete(messages)
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                debug!("Completion succeeded on attempt {}", attempts);
                CompletionOutcome::Generated(value)
            }
            RetryOutcome::Exhausted { last_error, attempts } => CompletionOutcome::Failed {
                attempts,
                reason: last_error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ConversationId, Role};
    use crate::services::completion::MockCompletionClient;
    use crate::services::retry::testing::RecordingSleeper;
    use crate::transport::testing::RecordingSink;
    use crate::transport::{MockReplySink, TransportError};
    use async_trait::async_trait;
    use mockall::Sequence;
    use std::time::Duration;

    fn persona() -> PersonaConfig {
        PersonaConfig {
            system_prompt: "You are an art consultant.".to_string(),
            identity_reply: "I'm the art bot.".to_string(),
            greeting_reply: "Hey 👋".to_string(),
            fallback_reply: "Let me think... 🤔".to_string(),
        }
    }

    fn orchestrator(
        completion: impl CompletionClient + 'static,
        sleeper: Arc<RecordingSleeper>,
    ) -> ReplyOrchestrator {
        ReplyOrchestrator::new(
            ConversationStore::new(20),
            Arc::new(completion),
            RetryPolicy::default(),
            sleeper,
            persona(),
        )
    }

    fn message(id: ConversationId, text: &str) -> InboundMessage {
        InboundMessage {
            conversation_id: id,
            message_id: Some(1),
            sender: Some("tester".to_string()),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("  WHO ARE YOU?? "), Intent::Identity);
        assert_eq!(classify("so, What Are You exactly"), Intent::Identity);
        assert_eq!(classify("/start"), Intent::Start);
        assert_eq!(classify("/start@ArtBot"), Intent::Start);
        assert_eq!(classify("  /start  "), Intent::Start);
        assert_eq!(classify("/START"), Intent::Chat);
        assert_eq!(classify("/Start@ArtBot"), Intent::Chat);
        assert_eq!(classify("/started"), Intent::Chat);
        assert_eq!(classify("who is Klimt"), Intent::Chat);
        assert_eq!(classify("   "), Intent::Chat);
    }

    #[tokio::test]
    async fn test_identity_question_skips_completion() {
        let mut completion = MockCompletionClient::new();
        completion.expect_complete().times(0);
        let orch = orchestrator(completion, Arc::new(RecordingSleeper::default()));
        let sink = RecordingSink::default();

        let reply = orch.handle(&message(3, "  Who Are You?  "), &sink).await;

        assert_eq!(reply.text, "I'm the art bot.");
        assert!(sink.typing.lock().is_empty());
        assert_eq!(sink.replies.lock().as_slice(), &[reply]);

        let turns = orch.store().snapshot(3).await.unwrap();
        assert_eq!(
            turns,
            vec![Turn::user("  Who Are You?  "), Turn::assistant("I'm the art bot.")]
        );
    }

    #[tokio::test]
    async fn test_request_is_system_history_then_current() {
        let mut completion = MockCompletionClient::new();
        let mut seq = Sequence::new();
        completion
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|msgs: &[Turn]| {
                msgs == [Turn::system("You are an art consultant."), Turn::user("Hi There")]
            })
            .returning(|_| Ok("Hello 🎨".to_string()));
        completion
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|msgs: &[Turn]| {
                msgs == [
                    Turn::system("You are an art consultant."),
                    Turn::user("Hi There"),
                    Turn::assistant("Hello 🎨"),
                    Turn::user("Best Vermeer?"),
                ]
            })
            .returning(|_| Ok("Girl with a Pearl Earring".to_string()));

        let orch = orchestrator(completion, Arc::new(RecordingSleeper::default()));
        let sink = RecordingSink::default();

        orch.handle(&message(8, "Hi There"), &sink).await;
        let reply = orch.handle(&message(8, "Best Vermeer?"), &sink).await;

        assert_eq!(reply.text, "Girl with a Pearl Earring");
        assert_eq!(sink.typing.lock().as_slice(), &[8, 8]);
        assert_eq!(orch.store().snapshot(8).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_retries_until_third_attempt_succeeds() {
        let mut completion = MockCompletionClient::new();
        let mut seq = Sequence::new();
        completion
            .expect_complete()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(CompletionError::EmptyChoices));
        completion
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("Third time lucky".to_string()));

        let sleeper = Arc::new(RecordingSleeper::default());
        let orch = orchestrator(completion, sleeper.clone());
        let sink = RecordingSink::default();

        let reply = orch.handle(&message(1, "Tell me about Kahlo"), &sink).await;

        assert_eq!(reply.text, "Third time lucky");
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(3), Duration::from_secs(3)]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back() {
        let mut completion = MockCompletionClient::new();
        completion
            .expect_complete()
            .times(3)
            .returning(|_| Err(CompletionError::Transport("connection reset".to_string())));

        let sleeper = Arc::new(RecordingSleeper::default());
        let orch = orchestrator(completion, sleeper.clone());
        let sink = RecordingSink::default();

        let reply = orch.handle(&message(1, "Tell me about Kahlo"), &sink).await;

        assert_eq!(reply.text, "Let me think... 🤔");
        assert_eq!(sleeper.delays().len(), 2);
        let turns = orch.store().snapshot(1).await.unwrap();
        assert_eq!(turns.last(), Some(&Turn::assistant("Let me think... 🤔")));
    }

    struct Exploding;

    #[async_trait]
    impl CompletionClient for Exploding {
        async fn complete(&self, _messages: &[Turn]) -> Result<String, CompletionError> {
            panic!("upstream exploded")
        }
    }

    #[tokio::test]
    async fn test_panic_in_pipeline_still_replies() {
        let orch = orchestrator(Exploding, Arc::new(RecordingSleeper::default()));
        let sink = RecordingSink::default();

        let reply = orch.handle(&message(4, "hello"), &sink).await;
        assert_eq!(reply.text, "Let me think... 🤔");
        assert_eq!(sink.replies.lock().len(), 1);

        // Conversation lock was released by the unwind
        let turns = orch.store().snapshot(4).await.unwrap();
        assert_eq!(turns, vec![Turn::user("hello")]);
    }

    #[tokio::test]
    async fn test_start_command_bypasses_history() {
        let mut completion = MockCompletionClient::new();
        completion.expect_complete().times(0);
        let orch = orchestrator(completion, Arc::new(RecordingSleeper::default()));
        let sink = RecordingSink::default();

        let reply = orch.handle(&message(2, "/start"), &sink).await;

        assert_eq!(reply.text, "Hey 👋");
        assert!(orch.store().is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_message_is_processed() {
        let mut completion = MockCompletionClient::new();
        completion
            .expect_complete()
            .times(1)
            .withf(|msgs: &[Turn]| msgs.last() == Some(&Turn::user("   ")))
            .returning(|_| Ok("Say something about art!".to_string()));

        let orch = orchestrator(completion, Arc::new(RecordingSleeper::default()));
        let sink = RecordingSink::default();

        let reply = orch.handle(&message(6, "   "), &sink).await;
        assert_eq!(reply.text, "Say something about art!");
    }

    #[tokio::test]
    async fn test_delivery_failure_is_not_propagated() {
        let mut completion = MockCompletionClient::new();
        completion.expect_complete().returning(|_| Ok("ok".to_string()));

        let mut sink = MockReplySink::new();
        sink.expect_send_typing().returning(|_| ());
        sink.expect_send_reply()
            .times(1)
            .returning(|_| Err(TransportError::Network("timeout".to_string())));

        let orch = orchestrator(completion, Arc::new(RecordingSleeper::default()));
        let reply = orch.handle(&message(1, "hi"), &sink).await;
        assert_eq!(reply.text, "ok");
    }

    #[tokio::test]
    async fn test_history_is_capped_across_turns() {
        let mut completion = MockCompletionClient::new();
        completion
            .expect_complete()
            .withf(|msgs: &[Turn]| msgs.len() <= 21)
            .returning(|msgs| Ok(format!("reply to {}", msgs.last().unwrap().content)));

        let orch = orchestrator(completion, Arc::new(RecordingSleeper::default()));
        let sink = RecordingSink::default();

        for i in 0..15 {
            orch.handle(&message(5, &format!("q{}", i)), &sink).await;
        }

        let turns = orch.store().snapshot(5).await.unwrap();
        assert_eq!(turns.len(), 20);
        assert_eq!(turns.first(), Some(&Turn::user("q5")));
        assert_eq!(turns.last(), Some(&Turn::assistant("reply to q14")));
    }

    /// Echo stub that yields mid-call so concurrent turns overlap.
    struct SlowEcho;

    #[async_trait]
    impl CompletionClient for SlowEcho {
        async fn complete(&self, messages: &[Turn]) -> Result<String, CompletionError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let last = messages.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(format!("echo {}", last))
        }
    }

    #[tokio::test]
    async fn test_concurrent_messages_same_conversation_serialize() {
        let orch = orchestrator(SlowEcho, Arc::new(RecordingSleeper::default()));
        let sink = RecordingSink::default();

        let first = message(11, "first");
        let second = message(11, "second");
        let (a, b) = tokio::join!(orch.handle(&first, &sink), orch.handle(&second, &sink));
        assert_eq!(a.text, "echo first");
        assert_eq!(b.text, "echo second");

        let turns = orch.store().snapshot(11).await.unwrap();
        assert_eq!(turns.len(), 4);
        // Each user turn is immediately followed by its own answer
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1], Turn::assistant(format!("echo {}", pair[0].content)));
        }
    }

    #[tokio::test]
    async fn test_other_conversations_are_not_blocked() {
        let orch = Arc::new(orchestrator(SlowEcho, Arc::new(RecordingSleeper::default())));
        let busy = orch.store().get_or_create(1);
        let guard = busy.lock().await;

        let sink = RecordingSink::default();
        let reply = tokio::time::timeout(
            Duration::from_secs(1),
            orch.handle(&message(2, "free"), &sink),
        )
        .await
        .expect("conversation 2 must not wait on conversation 1");
        assert_eq!(reply.text, "echo free");
        drop(guard);
    }
}
