pub mod completion;
pub mod conversation;
pub mod orchestrator;
pub mod retry;

pub use completion::{CompletionClient, CompletionError, OpenRouterClient};
pub use conversation::ConversationStore;
pub use orchestrator::{CompletionOutcome, ReplyOrchestrator};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
