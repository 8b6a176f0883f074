pub mod settings;

pub use settings::{
    CompletionConfig, ConfigError, HistoryConfig, PersonaConfig, RetryConfig, ServerConfig,
    Settings, TelegramConfig, TransportMode,
};
