use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SYSTEM_PROMPT: &str = "You're an expert art consultant.
You know both classical and contemporary art like the back of your hand.
Keep responses extremely short, punchy, and casual with occasional art world jargon.
Format answers for Telegram chat:
- Use emojis
- Break text into short paragraphs
- Add links to images or galleries if relevant

Answer directly to the user's question without extra commentary or explanations about the question itself.";

const DEFAULT_IDENTITY_REPLY: &str =
    "I'm an expert in art, trained by Vladislav Sludsky and Roman Selivan. Ask me anything about art!";

const DEFAULT_GREETING_REPLY: &str =
    "Hey 👋 Art's my thing. Got a question? I'll give you the real deal, no fluff 😉";

const DEFAULT_FALLBACK_REPLY: &str = "Let me think... 🤔";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub completion: CompletionConfig,
    pub retry: RetryConfig,
    pub history: HistoryConfig,
    pub persona: PersonaConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Webhook,
    Polling,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramConfig {
    pub api_token: String,
    pub api_base_url: String,
    pub mode: TransportMode,
    #[serde(default)]
    pub webhook_base_url: Option<String>,
    pub polling_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CompletionConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_seconds: u64,
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    pub max_turns: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PersonaConfig {
    pub system_prompt: String,
    pub identity_reply: String,
    pub greeting_reply: String,
    pub fallback_reply: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            identity_reply: DEFAULT_IDENTITY_REPLY.to_string(),
            greeting_reply: DEFAULT_GREETING_REPLY.to_string(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, `config/settings.*`, `APP__*` variables
    /// and the bare variables used by older deployments.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("telegram.api_token", std::env::var("TELEGRAM_API_TOKEN").ok())?
            .set_override_option("completion.api_key", std::env::var("OPENAI_API_KEY").ok())?
            .set_override_option("server.port", std::env::var("PORT").ok())?;

        Self::from_builder(builder)
    }

    /// Builder pre-populated with every default; credentials are left blank.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let persona = PersonaConfig::default();

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000_i64)?
            .set_default("telegram.api_token", "")?
            .set_default("telegram.api_base_url", "https://api.telegram.org")?
            .set_default("telegram.mode", "webhook")?
            .set_default("telegram.polling_timeout_seconds", 30_i64)?
            .set_default(
                "completion.api_url",
                "https://openrouter.ai/api/v1/chat/completions",
            )?
            .set_default("completion.api_key", "")?
            .set_default("completion.model", "meta-llama/llama-3.2-3b-instruct:free")?
            .set_default("completion.timeout_seconds", 60_i64)?
            .set_default("retry.max_attempts", 3_i64)?
            .set_default("retry.backoff_seconds", 3_i64)?
            .set_default("history.max_turns", 20_i64)?
            .set_default("persona.system_prompt", persona.system_prompt)?
            .set_default("persona.identity_reply", persona.identity_reply)?
            .set_default("persona.greeting_reply", persona.greeting_reply)?
            .set_default("persona.fallback_reply", persona.fallback_reply)?;

        Ok(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("telegram.api_token"));
        }
        if self.completion.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("completion.api_key"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.history.max_turns == 0 {
            return Err(ConfigError::Invalid {
                key: "history.max_turns",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.telegram.mode == TransportMode::Webhook
            && self
                .telegram
                .webhook_base_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(ConfigError::Missing("telegram.webhook_base_url"));
        }
        Ok(())
    }

    /// Full webhook URL registered with Telegram, `<base>/<token>`.
    pub fn webhook_url(&self) -> Option<String> {
        self.telegram.webhook_base_url.as_ref().map(|base| {
            format!("{}/{}", base.trim_end_matches('/'), self.telegram.api_token)
        })
    }
}
