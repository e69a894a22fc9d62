//! Runtime configuration for the post-processor.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file in the working directory. Every key has a default unless marked as
//! required; errors name the offending key.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::{Error, Result};

/// A secret value that never shows up in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::Config(format!(
                "unknown log level {other:?} (expected debug, info, warning or error)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    AzureOpenAi,
    Dummy,
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure_openai" => Ok(LlmProvider::AzureOpenAi),
            "dummy" => Ok(LlmProvider::Dummy),
            other => Err(Error::Config(format!("Unsupported LLM provider: {other}"))),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::AzureOpenAi => f.write_str("azure_openai"),
            LlmProvider::Dummy => f.write_str("dummy"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<Secret>,
    pub endpoint: Option<Url>,
    pub api_version: String,
    pub deployment: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    /// Sustained request rate towards the LLM API.
    pub requests_per_second: f64,
    /// Requests allowed in a burst before the rate applies.
    pub max_burst: u32,
    /// Per-request timeout; a timed out request counts as retryable.
    pub request_timeout: Duration,
    pub prompts_dir: PathBuf,
    pub system_prompt_file: String,
    pub few_shot_examples_file: String,
}

impl LlmConfig {
    pub fn system_prompt_path(&self) -> PathBuf {
        self.prompts_dir.join(&self.system_prompt_file)
    }

    pub fn few_shot_examples_path(&self) -> PathBuf {
        self.prompts_dir.join(&self.few_shot_examples_file)
    }
}

#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub api_key: Secret,
    pub endpoint: Url,
    pub location: String,
    /// Rate-limited attempts before a translation is given up.
    pub max_retries: u32,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: LogLevel,
    pub logging_dir: PathBuf,
    pub mongo_uri: Secret,
    pub mongo_db: String,
    pub batch_size: usize,
    pub schema_version: String,
    pub llm: LlmConfig,
    pub translator: TranslatorConfig,
}

impl Config {
    /// Load from the process environment after applying a `.env` file, if any.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let provider: LlmProvider = env.parse_or("LLM_PROVIDER", LlmProvider::AzureOpenAi)?;
        let (api_key, endpoint) = match provider {
            LlmProvider::AzureOpenAi => (
                Some(Secret::new(env.required("LLM_API_KEY")?)),
                Some(env.url("LLM_ENDPOINT")?),
            ),
            LlmProvider::Dummy => (
                env.optional("LLM_API_KEY").map(Secret::new),
                env.optional("LLM_ENDPOINT")
                    .map(|v| parse_url("LLM_ENDPOINT", &v))
                    .transpose()?,
            ),
        };

        let llm = LlmConfig {
            provider,
            api_key,
            endpoint,
            api_version: env.string_or("LLM_API_VERSION", "2024-04-01-preview"),
            deployment: env.string_or("LLM_DEPLOYMENT", "gpt-4o-mini"),
            temperature: env.parse_or("TEMPERATURE", 0.0)?,
            max_tokens: env.parse_or("MAX_TOKENS", 100)?,
            max_retries: env.parse_or("MAX_RETRIES", 2)?,
            requests_per_second: env.parse_or("LLM_REQUESTS_PER_SECOND", 0.5)?,
            max_burst: env.parse_or("LLM_MAX_BURST", 5)?,
            request_timeout: env.seconds_or("LLM_TIMEOUT_SECS", 60)?,
            prompts_dir: PathBuf::from(env.string_or("PROMPTS_DIR", "prompts")),
            system_prompt_file: env.string_or("SYSTEM_PROMPT_FILE", "azure_openai_system_prompt.txt"),
            few_shot_examples_file: env.string_or("FEW_SHOT_EXAMPLES_FILE", "few_shot_examples.json"),
        };

        let translator = TranslatorConfig {
            api_key: Secret::new(env.required("AZURE_TRANSLATOR_API_KEY")?),
            endpoint: env.url("AZURE_TRANSLATOR_ENDPOINT")?,
            location: env.required("AZURE_TRANSLATOR_LOCATION")?,
            max_retries: env.parse_or("TRANSLATOR_MAX_RETRIES", 5)?,
            request_timeout: env.seconds_or("TRANSLATOR_TIMEOUT_SECS", 30)?,
        };

        let config = Self {
            log_level: env.parse_or("LOG_LEVEL", LogLevel::Info)?,
            logging_dir: PathBuf::from(env.string_or("LOGGING_DIR", "logs")),
            mongo_uri: Secret::new(env.required("MONGO_URI")?),
            mongo_db: env.required("MONGO_DB")?,
            batch_size: env.parse_or("BATCH_SIZE", 20)?,
            schema_version: env.string_or("SCHEMA_VERSION", "1.1"),
            llm,
            translator,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config_key("BATCH_SIZE", "must be greater than zero"));
        }
        if !(self.llm.requests_per_second > 0.0) {
            return Err(Error::config_key("LLM_REQUESTS_PER_SECOND", "must be greater than zero"));
        }
        if self.llm.max_burst == 0 {
            return Err(Error::config_key("LLM_MAX_BURST", "must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::config_key("TEMPERATURE", "must be between 0.0 and 2.0"));
        }
        Ok(())
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| Error::config_key(key, "is required but not set"))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key) {
            Some(value) => value
                .parse::<T>()
                .map_err(|e| Error::config_key(key, format!("invalid value {value:?}: {e}"))),
            None => Ok(default),
        }
    }

    fn seconds_or(&self, key: &str, default: u64) -> Result<Duration> {
        match self.parse_or(key, default)? {
            0 => Err(Error::config_key(key, "must be greater than zero")),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    fn url(&self, key: &str) -> Result<Url> {
        parse_url(key, &self.required(key)?)
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|e| Error::config_key(key, format!("invalid URL {value:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::config_key(key, format!("unsupported URL scheme {scheme:?}"))),
    }
}
