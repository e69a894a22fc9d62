pub mod codes;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod types;

pub use config::{Config, LlmConfig, LlmProvider, LogLevel, Secret, TranslatorConfig};
pub use error::{Error, Result};
pub use models::{InferenceModel, Translator};
pub use storage::ArticleStorage;
pub use types::{
    ArticleId, Category, CountryCode, CuratedArticle, FailedArticle, GlobeArticle, LanguageCode,
    LlmArticleData, TokenUsage, MAX_LLM_KEYWORDS,
};
