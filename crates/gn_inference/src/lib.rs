pub mod models;
pub mod prompts;
pub mod rate_limit;
pub mod retry;
pub mod translation;

pub use models::create_model;
pub use translation::AzureTranslator;

pub mod prelude {
    pub use super::models::{create_model, AzureOpenAiModel, DummyModel};
    pub use super::prompts::PromptTemplate;
    pub use super::rate_limit::RateLimiter;
    pub use super::retry::RetryPolicy;
    pub use super::translation::AzureTranslator;
    pub use gn_core::{Error, InferenceModel, Result, Translator};
}
