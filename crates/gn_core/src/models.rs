use async_trait::async_trait;
use crate::types::{GlobeArticle, LanguageCode, LlmArticleData, TokenUsage};
use crate::Result;

#[async_trait]
pub trait InferenceModel: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    /// Extract category, related countries and keywords from an article
    async fn extract_metadata(&self, article: &GlobeArticle) -> Result<(LlmArticleData, TokenUsage)>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from one language to another
    async fn translate(&self, text: &str, from: &LanguageCode, to: &LanguageCode) -> Result<String>;
}
