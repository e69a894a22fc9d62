use std::fmt;

use gn_core::{Category, GlobeArticle, InferenceModel, LlmArticleData, Result, TokenUsage, MAX_LLM_KEYWORDS};

/// Offline stand-in that never calls an API.
pub struct DummyModel;

impl fmt::Debug for DummyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyModel").finish()
    }
}

impl DummyModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl InferenceModel for DummyModel {
    fn name(&self) -> &str {
        "Dummy"
    }

    async fn extract_metadata(&self, article: &GlobeArticle) -> Result<(LlmArticleData, TokenUsage)> {
        let data = LlmArticleData {
            category: Category::Society,
            related_countries: Vec::new(),
            keywords: article.keywords.iter().take(MAX_LLM_KEYWORDS).cloned().collect(),
        };
        tracing::debug!("Dummy metadata for article {}", article.id);
        Ok((data, TokenUsage::default()))
    }
}
