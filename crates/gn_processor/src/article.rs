use std::sync::Arc;

use gn_core::{
    Config, CuratedArticle, FailedArticle, GlobeArticle, InferenceModel, LanguageCode, Result,
    TokenUsage, Translator,
};
use gn_inference::{create_model, AzureTranslator};
use tracing::{debug, error};

/// Result of post-processing one article.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Curated(CuratedArticle, TokenUsage),
    Failed(FailedArticle),
}

/// Enriches single articles: LLM metadata plus English title and description.
pub struct ArticlePostProcessor {
    model: Arc<dyn InferenceModel>,
    translator: Arc<dyn Translator>,
}

impl ArticlePostProcessor {
    pub fn new(model: Arc<dyn InferenceModel>, translator: Arc<dyn Translator>) -> Self {
        Self { model, translator }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let model = create_model(config)?;
        let translator = Arc::new(AzureTranslator::new(&config.translator)?);
        Ok(Self::new(model, translator))
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Never fails: any error turns the article into a `Failed` outcome.
    pub async fn process_article(&self, article: &GlobeArticle) -> ProcessOutcome {
        match self.try_process(article).await {
            Ok((curated, usage)) => ProcessOutcome::Curated(curated, usage),
            Err(e) => {
                error!("Error post processing article {}: {}", article.id, e);
                ProcessOutcome::Failed(FailedArticle::new(article.clone(), e.to_string()))
            }
        }
    }

    async fn try_process(&self, article: &GlobeArticle) -> Result<(CuratedArticle, TokenUsage)> {
        let (llm, usage) = self.model.extract_metadata(article).await?;
        let (title, description) = self.translate_if_needed(article).await?;
        Ok((CuratedArticle::from_parts(article.clone(), llm, title, description), usage))
    }

    async fn translate_if_needed(&self, article: &GlobeArticle) -> Result<(String, String)> {
        match &article.language {
            Some(language) if !language.is_english() => {
                let english = LanguageCode::english();
                let title = self.translator.translate(&article.title, language, &english).await?;
                let description = self
                    .translator
                    .translate(&article.description, language, &english)
                    .await?;
                debug!("Translated article {} from {}", article.id, language);
                Ok((title, description))
            }
            _ => Ok((article.title.clone(), article.description.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{article, StubModel, StubTranslator};
    use gn_core::Category;

    fn processor(model: StubModel, translator: StubTranslator) -> (ArticlePostProcessor, Arc<StubTranslator>) {
        let translator = Arc::new(translator);
        (ArticlePostProcessor::new(Arc::new(model), translator.clone()), translator)
    }

    #[tokio::test]
    async fn test_english_article_is_not_translated() {
        let (processor, translator) = processor(StubModel::ok(), StubTranslator::ok());
        let outcome = processor.process_article(&article("1", Some("en"))).await;

        let ProcessOutcome::Curated(curated, usage) = outcome else {
            panic!("expected a curated article, got {outcome:?}");
        };
        assert_eq!(curated.title_translated(), "Test Title 1");
        assert_eq!(curated.description_translated(), "Test Description 1");
        assert_eq!(curated.category(), Category::Technology);
        assert!(curated.article().post_processed);
        assert_eq!(usage, TokenUsage::new(100, 50));
        assert_eq!(translator.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_language_is_not_translated() {
        let (processor, translator) = processor(StubModel::ok(), StubTranslator::ok());
        let outcome = processor.process_article(&article("1", None)).await;
        assert!(matches!(outcome, ProcessOutcome::Curated(..)));
        assert_eq!(translator.calls(), 0);
    }

    #[tokio::test]
    async fn test_foreign_article_is_translated() {
        let (processor, translator) = processor(StubModel::ok(), StubTranslator::ok());
        let outcome = processor.process_article(&article("2", Some("fr"))).await;

        let ProcessOutcome::Curated(curated, _) = outcome else {
            panic!("expected a curated article, got {outcome:?}");
        };
        assert_eq!(curated.title_translated(), "[fr->en] Test Title 2");
        assert_eq!(curated.description_translated(), "[fr->en] Test Description 2");
        assert_eq!(translator.calls(), 2);
    }

    #[tokio::test]
    async fn test_origin_country_is_dropped_from_related() {
        let (processor, _) = processor(StubModel::ok(), StubTranslator::ok());
        let ProcessOutcome::Curated(curated, _) = processor.process_article(&article("1", Some("en"))).await else {
            panic!("expected a curated article");
        };
        let related: Vec<&str> = curated.related_countries().iter().map(|c| c.as_str()).collect();
        assert_eq!(related, vec!["CN"]);
    }

    #[tokio::test]
    async fn test_llm_failure_becomes_failed_article() {
        let (processor, _) = processor(StubModel::failing("LLM processing failed"), StubTranslator::ok());
        let outcome = processor.process_article(&article("3", Some("en"))).await;

        let ProcessOutcome::Failed(failed) = outcome else {
            panic!("expected a failed article, got {outcome:?}");
        };
        assert_eq!(failed.id().as_str(), "3");
        assert!(failed.failure_reason.contains("LLM processing failed"));
    }

    #[tokio::test]
    async fn test_translation_failure_becomes_failed_article() {
        let (processor, _) = processor(StubModel::ok(), StubTranslator::failing());
        let outcome = processor.process_article(&article("4", Some("de"))).await;

        let ProcessOutcome::Failed(failed) = outcome else {
            panic!("expected a failed article, got {outcome:?}");
        };
        assert!(failed.failure_reason.contains("Translation"));
    }
}
