//! Stub collaborators for pipeline tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use gn_core::{
    ArticleId, Category, Error, GlobeArticle, InferenceModel, LanguageCode, LlmArticleData, Result,
    TokenUsage, Translator,
};

pub fn article(id: &str, language: Option<&str>) -> GlobeArticle {
    GlobeArticle {
        id: ArticleId::new(id),
        title: format!("Test Title {id}"),
        title_translated: None,
        url: format!("https://example.com/{id}"),
        description: format!("Test Description {id}"),
        description_translated: None,
        date_published: Utc::now(),
        provider: "Test Provider".to_string(),
        language: language.map(|l| l.parse::<LanguageCode>().unwrap()),
        content: format!("Test Content {id}"),
        origin_country: "US".parse().unwrap(),
        keywords: vec!["curated".to_string()],
        source_api: "TestAPI".to_string(),
        schema_version: "1.1".to_string(),
        date_scraped: Utc::now() - Duration::seconds(id.len() as i64),
        category: None,
        authors: None,
        related_countries: None,
        image_url: None,
        post_processed: false,
    }
}

/// Model returning fixed metadata, or failing for selected article ids.
pub struct StubModel {
    fail_all: Option<String>,
    fail_ids: HashSet<String>,
    calls: AtomicUsize,
}

impl StubModel {
    pub fn ok() -> Self {
        Self {
            fail_all: None,
            fail_ids: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_all: Some(message.to_string()),
            ..Self::ok()
        }
    }

    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            fail_ids: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceModel for StubModel {
    fn name(&self) -> &str {
        "Stub"
    }

    async fn extract_metadata(&self, article: &GlobeArticle) -> Result<(LlmArticleData, TokenUsage)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_all {
            return Err(Error::Inference(message.clone()));
        }
        if self.fail_ids.contains(article.id.as_str()) {
            return Err(Error::Inference(format!("LLM processing failed for {}", article.id)));
        }
        let data = LlmArticleData {
            category: Category::Technology,
            related_countries: vec!["US".parse()?, "CN".parse()?],
            keywords: vec!["test".to_string(), "technology".to_string()],
        };
        Ok((data, TokenUsage::new(100, 50)))
    }
}

/// Translator that tags text with the language pair.
pub struct StubTranslator {
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl StubTranslator {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Translator for StubTranslator {
    async fn translate(&self, text: &str, from: &LanguageCode, to: &LanguageCode) -> Result<String> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(Error::Translation("Translation failed: 500 Internal Server Error".to_string()));
        }
        Ok(format!("[{from}->{to}] {text}"))
    }
}
