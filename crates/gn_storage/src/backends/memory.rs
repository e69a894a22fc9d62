use async_trait::async_trait;
use gn_core::{ArticleId, ArticleStorage, CuratedArticle, FailedArticle, GlobeArticle, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FailedRecord {
    pub article: GlobeArticle,
    pub failure_reason: String,
}

#[derive(Default)]
pub struct MemoryStore {
    articles: Vec<GlobeArticle>,
    failed: Vec<FailedRecord>,
}

impl MemoryStore {
    fn unprocessed(&self, schema_version: &str, batch_size: usize, exclude: &[ArticleId]) -> Vec<GlobeArticle> {
        let mut pending = self
            .articles
            .iter()
            .filter(|a| !a.post_processed && a.schema_version == schema_version)
            .filter(|a| !exclude.contains(&a.id))
            .cloned()
            .collect::<Vec<_>>();
        pending.sort_by(|a, b| b.date_scraped.cmp(&a.date_scraped));
        pending.truncate(batch_size);
        pending
    }

    fn update(&mut self, curated: &CuratedArticle) -> bool {
        let Some(existing) = self.articles.iter_mut().find(|a| a.id == *curated.id()) else {
            return false;
        };

        let mut updated = existing.clone();
        updated.post_processed = true;
        updated.category = Some(curated.category().to_string());
        updated.related_countries = Some(curated.related_countries().to_vec());
        updated.title_translated = Some(curated.title_translated().to_string());
        updated.description_translated = Some(curated.description_translated().to_string());
        for keyword in curated.keywords() {
            if !updated.keywords.contains(keyword) {
                updated.keywords.push(keyword.clone());
            }
        }

        if updated == *existing {
            return false;
        }
        *existing = updated;
        true
    }

    fn move_failed(&mut self, failed: &FailedArticle) -> bool {
        let Some(position) = self.articles.iter().position(|a| a.id == *failed.id()) else {
            warn!("Article {} not found in articles collection", failed.id());
            return false;
        };

        if self.failed.iter().any(|r| r.article.id == *failed.id()) {
            warn!(
                "Article {} already exists in failed_articles collection, deleting original.",
                failed.id()
            );
            self.articles.remove(position);
            return false;
        }

        let article = self.articles.remove(position);
        self.failed.push(FailedRecord {
            article,
            failure_reason: failed.failure_reason.clone(),
        });
        true
    }
}

/// Article storage kept in process memory, used for dry runs and tests.
#[derive(Clone)]
pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
    schema_version: String,
}

impl InMemoryStorage {
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::default())),
            schema_version: schema_version.into(),
        }
    }

    pub async fn with_articles(schema_version: impl Into<String>, articles: Vec<GlobeArticle>) -> Self {
        let storage = Self::new(schema_version);
        storage.store.write().await.articles = articles;
        storage
    }

    pub async fn insert_article(&self, article: GlobeArticle) {
        self.store.write().await.articles.push(article);
    }

    pub async fn article(&self, id: &ArticleId) -> Option<GlobeArticle> {
        self.store.read().await.articles.iter().find(|a| a.id == *id).cloned()
    }

    pub async fn failed_articles(&self) -> Vec<FailedRecord> {
        self.store.read().await.failed.clone()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.articles.len()
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn verify(&self) -> Result<()> {
        debug!("Memory storage is always available");
        Ok(())
    }

    async fn get_unprocessed_articles(&self, batch_size: usize, exclude: &[ArticleId]) -> Result<Vec<GlobeArticle>> {
        let store = self.store.read().await;
        Ok(store.unprocessed(&self.schema_version, batch_size, exclude))
    }

    async fn update_articles(&self, articles: &[CuratedArticle]) -> Result<Vec<ArticleId>> {
        let mut store = self.store.write().await;
        Ok(articles
            .iter()
            .filter(|curated| store.update(curated))
            .map(|curated| curated.id().clone())
            .collect())
    }

    async fn move_failed_articles(&self, articles: &[FailedArticle]) -> Result<Vec<ArticleId>> {
        let mut store = self.store.write().await;
        Ok(articles
            .iter()
            .filter(|failed| store.move_failed(failed))
            .map(|failed| failed.id().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use gn_core::{Category, LanguageCode, LlmArticleData};

    fn article(id: &str, hours_ago: i64) -> GlobeArticle {
        GlobeArticle {
            id: ArticleId::new(id),
            title: format!("Article {id}"),
            title_translated: None,
            url: format!("https://example.com/{id}"),
            description: "Description".to_string(),
            description_translated: None,
            date_published: Utc::now(),
            provider: "Test Provider".to_string(),
            language: Some(LanguageCode::english()),
            content: "Content".to_string(),
            origin_country: "CZ".parse().unwrap(),
            keywords: vec!["curated".to_string(), "article".to_string()],
            source_api: "TestAPI".to_string(),
            schema_version: "1.1".to_string(),
            date_scraped: Utc::now() - Duration::hours(hours_ago),
            category: None,
            authors: None,
            related_countries: None,
            image_url: None,
            post_processed: false,
        }
    }

    fn curate(article: GlobeArticle) -> CuratedArticle {
        let llm = LlmArticleData {
            category: Category::Politics,
            related_countries: vec!["DE".parse().unwrap(), "SK".parse().unwrap()],
            keywords: vec!["article".to_string(), "elections".to_string()],
        };
        CuratedArticle::from_parts(article, llm, "Title".to_string(), "Description".to_string())
    }

    #[tokio::test]
    async fn test_unprocessed_filter_and_order() {
        let mut processed = article("c", 0);
        processed.post_processed = true;
        let mut old_schema = article("d", 0);
        old_schema.schema_version = "1.0".to_string();

        let storage = InMemoryStorage::with_articles(
            "1.1",
            vec![article("a", 5), article("b", 1), processed, old_schema],
        )
        .await;

        let batch = storage.get_unprocessed_articles(10, &[]).await.unwrap();
        let ids: Vec<&str> = batch.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let batch = storage.get_unprocessed_articles(1, &[]).await.unwrap();
        assert_eq!(batch.len(), 1);

        let batch = storage.get_unprocessed_articles(1, &[ArticleId::new("b")]).await.unwrap();
        assert_eq!(batch[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_update_merges_keywords_and_marks_processed() {
        let storage = InMemoryStorage::with_articles("1.1", vec![article("a", 0)]).await;
        let curated = curate(article("a", 0));

        let updated = storage.update_articles(&[curated.clone()]).await.unwrap();
        assert_eq!(updated, vec![ArticleId::new("a")]);

        let stored = storage.article(&ArticleId::new("a")).await.unwrap();
        assert!(stored.post_processed);
        assert_eq!(stored.category.as_deref(), Some("POLITICS"));
        assert_eq!(stored.keywords, vec!["curated", "article", "elections"]);
        assert!(storage.get_unprocessed_articles(10, &[]).await.unwrap().is_empty());

        // Writing the same result again modifies nothing.
        let updated = storage.update_articles(&[curated]).await.unwrap();
        assert!(updated.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_article() {
        let storage = InMemoryStorage::new("1.1");
        let updated = storage.update_articles(&[curate(article("x", 0))]).await.unwrap();
        assert!(updated.is_empty());
    }

    #[tokio::test]
    async fn test_move_failed_articles() {
        let storage = InMemoryStorage::with_articles("1.1", vec![article("a", 0), article("b", 0)]).await;
        let failed = FailedArticle::new(article("a", 0), "Test failure reason");

        let moved = storage.move_failed_articles(&[failed.clone()]).await.unwrap();
        assert_eq!(moved, vec![ArticleId::new("a")]);
        assert_eq!(storage.len().await, 1);

        let records = storage.failed_articles().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].failure_reason, "Test failure reason");

        // Already moved: the article is no longer in `articles`.
        let moved = storage.move_failed_articles(&[failed]).await.unwrap();
        assert!(moved.is_empty());
    }

    #[tokio::test]
    async fn test_move_failed_duplicate_deletes_original() {
        let storage = InMemoryStorage::with_articles("1.1", vec![article("a", 0)]).await;
        let failed = FailedArticle::new(article("a", 0), "first");
        storage.move_failed_articles(&[failed.clone()]).await.unwrap();

        storage.insert_article(article("a", 0)).await;
        let moved = storage.move_failed_articles(&[failed]).await.unwrap();
        assert!(moved.is_empty());
        assert_eq!(storage.len().await, 0);
        assert_eq!(storage.failed_articles().await.len(), 1);
    }
}
