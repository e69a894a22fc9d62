use async_trait::async_trait;
use crate::types::{ArticleId, CuratedArticle, FailedArticle, GlobeArticle};
use crate::Result;

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Check connectivity, expected collections and read/write permissions
    async fn verify(&self) -> Result<()>;

    /// Fetch up to `batch_size` articles that have not been post-processed, newest scrape first,
    /// leaving out the `exclude` ids
    async fn get_unprocessed_articles(&self, batch_size: usize, exclude: &[ArticleId]) -> Result<Vec<GlobeArticle>>;

    /// Write curated metadata back; returns the ids of documents actually modified
    async fn update_articles(&self, articles: &[CuratedArticle]) -> Result<Vec<ArticleId>>;

    /// Move failed articles to the failed collection; returns the ids that were moved
    async fn move_failed_articles(&self, articles: &[FailedArticle]) -> Result<Vec<ArticleId>>;
}
