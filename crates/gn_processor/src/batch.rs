use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use gn_core::{ArticleId, ArticleStorage, CuratedArticle, FailedArticle, GlobeArticle, Result, TokenUsage};
use tracing::{debug, info, warn};

use crate::article::{ArticlePostProcessor, ProcessOutcome};

/// Totals for one run of the batch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub fetched: usize,
    pub curated: usize,
    pub failed: usize,
    pub updated: usize,
    pub moved: usize,
    pub token_usage: TokenUsage,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batches, {} fetched, {} curated, {} failed, {} updated, {} moved, {}",
            self.batches, self.fetched, self.curated, self.failed, self.updated, self.moved, self.token_usage
        )
    }
}

#[derive(Default)]
struct BatchResult {
    curated: Vec<CuratedArticle>,
    failed: Vec<FailedArticle>,
    token_usage: TokenUsage,
}

/// Drains unprocessed articles from storage, one batch at a time.
pub struct BatchProcessor {
    storage: Arc<dyn ArticleStorage>,
    processor: ArticlePostProcessor,
    batch_size: usize,
}

impl BatchProcessor {
    pub fn new(storage: Arc<dyn ArticleStorage>, processor: ArticlePostProcessor, batch_size: usize) -> Self {
        Self {
            storage,
            processor,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn process_pending_articles(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut seen: HashSet<ArticleId> = HashSet::new();
        let mut handled: Vec<ArticleId> = Vec::new();

        loop {
            let articles = self
                .storage
                .get_unprocessed_articles(self.batch_size, &handled)
                .await?;
            debug!("Fetched {} articles.", articles.len());
            if articles.is_empty() {
                break;
            }

            let fetched = articles.len();
            let fresh: Vec<GlobeArticle> = articles
                .into_iter()
                .filter(|a| seen.insert(a.id.clone()))
                .collect();
            if fresh.is_empty() {
                warn!(
                    "Storage returned {} articles that were already processed in this run; stopping",
                    fetched
                );
                break;
            }
            handled.extend(fresh.iter().map(|a| a.id.clone()));

            let batch = self.process_batch(&fresh).await;
            let updated = self.storage.update_articles(&batch.curated).await?;
            let moved = if batch.failed.is_empty() {
                Vec::new()
            } else {
                self.storage.move_failed_articles(&batch.failed).await?
            };

            info!("Successfully updated {} articles.", updated.len());
            if !moved.is_empty() {
                info!("Moved {} failed articles to failed_articles collection.", moved.len());
            }
            info!("📊 Batch processed. Total token usage: {}", batch.token_usage);

            summary.batches += 1;
            summary.fetched += fresh.len();
            summary.curated += batch.curated.len();
            summary.failed += batch.failed.len();
            summary.updated += updated.len();
            summary.moved += moved.len();
            summary.token_usage += batch.token_usage;
        }

        Ok(summary)
    }

    async fn process_batch(&self, articles: &[GlobeArticle]) -> BatchResult {
        let mut result = BatchResult::default();
        for article in articles {
            match self.processor.process_article(article).await {
                ProcessOutcome::Curated(curated, usage) => {
                    result.curated.push(curated);
                    result.token_usage += usage;
                }
                ProcessOutcome::Failed(failed) => result.failed.push(failed),
            }
        }
        result
    }
}
