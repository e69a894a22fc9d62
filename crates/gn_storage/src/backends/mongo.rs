use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures_util::stream::TryStreamExt;
use gn_core::{
    ArticleId, ArticleStorage, Config, CountryCode, CuratedArticle, Error, FailedArticle, GlobeArticle,
    LanguageCode, Result,
};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

const ARTICLES: &str = "articles";
const FAILED_ARTICLES: &str = "failed_articles";
const DUPLICATE_KEY: i32 = 11000;

/// Article document as stored by the scraper.
#[derive(Debug, Deserialize)]
struct ArticleDocument {
    #[serde(rename = "_id")]
    id: Bson,
    title: String,
    #[serde(default)]
    title_translated: Option<String>,
    url: String,
    description: String,
    #[serde(default)]
    description_translated: Option<String>,
    date_published: bson::DateTime,
    provider: String,
    #[serde(default)]
    language: Option<String>,
    content: String,
    origin_country: String,
    #[serde(default)]
    keywords: Vec<String>,
    source_api: String,
    schema_version: String,
    date_scraped: bson::DateTime,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    authors: Option<Vec<String>>,
    #[serde(default)]
    related_countries: Option<Vec<String>>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    post_processed: bool,
}

impl TryFrom<ArticleDocument> for GlobeArticle {
    type Error = Error;

    fn try_from(doc: ArticleDocument) -> Result<Self> {
        Ok(GlobeArticle {
            id: ArticleId::new(id_to_string(&doc.id)),
            title: doc.title,
            title_translated: doc.title_translated,
            url: doc.url,
            description: doc.description,
            description_translated: doc.description_translated,
            date_published: doc.date_published.to_chrono(),
            provider: doc.provider,
            language: doc.language.map(|l| l.parse::<LanguageCode>()).transpose()?,
            content: doc.content,
            origin_country: doc.origin_country.parse::<CountryCode>()?,
            keywords: doc.keywords,
            source_api: doc.source_api,
            schema_version: doc.schema_version,
            date_scraped: doc.date_scraped.to_chrono(),
            category: doc.category,
            authors: doc.authors,
            related_countries: doc
                .related_countries
                .map(|countries| countries.iter().map(|c| c.parse::<CountryCode>()).collect::<Result<Vec<_>>>())
                .transpose()?,
            image_url: doc.image_url,
            post_processed: doc.post_processed,
        })
    }
}

fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Best guess for an id that was never fetched through this storage.
fn guess_id(id: &ArticleId) -> Bson {
    match ObjectId::parse_str(id.as_str()) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(id.to_string()),
    }
}

fn unprocessed_filter(schema_version: &str, exclude: Vec<Bson>) -> Document {
    let mut filter = doc! {
        "post_processed": { "$ne": true },
        "schema_version": schema_version,
    };
    if !exclude.is_empty() {
        filter.insert("_id", doc! { "$nin": exclude });
    }
    filter
}

fn curated_update(curated: &CuratedArticle) -> Document {
    let related_countries: Vec<&str> = curated.related_countries().iter().map(|c| c.as_str()).collect();
    doc! {
        "$set": {
            "post_processed": true,
            "category": curated.category().as_str(),
            "related_countries": related_countries,
            "title_translated": curated.title_translated(),
            "description_translated": curated.description_translated(),
        },
        "$addToSet": {
            "keywords": { "$each": curated.keywords().to_vec() }
        },
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

fn db_error(context: &str) -> impl Fn(mongodb::error::Error) -> Error + '_ {
    move |e| Error::Database(format!("{context}: {e}"))
}

pub struct MongoStorage {
    client: Client,
    db_name: String,
    db: Database,
    articles: Collection<Document>,
    failed_articles: Collection<Document>,
    schema_version: String,
    /// Stored `_id` of every fetched article, so string ids that look like
    /// ObjectIds are still matched as strings.
    raw_ids: Mutex<HashMap<ArticleId, Bson>>,
}

impl MongoStorage {
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = Client::with_uri_str(config.mongo_uri.expose())
            .await
            .map_err(db_error("Failed to initialize MongoDB connection"))?;
        let db = client.database(&config.mongo_db);
        let articles = db.collection::<Document>(ARTICLES);
        let failed_articles = db.collection::<Document>(FAILED_ARTICLES);

        Ok(Self {
            client,
            db_name: config.mongo_db.clone(),
            db,
            articles,
            failed_articles,
            schema_version: config.schema_version.clone(),
            raw_ids: Mutex::new(HashMap::new()),
        })
    }

    fn raw_ids(&self) -> MutexGuard<'_, HashMap<ArticleId, Bson>> {
        self.raw_ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn raw_id(&self, id: &ArticleId) -> Bson {
        self.raw_ids().get(id).cloned().unwrap_or_else(|| guess_id(id))
    }

    fn id_filter(&self, id: &ArticleId) -> Document {
        doc! { "_id": self.raw_id(id) }
    }

    fn forget(&self, id: &ArticleId) {
        self.raw_ids().remove(id);
    }

    async fn check_permissions(&self) -> Result<()> {
        self.articles
            .find_one(None, None)
            .await
            .map_err(db_error("Read permission check failed"))?;

        let now = bson::DateTime::now();
        let test_doc = doc! {
            "_id": "test",
            "title": "Test Article Title",
            "url": "https://example.com/test-article",
            "description": "This is a test article description.",
            "date_published": now,
            "provider": "Test News Provider",
            "content": "This is the main content of the test article.",
            "origin_country": "FR",
            "source_api": "test_api",
            "schema_version": "permission-check",
            "date_scraped": now,
            "post_processed": false,
            "language": "fr",
            "keywords": ["test", "article"],
        };
        let mut failed_doc = test_doc.clone();
        failed_doc.insert("keywords", Bson::Array(vec![]));
        failed_doc.insert("failure_reason", "Test failure reason");

        let test_filter = doc! { "_id": "test" };
        self.articles
            .insert_one(test_doc, None)
            .await
            .map_err(db_error("Write permission check on articles failed"))?;
        self.articles
            .delete_one(test_filter.clone(), None)
            .await
            .map_err(db_error("Delete permission check on articles failed"))?;
        self.failed_articles
            .insert_one(failed_doc, None)
            .await
            .map_err(db_error("Write permission check on failed_articles failed"))?;
        self.failed_articles
            .delete_one(test_filter, None)
            .await
            .map_err(db_error("Delete permission check on failed_articles failed"))?;
        Ok(())
    }

    async fn move_one(&self, failed: &FailedArticle) -> Result<bool> {
        let filter = self.id_filter(failed.id());
        let Some(document) = self
            .articles
            .find_one(filter.clone(), None)
            .await
            .map_err(db_error("Error finding failed article"))?
        else {
            warn!("Article {} not found in articles collection", failed.id());
            return Ok(false);
        };

        let moved = self.move_document(document, filter, &failed.failure_reason).await?;
        if moved {
            self.forget(failed.id());
        }
        Ok(moved)
    }

    /// Copy `document` into `failed_articles` with a `failure_reason`, then
    /// delete it from `articles`.
    async fn move_document(&self, mut document: Document, filter: Document, reason: &str) -> Result<bool> {
        let id = document.get("_id").map(id_to_string).unwrap_or_default();
        document.insert("failure_reason", reason);
        match self.failed_articles.insert_one(document, None).await {
            Ok(_) => {}
            Err(e) if is_duplicate_key(&e) => {
                warn!(
                    "Article {} already exists in failed_articles collection, deleting original.",
                    id
                );
                self.articles
                    .delete_one(filter, None)
                    .await
                    .map_err(db_error("Error deleting duplicate failed article"))?;
                return Ok(false);
            }
            Err(e) => {
                warn!("Failed to insert article {} into failed_articles collection: {}", id, e);
                return Ok(false);
            }
        }

        let deleted = self
            .articles
            .delete_one(filter, None)
            .await
            .map_err(db_error("Error deleting failed article"))?;
        if deleted.deleted_count == 0 {
            warn!("Failed to delete article {} from articles collection", id);
            return Ok(false);
        }
        Ok(true)
    }

    /// Move a document that cannot be decoded out of the way so it is not
    /// fetched again. Errors are logged; the caller skips the document either way.
    async fn set_aside(&self, document: Document, reason: &str) {
        let Some(raw_id) = document.get("_id").cloned() else {
            warn!("Skipping article without _id: {}", reason);
            return;
        };
        let id = id_to_string(&raw_id);
        warn!(article_id = %id, error = %reason, "Moving article that could not be decoded to failed_articles");
        let filter = doc! { "_id": raw_id };
        if let Err(e) = self.move_document(document, filter, reason).await {
            error!("Error moving undecodable article {}: {}", id, e);
        }
    }

    async fn fetch_page(&self, batch_size: usize, exclude: Vec<Bson>) -> Result<Vec<Document>> {
        let options = FindOptions::builder()
            .sort(doc! { "post_processed": 1, "date_scraped": -1 })
            .limit(batch_size as i64)
            .build();

        let cursor = self
            .articles
            .find(unprocessed_filter(&self.schema_version, exclude), options)
            .await
            .map_err(db_error("Error fetching unprocessed articles"))?;
        cursor
            .try_collect::<Vec<Document>>()
            .await
            .map_err(db_error("Error fetching unprocessed articles"))
    }
}

#[async_trait]
impl ArticleStorage for MongoStorage {
    async fn verify(&self) -> Result<()> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(db_error("Failed to ping MongoDB"))?;

        let databases = self
            .client
            .list_database_names(None, None)
            .await
            .map_err(db_error("Failed to list databases"))?;
        if !databases.contains(&self.db_name) {
            return Err(Error::Database(format!("Database '{}' does not exist", self.db_name)));
        }

        let collections = self
            .db
            .list_collection_names(None)
            .await
            .map_err(db_error("Failed to list collections"))?;
        for collection in [ARTICLES, FAILED_ARTICLES] {
            if !collections.iter().any(|c| c == collection) {
                return Err(Error::Database(format!("Collection '{collection}' does not exist")));
            }
        }

        self.check_permissions().await?;
        info!("🍃 MongoDB connection and permissions verified successfully");
        Ok(())
    }

    async fn get_unprocessed_articles(&self, batch_size: usize, exclude: &[ArticleId]) -> Result<Vec<GlobeArticle>> {
        let mut excluded: Vec<Bson> = exclude.iter().map(|id| self.raw_id(id)).collect();

        // Undecodable documents are set aside and the page is fetched again,
        // so they never take the place of valid articles.
        loop {
            let documents = self.fetch_page(batch_size, excluded.clone()).await?;
            if documents.is_empty() {
                debug!("Fetched 0 articles.");
                return Ok(Vec::new());
            }

            let mut articles = Vec::with_capacity(documents.len());
            for document in documents {
                let raw_id = document.get("_id").cloned();
                let decoded = bson::from_document::<ArticleDocument>(document.clone())
                    .map_err(|e| Error::Parse(e.to_string()))
                    .and_then(GlobeArticle::try_from);
                match (decoded, raw_id) {
                    (Ok(article), Some(raw_id)) => {
                        self.raw_ids().insert(article.id.clone(), raw_id);
                        articles.push(article);
                    }
                    (Ok(article), None) => articles.push(article),
                    (Err(e), raw_id) => {
                        self.set_aside(document, &e.to_string()).await;
                        excluded.extend(raw_id);
                    }
                }
            }

            if !articles.is_empty() {
                debug!("Fetched {} articles.", articles.len());
                return Ok(articles);
            }
        }
    }

    async fn update_articles(&self, articles: &[CuratedArticle]) -> Result<Vec<ArticleId>> {
        let mut updated = Vec::with_capacity(articles.len());
        for curated in articles {
            match self
                .articles
                .update_one(self.id_filter(curated.id()), curated_update(curated), None)
                .await
            {
                Ok(result) if result.modified_count > 0 => {
                    self.forget(curated.id());
                    updated.push(curated.id().clone());
                }
                Ok(_) => debug!("Article {} was not modified", curated.id()),
                Err(e) => error!("Error updating article {}: {}", curated.id(), e),
            }
        }
        Ok(updated)
    }

    async fn move_failed_articles(&self, articles: &[FailedArticle]) -> Result<Vec<ArticleId>> {
        let mut moved = Vec::new();
        for failed in articles {
            match self.move_one(failed).await {
                Ok(true) => moved.push(failed.id().clone()),
                Ok(false) => {}
                Err(e) => error!("Error moving failed article {}: {}", failed.id(), e),
            }
        }
        Ok(moved)
    }
}
