//! Tests against a live MongoDB. They only run when `MONGO_URI` is set and
//! return early otherwise; each test works in its own throwaway database.
#![cfg(feature = "mongo")]

use std::time::{SystemTime, UNIX_EPOCH};

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use gn_core::{ArticleId, ArticleStorage, Category, Config, CuratedArticle, FailedArticle, LlmArticleData};
use gn_storage::MongoStorage;
use mongodb::{Client, Database};

struct TestDb {
    db: Database,
    storage: MongoStorage,
}

impl TestDb {
    async fn start(name: &str) -> Option<Self> {
        let uri = std::env::var("MONGO_URI").ok().filter(|v| !v.trim().is_empty())?;
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let db_name = format!("gn_test_{name}_{}_{nanos}", std::process::id());

        let client = Client::with_uri_str(&uri).await.unwrap();
        let db = client.database(&db_name);
        db.create_collection("articles", None).await.unwrap();
        db.create_collection("failed_articles", None).await.unwrap();

        let config = Config::from_lookup(|key| match key {
            "MONGO_URI" => Some(uri.clone()),
            "MONGO_DB" => Some(db_name.clone()),
            "LLM_PROVIDER" => Some("dummy".to_string()),
            "AZURE_TRANSLATOR_API_KEY" => Some("unused".to_string()),
            "AZURE_TRANSLATOR_ENDPOINT" => Some("https://api.cognitive.microsofttranslator.com".to_string()),
            "AZURE_TRANSLATOR_LOCATION" => Some("eastus".to_string()),
            _ => None,
        })
        .unwrap();
        let storage = MongoStorage::connect(&config).await.unwrap();
        storage.verify().await.unwrap();

        Some(Self { db, storage })
    }

    fn articles(&self) -> mongodb::Collection<Document> {
        self.db.collection("articles")
    }

    fn failed_articles(&self) -> mongodb::Collection<Document> {
        self.db.collection("failed_articles")
    }

    async fn insert(&self, document: Document) {
        self.articles().insert_one(document, None).await.unwrap();
    }

    async fn finish(self) {
        self.db.drop(None).await.unwrap();
    }
}

fn article_document(id: impl Into<Bson>, hours_ago: i64) -> Document {
    let scraped = bson::DateTime::from_millis(bson::DateTime::now().timestamp_millis() - hours_ago * 3_600_000);
    doc! {
        "_id": id.into(),
        "title": "Test Title",
        "url": "https://example.com/article",
        "description": "Test Description",
        "date_published": scraped,
        "provider": "Test Provider",
        "language": "en",
        "content": "Test Content",
        "origin_country": "US",
        "keywords": ["curated"],
        "source_api": "TestAPI",
        "schema_version": "1.1",
        "date_scraped": scraped,
        "post_processed": false,
    }
}

#[tokio::test]
async fn test_move_failed_article() {
    let Some(test) = TestDb::start("move").await else {
        return;
    };
    let oid = ObjectId::new();
    test.insert(article_document(oid, 0)).await;

    let articles = test.storage.get_unprocessed_articles(10, &[]).await.unwrap();
    assert_eq!(articles.len(), 1);
    let failed = FailedArticle::new(articles[0].clone(), "LLM processing failed");

    let moved = test.storage.move_failed_articles(&[failed.clone()]).await.unwrap();
    assert_eq!(moved, vec![ArticleId::new(oid.to_hex())]);
    assert!(test.articles().find_one(doc! { "_id": oid }, None).await.unwrap().is_none());
    let stored = test.failed_articles().find_one(doc! { "_id": oid }, None).await.unwrap().unwrap();
    assert_eq!(stored.get_str("failure_reason").unwrap(), "LLM processing failed");

    // Gone from `articles`: reported as not found, nothing moved.
    let moved = test.storage.move_failed_articles(&[failed]).await.unwrap();
    assert!(moved.is_empty());

    test.finish().await;
}

#[tokio::test]
async fn test_move_duplicate_deletes_original() {
    let Some(test) = TestDb::start("duplicate").await else {
        return;
    };
    test.insert(article_document("dup", 0)).await;
    test.failed_articles()
        .insert_one(article_document("dup", 0), None)
        .await
        .unwrap();

    let articles = test.storage.get_unprocessed_articles(10, &[]).await.unwrap();
    let failed = FailedArticle::new(articles[0].clone(), "second failure");
    let moved = test.storage.move_failed_articles(&[failed]).await.unwrap();

    assert!(moved.is_empty());
    assert!(test.articles().find_one(doc! { "_id": "dup" }, None).await.unwrap().is_none());
    assert_eq!(test.failed_articles().count_documents(None, None).await.unwrap(), 1);

    test.finish().await;
}

#[tokio::test]
async fn test_undecodable_documents_are_set_aside() {
    let Some(test) = TestDb::start("undecodable").await else {
        return;
    };
    let mut broken = article_document("broken", 0);
    broken.insert("origin_country", "Atlantis");
    test.insert(broken).await;
    test.insert(article_document("valid", 5)).await;

    let articles = test.storage.get_unprocessed_articles(1, &[]).await.unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].id.as_str(), "valid");

    let set_aside = test.failed_articles().find_one(doc! { "_id": "broken" }, None).await.unwrap().unwrap();
    assert!(set_aside.get_str("failure_reason").unwrap().contains("Atlantis"));
    assert!(test.articles().find_one(doc! { "_id": "broken" }, None).await.unwrap().is_none());

    let rest = test
        .storage
        .get_unprocessed_articles(1, &[ArticleId::new("valid")])
        .await
        .unwrap();
    assert!(rest.is_empty());

    test.finish().await;
}

#[tokio::test]
async fn test_hex_string_id_is_updated_as_string() {
    let Some(test) = TestDb::start("hex_id").await else {
        return;
    };
    let hex = "666f6f2d6261722d71757578";
    test.insert(article_document(hex, 0)).await;

    let articles = test.storage.get_unprocessed_articles(10, &[]).await.unwrap();
    let llm = LlmArticleData {
        category: Category::Economy,
        related_countries: vec!["DE".parse().unwrap()],
        keywords: vec!["markets".to_string()],
    };
    let curated = CuratedArticle::from_parts(
        articles[0].clone(),
        llm,
        "Test Title".to_string(),
        "Test Description".to_string(),
    );

    let updated = test.storage.update_articles(&[curated]).await.unwrap();
    assert_eq!(updated, vec![ArticleId::new(hex)]);
    let stored = test.articles().find_one(doc! { "_id": hex }, None).await.unwrap().unwrap();
    assert!(stored.get_bool("post_processed").unwrap());
    assert_eq!(stored.get_str("category").unwrap(), "ECONOMY");

    test.finish().await;
}
