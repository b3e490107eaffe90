//! SQLite-backed persistence for scraped results and analysis documents.
//!
//! Two tables, both schema-opaque to the rest of the system:
//!
//! - `scraped_results`: one flat row per saved page, with the full record
//!   JSON-encoded in the `data` column.
//! - `analysis_documents`: enriched per-page analysis records stored as
//!   JSON documents, keyed by UUID. This is the document-store collaborator;
//!   callers hand in a record and get an identifier back.

use anyhow::Result;
use chrono::Utc;
use dredge_common::PageRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

const CREATE_RESULTS: &str = "
CREATE TABLE IF NOT EXISTS scraped_results (
    id INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    title TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

const CREATE_DOCUMENTS: &str = "
CREATE TABLE IF NOT EXISTS analysis_documents (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    document TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database file and its parent
    /// directory, and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!(path = %path.display(), "store.opened");
        Self::with_pool(pool).await
    }

    /// In-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        // A single connection keeps every query on the same in-memory
        // database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_RESULTS).execute(&pool).await?;
        sqlx::query(CREATE_DOCUMENTS).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert one flat result row; returns the row id.
    pub async fn save_record(&self, record: &PageRecord) -> Result<i64> {
        let data = serde_json::to_string(record)?;
        let result = sqlx::query(
            "INSERT INTO scraped_results (url, fetched_at, title, data, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.url)
        .bind(record.fetched_at.to_rfc3339())
        .bind(&record.title)
        .bind(&data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(url = %record.url, id, "store.record.saved");
        Ok(id)
    }

    pub async fn record_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM scraped_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Insert an analysis document; returns its UUID.
    pub async fn save_document(&self, url: &str, document: &serde_json::Value) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO analysis_documents (id, url, document, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(url)
        .bind(serde_json::to_string(document)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(%url, %id, "store.document.saved");
        Ok(id)
    }

    /// Fetch a stored analysis document by id.
    pub async fn document(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT document FROM analysis_documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.get("document");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(url: &str) -> PageRecord {
        let mut texts = BTreeMap::new();
        texts.insert("h1".to_string(), "Hello".to_string());
        PageRecord {
            url: url.to_string(),
            fetched_at: Utc::now(),
            title: "Example".to_string(),
            html_length: 1024,
            texts,
        }
    }

    #[tokio::test]
    async fn records_round_trip_through_sqlite() {
        let store = Store::open_in_memory().await.unwrap();
        let first = store.save_record(&record("https://a.example")).await.unwrap();
        let second = store.save_record(&record("https://b.example")).await.unwrap();

        assert!(second > first);
        assert_eq!(store.record_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn documents_are_fetched_by_uuid() {
        let store = Store::open_in_memory().await.unwrap();
        let doc = serde_json::json!({
            "url": "https://a.example",
            "word_count": 42,
        });
        let id = store.save_document("https://a.example", &doc).await.unwrap();

        let fetched = store.document(&id).await.unwrap().expect("stored");
        assert_eq!(fetched["word_count"], 42);
        assert!(store.document("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_creates_the_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dredge.db");
        let store = Store::open(&path).await.unwrap();
        store.save_record(&record("https://a.example")).await.unwrap();
        assert!(path.exists());
    }
}
