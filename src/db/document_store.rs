//! Hierarchical document store with a change feed.
//!
//! Writes are serialized and each one runs in a transaction together with the
//! store revision bump. Committed writes are published on a broadcast channel.

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::{broadcast, Mutex};

use super::CollectionPath;
use crate::errors::AppError;
use crate::models::{timestamp, RevisionInfo};

/// Document body: a JSON object without its identifier.
pub type Document = Map<String, Value>;

/// In-place edit applied inside a store transaction.
pub type DocumentMutation = Box<dyn FnOnce(&mut Document) -> Result<(), AppError> + Send>;

/// Capacity of the change feed before slow listeners start lagging.
const CHANGE_FEED_CAPACITY: usize = 256;

/// A document with the identifier the store assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: String,
    pub document_id: String,
    pub kind: ChangeKind,
    pub revision_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn as_sql(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

/// Ordering for a collection query.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    /// JSON path for `json_extract`; only plain field names are accepted.
    fn json_path(&self) -> Result<String, AppError> {
        let valid = !self.field.is_empty()
            && self
                .field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(AppError::Validation(format!(
                "Invalid order field: {:?}",
                self.field
            )));
        }
        Ok(format!("$.{}", self.field))
    }
}

/// Operations the data-access layer needs from a document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document under a generated identifier.
    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<String, AppError>;

    /// Create or replace a document under a known identifier.
    async fn set(
        &self,
        collection: &CollectionPath,
        id: &str,
        data: Document,
    ) -> Result<(), AppError>;

    async fn get(
        &self,
        collection: &CollectionPath,
        id: &str,
    ) -> Result<Option<StoredDocument>, AppError>;

    /// Merge top-level fields into an existing document.
    async fn update(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: Document,
    ) -> Result<(), AppError> {
        self.modify(
            collection,
            id,
            Box::new(move |doc: &mut Document| {
                doc.extend(fields);
                Ok(())
            }),
        )
        .await
        .map(|_| ())
    }

    /// Atomic read-modify-write of one document; returns the new body.
    async fn modify(
        &self,
        collection: &CollectionPath,
        id: &str,
        mutation: DocumentMutation,
    ) -> Result<Document, AppError>;

    /// Remove a document. Removing a missing document is not an error.
    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), AppError>;

    async fn query(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
    ) -> Result<Vec<StoredDocument>, AppError>;

    /// Subscribe to every committed write, across all collections.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;

    async fn revision(&self) -> Result<RevisionInfo, AppError>;
}

/// SQLite-backed [`DocumentStore`].
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    feed: broadcast::Sender<ChangeEvent>,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            pool,
            write_lock: Mutex::new(()),
            feed,
        }
    }

    fn publish(&self, collection: &CollectionPath, id: &str, kind: ChangeKind, revision_id: i64) {
        // No receivers is fine; nobody is listening yet.
        let _ = self.feed.send(ChangeEvent {
            collection: collection.to_string(),
            document_id: id.to_string(),
            kind,
            revision_id,
        });
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<String, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = timestamp::format(&Utc::now());
        let body = serde_json::to_string(&data)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection.as_str())
        .bind(&id)
        .bind(&body)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.publish(collection, &id, ChangeKind::Added, revision);
        Ok(id)
    }

    async fn set(
        &self,
        collection: &CollectionPath,
        id: &str,
        data: Document,
    ) -> Result<(), AppError> {
        let now = timestamp::format(&Utc::now());
        let body = serde_json::to_string(&data)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let existed = sqlx::query("SELECT 1 FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();

        sqlx::query(
            r#"INSERT INTO documents (collection, id, data, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at"#,
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(&body)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;

        let kind = if existed {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        self.publish(collection, id, kind, revision);
        Ok(())
    }

    async fn get(
        &self,
        collection: &CollectionPath,
        id: &str,
    ) -> Result<Option<StoredDocument>, AppError> {
        let row = sqlx::query("SELECT id, data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn modify(
        &self,
        collection: &CollectionPath,
        id: &str,
        mutation: DocumentMutation,
    ) -> Result<Document, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id, data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let mut data = match row.as_ref().map(document_from_row).transpose()? {
            Some(existing) => existing.data,
            None => {
                return Err(AppError::NotFound(format!(
                    "Document {}/{} not found",
                    collection, id
                )))
            }
        };

        // Dropping the transaction on error rolls it back.
        mutation(&mut data)?;

        let body = serde_json::to_string(&data)?;
        sqlx::query("UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(&body)
            .bind(timestamp::format(&Utc::now()))
            .bind(collection.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.publish(collection, id, ChangeKind::Modified, revision);
        Ok(data)
    }

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(%collection, id, "Delete of missing document ignored");
            return Ok(());
        }

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.publish(collection, id, ChangeKind::Removed, revision);
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
    ) -> Result<Vec<StoredDocument>, AppError> {
        let sql = format!(
            "SELECT id, data FROM documents WHERE collection = ? ORDER BY json_extract(data, ?) {dir}, id {dir}",
            dir = order.direction.as_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(collection.as_str())
            .bind(order.json_path()?)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(document_from_row).collect()
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    async fn revision(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }
}

/// Increment the revision ID inside the caller's transaction.
async fn bump_revision(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(&now)
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("revision_id"))
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredDocument, AppError> {
    let id: String = row.get("id");
    let raw: String = row.get("data");
    let data = serde_json::from_str(&raw)
        .map_err(|e| AppError::Database(format!("Corrupt document {}: {}", id, e)))?;
    Ok(StoredDocument { id, data })
}

/// Serialize an entity into a document body, dropping its `id` field.
pub fn encode_document<T: Serialize>(entity: &T) -> Result<Document, AppError> {
    match serde_json::to_value(entity)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(AppError::Internal(format!(
            "Expected an object, got {}",
            other
        ))),
    }
}

/// Rebuild an entity from a stored document, injecting its identifier.
pub fn decode_document<T: DeserializeOwned>(doc: StoredDocument) -> Result<T, AppError> {
    let StoredDocument { id, mut data } = doc;
    data.insert("id".to_string(), Value::String(id.clone()));
    serde_json::from_value(Value::Object(data))
        .map_err(|e| AppError::Database(format!("Malformed document {}: {}", id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::db::init_database;

    async fn store() -> (SqliteDocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("docs.sqlite"))
            .await
            .unwrap();
        (SqliteDocumentStore::new(pool), temp_dir)
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn notes() -> CollectionPath {
        CollectionPath::parse("users/u1/notes").unwrap()
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let (store, _dir) = store().await;

        let id = store
            .add(&notes(), doc(json!({ "title": "Groceries" })))
            .await
            .unwrap();
        assert!(!id.is_empty());

        let fetched = store.get(&notes(), &id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.data["title"], "Groceries");
    }

    #[tokio::test]
    async fn test_collections_are_partitioned() {
        let (store, _dir) = store().await;
        let other = CollectionPath::parse("users/u2/notes").unwrap();

        let id = store.add(&notes(), doc(json!({ "title": "a" }))).await.unwrap();

        assert!(store.get(&other, &id).await.unwrap().is_none());
        assert!(store
            .query(&other, &OrderBy::asc("title"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let (store, _dir) = store().await;
        let id = store
            .add(&notes(), doc(json!({ "title": "a", "content": "b" })))
            .await
            .unwrap();

        store
            .update(&notes(), &id, doc(json!({ "content": "c", "isPinned": true })))
            .await
            .unwrap();

        let fetched = store.get(&notes(), &id).await.unwrap().unwrap();
        assert_eq!(fetched.data["title"], "a");
        assert_eq!(fetched.data["content"], "c");
        assert_eq!(fetched.data["isPinned"], true);
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let (store, _dir) = store().await;
        let err = store
            .update(&notes(), "missing", doc(json!({ "title": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_document_unchanged() {
        let (store, _dir) = store().await;
        let id = store.add(&notes(), doc(json!({ "title": "a" }))).await.unwrap();
        let before = store.revision().await.unwrap().revision_id;

        let err = store
            .modify(
                &notes(),
                &id,
                Box::new(|doc: &mut Document| {
                    doc.insert("title".into(), json!("b"));
                    Err(AppError::Validation("nope".into()))
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        let fetched = store.get(&notes(), &id).await.unwrap().unwrap();
        assert_eq!(fetched.data["title"], "a");
        assert_eq!(store.revision().await.unwrap().revision_id, before);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _dir) = store().await;
        let id = store.add(&notes(), doc(json!({ "title": "a" }))).await.unwrap();

        store.delete(&notes(), &id).await.unwrap();
        store.delete(&notes(), &id).await.unwrap();
        store.delete(&notes(), "never-existed").await.unwrap();

        assert!(store.get(&notes(), &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_orders_by_field() {
        let (store, _dir) = store().await;
        for stamp in [
            "2024-01-02T00:00:00.000000Z",
            "2024-01-03T00:00:00.000000Z",
            "2024-01-01T00:00:00.000000Z",
        ] {
            store
                .add(&notes(), doc(json!({ "updatedAt": stamp })))
                .await
                .unwrap();
        }

        let docs = store.query(&notes(), &OrderBy::desc("updatedAt")).await.unwrap();
        let stamps: Vec<&str> = docs
            .iter()
            .map(|d| d.data["updatedAt"].as_str().unwrap())
            .collect();
        assert_eq!(
            stamps,
            vec![
                "2024-01-03T00:00:00.000000Z",
                "2024-01-02T00:00:00.000000Z",
                "2024-01-01T00:00:00.000000Z",
            ]
        );
    }

    #[tokio::test]
    async fn test_query_rejects_unsafe_field() {
        let (store, _dir) = store().await;
        let err = store
            .query(&notes(), &OrderBy::desc("x') DESC; --"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_writes_publish_changes_and_bump_revision() {
        let (store, _dir) = store().await;
        let mut feed = store.changes();
        let start = store.revision().await.unwrap().revision_id;

        let id = store.add(&notes(), doc(json!({ "title": "a" }))).await.unwrap();
        store
            .update(&notes(), &id, doc(json!({ "title": "b" })))
            .await
            .unwrap();
        store.delete(&notes(), &id).await.unwrap();

        let kinds: Vec<ChangeKind> = vec![
            feed.recv().await.unwrap().kind,
            feed.recv().await.unwrap().kind,
            feed.recv().await.unwrap().kind,
        ];
        assert_eq!(
            kinds,
            vec![ChangeKind::Added, ChangeKind::Modified, ChangeKind::Removed]
        );
        assert_eq!(store.revision().await.unwrap().revision_id, start + 3);
    }

    #[tokio::test]
    async fn test_set_upserts() {
        let (store, _dir) = store().await;
        let users = CollectionPath::users();

        store
            .set(&users, "u1", doc(json!({ "userPicUrl": "a" })))
            .await
            .unwrap();
        store
            .set(&users, "u1", doc(json!({ "userPicUrl": "b" })))
            .await
            .unwrap();

        let fetched = store.get(&users, "u1").await.unwrap().unwrap();
        assert_eq!(fetched.data["userPicUrl"], "b");
    }

    #[test]
    fn test_encode_strips_id_and_decode_restores_it() {
        #[derive(Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Thing {
            id: String,
            name: String,
        }

        let encoded = encode_document(&Thing {
            id: "x".into(),
            name: "n".into(),
        })
        .unwrap();
        assert!(!encoded.contains_key("id"));

        let decoded: Thing = decode_document(StoredDocument {
            id: "y".into(),
            data: encoded,
        })
        .unwrap();
        assert_eq!(decoded.id, "y");
        assert_eq!(decoded.name, "n");
    }
}
