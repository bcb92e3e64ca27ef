use async_trait::async_trait;
use resync_core::{Document, DocumentStore, StoreError};
use sqlx::SqlitePool;

/// The local document table.
///
/// `title` and `last_modified` are stored in their own columns for listing.
/// `body` holds the full document JSON, including fields resync never reads.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    body: String,
}

impl DocumentRow {
    fn into_document(self) -> Result<Document, StoreError> {
        serde_json::from_str(&self.body).map_err(|e| StoreError::InvalidValue {
            key: self.id,
            detail: e.to_string(),
        })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn encode(document: &Document) -> Result<String, StoreError> {
    serde_json::to_string(document).map_err(|e| StoreError::InvalidValue {
        key: document.id.clone(),
        detail: e.to_string(),
    })
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Document>, StoreError> {
        let rows: Vec<DocumentRow> =
            sqlx::query_as("SELECT id, body FROM documents ORDER BY last_modified DESC, id")
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row: Option<DocumentRow> = sqlx::query_as("SELECT id, body FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(DocumentRow::into_document).transpose()
    }

    /// Insert a document or overwrite the one with the same id.
    pub async fn upsert(&self, document: &Document) -> Result<(), StoreError> {
        let body = encode(document)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, last_modified, body)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                last_modified = excluded.last_modified,
                body = excluded.body
            "#,
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(document.last_modified.to_rfc3339())
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    /// Returns false if no document had that id.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn load_all(&self) -> Result<Vec<Document>, StoreError> {
        let rows: Vec<DocumentRow> = sqlx::query_as("SELECT id, body FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    async fn replace_all(&self, documents: &[Document]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for document in documents {
            let body = encode(document)?;
            sqlx::query(
                "INSERT INTO documents (id, title, last_modified, body) VALUES (?, ?, ?, ?)",
            )
            .bind(&document.id)
            .bind(&document.title)
            .bind(document.last_modified.to_rfc3339())
            .bind(&body)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        tracing::debug!("Replaced local documents ({} total)", documents.len());
        Ok(())
    }
}
