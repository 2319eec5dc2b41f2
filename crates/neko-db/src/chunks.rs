use neko_core::models::ChunkRecord;
use neko_core::AppError;
use sqlx::SqlitePool;

/// Repository for the chunk→message mapping.
#[derive(Clone)]
pub struct ChunkRepository {
    pool: SqlitePool,
}

impl ChunkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a chunk, overwriting any prior row at `(file_id, idx)`.
    pub async fn put_chunk(
        &self,
        file_id: &str,
        idx: i64,
        message_id: &str,
        channel_id: &str,
        size: i64,
        url: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE file_id = ?1 AND idx = ?2")
            .bind(file_id)
            .bind(idx)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO chunks (file_id, idx, message_id, channel_id, size, url)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(file_id)
        .bind(idx)
        .bind(message_id)
        .bind(channel_id)
        .bind(size)
        .bind(url)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Store a chunk only if its file still has a pending upload session.
    ///
    /// Returns false without writing when the pending row is gone (the
    /// upload was aborted while the external transfer was in flight), so the
    /// caller can schedule cleanup of the freshly created external record.
    #[allow(clippy::too_many_arguments)]
    pub async fn put_chunk_if_pending(
        &self,
        file_id: &str,
        idx: i64,
        message_id: &str,
        channel_id: &str,
        size: i64,
        url: &str,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let pending: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM files WHERE id = ?1 AND status = 'pending'",
        )
        .bind(file_id)
        .fetch_optional(&mut *tx)
        .await?;
        if pending.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM chunks WHERE file_id = ?1 AND idx = ?2")
            .bind(file_id)
            .bind(idx)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO chunks (file_id, idx, message_id, channel_id, size, url)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(file_id)
        .bind(idx)
        .bind(message_id)
        .bind(channel_id)
        .bind(size)
        .bind(url)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Remove and return the chunk at `(file_id, idx)`, if any. Used before
    /// an idempotent re-upload so the displaced external record can be
    /// queued for deletion.
    pub async fn take_chunk(
        &self,
        file_id: &str,
        idx: i64,
    ) -> Result<Option<ChunkRecord>, AppError> {
        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query_as::<_, ChunkRecord>(
            r#"
            SELECT file_id, idx, message_id, channel_id, size, url
            FROM chunks WHERE file_id = ?1 AND idx = ?2
            "#,
        )
        .bind(file_id)
        .bind(idx)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            sqlx::query("DELETE FROM chunks WHERE file_id = ?1 AND idx = ?2")
                .bind(file_id)
                .bind(idx)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(existing)
    }

    pub async fn get_chunk(
        &self,
        file_id: &str,
        idx: i64,
    ) -> Result<Option<ChunkRecord>, AppError> {
        let chunk = sqlx::query_as::<_, ChunkRecord>(
            r#"
            SELECT file_id, idx, message_id, channel_id, size, url
            FROM chunks WHERE file_id = ?1 AND idx = ?2
            "#,
        )
        .bind(file_id)
        .bind(idx)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chunk)
    }

    pub async fn get_chunks(&self, file_id: &str) -> Result<Vec<ChunkRecord>, AppError> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            r#"
            SELECT file_id, idx, message_id, channel_id, size, url
            FROM chunks WHERE file_id = ?1
            ORDER BY idx
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Sorted list of stored chunk indices, used by clients to resume an
    /// interrupted upload.
    pub async fn chunk_indices(&self, file_id: &str) -> Result<Vec<i64>, AppError> {
        let indices =
            sqlx::query_scalar("SELECT idx FROM chunks WHERE file_id = ?1 ORDER BY idx")
                .bind(file_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(indices)
    }

    pub async fn message_ids_for(&self, file_id: &str) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar("SELECT message_id FROM chunks WHERE file_id = ?1")
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Persist a refreshed CDN URL. Single-row update, safe under concurrent
    /// readers.
    pub async fn update_url(&self, file_id: &str, idx: i64, url: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE chunks SET url = ?3 WHERE file_id = ?1 AND idx = ?2")
            .bind(file_id)
            .bind(idx)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
