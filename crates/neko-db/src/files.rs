use neko_core::models::{FilePage, FileRecord, FileStatus, IndexStats, NewFile};
use neko_core::AppError;
use sqlx::{Row, SqlitePool};

/// Repository for file rows and the name search index.
#[derive(Clone)]
pub struct FileRepository {
    pool: SqlitePool,
}

impl FileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new `pending` file.
    ///
    /// Fails with `Conflict` if an active or trashed file with the same id
    /// exists. A pending row with the same id is replaced (its chunks
    /// cascade); the caller owns cleanup of any external records those
    /// chunks pointed at.
    pub async fn create_file(&self, meta: &NewFile) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<FileStatus> =
            sqlx::query_scalar("SELECT status FROM files WHERE id = ?1")
                .bind(&meta.id)
                .fetch_optional(&mut *tx)
                .await?;

        match existing {
            Some(FileStatus::Pending) => {
                sqlx::query("DELETE FROM files WHERE id = ?1")
                    .bind(&meta.id)
                    .execute(&mut *tx)
                    .await?;
            }
            Some(_) => {
                return Err(AppError::Conflict(format!(
                    "File already exists: {}",
                    meta.id
                )));
            }
            None => {}
        }

        sqlx::query(
            r#"
            INSERT INTO files (id, name, size, type, iv, salt, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', strftime('%s', 'now'))
            "#,
        )
        .bind(&meta.id)
        .bind(&meta.name)
        .bind(meta.size)
        .bind(&meta.mime_type)
        .bind(&meta.iv)
        .bind(&meta.salt)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<_, FileRecord>(
            "SELECT id, name, size, type, iv, salt, status, created_at FROM files WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Newest-first page of files in the given state, plus the total count.
    pub async fn list_files(
        &self,
        status: FileStatus,
        limit: i64,
        offset: i64,
    ) -> Result<FilePage, AppError> {
        let files = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, name, size, type, iv, salt, status, created_at
            FROM files
            WHERE status = ?1
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(FilePage { files, total })
    }

    /// Prefix match over file names via the FTS index.
    pub async fn search_files(
        &self,
        query: &str,
        status: FileStatus,
    ) -> Result<Vec<FileRecord>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let files = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT f.id, f.name, f.size, f.type, f.iv, f.salt, f.status, f.created_at
            FROM files f
            JOIN files_fts ON files_fts.rowid = f.rowid
            WHERE files_fts MATCH ?1 AND f.status = ?2
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(sanitize_fts_query(query))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    /// Returns false when no row with that id exists.
    pub async fn set_status(&self, id: &str, status: FileStatus) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE files SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a file row; chunks cascade. Returns false when absent.
    pub async fn delete_file(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop every file in the given state, returning the number of files
    /// removed and the external message ids their chunks pointed at.
    pub async fn purge_status(&self, status: FileStatus) -> Result<(u64, Vec<String>), AppError> {
        let mut tx = self.pool.begin().await?;

        let message_ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT c.message_id
            FROM chunks c
            JOIN files f ON f.id = c.file_id
            WHERE f.status = ?1
            "#,
        )
        .bind(status)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM files WHERE status = ?1")
            .bind(status)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((result.rows_affected(), message_ids))
    }

    /// Index compaction after finalize.
    pub async fn vacuum(&self) -> Result<(), AppError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Aggregate counters for the stats endpoint.
    pub async fn stats(&self) -> Result<IndexStats, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0)     AS active_files,
                COALESCE(SUM(CASE WHEN status = 'trashed' THEN 1 ELSE 0 END), 0)    AS trashed_files,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0)    AS pending_files,
                COALESCE(SUM(CASE WHEN status = 'active' THEN size ELSE 0 END), 0)  AS active_bytes,
                COALESCE(SUM(CASE WHEN status = 'trashed' THEN size ELSE 0 END), 0) AS trashed_bytes
            FROM files
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        Ok(IndexStats {
            active_files: row.get("active_files"),
            trashed_files: row.get("trashed_files"),
            pending_files: row.get("pending_files"),
            total_chunks,
            active_bytes: row.get("active_bytes"),
            trashed_bytes: row.get("trashed_bytes"),
        })
    }
}

/// FTS5 input is untrusted. Double any embedded quotes, wrap the whole value
/// in quotes so it is a single literal token, and append `*` for prefix
/// matching.
fn sanitize_fts_query(query: &str) -> String {
    format!("\"{}\"*", query.replace('"', "\"\""))
}
