use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use scan_core::ScanError;

/// Owns the SQLite connection pool and schema migrations. A thin wrapper so
/// `ScanStore` never has to reason about connection setup.
#[derive(Clone)]
pub struct ScanDb {
    pool: SqlitePool,
}

impl ScanDb {
    pub async fn new(database_url: &str) -> Result<Self, ScanError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| ScanError::Config(format!("invalid store.path {database_url:?}: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ScanError::StoreIO(e.to_string()))?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), ScanError> {
        let schema = include_str!("../../../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| ScanError::StoreCorruption(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if a sqlite file already exists on disk (used by `setup`/`run --cleanup`).
    pub fn exists(path: &str) -> bool {
        let file_path = path.strip_prefix("sqlite:").unwrap_or(path);
        Path::new(file_path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_in_memory_db_and_runs_migrations() {
        let db = ScanDb::new("sqlite::memory:").await.unwrap();
        assert!(db.pool().acquire().await.is_ok());
    }
}
