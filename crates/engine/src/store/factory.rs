use crate::store::{DatabaseConfig, DatabaseType, MemoryStore, SqliteStore, ValidationStore};
use std::sync::Arc;

pub async fn create_store(config: &DatabaseConfig) -> crate::Result<Arc<dyn ValidationStore>> {
    match config.db_type {
        DatabaseType::Sqlite => {
            let path = config
                .sqlite_path
                .as_ref()
                .ok_or_else(|| crate::Error::Config("SQLite path not configured".into()))?
                .to_str()
                .unwrap_or("data/docgrid.db");
            Ok(Arc::new(SqliteStore::new(path).await?))
        }
        DatabaseType::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
