mod config;
mod factory;
mod memory;
mod models;
mod sqlite;

pub use config::{DatabaseConfig, DatabaseType};
pub use factory::create_store;
pub use memory::MemoryStore;
pub use models::*;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use uuid::Uuid;

/// CRUD contract of the validation store. The engine treats `list` results
/// as the source of truth after every confirmed mutation.
#[async_trait]
pub trait ValidationStore: Send + Sync {
    /// Initialize the backing schema.
    async fn init(&self) -> crate::Result<()>;

    async fn list(&self, session_id: Uuid) -> crate::Result<Vec<FieldValidation>>;
    async fn create(&self, record: FieldValidation) -> crate::Result<FieldValidation>;
    async fn update(&self, id: Uuid, patch: ValidationPatch) -> crate::Result<FieldValidation>;
    async fn delete(&self, id: Uuid) -> crate::Result<()>;
}
