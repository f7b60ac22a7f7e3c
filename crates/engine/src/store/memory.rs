use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{
    store::{FieldValidation, ValidationPatch, ValidationStore},
    Error, Result,
};

/// In-memory validation store, used in tests and as a stand-in when no
/// database is configured.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, FieldValidation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ValidationStore for MemoryStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn list(&self, session_id: Uuid) -> Result<Vec<FieldValidation>> {
        let records = self
            .records
            .read()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))?;
        let mut result: Vec<_> = records
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        result.sort_by_key(|r| r.created_at);
        Ok(result)
    }

    async fn create(&self, record: FieldValidation) -> Result<FieldValidation> {
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))?;
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: Uuid, patch: ValidationPatch) -> Result<FieldValidation> {
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))?;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("validation {id}")))?;
        patch.apply(record);
        Ok(record.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))?;
        records
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("validation {id}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ValidationStatus;

    #[tokio::test]
    async fn create_update_delete_roundtrip() {
        let store = MemoryStore::new();
        let session_id = Uuid::new_v4();
        let record = FieldValidation::blank(session_id, None, "col-1");
        let id = record.id;

        store.create(record).await.unwrap();
        assert_eq!(store.list(session_id).await.unwrap().len(), 1);

        let updated = store
            .update(id, ValidationPatch::status(ValidationStatus::Valid))
            .await
            .unwrap();
        assert_eq!(updated.status, ValidationStatus::Valid);

        store.delete(id).await.unwrap();
        assert!(store.list(session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(Uuid::new_v4(), ValidationPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
