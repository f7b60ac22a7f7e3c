use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    store::{FieldValidation, RowIdentifier, ValidationPatch, ValidationStatus, ValidationStore},
    Error, Result,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Connecting to SQLite database: {}", database_url);

        let pool = SqlitePool::connect(database_url).await.map_err(|e| {
            error!("Failed to connect to SQLite: {}", e);
            Error::Sqlx(e)
        })?;

        Ok(Self { pool })
    }

    async fn fetch(&self, id: Uuid) -> Result<FieldValidation> {
        let row = sqlx::query("SELECT * FROM field_validations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("validation {id}")))?;
        row_to_validation(&row)
    }

    async fn write(&self, record: &FieldValidation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO field_validations (
                id, session_id, row_identifier, column_id,
                legacy_field_id, legacy_collection_name, legacy_field_name, legacy_record_index,
                extracted_value, status, confidence_score, ai_reasoning,
                original_extracted_value, original_confidence_score, original_ai_reasoning,
                manually_updated, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ON CONFLICT(id) DO UPDATE SET
                extracted_value = excluded.extracted_value,
                status = excluded.status,
                confidence_score = excluded.confidence_score,
                ai_reasoning = excluded.ai_reasoning,
                original_extracted_value = excluded.original_extracted_value,
                original_confidence_score = excluded.original_confidence_score,
                original_ai_reasoning = excluded.original_ai_reasoning,
                manually_updated = excluded.manually_updated,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.session_id.to_string())
        .bind(record.row_identifier.as_ref().map(|r| r.as_str().to_string()))
        .bind(&record.column_id)
        .bind(&record.legacy_field_id)
        .bind(&record.legacy_collection_name)
        .bind(&record.legacy_field_name)
        .bind(record.legacy_record_index)
        .bind(&record.extracted_value)
        .bind(record.status.to_string())
        .bind(record.confidence_score.map(f64::from))
        .bind(&record.ai_reasoning)
        .bind(&record.original_extracted_value)
        .bind(record.original_confidence_score.map(f64::from))
        .bind(&record.original_ai_reasoning)
        .bind(record.manually_updated)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_validation(row: &sqlx::sqlite::SqliteRow) -> Result<FieldValidation> {
    let status: String = row.get("status");
    Ok(FieldValidation {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        session_id: Uuid::parse_str(&row.get::<String, _>("session_id"))?,
        row_identifier: row
            .get::<Option<String>, _>("row_identifier")
            .map(RowIdentifier::new),
        column_id: row.get("column_id"),
        legacy_field_id: row.get("legacy_field_id"),
        legacy_collection_name: row.get("legacy_collection_name"),
        legacy_field_name: row.get("legacy_field_name"),
        legacy_record_index: row.get("legacy_record_index"),
        extracted_value: row.get("extracted_value"),
        status: ValidationStatus::from_str(&status)?,
        confidence_score: row.get::<Option<f64>, _>("confidence_score").map(|v| v as f32),
        ai_reasoning: row.get("ai_reasoning"),
        original_extracted_value: row.get("original_extracted_value"),
        original_confidence_score: row
            .get::<Option<f64>, _>("original_confidence_score")
            .map(|v| v as f32),
        original_ai_reasoning: row.get("original_ai_reasoning"),
        manually_updated: row.get("manually_updated"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

#[async_trait]
impl ValidationStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    async fn list(&self, session_id: Uuid) -> Result<Vec<FieldValidation>> {
        debug!("Listing validations for session: {}", session_id);

        let rows = sqlx::query(
            "SELECT * FROM field_validations WHERE session_id = ?1 ORDER BY created_at, id",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_validation).collect()
    }

    async fn create(&self, record: FieldValidation) -> Result<FieldValidation> {
        debug!("Creating validation: {}", record.id);
        self.write(&record).await?;
        Ok(record)
    }

    async fn update(&self, id: Uuid, patch: ValidationPatch) -> Result<FieldValidation> {
        debug!("Updating validation: {}", id);

        let mut record = self.fetch(id).await?;
        patch.apply(&mut record);
        self.write(&record).await?;
        Ok(record)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        debug!("Deleting validation: {}", id);

        let result = sqlx::query("DELETE FROM field_validations WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("validation {id}")));
        }
        Ok(())
    }
}
