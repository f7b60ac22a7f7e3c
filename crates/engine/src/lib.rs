pub mod config;
pub mod deps;
pub mod extraction;
pub mod grid;
pub mod schema;
pub mod store;
pub mod validation;

use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

pub use config::{Config, ExtractionConfig};
pub use deps::{resolve_dependencies, ColumnDependencies, InputRef};
pub use extraction::{
    compute_ready_batch, CancelHandle, ExtractionProgress, ExtractionService,
    HttpExtractionService, ReadyBatch, RunSummary, SequentialOrchestrator,
};
pub use grid::GridSession;
pub use schema::{flatten_step, FlatColumn, StepKind, StepValue, SubField, WorkflowStep};
pub use store::{create_store, FieldValidation, RowIdentifier, ValidationStatus, ValidationStore};
pub use validation::{ValidationIndex, ValidationPatch};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Extraction failed for column {column_id}: {message}")]
    Extraction {
        column_id: String,
        message: String,
        request: JsonValue,
        response: JsonValue,
    },
    #[error("Cannot revert validation {0}: no original extraction captured")]
    RevertWithoutOriginal(Uuid),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
