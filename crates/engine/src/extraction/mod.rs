pub mod client;
pub mod orchestrator;
pub mod readiness;

pub use client::HttpExtractionService;
pub use orchestrator::{CancelHandle, ExtractionProgress, RunSummary, SequentialOrchestrator};
pub use readiness::{compute_ready_batch, ReadyBatch};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// One extraction call: a target column, the rows ready for it, and the
/// documents it may read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub step_id: Uuid,
    pub column_id: String,
    pub column_name: String,
    pub data_type: String,
    /// One object per ready row: `{"rowIdentifier": ..., "<name>": value}`,
    /// identifier column first. Empty for extraction-root columns.
    pub row_payload: Vec<JsonValue>,
    pub document_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub results: Vec<ExtractionResult>,
    pub results_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Absent when the service addresses a new row (the engine then
    /// generates an identifier) or a schema-level field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_identifier: Option<String>,
    pub extracted_value: Option<String>,
    pub confidence_score: Option<f32>,
    pub ai_reasoning: Option<String>,
}

impl ExtractionResult {
    /// Responses sometimes carry an engine-side failure as a per-result
    /// reasoning marker instead of a transport error; treat those as a
    /// failed column, never as data.
    pub fn is_engine_error(&self) -> bool {
        self.ai_reasoning
            .as_deref()
            .map(|reasoning| reasoning.to_lowercase().contains("internal engine error"))
            .unwrap_or(false)
    }
}

/// The external AI extraction service. A black box: request in, values
/// with confidence and reasoning out.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> crate::Result<ExtractionResponse>;
}
