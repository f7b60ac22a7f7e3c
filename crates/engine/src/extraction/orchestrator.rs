//! Sequential Extraction Orchestrator
//!
//! Issues one extraction call per target column, in ascending column
//! order, merging each column's results into the session before the next
//! column starts. Column k may depend on column k-1's output, so this
//! ordering is a guarantee, not a scheduling accident.

use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    extraction::{ExtractionRequest, ExtractionService},
    grid::GridSession,
    Error, Result,
};

/// Progress events emitted while a sequential run advances.
#[derive(Debug, Clone)]
pub enum ExtractionProgress {
    ColumnStarted {
        column_id: String,
        column_name: String,
        row_count: usize,
    },
    ColumnCompleted {
        column_id: String,
        validations_written: usize,
    },
    ColumnFailed {
        column_id: String,
        message: String,
        request: JsonValue,
        response: JsonValue,
    },
    RunFinished(RunSummary),
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub columns_processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub validations_written: usize,
    pub cancelled: bool,
}

/// Shared cancel flag. Cancelling stops issuing further column calls; an
/// in-flight call still completes and its result is still merged.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct SequentialOrchestrator {
    service: Arc<dyn ExtractionService>,
    cancel: CancelHandle,
}

impl SequentialOrchestrator {
    pub fn new(service: Arc<dyn ExtractionService>) -> Self {
        Self {
            service,
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run one extraction call per target column of a step, in ascending
    /// `order_index`. Progress events are sent on `progress`; a dropped
    /// receiver does not stop the run.
    pub async fn run(
        &self,
        session: &mut GridSession,
        step_id: Uuid,
        target_column_ids: &[String],
        document_ids: &[String],
        progress: mpsc::Sender<ExtractionProgress>,
    ) -> Result<RunSummary> {
        let mut targets: Vec<_> = session
            .columns(step_id)
            .iter()
            .filter(|column| target_column_ids.contains(&column.id))
            .cloned()
            .collect();
        targets.sort_by_key(|column| (column.order_index, column.sub_field_index));

        info!(step_id = %step_id, columns = targets.len(), "Starting sequential extraction");
        let mut summary = RunSummary::default();

        for target in &targets {
            if self.cancel.is_cancelled() {
                info!("Extraction run cancelled, stopping before next column");
                summary.cancelled = true;
                break;
            }

            let deps = session.column_dependencies(step_id, &target.id)?;
            let batch = session.compute_ready_batch(step_id, &target.id)?;

            // A derived column with nothing ready has nothing to call for.
            if batch.payload.is_empty() && !deps.needs_document {
                info!(column = %target.name, excluded = batch.excluded_count, "No rows ready, skipping column");
                continue;
            }

            let request = ExtractionRequest {
                step_id,
                column_id: target.id.clone(),
                column_name: target.name.clone(),
                data_type: target.data_type.clone(),
                row_payload: batch.payload.clone(),
                document_ids: document_ids.to_vec(),
            };

            summary.columns_processed += 1;
            let _ = progress
                .send(ExtractionProgress::ColumnStarted {
                    column_id: target.id.clone(),
                    column_name: target.name.clone(),
                    row_count: request.row_payload.len(),
                })
                .await;

            match self.extract_column(session, step_id, &request).await {
                Ok(written) => {
                    summary.succeeded += 1;
                    summary.validations_written += written;
                    let _ = progress
                        .send(ExtractionProgress::ColumnCompleted {
                            column_id: target.id.clone(),
                            validations_written: written,
                        })
                        .await;
                }
                Err(Error::Extraction {
                    column_id,
                    message,
                    request,
                    response,
                }) => {
                    // Abort only this column's batch; earlier columns in the
                    // run are already merged and stay applied.
                    summary.failed += 1;
                    error!(column_id = %column_id, "Column extraction failed: {}", message);
                    let _ = progress
                        .send(ExtractionProgress::ColumnFailed {
                            column_id,
                            message,
                            request,
                            response,
                        })
                        .await;
                }
                Err(other) => return Err(other),
            }
        }

        info!(
            processed = summary.columns_processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            written = summary.validations_written,
            "Sequential extraction finished"
        );
        let _ = progress
            .send(ExtractionProgress::RunFinished(summary.clone()))
            .await;
        Ok(summary)
    }

    /// One column: call the service, vet the response, merge the results.
    /// The merge completes before the caller moves to the next column.
    async fn extract_column(
        &self,
        session: &mut GridSession,
        step_id: Uuid,
        request: &ExtractionRequest,
    ) -> Result<usize> {
        let response = self.service.extract(request).await?;

        if response.results_count == 0 && !request.row_payload.is_empty() {
            return Err(Error::Extraction {
                column_id: request.column_id.clone(),
                message: format!(
                    "service returned zero results for {} input rows",
                    request.row_payload.len()
                ),
                request: serde_json::to_value(request)?,
                response: serde_json::to_value(&response)?,
            });
        }

        if let Some(bad) = response.results.iter().find(|r| r.is_engine_error()) {
            warn!(column_id = %request.column_id, "Response carries an engine error marker");
            return Err(Error::Extraction {
                column_id: request.column_id.clone(),
                message: format!(
                    "service reported an internal engine error: {}",
                    bad.ai_reasoning.as_deref().unwrap_or_default()
                ),
                request: serde_json::to_value(request)?,
                response: serde_json::to_value(&response)?,
            });
        }

        session
            .merge_column_results(step_id, &request.column_id, &request.row_payload, &response.results)
            .await
    }
}
