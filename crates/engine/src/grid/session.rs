//! Grid session: the engine's working state for one validation session.
//!
//! Holds a read-through/write-through cache of the session's validation
//! records over an injected store, plus the flattened column model for
//! every step. Mutations are optimistic: the cache changes first, the
//! store call confirms; any store failure triggers a full resync
//! (fetch-and-replace, never a partial patch).

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    deps::{resolve_dependencies, ColumnDependencies, SchemaCatalog},
    extraction::{compute_ready_batch, ExtractionResult, ReadyBatch},
    schema::{flatten_step, FlatColumn, WorkflowStep},
    store::{FieldValidation, RowIdentifier, ValidationPatch, ValidationStatus, ValidationStore},
    validation::{self, ValidationIndex},
    Error, Result,
};

pub struct GridSession {
    session_id: Uuid,
    steps: Vec<WorkflowStep>,
    columns_by_step: HashMap<Uuid, Vec<FlatColumn>>,
    catalog: SchemaCatalog,
    store: Arc<dyn ValidationStore>,
    cache: Vec<FieldValidation>,
    indexes: HashMap<Uuid, ValidationIndex>,
}

impl GridSession {
    /// Build a session over the given schema and store, loading the
    /// current validation records.
    pub async fn new(
        session_id: Uuid,
        steps: Vec<WorkflowStep>,
        store: Arc<dyn ValidationStore>,
    ) -> Result<Self> {
        let columns_by_step = steps
            .iter()
            .map(|step| (step.id, flatten_step(step)))
            .collect();
        let catalog = SchemaCatalog::build(&steps);
        let mut session = Self {
            session_id,
            steps,
            columns_by_step,
            catalog,
            store,
            cache: Vec::new(),
            indexes: HashMap::new(),
        };
        session.refresh().await?;
        Ok(session)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn step(&self, step_id: Uuid) -> Result<&WorkflowStep> {
        self.steps
            .iter()
            .find(|s| s.id == step_id)
            .ok_or_else(|| Error::NotFound(format!("step {step_id}")))
    }

    pub fn columns(&self, step_id: Uuid) -> &[FlatColumn] {
        self.columns_by_step
            .get(&step_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace the cache with the store's current state and rebuild every
    /// per-step index. The store's `list` is the source of truth.
    pub async fn refresh(&mut self) -> Result<()> {
        self.cache = self.store.list(self.session_id).await?;
        self.rebuild_indexes();
        Ok(())
    }

    fn rebuild_indexes(&mut self) {
        self.indexes = self
            .steps
            .iter()
            .map(|step| {
                let columns = self.columns_by_step.get(&step.id).cloned().unwrap_or_default();
                (
                    step.id,
                    ValidationIndex::build(self.cache.clone(), &columns, &step.name),
                )
            })
            .collect();
    }

    /// Resync after a rejected store write. Failure here is logged, not
    /// propagated: the caller already has the original error.
    async fn resync(&mut self) {
        if let Err(e) = self.refresh().await {
            warn!("Cache resync after store failure also failed: {}", e);
        }
    }

    pub fn resolve(
        &self,
        step_id: Uuid,
        row: Option<&RowIdentifier>,
        column_id: &str,
    ) -> Option<&FieldValidation> {
        self.indexes.get(&step_id)?.resolve(row, column_id)
    }

    /// Distinct row identifiers of a step, in first-appearance order.
    pub fn row_identifiers(&self, step_id: Uuid) -> Vec<RowIdentifier> {
        self.indexes
            .get(&step_id)
            .map(|index| index.row_identifiers().to_vec())
            .unwrap_or_default()
    }

    pub fn records(&self) -> &[FieldValidation] {
        &self.cache
    }

    fn cached_mut(&mut self, validation_id: Uuid) -> Result<&mut FieldValidation> {
        self.cache
            .iter_mut()
            .find(|record| record.id == validation_id)
            .ok_or_else(|| Error::NotFound(format!("validation {validation_id}")))
    }

    /// Apply an already-cached optimistic change to the store; on rejection
    /// roll the cache back to the server-confirmed state.
    async fn confirm_update(
        &mut self,
        validation_id: Uuid,
        patch: ValidationPatch,
    ) -> Result<FieldValidation> {
        match self.store.update(validation_id, patch).await {
            Ok(confirmed) => {
                if let Some(record) = self.cache.iter_mut().find(|r| r.id == validation_id) {
                    *record = confirmed.clone();
                }
                self.rebuild_indexes();
                Ok(confirmed)
            }
            Err(e) => {
                warn!(validation_id = %validation_id, "Store update rejected, resyncing cache");
                self.resync().await;
                Err(e)
            }
        }
    }

    /// Toggle a cell between `pending` and `valid`.
    pub async fn toggle(&mut self, validation_id: Uuid) -> Result<FieldValidation> {
        let record = self.cached_mut(validation_id)?;
        let patch = validation::toggle_status(record);
        self.rebuild_indexes();
        self.confirm_update(validation_id, patch).await
    }

    /// Overwrite a cell's value by hand, capturing the original extraction
    /// for a later revert.
    pub async fn manual_edit(
        &mut self,
        validation_id: Uuid,
        new_value: &str,
    ) -> Result<FieldValidation> {
        let record = self.cached_mut(validation_id)?;
        let patch = validation::manual_edit(record, new_value);
        self.rebuild_indexes();
        self.confirm_update(validation_id, patch).await
    }

    /// Manually set a cell that may not have a record yet. A brand-new cell
    /// starts life as a manual record with no original to revert to.
    pub async fn manual_edit_cell(
        &mut self,
        step_id: Uuid,
        row: Option<&RowIdentifier>,
        column_id: &str,
        new_value: &str,
    ) -> Result<FieldValidation> {
        if let Some(existing) = self.resolve(step_id, row, column_id) {
            let id = existing.id;
            return self.manual_edit(id, new_value).await;
        }

        let mut record = FieldValidation::blank(self.session_id, row.cloned(), column_id);
        validation::manual_edit(&mut record, new_value);
        self.create_record(record).await
    }

    /// Return a manually edited cell to its AI-derived state. Reports
    /// `RevertWithoutOriginal` without touching anything when no original
    /// extraction was captured.
    pub async fn revert(&mut self, validation_id: Uuid) -> Result<FieldValidation> {
        let record = self.cached_mut(validation_id)?;
        let patch = validation::revert_to_original(record)?;
        self.rebuild_indexes();
        self.confirm_update(validation_id, patch).await
    }

    /// Bulk-toggle a column: if every non-empty cell is `valid` they all
    /// drop to `pending`, otherwise they all converge to `valid`. One
    /// logical operation, not N independent toggles.
    pub async fn bulk_column_toggle(&mut self, step_id: Uuid, column_id: &str) -> Result<usize> {
        let index = self
            .indexes
            .get(&step_id)
            .ok_or_else(|| Error::NotFound(format!("step {step_id}")))?;
        let cells: Vec<Uuid> = index
            .records_for_column(column_id)
            .into_iter()
            .filter(|record| record.has_value())
            .map(|record| record.id)
            .collect();
        let target = validation::bulk_toggle_target(
            index
                .records_for_column(column_id)
                .into_iter()
                .filter(|record| record.has_value()),
        );

        debug!(column_id, cells = cells.len(), target = %target, "Bulk column toggle");

        for id in &cells {
            if let Ok(record) = self.cached_mut(*id) {
                ValidationPatch::status(target).apply(record);
            }
        }
        self.rebuild_indexes();

        for id in &cells {
            if let Err(e) = self.store.update(*id, ValidationPatch::status(target)).await {
                warn!(validation_id = %id, "Bulk toggle write rejected, resyncing cache");
                self.resync().await;
                return Err(e);
            }
        }
        Ok(cells.len())
    }

    /// Add an empty row: a fresh identifier plus one pending blank cell per
    /// column of the step.
    pub async fn add_row(&mut self, step_id: Uuid) -> Result<RowIdentifier> {
        let row = RowIdentifier::generate();
        let columns: Vec<String> = self.columns(step_id).iter().map(|c| c.id.clone()).collect();
        if columns.is_empty() {
            return Err(Error::Validation(format!("step {step_id} has no columns")));
        }

        for column_id in &columns {
            let record = FieldValidation::blank(self.session_id, Some(row.clone()), column_id);
            self.create_record(record).await?;
        }
        info!(step_id = %step_id, row = %row, "Added row");
        Ok(row)
    }

    /// Delete every cell of one row. The identifier is never reused.
    pub async fn delete_row(&mut self, step_id: Uuid, row: &RowIdentifier) -> Result<usize> {
        let column_ids: Vec<String> = self.columns(step_id).iter().map(|c| c.id.clone()).collect();
        let doomed: Vec<Uuid> = self
            .cache
            .iter()
            .filter(|record| {
                record.row_identifier.as_ref() == Some(row)
                    && column_ids.iter().any(|c| record.addresses_column(c))
            })
            .map(|record| record.id)
            .collect();
        self.delete_records(&doomed).await?;
        info!(step_id = %step_id, row = %row, deleted = doomed.len(), "Deleted row");
        Ok(doomed.len())
    }

    /// Delete every record belonging to a step's columns.
    pub async fn delete_collection(&mut self, step_id: Uuid) -> Result<usize> {
        let column_ids: Vec<String> = self.columns(step_id).iter().map(|c| c.id.clone()).collect();
        let doomed: Vec<Uuid> = self
            .cache
            .iter()
            .filter(|record| column_ids.iter().any(|c| record.addresses_column(c)))
            .map(|record| record.id)
            .collect();
        self.delete_records(&doomed).await?;
        info!(step_id = %step_id, deleted = doomed.len(), "Deleted collection");
        Ok(doomed.len())
    }

    async fn create_record(&mut self, record: FieldValidation) -> Result<FieldValidation> {
        self.cache.push(record.clone());
        self.rebuild_indexes();
        match self.store.create(record).await {
            Ok(confirmed) => {
                if let Some(cached) = self.cache.iter_mut().find(|r| r.id == confirmed.id) {
                    *cached = confirmed.clone();
                }
                self.rebuild_indexes();
                Ok(confirmed)
            }
            Err(e) => {
                warn!("Store create rejected, resyncing cache");
                self.resync().await;
                Err(e)
            }
        }
    }

    async fn delete_records(&mut self, ids: &[Uuid]) -> Result<()> {
        self.cache.retain(|record| !ids.contains(&record.id));
        self.rebuild_indexes();
        for id in ids {
            if let Err(e) = self.store.delete(*id).await {
                warn!(validation_id = %id, "Store delete rejected, resyncing cache");
                self.resync().await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Resolve a column's dependencies against the full schema.
    pub fn column_dependencies(&self, step_id: Uuid, column_id: &str) -> Result<ColumnDependencies> {
        let columns = self.columns(step_id);
        let target = columns
            .iter()
            .find(|c| c.id == column_id)
            .ok_or_else(|| Error::NotFound(format!("column {column_id}")))?;
        Ok(resolve_dependencies(target, columns, step_id, &self.catalog))
    }

    /// Compute the ready-row subset and serialized payload for one target
    /// column. Synchronous over the cache.
    pub fn compute_ready_batch(&self, step_id: Uuid, column_id: &str) -> Result<ReadyBatch> {
        let deps = self.column_dependencies(step_id, column_id)?;
        let columns = self.columns(step_id);
        let target = columns
            .iter()
            .find(|c| c.id == column_id)
            .ok_or_else(|| Error::NotFound(format!("column {column_id}")))?;
        let index = self
            .indexes
            .get(&step_id)
            .ok_or_else(|| Error::NotFound(format!("step {step_id}")))?;
        let rows = index.row_identifiers().to_vec();

        // Cross-step references resolve to schema-level values; if any of
        // them is not yet validated, no row can be ready.
        let mut shared_values = Vec::new();
        for value_id in &deps.referenced_cross_step_value_ids {
            match self.cross_step_value(*value_id) {
                Some(pairs) => shared_values.extend(pairs),
                None => {
                    debug!(value_id = %value_id, "Cross-step dependency not yet validated");
                    return Ok(ReadyBatch::empty_with_excluded(rows.len()));
                }
            }
        }

        Ok(compute_ready_batch(
            target,
            columns,
            &deps,
            index,
            &rows,
            &shared_values,
        ))
    }

    /// Validated values of a cross-step referenced value, as (name, value)
    /// pairs (one per sub-field for multi-field values). `None` until every
    /// involved cell is validated and non-empty.
    fn cross_step_value(&self, value_id: Uuid) -> Option<Vec<(String, String)>> {
        let step_id = self.catalog.step_of(value_id)?;
        let index = self.indexes.get(&step_id)?;
        let mut pairs = Vec::new();
        for column in self
            .columns(step_id)
            .iter()
            .filter(|c| c.parent_value_id == value_id)
        {
            let record = index.resolve(None, &column.id)?;
            if !(record.is_validated() && record.has_value()) {
                return None;
            }
            pairs.push((column.name.clone(), record.extracted_value.clone()?));
        }
        if pairs.is_empty() {
            None
        } else {
            Some(pairs)
        }
    }

    /// Merge one column's extraction results into the session: update
    /// matched cells, create rows the service discovered, and back-fill a
    /// blank pending cell for every requested row the response skipped.
    /// Returns the number of validations written.
    pub async fn merge_column_results(
        &mut self,
        step_id: Uuid,
        column_id: &str,
        request_rows: &[serde_json::Value],
        results: &[ExtractionResult],
    ) -> Result<usize> {
        let tabular = self.step(step_id)?.is_tabular();
        let mut written = 0;

        let mut seen_rows: Vec<String> = Vec::new();
        for result in results {
            let row = match (&result.row_identifier, tabular) {
                (Some(row), _) => Some(RowIdentifier::new(row.clone())),
                // extraction root: the service discovered a new row
                (None, true) => Some(RowIdentifier::generate()),
                (None, false) => None,
            };
            if let Some(row) = &row {
                seen_rows.push(row.as_str().to_string());
            }
            self.write_result_cell(step_id, row, column_id, result).await?;
            written += 1;
        }

        // Null back-fill: every requested row gets a cell even when the
        // service returned nothing for it.
        for request_row in request_rows {
            let Some(row_id) = request_row.get("rowIdentifier").and_then(|v| v.as_str()) else {
                continue;
            };
            if seen_rows.iter().any(|seen| seen == row_id) {
                continue;
            }
            let row = RowIdentifier::from(row_id);
            if self
                .resolve(step_id, Some(&row), column_id)
                .map(|r| r.has_value())
                .unwrap_or(false)
            {
                continue;
            }
            let backfill = ExtractionResult {
                row_identifier: Some(row_id.to_string()),
                extracted_value: None,
                confidence_score: Some(0.0),
                ai_reasoning: Some(format!("No value found for identifier: {row_id}")),
            };
            self.write_result_cell(step_id, Some(row), column_id, &backfill)
                .await?;
            written += 1;
        }

        Ok(written)
    }

    async fn write_result_cell(
        &mut self,
        step_id: Uuid,
        row: Option<RowIdentifier>,
        column_id: &str,
        result: &ExtractionResult,
    ) -> Result<()> {
        let patch = ValidationPatch {
            extracted_value: Some(result.extracted_value.clone()),
            status: Some(ValidationStatus::Pending),
            confidence_score: Some(Some(result.confidence_score.unwrap_or(0.0))),
            ai_reasoning: Some(result.ai_reasoning.clone()),
            ..Default::default()
        };

        if let Some(existing) = self.resolve(step_id, row.as_ref(), column_id) {
            let id = existing.id;
            if let Ok(record) = self.cached_mut(id) {
                patch.apply(record);
            }
            self.rebuild_indexes();
            self.confirm_update(id, patch).await?;
        } else {
            let mut record = FieldValidation::blank(self.session_id, row, column_id);
            patch.apply(&mut record);
            self.create_record(record).await?;
        }
        Ok(())
    }
}
