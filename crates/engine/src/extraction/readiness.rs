//! Extraction Readiness Filter
//!
//! For a target column, computes which rows have all of their dependency
//! cells validated and serializes that subset into the payload for the
//! next extraction call. Synchronous over the in-memory cache.

use serde_json::{json, Map, Value as JsonValue};

use crate::deps::ColumnDependencies;
use crate::schema::{flatten::identifier_column, FlatColumn};
use crate::store::RowIdentifier;
use crate::validation::ValidationIndex;

#[derive(Debug, Clone)]
pub struct ReadyBatch {
    /// One object per ready row, identifier column first, then the
    /// referenced columns in declared dependency order.
    pub payload: Vec<JsonValue>,
    /// Rows dropped because a dependency cell is missing, unvalidated, or
    /// because the target cell already holds a value.
    pub excluded_count: usize,
}

impl ReadyBatch {
    pub fn empty_with_excluded(excluded_count: usize) -> Self {
        Self {
            payload: Vec::new(),
            excluded_count,
        }
    }
}

/// Compute the ready-row subset for `target`.
///
/// `shared_values` carries pre-resolved cross-step values; they are
/// appended to every row unchanged. Rules, per row:
/// 1. the identifier column's value is always included (it is the row's
///    external key), even when not referenced;
/// 2. every referenced column must hold a validated (`valid` or `manual`)
///    non-empty value, otherwise the row is excluded;
/// 3. rows whose target cell already holds a non-empty value are excluded
///    so they are never re-extracted.
pub fn compute_ready_batch(
    target: &FlatColumn,
    step_columns: &[FlatColumn],
    deps: &ColumnDependencies,
    index: &ValidationIndex,
    rows: &[RowIdentifier],
    shared_values: &[(String, String)],
) -> ReadyBatch {
    let identifier = identifier_column(step_columns);
    let mut payload = Vec::new();
    let mut excluded_count = 0;

    'rows: for row in rows {
        // already extracted for the target column
        if let Some(existing) = index.resolve(Some(row), &target.id) {
            if existing.has_value() {
                excluded_count += 1;
                continue;
            }
        }

        let mut entry = Map::new();
        entry.insert("rowIdentifier".to_string(), json!(row.as_str()));

        if let Some(identifier) = identifier {
            let value = index
                .resolve(Some(row), &identifier.id)
                .and_then(|record| record.extracted_value.clone())
                .unwrap_or_default();
            entry.insert(identifier.name.clone(), json!(value));
        }

        for column_id in &deps.referenced_column_ids {
            if identifier.map(|c| &c.id) == Some(column_id) {
                // identifier already serialized first; still subject to the
                // validated-and-non-empty requirement below
                match index.resolve(Some(row), column_id) {
                    Some(record) if record.is_validated() && record.has_value() => continue,
                    _ => {
                        excluded_count += 1;
                        continue 'rows;
                    }
                }
            }
            let Some(column) = step_columns.iter().find(|c| &c.id == column_id) else {
                continue;
            };
            match index.resolve(Some(row), column_id) {
                Some(record) if record.is_validated() && record.has_value() => {
                    entry.insert(
                        column.name.clone(),
                        json!(record.extracted_value.clone().unwrap_or_default()),
                    );
                }
                _ => {
                    excluded_count += 1;
                    continue 'rows;
                }
            }
        }

        for (name, value) in shared_values {
            entry.insert(name.clone(), json!(value));
        }

        payload.push(JsonValue::Object(entry));
    }

    ReadyBatch {
        payload,
        excluded_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::{resolve_dependencies, SchemaCatalog};
    use crate::schema::{flatten_step, StepKind, StepValue, WorkflowStep};
    use crate::store::{FieldValidation, ValidationStatus};
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn invoices_step() -> WorkflowStep {
        let identifier = StepValue {
            id: Uuid::new_v4(),
            name: "Invoice No".to_string(),
            data_type: "text".to_string(),
            order_index: 0,
            tool_id: None,
            input_config: BTreeMap::from([("source".to_string(), json!("document"))]),
            sub_fields: Vec::new(),
            is_identifier: true,
        };
        let total = StepValue {
            id: Uuid::new_v4(),
            name: "Total".to_string(),
            data_type: "number".to_string(),
            order_index: 1,
            tool_id: None,
            input_config: BTreeMap::from([(
                "source".to_string(),
                json!(identifier.id.to_string()),
            )]),
            sub_fields: Vec::new(),
            is_identifier: false,
        };
        WorkflowStep {
            id: Uuid::new_v4(),
            name: "Invoices".to_string(),
            kind: StepKind::Table,
            values: vec![identifier, total],
        }
    }

    fn cell(
        session_id: Uuid,
        row: &str,
        column_id: &str,
        value: Option<&str>,
        status: ValidationStatus,
    ) -> FieldValidation {
        let mut record =
            FieldValidation::blank(session_id, Some(RowIdentifier::from(row)), column_id);
        record.extracted_value = value.map(|v| v.to_string());
        record.status = status;
        record
    }

    #[test]
    fn only_rows_with_validated_dependencies_are_ready() {
        let step = invoices_step();
        let columns = flatten_step(&step);
        let catalog = SchemaCatalog::build(std::slice::from_ref(&step));
        let session_id = Uuid::new_v4();
        let invoice_no = &columns[0];
        let total = &columns[1];

        let records = vec![
            cell(session_id, "row-1", &invoice_no.id, Some("INV-001"), ValidationStatus::Valid),
            cell(session_id, "row-2", &invoice_no.id, Some("INV-002"), ValidationStatus::Manual),
            // row-3's identifier is still pending
            cell(session_id, "row-3", &invoice_no.id, Some("INV-003"), ValidationStatus::Pending),
        ];
        let rows: Vec<RowIdentifier> =
            ["row-1", "row-2", "row-3"].iter().map(|r| RowIdentifier::from(*r)).collect();
        let index = ValidationIndex::build(records, &columns, &step.name);
        let deps = resolve_dependencies(total, &columns, step.id, &catalog);

        let batch = compute_ready_batch(total, &columns, &deps, &index, &rows, &[]);

        assert_eq!(batch.payload.len(), 2);
        assert_eq!(batch.excluded_count, 1);
        assert_eq!(batch.payload[0]["rowIdentifier"], json!("row-1"));
        assert_eq!(batch.payload[0]["Invoice No"], json!("INV-001"));
        assert_eq!(batch.payload[1]["Invoice No"], json!("INV-002"));
    }

    #[test]
    fn rows_with_an_existing_target_value_are_not_re_extracted() {
        let step = invoices_step();
        let columns = flatten_step(&step);
        let catalog = SchemaCatalog::build(std::slice::from_ref(&step));
        let session_id = Uuid::new_v4();
        let invoice_no = &columns[0];
        let total = &columns[1];

        let records = vec![
            cell(session_id, "row-1", &invoice_no.id, Some("INV-001"), ValidationStatus::Valid),
            cell(session_id, "row-2", &invoice_no.id, Some("INV-002"), ValidationStatus::Valid),
            cell(session_id, "row-1", &total.id, Some("100.00"), ValidationStatus::Valid),
        ];
        let rows: Vec<RowIdentifier> =
            ["row-1", "row-2"].iter().map(|r| RowIdentifier::from(*r)).collect();
        let index = ValidationIndex::build(records, &columns, &step.name);
        let deps = resolve_dependencies(total, &columns, step.id, &catalog);

        let batch = compute_ready_batch(total, &columns, &deps, &index, &rows, &[]);

        assert_eq!(batch.payload.len(), 1);
        assert_eq!(batch.payload[0]["rowIdentifier"], json!("row-2"));
        assert_eq!(batch.excluded_count, 1);
    }

    #[test]
    fn shared_cross_step_values_are_appended_to_every_row() {
        let step = invoices_step();
        let columns = flatten_step(&step);
        let catalog = SchemaCatalog::build(std::slice::from_ref(&step));
        let session_id = Uuid::new_v4();
        let invoice_no = &columns[0];
        let total = &columns[1];

        let records = vec![cell(
            session_id,
            "row-1",
            &invoice_no.id,
            Some("INV-001"),
            ValidationStatus::Valid,
        )];
        let rows = vec![RowIdentifier::from("row-1")];
        let index = ValidationIndex::build(records, &columns, &step.name);
        let deps = resolve_dependencies(total, &columns, step.id, &catalog);

        let shared = vec![("Currency".to_string(), "EUR".to_string())];
        let batch = compute_ready_batch(total, &columns, &deps, &index, &rows, &shared);

        assert_eq!(batch.payload[0]["Currency"], json!("EUR"));
    }

    #[test]
    fn payload_keys_keep_identifier_first_then_declared_dependency_order() {
        // "Amount" sorts alphabetically before both "Invoice No" and
        // "rowIdentifier"; the payload must keep the declared order anyway.
        let identifier = StepValue {
            id: Uuid::new_v4(),
            name: "Invoice No".to_string(),
            data_type: "text".to_string(),
            order_index: 0,
            tool_id: None,
            input_config: BTreeMap::from([("source".to_string(), json!("document"))]),
            sub_fields: Vec::new(),
            is_identifier: true,
        };
        let amount = StepValue {
            id: Uuid::new_v4(),
            name: "Amount".to_string(),
            data_type: "number".to_string(),
            order_index: 1,
            tool_id: None,
            input_config: BTreeMap::from([("source".to_string(), json!("document"))]),
            sub_fields: Vec::new(),
            is_identifier: false,
        };
        let total = StepValue {
            id: Uuid::new_v4(),
            name: "Total".to_string(),
            data_type: "number".to_string(),
            order_index: 2,
            tool_id: None,
            input_config: BTreeMap::from([(
                "source".to_string(),
                json!(amount.id.to_string()),
            )]),
            sub_fields: Vec::new(),
            is_identifier: false,
        };
        let step = WorkflowStep {
            id: Uuid::new_v4(),
            name: "Invoices".to_string(),
            kind: StepKind::Table,
            values: vec![identifier, amount, total],
        };
        let columns = flatten_step(&step);
        let catalog = SchemaCatalog::build(std::slice::from_ref(&step));
        let session_id = Uuid::new_v4();

        let records = vec![
            cell(session_id, "row-1", &columns[0].id, Some("INV-001"), ValidationStatus::Valid),
            cell(session_id, "row-1", &columns[1].id, Some("40"), ValidationStatus::Valid),
        ];
        let rows = vec![RowIdentifier::from("row-1")];
        let index = ValidationIndex::build(records, &columns, &step.name);
        let deps = resolve_dependencies(&columns[2], &columns, step.id, &catalog);

        let batch = compute_ready_batch(&columns[2], &columns, &deps, &index, &rows, &[]);
        let keys: Vec<&str> = batch.payload[0]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["rowIdentifier", "Invoice No", "Amount"]);
        assert_eq!(
            serde_json::to_string(&batch.payload[0]).unwrap(),
            r#"{"rowIdentifier":"row-1","Invoice No":"INV-001","Amount":"40"}"#
        );
    }

    #[test]
    fn empty_identifier_value_serializes_as_empty_string_when_unreferenced() {
        let step = invoices_step();
        let columns = flatten_step(&step);
        let session_id = Uuid::new_v4();
        let invoice_no = &columns[0];

        // extraction root: the identifier column itself, no references
        let deps = ColumnDependencies {
            needs_document: true,
            ..Default::default()
        };
        let records = vec![cell(session_id, "row-1", &invoice_no.id, None, ValidationStatus::Pending)];
        let rows = vec![RowIdentifier::from("row-1")];
        let index = ValidationIndex::build(records, &columns, &step.name);

        let batch = compute_ready_batch(invoice_no, &columns, &deps, &index, &rows, &[]);
        assert_eq!(batch.payload.len(), 1);
        assert_eq!(batch.payload[0]["Invoice No"], json!(""));
    }
}
