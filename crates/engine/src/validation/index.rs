//! Validation Index
//!
//! Builds a queryable map from `(row identifier, column id)` to a persisted
//! validation record, bridging the legacy name/index addressing with the
//! current id-based addressing so neither generation of writer loses data.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::schema::FlatColumn;
use crate::store::{FieldValidation, RowIdentifier};

/// `"<step>.<subfield-name>[<index>]"`, the legacy composite cell address.
fn composite_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?P<step>.+)\.(?P<name>[^.\[\]]+)\[(?P<index>\d+)\]$").unwrap())
}

/// Decode a legacy composite cell address into `(step, sub-field, index)`.
/// Pure adapter, used for backward-compatible reads only; never for writes.
pub fn decode_composite_name(raw: &str) -> Option<(String, String, i32)> {
    let captures = composite_name_pattern().captures(raw.trim())?;
    let index: i32 = captures.name("index")?.as_str().parse().ok()?;
    Some((
        captures.name("step")?.as_str().to_string(),
        captures.name("name")?.as_str().to_string(),
        index,
    ))
}

pub struct ValidationIndex {
    records: Vec<FieldValidation>,
    /// (row identifier, column id) -> candidate records, keyed under both
    /// the current and the legacy id field.
    exact: HashMap<(String, String), Vec<usize>>,
    /// (legacy record index, column id) -> candidates decoded from
    /// composite names, for records that predate id-based addressing.
    legacy_composite: HashMap<(i32, String), Vec<usize>>,
    /// Row position learned from records carrying both addressing
    /// generations; lets a row-identifier query reach index-addressed data.
    row_positions: HashMap<String, i32>,
    /// column id -> schema-level candidates (records with no row).
    schema_level: HashMap<String, Vec<usize>>,
    /// Multi-field column ids, eligible for the composite-name fallback.
    multi_field_columns: Vec<String>,
    /// Distinct row identifiers in first-appearance order.
    rows: Vec<RowIdentifier>,
}

impl ValidationIndex {
    /// Build the index for one step. `records` may span the whole session;
    /// anything not addressing this step's columns (under either id
    /// generation, composite name, or collection name) is ignored.
    pub fn build(records: Vec<FieldValidation>, columns: &[FlatColumn], step_name: &str) -> Self {
        let records: Vec<FieldValidation> = records
            .into_iter()
            .filter(|record| belongs_to_step(record, columns, step_name))
            .collect();
        let mut index = Self {
            records,
            exact: HashMap::new(),
            legacy_composite: HashMap::new(),
            row_positions: HashMap::new(),
            schema_level: HashMap::new(),
            multi_field_columns: columns
                .iter()
                .filter(|c| c.is_multi_field)
                .map(|c| c.id.clone())
                .collect(),
            rows: Vec::new(),
        };

        // Lowercase sub-field name -> column id, for composite decoding.
        let mut columns_by_name: HashMap<String, String> = HashMap::new();
        for column in columns.iter().filter(|c| c.is_multi_field) {
            columns_by_name
                .entry(column.name.to_lowercase())
                .or_insert_with(|| column.id.clone());
        }

        for (position, record) in index.records.iter().enumerate() {
            let keys = [record.column_id.as_deref(), record.legacy_field_id.as_deref()];

            match &record.row_identifier {
                Some(row) => {
                    for key in keys.into_iter().flatten() {
                        index
                            .exact
                            .entry((row.as_str().to_string(), key.to_string()))
                            .or_default()
                            .push(position);
                    }
                    if let Some(record_index) = record.legacy_record_index {
                        index
                            .row_positions
                            .entry(row.as_str().to_string())
                            .or_insert(record_index);
                    }
                    if !index.rows.contains(row) {
                        index.rows.push(row.clone());
                    }
                }
                None => {
                    for key in keys.into_iter().flatten() {
                        index
                            .schema_level
                            .entry(key.to_string())
                            .or_default()
                            .push(position);
                    }
                }
            }

            if let Some(raw) = record.legacy_field_name.as_deref() {
                if let Some((step, name, record_index)) = decode_composite_name(raw) {
                    if step.eq_ignore_ascii_case(step_name) {
                        if let Some(column_id) = columns_by_name.get(&name.to_lowercase()) {
                            index
                                .legacy_composite
                                .entry((record_index, column_id.clone()))
                                .or_default()
                                .push(position);
                        }
                    }
                }
            }
        }

        index
    }

    /// Look up the record for a cell. Resolution order: direct id match
    /// (either id generation), then the composite-name fallback for
    /// multi-field columns, then the schema-level match for row-less
    /// queries. Deterministic: ties prefer the more specific id match,
    /// then the most recent `updated_at`.
    pub fn resolve(
        &self,
        row: Option<&RowIdentifier>,
        column_id: &str,
    ) -> Option<&FieldValidation> {
        match row {
            Some(row) => {
                let direct = self
                    .exact
                    .get(&(row.as_str().to_string(), column_id.to_string()))
                    .and_then(|candidates| self.best_of(candidates, column_id));
                if direct.is_some() {
                    return direct;
                }

                if self.multi_field_columns.iter().any(|id| id == column_id) {
                    if let Some(&position) = self.row_positions.get(row.as_str()) {
                        return self
                            .legacy_composite
                            .get(&(position, column_id.to_string()))
                            .and_then(|candidates| self.best_of(candidates, column_id));
                    }
                }
                None
            }
            None => self
                .schema_level
                .get(column_id)
                .and_then(|candidates| self.best_of(candidates, column_id)),
        }
    }

    fn best_of(&self, candidates: &[usize], column_id: &str) -> Option<&FieldValidation> {
        candidates
            .iter()
            .map(|&position| &self.records[position])
            .max_by_key(|record| {
                let specific = record.column_id.as_deref() == Some(column_id);
                (specific, record.updated_at)
            })
    }

    /// Every record addressing the given column, across all rows.
    pub fn records_for_column(&self, column_id: &str) -> Vec<&FieldValidation> {
        self.records
            .iter()
            .filter(|record| record.addresses_column(column_id))
            .collect()
    }

    /// Distinct row identifiers in first-appearance order.
    pub fn row_identifiers(&self) -> &[RowIdentifier] {
        &self.rows
    }

    pub fn records(&self) -> &[FieldValidation] {
        &self.records
    }
}

fn belongs_to_step(record: &FieldValidation, columns: &[FlatColumn], step_name: &str) -> bool {
    if columns.iter().any(|column| record.addresses_column(&column.id)) {
        return true;
    }
    if record
        .legacy_collection_name
        .as_deref()
        .map(|name| name.eq_ignore_ascii_case(step_name))
        .unwrap_or(false)
    {
        return true;
    }
    record
        .legacy_field_name
        .as_deref()
        .and_then(decode_composite_name)
        .map(|(step, _, _)| step.eq_ignore_ascii_case(step_name))
        .unwrap_or(false)
}
