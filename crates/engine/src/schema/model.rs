use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A named phase of a workflow: an info page, a data table, or a kanban board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub name: String,
    pub kind: StepKind,
    pub values: Vec<StepValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Info,
    Table,
    Kanban,
}

impl WorkflowStep {
    /// Whether values in this step form rows of a table (one cell per row
    /// identifier) rather than a single schema-level record.
    pub fn is_tabular(&self) -> bool {
        matches!(self.kind, StepKind::Table | StepKind::Kanban)
    }
}

/// A configured unit of extraction within a step. A value either stands on
/// its own or decomposes into several sub-fields, each of which behaves as
/// an independent column sharing the parent's tool and input configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepValue {
    pub id: Uuid,
    pub name: String,
    pub data_type: String,
    pub order_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    /// Entries may be literals, references to other StepValue ids, legacy
    /// "@step.name" strings, or document tokens. Parsed once by `deps`.
    #[serde(default)]
    pub input_config: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub sub_fields: Vec<SubField>,
    #[serde(default)]
    pub is_identifier: bool,
}

impl StepValue {
    pub fn is_multi_field(&self) -> bool {
        !self.sub_fields.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubField {
    pub name: String,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_id: Option<String>,
}

/// The row-table projection of a value or sub-field. Derived, never
/// persisted; produced by `flatten_step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatColumn {
    /// `parent_value_id` for single-field values,
    /// `"{parent_value_id}_field_{index}"` for sub-fields.
    pub id: String,
    pub name: String,
    pub data_type: String,
    pub order_index: i32,
    pub parent_value_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_field_index: Option<usize>,
    pub is_multi_field: bool,
    pub is_identifier_column: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub input_config: BTreeMap<String, JsonValue>,
}

impl FlatColumn {
    pub fn sub_field_column_id(parent_value_id: Uuid, index: usize) -> String {
        format!("{}_field_{}", parent_value_id, index)
    }
}
