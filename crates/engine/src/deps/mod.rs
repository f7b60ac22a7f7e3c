//! Dependency Resolver
//!
//! Inspects a column's `input_config` and classifies every entry into a
//! tagged `InputRef` in a single parsing pass, so nothing downstream ever
//! re-parses strings. The resolver then decides whether a column reads the
//! source documents or derives from other columns, and which ones.

use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;
use uuid::Uuid;

use crate::schema::{FlatColumn, WorkflowStep};

/// Literal tokens in an input config meaning "read the source document".
const DOCUMENT_TOKENS: &[&str] = &["document", "documents", "@document"];

/// One parsed input-config entry.
#[derive(Debug, Clone, PartialEq)]
pub enum InputRef {
    /// Plain configuration literal, carried through untouched.
    Literal(JsonValue),
    /// Reference to a value in the same step.
    ColumnRef(Uuid),
    /// Reference to a value in a different step.
    CrossStepRef(Uuid),
    /// The column reads the uploaded source documents.
    DocumentToken,
}

/// What a column needs before it can be extracted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnDependencies {
    pub needs_document: bool,
    /// Flat-column ids within the same step, deduplicated, in declared
    /// dependency order. The readiness payload reuses this order.
    pub referenced_column_ids: Vec<String>,
    pub referenced_cross_step_value_ids: BTreeSet<Uuid>,
}

impl ColumnDependencies {
    fn add_column_ref(&mut self, column_id: String) {
        if !self.referenced_column_ids.contains(&column_id) {
            self.referenced_column_ids.push(column_id);
        }
    }
}

/// Lookup tables over the whole schema, built once per reconciliation pass.
pub struct SchemaCatalog {
    value_steps: HashMap<Uuid, Uuid>,
    by_step_and_value_name: HashMap<(String, String), Uuid>,
}

impl SchemaCatalog {
    pub fn build(steps: &[WorkflowStep]) -> Self {
        let mut value_steps = HashMap::new();
        let mut by_step_and_value_name = HashMap::new();
        for step in steps {
            for value in &step.values {
                value_steps.insert(value.id, step.id);
                by_step_and_value_name.insert(
                    (step.name.to_lowercase(), value.name.to_lowercase()),
                    value.id,
                );
            }
        }
        Self {
            value_steps,
            by_step_and_value_name,
        }
    }

    pub fn step_of(&self, value_id: Uuid) -> Option<Uuid> {
        self.value_steps.get(&value_id).copied()
    }

    /// Resolve a legacy `"@<step>.<name>"` reference to the value id the
    /// id-based form would use. Case-insensitive on both parts.
    pub fn value_by_names(&self, step_name: &str, value_name: &str) -> Option<Uuid> {
        self.by_step_and_value_name
            .get(&(step_name.to_lowercase(), value_name.to_lowercase()))
            .copied()
    }
}

/// Parse one input-config entry. Accepted forms, in order: a document token,
/// an opaque UUID naming another value, the legacy `"@<step>.<name>"`
/// interpolation, and anything else as a literal.
pub fn parse_input_ref(raw: &JsonValue, current_step_id: Uuid, catalog: &SchemaCatalog) -> InputRef {
    let Some(text) = raw.as_str() else {
        return InputRef::Literal(raw.clone());
    };
    let trimmed = text.trim();

    if DOCUMENT_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        return InputRef::DocumentToken;
    }

    if let Ok(value_id) = Uuid::parse_str(trimmed) {
        return classify_value_ref(value_id, current_step_id, catalog, raw);
    }

    if let Some(rest) = trimmed.strip_prefix('@') {
        if let Some((step_name, value_name)) = rest.split_once('.') {
            if let Some(value_id) = catalog.value_by_names(step_name, value_name) {
                return classify_value_ref(value_id, current_step_id, catalog, raw);
            }
            warn!(
                reference = trimmed,
                "legacy reference does not name any known value, ignoring"
            );
        }
    }

    InputRef::Literal(raw.clone())
}

fn classify_value_ref(
    value_id: Uuid,
    current_step_id: Uuid,
    catalog: &SchemaCatalog,
    raw: &JsonValue,
) -> InputRef {
    match catalog.step_of(value_id) {
        Some(step_id) if step_id == current_step_id => InputRef::ColumnRef(value_id),
        Some(_) => InputRef::CrossStepRef(value_id),
        None => {
            // Schema inconsistency: recover by ignoring the reference.
            warn!(value_id = %value_id, "referenced value id does not resolve to any known value");
            InputRef::Literal(raw.clone())
        }
    }
}

/// Resolve a column's configured inputs into its dependency set.
///
/// `step_columns` is the flattened output of the column's own step; it is
/// used to map a referenced same-step value onto its flat column ids (a
/// multi-field value contributes one id per sub-field).
pub fn resolve_dependencies(
    column: &FlatColumn,
    step_columns: &[FlatColumn],
    current_step_id: Uuid,
    catalog: &SchemaCatalog,
) -> ColumnDependencies {
    let mut deps = ColumnDependencies::default();

    for raw in column.input_config.values() {
        match parse_input_ref(raw, current_step_id, catalog) {
            InputRef::DocumentToken => deps.needs_document = true,
            InputRef::ColumnRef(value_id) => {
                let mut found = false;
                for step_column in step_columns {
                    if step_column.parent_value_id == value_id {
                        deps.add_column_ref(step_column.id.clone());
                        found = true;
                    }
                }
                if !found {
                    warn!(
                        column_id = %column.id,
                        referenced_value_id = %value_id,
                        "referenced value has no flat column in this step, ignoring"
                    );
                }
            }
            InputRef::CrossStepRef(value_id) => {
                deps.referenced_cross_step_value_ids.insert(value_id);
            }
            InputRef::Literal(_) => {}
        }
    }

    let has_references =
        !deps.referenced_column_ids.is_empty() || !deps.referenced_cross_step_value_ids.is_empty();

    // The identifier column is the extraction root unless it derives from
    // another column; a column with nothing configured reads the documents
    // rather than silently producing empty output.
    if column.is_identifier_column && !has_references {
        deps.needs_document = true;
    }
    if !deps.needs_document && !has_references {
        deps.needs_document = true;
    }

    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{flatten_step, StepKind, StepValue, SubField, WorkflowStep};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn value_with_config(name: &str, order_index: i32, config: BTreeMap<String, JsonValue>) -> StepValue {
        StepValue {
            id: Uuid::new_v4(),
            name: name.to_string(),
            data_type: "text".to_string(),
            order_index,
            tool_id: None,
            input_config: config,
            sub_fields: Vec::new(),
            is_identifier: false,
        }
    }

    fn value(name: &str, order_index: i32) -> StepValue {
        value_with_config(name, order_index, BTreeMap::new())
    }

    fn table_step(name: &str, values: Vec<StepValue>) -> WorkflowStep {
        WorkflowStep {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind: StepKind::Table,
            values,
        }
    }

    #[test]
    fn document_token_is_recognized_case_insensitively() {
        let step = table_step("Invoices", vec![value("Invoice No", 0)]);
        let catalog = SchemaCatalog::build(std::slice::from_ref(&step));
        for token in ["document", "Documents", "@DOCUMENT"] {
            assert_eq!(
                parse_input_ref(&json!(token), step.id, &catalog),
                InputRef::DocumentToken
            );
        }
    }

    #[test]
    fn uuid_reference_classifies_by_step() {
        let invoices = table_step("Invoices", vec![value("Invoice No", 0), value("Total", 1)]);
        let parties = table_step("Parties", vec![value("Name", 0)]);
        let catalog = SchemaCatalog::build(&[invoices.clone(), parties.clone()]);

        let same = parse_input_ref(
            &json!(invoices.values[0].id.to_string()),
            invoices.id,
            &catalog,
        );
        assert_eq!(same, InputRef::ColumnRef(invoices.values[0].id));

        let cross = parse_input_ref(
            &json!(parties.values[0].id.to_string()),
            invoices.id,
            &catalog,
        );
        assert_eq!(cross, InputRef::CrossStepRef(parties.values[0].id));
    }

    #[test]
    fn legacy_string_form_resolves_like_the_id_form() {
        let invoices = table_step("Invoices", vec![value("Invoice No", 0)]);
        let parties = table_step("Parties", vec![value("Name", 0)]);
        let catalog = SchemaCatalog::build(&[invoices.clone(), parties.clone()]);

        let by_name = parse_input_ref(&json!("@Parties.Name"), invoices.id, &catalog);
        let by_id = parse_input_ref(
            &json!(parties.values[0].id.to_string()),
            invoices.id,
            &catalog,
        );
        assert_eq!(by_name, by_id);
    }

    #[test]
    fn unknown_uuid_is_ignored_and_column_defaults_to_document() {
        let step = table_step(
            "Invoices",
            vec![
                value("Invoice No", 0),
                value_with_config(
                    "Total",
                    1,
                    BTreeMap::from([("source".to_string(), json!(Uuid::new_v4().to_string()))]),
                ),
            ],
        );
        let catalog = SchemaCatalog::build(std::slice::from_ref(&step));
        let columns = flatten_step(&step);

        let deps = resolve_dependencies(&columns[1], &columns, step.id, &catalog);
        assert!(deps.needs_document);
        assert!(deps.referenced_column_ids.is_empty());
    }

    #[test]
    fn identifier_column_without_references_needs_document() {
        let step = table_step("Invoices", vec![value("Invoice No", 0)]);
        let catalog = SchemaCatalog::build(std::slice::from_ref(&step));
        let columns = flatten_step(&step);

        let deps = resolve_dependencies(&columns[0], &columns, step.id, &catalog);
        assert!(deps.needs_document);
    }

    #[test]
    fn derived_column_collects_referenced_column_ids() {
        let identifier = value("Invoice No", 0);
        let identifier_id = identifier.id;
        let total = value_with_config(
            "Total",
            1,
            BTreeMap::from([("source".to_string(), json!(identifier_id.to_string()))]),
        );
        let step = table_step("Invoices", vec![identifier, total]);
        let catalog = SchemaCatalog::build(std::slice::from_ref(&step));
        let columns = flatten_step(&step);

        let deps = resolve_dependencies(&columns[1], &columns, step.id, &catalog);
        assert!(!deps.needs_document);
        assert_eq!(deps.referenced_column_ids, vec![identifier_id.to_string()]);
    }

    #[test]
    fn multi_field_reference_expands_to_every_sub_field_column() {
        let mut address = value("Address", 0);
        address.sub_fields = vec![
            SubField {
                name: "Street".to_string(),
                data_type: "text".to_string(),
                identifier_id: None,
            },
            SubField {
                name: "City".to_string(),
                data_type: "text".to_string(),
                identifier_id: None,
            },
        ];
        let address_id = address.id;
        let summary = value_with_config(
            "Summary",
            1,
            BTreeMap::from([("source".to_string(), json!(address_id.to_string()))]),
        );
        let step = table_step("Parties", vec![address, summary]);
        let catalog = SchemaCatalog::build(std::slice::from_ref(&step));
        let columns = flatten_step(&step);

        let deps = resolve_dependencies(&columns[2], &columns, step.id, &catalog);
        assert_eq!(deps.referenced_column_ids.len(), 2);
        assert!(deps
            .referenced_column_ids
            .contains(&format!("{}_field_0", address_id)));
        assert!(deps
            .referenced_column_ids
            .contains(&format!("{}_field_1", address_id)));
    }
}
