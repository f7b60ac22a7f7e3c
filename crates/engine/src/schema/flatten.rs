//! Schema Normalizer
//!
//! Flattens a workflow step's ordered values into the stable column model
//! the grid and the extraction pipeline both work against.

use crate::schema::{FlatColumn, WorkflowStep};

/// Flatten one step's values into a globally ordered list of columns.
///
/// Parent values are stable-sorted by `order_index`; a multi-field value
/// emits one column per sub-field in declared order, each inheriting the
/// parent's `tool_id` and `input_config`. The first column emitted overall
/// is the identifier column (the row's natural key), regardless of any
/// `is_identifier` flag further down the step.
///
/// Pure and idempotent: calling it twice on the same step yields identical
/// output.
pub fn flatten_step(step: &WorkflowStep) -> Vec<FlatColumn> {
    let mut values: Vec<_> = step.values.iter().collect();
    values.sort_by_key(|v| v.order_index);

    let mut columns = Vec::new();
    for value in values {
        if value.is_multi_field() {
            for (index, sub_field) in value.sub_fields.iter().enumerate() {
                columns.push(FlatColumn {
                    id: FlatColumn::sub_field_column_id(value.id, index),
                    name: sub_field.name.clone(),
                    data_type: sub_field.data_type.clone(),
                    order_index: value.order_index,
                    parent_value_id: value.id,
                    sub_field_index: Some(index),
                    is_multi_field: true,
                    is_identifier_column: false,
                    tool_id: value.tool_id.clone(),
                    input_config: value.input_config.clone(),
                });
            }
        } else {
            columns.push(FlatColumn {
                id: value.id.to_string(),
                name: value.name.clone(),
                data_type: value.data_type.clone(),
                order_index: value.order_index,
                parent_value_id: value.id,
                sub_field_index: None,
                is_multi_field: false,
                is_identifier_column: false,
                tool_id: value.tool_id.clone(),
                input_config: value.input_config.clone(),
            });
        }
    }

    if let Some(first) = columns.first_mut() {
        first.is_identifier_column = true;
    }

    columns
}

/// The identifier column of a flattened step, if the step has any columns.
pub fn identifier_column(columns: &[FlatColumn]) -> Option<&FlatColumn> {
    columns.iter().find(|c| c.is_identifier_column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{StepKind, StepValue, SubField};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn value(name: &str, order_index: i32) -> StepValue {
        StepValue {
            id: Uuid::new_v4(),
            name: name.to_string(),
            data_type: "text".to_string(),
            order_index,
            tool_id: None,
            input_config: BTreeMap::new(),
            sub_fields: Vec::new(),
            is_identifier: false,
        }
    }

    fn step(values: Vec<StepValue>) -> WorkflowStep {
        WorkflowStep {
            id: Uuid::new_v4(),
            name: "Invoices".to_string(),
            kind: StepKind::Table,
            values,
        }
    }

    #[test]
    fn flattening_is_deterministic() {
        let step = step(vec![value("Total", 1), value("Invoice No", 0), value("Date", 2)]);
        let first = flatten_step(&step);
        let second = flatten_step(&step);
        assert_eq!(first, second);
    }

    #[test]
    fn columns_are_ordered_by_order_index() {
        let step = step(vec![value("Total", 1), value("Invoice No", 0)]);
        let columns = flatten_step(&step);
        assert_eq!(columns[0].name, "Invoice No");
        assert_eq!(columns[1].name, "Total");
    }

    #[test]
    fn exactly_one_identifier_column_and_it_is_first() {
        let mut late_identifier = value("Total", 1);
        late_identifier.is_identifier = true;
        let step = step(vec![late_identifier, value("Invoice No", 0)]);

        let columns = flatten_step(&step);
        let identifiers: Vec<_> = columns.iter().filter(|c| c.is_identifier_column).collect();
        assert_eq!(identifiers.len(), 1);
        assert!(columns[0].is_identifier_column);
        assert_eq!(columns[0].name, "Invoice No");
    }

    #[test]
    fn multi_field_value_expands_into_sub_field_columns() {
        let mut address = value("Address", 1);
        address.tool_id = Some("tool-123".to_string());
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
        let step = step(vec![value("Name", 0), address]);

        let columns = flatten_step(&step);
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[1].id, format!("{}_field_0", address_id));
        assert_eq!(columns[1].name, "Street");
        assert_eq!(columns[2].id, format!("{}_field_1", address_id));
        assert_eq!(columns[2].name, "City");
        assert_eq!(columns[1].tool_id.as_deref(), Some("tool-123"));
        assert_eq!(columns[2].tool_id.as_deref(), Some("tool-123"));
        assert!(columns[1].is_multi_field);
    }

    #[test]
    fn empty_step_flattens_to_no_columns() {
        let columns = flatten_step(&step(Vec::new()));
        assert!(columns.is_empty());
    }
}
