//! Validation State Machine
//!
//! Per-cell lifecycle: `pending <-> valid` by toggle, `-> manual` on a human
//! edit, and back to pending only through the explicit revert operation.
//! Each function mutates the record and returns the patch to persist.

use crate::{
    store::{FieldValidation, ValidationPatch, ValidationStatus},
    Error, Result,
};

/// Toggle a cell's sign-off. `valid` drops to `pending`; every other state
/// (including `manual`) becomes `valid`. Never touches the extracted value.
pub fn toggle_status(record: &mut FieldValidation) -> ValidationPatch {
    let next = if record.status == ValidationStatus::Valid {
        ValidationStatus::Pending
    } else {
        ValidationStatus::Valid
    };
    let patch = ValidationPatch::status(next);
    patch.apply(record);
    patch
}

/// Overwrite a cell's value by hand. The pre-edit extraction is captured
/// into the `original_*` fields the first time only, so a chain of edits
/// still reverts to the AI-derived state.
pub fn manual_edit(record: &mut FieldValidation, new_value: &str) -> ValidationPatch {
    let mut patch = ValidationPatch {
        extracted_value: Some(Some(new_value.to_string())),
        status: Some(ValidationStatus::Manual),
        manually_updated: Some(true),
        ..Default::default()
    };
    if record.original_extracted_value.is_none() {
        patch.original_extracted_value = Some(record.extracted_value.clone());
        patch.original_confidence_score = Some(record.confidence_score);
        patch.original_ai_reasoning = Some(record.ai_reasoning.clone());
    }
    patch.apply(record);
    patch
}

/// Return a manually edited cell to its AI-derived state. Requires a
/// captured original; without one this is a reportable no-op.
pub fn revert_to_original(record: &mut FieldValidation) -> Result<ValidationPatch> {
    if record.original_extracted_value.is_none() {
        return Err(Error::RevertWithoutOriginal(record.id));
    }
    let patch = ValidationPatch {
        extracted_value: Some(record.original_extracted_value.clone()),
        confidence_score: Some(record.original_confidence_score),
        ai_reasoning: Some(record.original_ai_reasoning.clone()),
        status: Some(ValidationStatus::Pending),
        manually_updated: Some(false),
        original_extracted_value: Some(None),
        original_confidence_score: Some(None),
        original_ai_reasoning: Some(None),
    };
    patch.apply(record);
    Ok(patch)
}

/// Target status for a bulk column toggle: a column whose non-empty cells
/// are all `valid` flips to `pending`, anything else converges to `valid`
/// in one invocation.
pub fn bulk_toggle_target<'a, I>(cells: I) -> ValidationStatus
where
    I: IntoIterator<Item = &'a FieldValidation>,
{
    let mut saw_any = false;
    for cell in cells {
        saw_any = true;
        if cell.status != ValidationStatus::Valid {
            return ValidationStatus::Valid;
        }
    }
    if saw_any {
        ValidationStatus::Pending
    } else {
        ValidationStatus::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn cell(value: Option<&str>, status: ValidationStatus) -> FieldValidation {
        let mut record = FieldValidation::blank(Uuid::new_v4(), None, "col-1");
        record.extracted_value = value.map(|v| v.to_string());
        record.status = status;
        record
    }

    #[test]
    fn toggle_flips_valid_and_pending() {
        let mut record = cell(Some("100"), ValidationStatus::Pending);
        toggle_status(&mut record);
        assert_eq!(record.status, ValidationStatus::Valid);
        toggle_status(&mut record);
        assert_eq!(record.status, ValidationStatus::Pending);
    }

    #[test]
    fn double_toggle_restores_the_record() {
        let original = cell(Some("100"), ValidationStatus::Pending);
        let mut record = original.clone();
        toggle_status(&mut record);
        toggle_status(&mut record);
        assert_eq!(record.status, original.status);
        assert_eq!(record.extracted_value, original.extracted_value);
        assert_eq!(record.manually_updated, original.manually_updated);
    }

    #[test]
    fn toggle_never_yields_manual() {
        let mut record = cell(Some("100"), ValidationStatus::Manual);
        toggle_status(&mut record);
        assert_eq!(record.status, ValidationStatus::Valid);
    }

    #[test]
    fn manual_edit_captures_the_original_once() {
        let mut record = cell(Some("100"), ValidationStatus::Pending);
        record.confidence_score = Some(0.8);
        record.ai_reasoning = Some("found on page 2".to_string());

        manual_edit(&mut record, "120");
        assert_eq!(record.extracted_value.as_deref(), Some("120"));
        assert_eq!(record.status, ValidationStatus::Manual);
        assert!(record.manually_updated);
        assert_eq!(record.original_extracted_value.as_deref(), Some("100"));
        assert_eq!(record.original_confidence_score, Some(0.8));

        // second edit keeps the first capture
        manual_edit(&mut record, "130");
        assert_eq!(record.original_extracted_value.as_deref(), Some("100"));
    }

    #[test]
    fn revert_restores_the_pre_edit_record() {
        let mut record = cell(Some("100"), ValidationStatus::Pending);
        record.confidence_score = Some(0.8);
        record.ai_reasoning = Some("found on page 2".to_string());
        let before = record.clone();

        manual_edit(&mut record, "120");
        revert_to_original(&mut record).unwrap();

        assert_eq!(record.extracted_value, before.extracted_value);
        assert_eq!(record.confidence_score, before.confidence_score);
        assert_eq!(record.ai_reasoning, before.ai_reasoning);
        assert_eq!(record.status, ValidationStatus::Pending);
        assert!(!record.manually_updated);
        assert!(record.original_extracted_value.is_none());
    }

    #[test]
    fn revert_without_original_is_an_error() {
        let mut record = cell(Some("100"), ValidationStatus::Pending);
        let err = revert_to_original(&mut record).unwrap_err();
        assert!(matches!(err, Error::RevertWithoutOriginal(_)));
        // record untouched
        assert_eq!(record.extracted_value.as_deref(), Some("100"));
        assert_eq!(record.status, ValidationStatus::Pending);
    }

    #[test]
    fn bulk_toggle_converges_to_valid_when_mixed() {
        let cells = vec![
            cell(Some("a"), ValidationStatus::Valid),
            cell(Some("b"), ValidationStatus::Pending),
        ];
        assert_eq!(bulk_toggle_target(cells.iter()), ValidationStatus::Valid);
    }

    #[test]
    fn bulk_toggle_drops_fully_valid_column_to_pending() {
        let cells = vec![
            cell(Some("a"), ValidationStatus::Valid),
            cell(Some("b"), ValidationStatus::Valid),
        ];
        assert_eq!(bulk_toggle_target(cells.iter()), ValidationStatus::Pending);
    }
}
