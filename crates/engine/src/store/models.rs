use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque stable key shared by every cell of one logical row. Generated
/// once per row and never reused after the row is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowIdentifier(String);

impl RowIdentifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RowIdentifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The persisted cell: extracted value, confidence, reasoning, and status.
///
/// Addressing is dual-generation: new writers fill `column_id`, legacy
/// writers filled `legacy_field_id` and/or the name/index triple. The
/// validation index accepts all of them as the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValidation {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Absent for schema-level (non-tabular) fields.
    pub row_identifier: Option<RowIdentifier>,

    // Cell addressing, current and legacy generations.
    pub column_id: Option<String>,
    pub legacy_field_id: Option<String>,
    pub legacy_collection_name: Option<String>,
    pub legacy_field_name: Option<String>,
    pub legacy_record_index: Option<i32>,

    pub extracted_value: Option<String>,
    pub status: ValidationStatus,
    pub confidence_score: Option<f32>,
    pub ai_reasoning: Option<String>,

    // Captured on the first manual edit; required by revert.
    pub original_extracted_value: Option<String>,
    pub original_confidence_score: Option<f32>,
    pub original_ai_reasoning: Option<String>,
    pub manually_updated: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FieldValidation {
    /// A blank pending cell for a row/column pair, as created by "add row".
    pub fn blank(session_id: Uuid, row_identifier: Option<RowIdentifier>, column_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id,
            row_identifier,
            column_id: Some(column_id.to_string()),
            legacy_field_id: None,
            legacy_collection_name: None,
            legacy_field_name: None,
            legacy_record_index: None,
            extracted_value: None,
            status: ValidationStatus::Pending,
            confidence_score: None,
            ai_reasoning: None,
            original_extracted_value: None,
            original_confidence_score: None,
            original_ai_reasoning: None,
            manually_updated: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the cell holds a non-blank value.
    pub fn has_value(&self) -> bool {
        self.extracted_value
            .as_deref()
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }

    /// Whether a human has signed off on the cell, by toggle or by edit.
    pub fn is_validated(&self) -> bool {
        matches!(self.status, ValidationStatus::Valid | ValidationStatus::Manual)
    }

    /// Whether the record addresses the given column, under either the
    /// current or the legacy id field.
    pub fn addresses_column(&self, column_id: &str) -> bool {
        self.column_id.as_deref() == Some(column_id)
            || self.legacy_field_id.as_deref() == Some(column_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pending,
    Valid,
    Manual,
    Invalid,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Pending => write!(f, "pending"),
            ValidationStatus::Valid => write!(f, "valid"),
            ValidationStatus::Manual => write!(f, "manual"),
            ValidationStatus::Invalid => write!(f, "invalid"),
        }
    }
}

impl std::str::FromStr for ValidationStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(ValidationStatus::Pending),
            "valid" => Ok(ValidationStatus::Valid),
            "manual" => Ok(ValidationStatus::Manual),
            "invalid" => Ok(ValidationStatus::Invalid),
            other => Err(crate::Error::Validation(format!(
                "unknown validation status: {other}"
            ))),
        }
    }
}

/// Partial update for a validation record. `Some` fields are written,
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ValidationPatch {
    pub extracted_value: Option<Option<String>>,
    pub status: Option<ValidationStatus>,
    pub confidence_score: Option<Option<f32>>,
    pub ai_reasoning: Option<Option<String>>,
    pub original_extracted_value: Option<Option<String>>,
    pub original_confidence_score: Option<Option<f32>>,
    pub original_ai_reasoning: Option<Option<String>>,
    pub manually_updated: Option<bool>,
}

impl ValidationPatch {
    pub fn status(status: ValidationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Apply the patch to a record in place, refreshing `updated_at`.
    pub fn apply(&self, record: &mut FieldValidation) {
        if let Some(value) = &self.extracted_value {
            record.extracted_value = value.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(score) = self.confidence_score {
            record.confidence_score = score;
        }
        if let Some(reasoning) = &self.ai_reasoning {
            record.ai_reasoning = reasoning.clone();
        }
        if let Some(value) = &self.original_extracted_value {
            record.original_extracted_value = value.clone();
        }
        if let Some(score) = self.original_confidence_score {
            record.original_confidence_score = score;
        }
        if let Some(reasoning) = &self.original_ai_reasoning {
            record.original_ai_reasoning = reasoning.clone();
        }
        if let Some(manual) = self.manually_updated {
            record.manually_updated = manual;
        }
        record.updated_at = Utc::now();
    }
}
