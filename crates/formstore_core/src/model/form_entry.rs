//! Form entry and field data records.
//!
//! # Responsibility
//! - Define the canonical records for one form submission and its values.
//! - Provide construction helpers and write-path validation.
//!
//! # Invariants
//! - `form_entry_id` is supplied by the caller and never reused.
//! - `created` and `form_item_id` are immutable once the entry is persisted.
//! - Field rows are keyed by `(form_entry_id, field_item_id)`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identity of one submitted form entry.
pub type FormEntryId = Uuid;
/// Identity of the form definition an entry was submitted against.
pub type FormItemId = Uuid;
/// Identity of one persisted field value row.
pub type FieldDataId = Uuid;
/// Identity of the field definition a value belongs to.
pub type FieldItemId = Uuid;

/// Unix epoch milliseconds.
///
/// `Timestamp::MIN` and `Timestamp::MAX` act as the open ends of a date
/// window.
pub type Timestamp = i64;

/// One submitted form entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormEntry {
    pub form_entry_id: FormEntryId,
    pub form_item_id: FormItemId,
    /// Submission time in epoch milliseconds.
    pub created: Timestamp,
    /// Populated by the repository on read. Optional content on write.
    #[serde(default)]
    pub fields: Vec<FieldData>,
}

/// One field value captured by a form entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldData {
    pub field_data_id: FieldDataId,
    /// Back-reference to the owning entry.
    pub form_entry_id: FormEntryId,
    pub field_item_id: FieldItemId,
    /// Display label, stored redundantly next to the value.
    pub field_name: String,
    /// String-serialized field value.
    pub value: String,
    /// Type discriminator used to deserialize `value` later.
    pub value_type: String,
}

/// Write-path validation failures for form entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEntryValidationError {
    MissingFormEntryId,
    MissingFormItemId,
    MissingFieldItemId { field_data_id: FieldDataId },
}

impl Display for FormEntryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFormEntryId => write!(f, "form entry id must not be nil"),
            Self::MissingFormItemId => write!(f, "form item id must not be nil"),
            Self::MissingFieldItemId { field_data_id } => {
                write!(f, "field item id must not be nil (field data {field_data_id})")
            }
        }
    }
}

impl Error for FormEntryValidationError {}

impl FormEntry {
    /// Creates an entry without fields.
    pub fn new(form_entry_id: FormEntryId, form_item_id: FormItemId, created: Timestamp) -> Self {
        Self {
            form_entry_id,
            form_item_id,
            created,
            fields: Vec::new(),
        }
    }

    /// Appends a field value owned by this entry.
    ///
    /// The field gets a freshly generated `field_data_id`.
    pub fn with_field(
        mut self,
        field_item_id: FieldItemId,
        field_name: impl Into<String>,
        value: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        let field = FieldData::new(
            self.form_entry_id,
            field_item_id,
            field_name,
            value,
            value_type,
        );
        self.fields.push(field);
        self
    }

    /// Returns the field captured for `field_item_id`, if loaded.
    pub fn field(&self, field_item_id: FieldItemId) -> Option<&FieldData> {
        self.fields
            .iter()
            .find(|field| field.field_item_id == field_item_id)
    }

    /// Validates identifiers required by the write path.
    ///
    /// # Errors
    /// - Nil `form_entry_id` or `form_item_id`.
    /// - Any field with a nil `field_item_id`.
    pub fn validate(&self) -> Result<(), FormEntryValidationError> {
        if self.form_entry_id.is_nil() {
            return Err(FormEntryValidationError::MissingFormEntryId);
        }
        if self.form_item_id.is_nil() {
            return Err(FormEntryValidationError::MissingFormItemId);
        }
        if let Some(field) = self.fields.iter().find(|field| field.field_item_id.is_nil()) {
            return Err(FormEntryValidationError::MissingFieldItemId {
                field_data_id: field.field_data_id,
            });
        }
        Ok(())
    }
}

impl FieldData {
    /// Creates a field value with a generated stable `field_data_id`.
    pub fn new(
        form_entry_id: FormEntryId,
        field_item_id: FieldItemId,
        field_name: impl Into<String>,
        value: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        Self {
            field_data_id: Uuid::new_v4(),
            form_entry_id,
            field_item_id,
            field_name: field_name.into(),
            value: value.into(),
            value_type: value_type.into(),
        }
    }
}
