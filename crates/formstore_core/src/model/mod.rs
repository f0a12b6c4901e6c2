//! Domain model for submitted form data.
//!
//! # Responsibility
//! - Define the records exchanged with the form entry repository.
//! - Keep one entry/field shape for both read and write paths.
//!
//! # Invariants
//! - Every entry is identified by a stable `FormEntryId`.
//! - At most one field row exists per `(FormEntryId, FieldItemId)` pair.
//! - Entries are only removed in bulk, per form definition.

pub mod form_entry;
