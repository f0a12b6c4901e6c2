//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for form data.
//! - Keep query templates and row mapping out of callers.
//!
//! # Invariants
//! - Write paths call `FormEntry::validate()` before touching the store.
//! - Repositories hold no state between calls; every write is its own
//!   transaction.

pub mod form_entry_repo;
