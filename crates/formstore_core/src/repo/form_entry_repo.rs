//! Form entry repository contracts and SQL implementation.
//!
//! # Responsibility
//! - Read entries of one form within a creation window, with their fields.
//! - Upsert one entry and its field values atomically.
//! - Bulk delete all entries of one form.
//!
//! # Invariants
//! - `get_entries` issues one entry query and, only when it returned rows,
//!   one field query. Field rows are never fetched per entry.
//! - `create_entry` is safe to replay: the entry row is inserted at most once
//!   and each `(entry, field item)` pair is inserted or updated in place.
//! - Every write runs in one transaction under the injected retryer.

use crate::db::{
    param, DataReader, DbError, DbResult, Retryer, SqlDataApi, SqlParam, TransientError,
};
use crate::model::form_entry::{
    FieldData, FieldItemId, FormEntry, FormEntryId, FormEntryValidationError, FormItemId,
    Timestamp,
};
use log::{debug, error, info};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

macro_rules! form_entry_select {
    () => {
        "SELECT {0}ID{1}, {0}FormItemID{1}, {0}Created{1} FROM {0}FormEntry{1}"
    };
}

macro_rules! field_data_select {
    () => {
        "SELECT {0}ID{1}, {0}FormEntryID{1}, {0}FieldItemID{1}, \
         {0}FieldName{1}, {0}Value{1}, {0}ValueType{1} FROM {0}FieldData{1}"
    };
}

/// Selects the entries of one form created within a window. Shared by the
/// entry query and the field subquery so both read the same entry set.
macro_rules! entry_window_predicate {
    () => {
        " WHERE {0}FormItemID{1} = {2}formItemId{3} \
         AND {0}Created{1} BETWEEN {2}start{3} AND {2}end{3}"
    };
}

const ENTRIES_IN_WINDOW_SQL: &str = concat!(form_entry_select!(), entry_window_predicate!(), ";");

const FIELDS_IN_WINDOW_SQL: &str = concat!(
    field_data_select!(),
    " WHERE {0}FormEntryID{1} IN (SELECT {0}ID{1} FROM {0}FormEntry{1}",
    entry_window_predicate!(),
    ");"
);

const FORM_ENTRY_BY_ID_SQL: &str =
    concat!(form_entry_select!(), " WHERE {0}ID{1} = {2}formEntryId{3};");

const FIELD_DATA_BY_ITEM_SQL: &str = concat!(
    field_data_select!(),
    " WHERE {0}FormEntryID{1} = {2}formEntryId{3} AND {0}FieldItemID{1} = {2}fieldItemId{3};"
);

const INSERT_FORM_ENTRY_SQL: &str = "INSERT INTO {0}FormEntry{1} \
     ({0}ID{1}, {0}FormItemID{1}, {0}Created{1}) \
     VALUES ({2}formEntryId{3}, {2}formItemId{3}, {2}created{3});";

const INSERT_FIELD_DATA_SQL: &str = "INSERT INTO {0}FieldData{1} \
     ({0}ID{1}, {0}FormEntryID{1}, {0}FieldItemID{1}, {0}FieldName{1}, {0}Value{1}, {0}ValueType{1}) \
     VALUES ({2}fieldDataId{3}, {2}formEntryId{3}, {2}fieldItemId{3}, \
     {2}fieldName{3}, {2}fieldValue{3}, {2}fieldValueType{3});";

const UPDATE_FIELD_DATA_SQL: &str = "UPDATE {0}FieldData{1} \
     SET {0}FieldName{1} = {2}fieldName{3}, {0}Value{1} = {2}fieldValue{3}, \
     {0}ValueType{1} = {2}fieldValueType{3} \
     WHERE {0}FormEntryID{1} = {2}formEntryId{3} AND {0}FieldItemID{1} = {2}fieldItemId{3};";

const DELETE_FORM_ENTRIES_SQL: &str =
    "DELETE FROM {0}FormEntry{1} WHERE {0}FormItemID{1} = {2}formItemId{3};";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for form entry persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(FormEntryValidationError),
    Db(DbError),
    /// Rejected collaborator configuration at construction time.
    InvalidConfig(String),
}

impl RepoError {
    /// Returns whether the store rejected a write on a constraint, e.g. two
    /// concurrent inserts of the same `(entry, field item)` pair.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_constraint_violation())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidConfig(message) => {
                write!(f, "invalid form repository configuration: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidConfig(_) => None,
        }
    }
}

impl TransientError for RepoError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_transient())
    }
}

impl From<FormEntryValidationError> for RepoError {
    fn from(value: FormEntryValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Repository interface for submitted form data.
pub trait FormDataProvider {
    /// Lists entries of `form_id` created within `[start_date, end_date]`,
    /// with their fields loaded. Missing bounds leave that side open.
    fn get_entries(
        &self,
        form_id: FormItemId,
        start_date: Option<Timestamp>,
        end_date: Option<Timestamp>,
    ) -> RepoResult<Vec<FormEntry>>;

    /// Inserts the entry if new, then inserts or updates each field value.
    fn create_entry(&self, entry: &FormEntry) -> RepoResult<()>;

    /// Deletes every entry submitted against `form_id`.
    fn delete_entries(&self, form_id: FormItemId) -> RepoResult<()>;
}

/// Form entry repository running query templates through a `SqlDataApi`.
pub struct SqlFormDataProvider<A: SqlDataApi> {
    api: A,
    retryer: Retryer,
}

impl<A: SqlDataApi> SqlFormDataProvider<A> {
    /// Constructs the repository from its store collaborators.
    ///
    /// # Errors
    /// - `InvalidConfig` when the retry policy allows no attempt at all.
    pub fn try_new(api: A, retryer: Retryer) -> RepoResult<Self> {
        if retryer.policy().max_attempts == 0 {
            return Err(RepoError::InvalidConfig(
                "retry policy must allow at least one attempt".to_string(),
            ));
        }
        Ok(Self { api, retryer })
    }

    /// Returns the underlying store API.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Loads one entry row by id. `fields` is left empty.
    pub fn get_form_entry(&self, form_entry_id: FormEntryId) -> RepoResult<Option<FormEntry>> {
        let entries = self.api.query_objects(
            FORM_ENTRY_BY_ID_SQL,
            &[param("formEntryId", form_entry_id)],
            parse_form_entry,
        )?;
        Ok(entries.into_iter().next())
    }

    /// Loads the value row of one field item within one entry.
    pub fn get_field_data(
        &self,
        form_entry_id: FormEntryId,
        field_item_id: FieldItemId,
    ) -> RepoResult<Option<FieldData>> {
        let fields = self.api.query_objects(
            FIELD_DATA_BY_ITEM_SQL,
            &[
                param("formEntryId", form_entry_id),
                param("fieldItemId", field_item_id),
            ],
            parse_field_data,
        )?;
        Ok(fields.into_iter().next())
    }

    fn upsert_entry(&self, entry: &FormEntry) -> RepoResult<()> {
        let scope = self.api.create_transaction()?;

        if self.get_form_entry(entry.form_entry_id)?.is_none() {
            self.api.execute(
                INSERT_FORM_ENTRY_SQL,
                &[
                    param("formEntryId", entry.form_entry_id),
                    param("formItemId", entry.form_item_id),
                    param("created", entry.created),
                ],
            )?;
        }

        for field in &entry.fields {
            let sql = if self
                .get_field_data(entry.form_entry_id, field.field_item_id)?
                .is_none()
            {
                INSERT_FIELD_DATA_SQL
            } else {
                UPDATE_FIELD_DATA_SQL
            };
            self.api
                .execute(sql, &field_params(entry.form_entry_id, field))?;
        }

        scope.complete()?;
        Ok(())
    }
}

impl<A: SqlDataApi> FormDataProvider for SqlFormDataProvider<A> {
    fn get_entries(
        &self,
        form_id: FormItemId,
        start_date: Option<Timestamp>,
        end_date: Option<Timestamp>,
    ) -> RepoResult<Vec<FormEntry>> {
        let started_at = Instant::now();
        let window = [
            param("formItemId", form_id),
            param("start", start_date.unwrap_or(Timestamp::MIN)),
            param("end", end_date.unwrap_or(Timestamp::MAX)),
        ];

        let mut entries =
            self.api
                .query_objects(ENTRIES_IN_WINDOW_SQL, &window, parse_form_entry)?;
        if entries.is_empty() {
            debug!(
                "event=form_entries_get module=repo status=ok form_id={} entries=0 duration_ms={}",
                form_id,
                started_at.elapsed().as_millis()
            );
            return Ok(entries);
        }

        let fields = self
            .api
            .query_objects(FIELDS_IN_WINDOW_SQL, &window, parse_field_data)?;
        let field_count = fields.len();
        let orphans = attach_fields(&mut entries, fields);
        if orphans > 0 {
            debug!(
                "event=form_entries_get module=repo status=orphans_dropped form_id={} orphans={}",
                form_id, orphans
            );
        }

        debug!(
            "event=form_entries_get module=repo status=ok form_id={} entries={} fields={} duration_ms={}",
            form_id,
            entries.len(),
            field_count - orphans,
            started_at.elapsed().as_millis()
        );
        Ok(entries)
    }

    fn create_entry(&self, entry: &FormEntry) -> RepoResult<()> {
        entry.validate()?;

        let started_at = Instant::now();
        let result = self
            .retryer
            .execute_no_result(|| self.upsert_entry(entry));

        match &result {
            Ok(()) => info!(
                "event=form_entry_create module=repo status=ok form_entry_id={} fields={} duration_ms={}",
                entry.form_entry_id,
                entry.fields.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=form_entry_create module=repo status=error form_entry_id={} duration_ms={} error={}",
                entry.form_entry_id,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn delete_entries(&self, form_id: FormItemId) -> RepoResult<()> {
        let started_at = Instant::now();
        let mut deleted = 0;
        let result = self.retryer.execute_no_result(|| -> RepoResult<()> {
            let scope = self.api.create_transaction()?;
            deleted = self
                .api
                .execute(DELETE_FORM_ENTRIES_SQL, &[param("formItemId", form_id)])?;
            scope.complete()?;
            Ok(())
        });

        match &result {
            Ok(()) => info!(
                "event=form_entries_delete module=repo status=ok form_id={} deleted={} duration_ms={}",
                form_id,
                deleted,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=form_entries_delete module=repo status=error form_id={} duration_ms={} error={}",
                form_id,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

/// Moves each field into its owning entry and returns how many fields had no
/// owner among `entries`.
fn attach_fields(entries: &mut [FormEntry], fields: Vec<FieldData>) -> usize {
    let positions: HashMap<FormEntryId, usize> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.form_entry_id, index))
        .collect();

    let mut orphans = 0;
    for field in fields {
        match positions.get(&field.form_entry_id) {
            Some(&index) => entries[index].fields.push(field),
            None => orphans += 1,
        }
    }
    orphans
}

fn field_params(form_entry_id: FormEntryId, field: &FieldData) -> [SqlParam<'static>; 6] {
    [
        param("fieldDataId", field.field_data_id),
        param("formEntryId", form_entry_id),
        param("fieldItemId", field.field_item_id),
        param("fieldName", field.field_name.as_str()),
        param("fieldValue", field.value.as_str()),
        param("fieldValueType", field.value_type.as_str()),
    ]
}

fn parse_form_entry(reader: &dyn DataReader) -> DbResult<FormEntry> {
    Ok(FormEntry::new(
        reader.get_uuid(0)?,
        reader.get_uuid(1)?,
        reader.get_timestamp(2)?,
    ))
}

fn parse_field_data(reader: &dyn DataReader) -> DbResult<FieldData> {
    Ok(FieldData {
        field_data_id: reader.get_uuid(0)?,
        form_entry_id: reader.get_uuid(1)?,
        field_item_id: reader.get_uuid(2)?,
        field_name: reader.get_string(3)?,
        value: reader.get_string(4)?,
        value_type: reader.get_string(5)?,
    })
}
