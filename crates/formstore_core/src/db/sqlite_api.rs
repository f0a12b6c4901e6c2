//! SQLite implementation of the `SqlDataApi` contract.
//!
//! # Responsibility
//! - Render query templates with the configured dialect.
//! - Bind named parameters and map result rows via caller-supplied mappers.
//! - Open `IMMEDIATE` transaction scopes on the borrowed connection.
//!
//! # Invariants
//! - Only parameters referenced by the rendered statement are bound.
//! - A scope that is dropped without `complete` rolls back.

use super::{
    DataReader, DbError, DbResult, RowMapper, SqlDataApi, SqlDialect, SqlParam, TransactionScope,
};
use crate::model::form_entry::Timestamp;
use log::trace;
use rusqlite::{Connection, Row, Statement, Transaction, TransactionBehavior};
use uuid::Uuid;

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("FormEntry", &["ID", "FormItemID", "Created"]),
    (
        "FieldData",
        &[
            "ID",
            "FormEntryID",
            "FieldItemID",
            "FieldName",
            "Value",
            "ValueType",
        ],
    ),
];

/// `SqlDataApi` over one borrowed SQLite connection.
pub struct SqliteDataApi<'conn> {
    conn: &'conn Connection,
    dialect: SqlDialect,
}

impl<'conn> SqliteDataApi<'conn> {
    /// Constructs the API from a migrated/ready connection.
    ///
    /// # Errors
    /// - `MissingRequiredTable`/`MissingRequiredColumn` when the connection
    ///   does not carry the form store schema.
    pub fn try_new(conn: &'conn Connection, dialect: SqlDialect) -> DbResult<Self> {
        ensure_form_store_schema(conn)?;
        Ok(Self { conn, dialect })
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn prepare_bound(&self, template: &str, params: &[SqlParam<'_>]) -> DbResult<Statement<'conn>> {
        let sql = self.dialect.render(template);
        trace!("event=sql_prepare module=db status=start sql={sql}");
        let mut stmt = self.conn.prepare(&sql)?;
        for param in params {
            let marker = self.dialect.parameter(param.name);
            if let Some(index) = stmt.parameter_index(&marker)? {
                stmt.raw_bind_parameter(index, &param.value)?;
            }
        }
        Ok(stmt)
    }
}

impl SqlDataApi for SqliteDataApi<'_> {
    fn create_transaction(&self) -> DbResult<Box<dyn TransactionScope + '_>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        Ok(Box::new(SqliteTransactionScope { tx }))
    }

    fn execute(&self, sql: &str, params: &[SqlParam<'_>]) -> DbResult<usize> {
        let mut stmt = self.prepare_bound(sql, params)?;
        Ok(stmt.raw_execute()?)
    }

    fn query_objects<T>(
        &self,
        sql: &str,
        params: &[SqlParam<'_>],
        mapper: RowMapper<T>,
    ) -> DbResult<Vec<T>> {
        let mut stmt = self.prepare_bound(sql, params)?;
        let mut rows = stmt.raw_query();
        let mut objects = Vec::new();
        while let Some(row) = rows.next()? {
            objects.push(mapper(&SqliteRow(row))?);
        }
        Ok(objects)
    }
}

struct SqliteTransactionScope<'conn> {
    tx: Transaction<'conn>,
}

impl TransactionScope for SqliteTransactionScope<'_> {
    fn complete(self: Box<Self>) -> DbResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

struct SqliteRow<'row, 'stmt>(&'row Row<'stmt>);

impl DataReader for SqliteRow<'_, '_> {
    fn get_uuid(&self, index: usize) -> DbResult<Uuid> {
        let text: String = self.0.get(index)?;
        Uuid::parse_str(&text).map_err(|_| {
            DbError::InvalidData(format!("invalid uuid value `{text}` in column {index}"))
        })
    }

    fn get_string(&self, index: usize) -> DbResult<String> {
        Ok(self.0.get(index)?)
    }

    fn get_timestamp(&self, index: usize) -> DbResult<Timestamp> {
        Ok(self.0.get(index)?)
    }
}

fn ensure_form_store_schema(conn: &Connection) -> DbResult<()> {
    for &(table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            return Err(DbError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(DbError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\");"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::SqliteDataApi;
    use crate::db::{
        open_db_in_memory, param, DataReader, DbError, SqlDataApi, SqlDialect,
    };
    use rusqlite::Connection;

    fn read_id_and_created(reader: &dyn DataReader) -> crate::db::DbResult<(String, i64)> {
        Ok((reader.get_string(0)?, reader.get_timestamp(1)?))
    }

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteDataApi::try_new(&conn, SqlDialect::SQLITE)
            .err()
            .expect("bare connection must be rejected");
        assert!(matches!(err, DbError::MissingRequiredTable("FormEntry")));
    }

    #[test]
    fn unreferenced_parameters_are_ignored() {
        let conn = open_db_in_memory().unwrap();
        let api = SqliteDataApi::try_new(&conn, SqlDialect::SQL_SERVER).unwrap();

        let inserted = api
            .execute(
                "INSERT INTO {0}FormEntry{1}({0}ID{1},{0}FormItemID{1},{0}Created{1}) \
                 VALUES({2}id{3},{2}form{3},{2}created{3})",
                &[
                    param("id", "e1"),
                    param("form", "f1"),
                    param("created", 7_i64),
                    param("unused", "ignored"),
                ],
            )
            .unwrap();
        assert_eq!(inserted, 1);

        let rows = api
            .query_objects(
                "SELECT {0}ID{1},{0}Created{1} FROM {0}FormEntry{1} WHERE {0}FormItemID{1}={2}form{3}",
                &[param("form", "f1")],
                read_id_and_created,
            )
            .unwrap();
        assert_eq!(rows, vec![("e1".to_string(), 7)]);
    }

    #[test]
    fn dropped_scope_rolls_back() {
        let conn = open_db_in_memory().unwrap();
        let api = SqliteDataApi::try_new(&conn, SqlDialect::SQLITE).unwrap();

        {
            let _scope = api.create_transaction().unwrap();
            api.execute(
                "INSERT INTO {0}FormEntry{1}({0}ID{1},{0}FormItemID{1},{0}Created{1}) \
                 VALUES({2}id{3},{2}form{3},0)",
                &[param("id", "e1"), param("form", "f1")],
            )
            .unwrap();
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM FormEntry;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn completed_scope_commits() {
        let conn = open_db_in_memory().unwrap();
        let api = SqliteDataApi::try_new(&conn, SqlDialect::SQLITE).unwrap();

        let scope = api.create_transaction().unwrap();
        api.execute(
            "INSERT INTO {0}FormEntry{1}({0}ID{1},{0}FormItemID{1},{0}Created{1}) \
             VALUES({2}id{3},{2}form{3},0)",
            &[param("id", "e1"), param("form", "f1")],
        )
        .unwrap();
        scope.complete().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM FormEntry;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
