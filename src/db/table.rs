//! Per-table CRUD accessor.
//!
//! Every operation is a single statement run on a connection checked out of
//! the pool for that call only, so each call is its own implicit transaction.

use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

use super::DbResult;
use super::field::Ident;
use super::filter::Filter;
use super::value::{SqlValue, arguments};

/// Ordering and limit for `SELECT` statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectOptions {
    pub limit: Option<u32>,
    pub order_by: Option<Ident>,
    pub desc: bool,
}

impl SelectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn order_by(mut self, field: &'static str) -> Self {
        self.order_by = Some(Ident::new(field));
        self
    }

    #[must_use]
    pub const fn desc(mut self) -> Self {
        self.desc = true;
        self
    }

    fn render(&self) -> String {
        let mut sql = String::new();
        if let Some(field) = self.order_by {
            sql.push_str(&format!(" ORDER BY {field}"));
            if self.desc {
                sql.push_str(" DESC");
            }
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }
}

/// Ordered column assignments for `INSERT` and `UPDATE`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    columns: Vec<(Ident, SqlValue)>,
}

impl Values {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.columns.push((Ident::new(column), value.into()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render each value as a placeholder starting at `$first`, except untyped
    /// `NULL` which is written inline. Returns the SQL fragments and the values
    /// that were bound.
    fn placeholders(&self, first: usize) -> (Vec<(Ident, String)>, Vec<SqlValue>) {
        let mut next = first;
        let mut bound = Vec::new();
        let fragments = self
            .columns
            .iter()
            .map(|(column, value)| {
                if *value == SqlValue::Null {
                    (*column, "NULL".to_string())
                } else {
                    bound.push(value.clone());
                    next += 1;
                    (*column, format!("${}", next - 1))
                }
            })
            .collect();
        (fragments, bound)
    }
}

/// A rendered statement with its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

#[must_use]
pub fn select_statement(table: Ident, filter: Option<&Filter>, options: &SelectOptions) -> Statement {
    let compiled = filter.map(Filter::compile).unwrap_or_default();
    let mut sql = format!("SELECT * FROM {table}");
    if !compiled.clause.is_empty() {
        sql.push(' ');
        sql.push_str(&compiled.clause);
    }
    sql.push_str(&options.render());
    sql.push(';');
    Statement {
        sql,
        values: compiled.values,
    }
}

#[must_use]
pub fn insert_statement(table: Ident, values: &Values, returning_id: bool) -> Statement {
    let returning = if returning_id { " RETURNING id" } else { "" };
    if values.is_empty() {
        return Statement {
            sql: format!("INSERT INTO {table} DEFAULT VALUES{returning};"),
            values: Vec::new(),
        };
    }

    let (fragments, bound) = values.placeholders(1);
    let columns = fragments
        .iter()
        .map(|(column, _)| column.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = fragments
        .iter()
        .map(|(_, placeholder)| placeholder.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Statement {
        sql: format!("INSERT INTO {table} ({columns}) VALUES ({placeholders}){returning};"),
        values: bound,
    }
}

#[must_use]
pub fn update_statement(table: Ident, filter: Option<&Filter>, values: &Values) -> Statement {
    let (fragments, mut bound) = values.placeholders(1);
    let assignments = fragments
        .iter()
        .map(|(column, placeholder)| format!("{column}={placeholder}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("UPDATE {table} SET {assignments}");
    if let Some(filter) = filter {
        let compiled = filter.compile_from(bound.len() + 1);
        if !compiled.clause.is_empty() {
            sql.push(' ');
            sql.push_str(&compiled.clause);
        }
        bound.extend(compiled.values);
    }
    sql.push(';');

    Statement { sql, values: bound }
}

#[must_use]
pub fn delete_statement(table: Ident, filter: Option<&Filter>) -> Statement {
    let compiled = filter.map(Filter::compile).unwrap_or_default();
    let sql = if compiled.clause.is_empty() {
        format!("DELETE FROM {table};")
    } else {
        format!("DELETE FROM {table} {};", compiled.clause)
    };
    Statement {
        sql,
        values: compiled.values,
    }
}

/// Handle to one table. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Table {
    pool: PgPool,
    name: Ident,
}

impl Table {
    pub(crate) fn new(pool: PgPool, name: Ident) -> Self {
        Self { pool, name }
    }

    #[must_use]
    pub fn name(&self) -> Ident {
        self.name
    }

    /// All rows in the table.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub async fn all<T>(&self, options: &SelectOptions) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        self.fetch(select_statement(self.name, None, options)).await
    }

    /// Rows matching `filter`.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub async fn filter<T>(&self, filter: &Filter, options: &SelectOptions) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        self.fetch(select_statement(self.name, Some(filter), options))
            .await
    }

    /// First row matching `filter`, if any.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    pub async fn first<T>(&self, filter: &Filter) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let rows = self.filter(filter, &SelectOptions::new().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row and return the number of rows written.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub async fn insert(&self, values: &Values) -> DbResult<u64> {
        self.execute(insert_statement(self.name, values, false))
            .await
    }

    /// Insert one row and return its auto-assigned `id`.
    ///
    /// # Errors
    /// Propagates the backend error unchanged, including the one raised for a
    /// table without an `id` column.
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub async fn insert_returning_id(&self, values: &Values) -> DbResult<i64> {
        let statement = insert_statement(self.name, values, true);
        debug!(sql = %statement.sql, params = statement.values.len(), "Executing statement");
        let args = arguments(&statement.values)?;
        sqlx::query_scalar_with::<_, i64, _>(&statement.sql, args)
            .fetch_one(&self.pool)
            .await
    }

    /// Update rows matching `filter`, or every row when `filter` is `None`.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub async fn update(&self, filter: Option<&Filter>, values: &Values) -> DbResult<u64> {
        self.execute(update_statement(self.name, filter, values))
            .await
    }

    /// Delete rows matching `filter`, or every row when `filter` is `None`.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub async fn delete(&self, filter: Option<&Filter>) -> DbResult<u64> {
        self.execute(delete_statement(self.name, filter)).await
    }

    async fn fetch<T>(&self, statement: Statement) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        debug!(sql = %statement.sql, params = statement.values.len(), "Executing query");
        let args = arguments(&statement.values)?;
        sqlx::query_as_with::<_, T, _>(&statement.sql, args)
            .fetch_all(&self.pool)
            .await
    }

    async fn execute(&self, statement: Statement) -> DbResult<u64> {
        debug!(sql = %statement.sql, params = statement.values.len(), "Executing statement");
        let args = arguments(&statement.values)?;
        let result = sqlx::query_with(&statement.sql, args)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
