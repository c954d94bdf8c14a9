//! Persistence layer
//!
//! A narrow translation layer from structured filters to parameterized
//! PostgreSQL statements. Backend errors are returned as-is.

mod database;
mod field;
mod filter;
mod table;
mod value;

pub use database::{Database, SETTINGS_TABLE};
pub use field::{Field, Ident, create_table_sql};
pub use filter::{CompiledFilter, Filter, Op};
pub use table::{
    SelectOptions, Statement, Table, Values, delete_statement, insert_statement,
    select_statement, update_statement,
};
pub use value::{SqlValue, arguments, snowflake_from_db, snowflake_to_db};

/// Result of a database operation.
pub type DbResult<T> = Result<T, sqlx::Error>;
