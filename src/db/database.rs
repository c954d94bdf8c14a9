//! Database handle: connection pool, table accessors and guild settings.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{FromRow, PgPool};
use tracing::{info, instrument, warn};

use super::DbResult;
use super::field::{Field, Ident, create_table_sql};
use super::filter::Filter;
use super::table::{Table, Values};
use super::value::{SqlValue, arguments};
use crate::config::DatabaseConfig;

/// Table holding `(guild_id, key) -> value` settings.
pub const SETTINGS_TABLE: Ident = Ident::new("server_setting");

#[derive(Debug, FromRow)]
struct SettingRow {
    value: Option<String>,
}

/// Shared handle to the backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the connection pool and make sure the settings table exists.
    ///
    /// # Errors
    /// Returns the backend error if the URL is invalid, the server cannot be
    /// reached, or the settings table cannot be created.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        let mut options: PgConnectOptions = config.url.parse()?;
        if config.require_ssl {
            options = options.ssl_mode(PgSslMode::Require);
        }
        if let Some(timeout) = config.statement_timeout {
            options = options.options([("statement_timeout", timeout.as_millis().to_string())]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect_with(options)
            .await?;

        let database = Self::from_pool(pool);
        database.ensure_settings_table().await?;
        info!(
            max_connections = config.max_connections,
            require_ssl = config.require_ssl,
            "Database connected"
        );
        Ok(database)
    }

    /// Wrap an existing pool without touching the schema.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the settings table if it does not exist.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    pub async fn ensure_settings_table(&self) -> DbResult<Table> {
        self.new_table(
            SETTINGS_TABLE,
            &[
                Field::big_integer("guild_id"),
                Field::text("key"),
                Field::text("value"),
            ],
        )
        .await
    }

    /// Accessor for an existing table.
    #[must_use]
    pub fn table(&self, name: Ident) -> Table {
        Table::new(self.pool.clone(), name)
    }

    /// Create a table if it does not exist and return its accessor.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    #[instrument(level = "debug", skip(self, fields), fields(table = %name))]
    pub async fn new_table(&self, name: Ident, fields: &[Field]) -> DbResult<Table> {
        sqlx::query(&create_table_sql(name, fields))
            .execute(&self.pool)
            .await?;
        Ok(self.table(name))
    }

    /// Value stored for `key` in a guild, if any.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    pub async fn get_setting(&self, guild_id: u64, key: &str) -> DbResult<Option<String>> {
        let filter = Filter::new().with("guild_id", guild_id).with("key", key);
        let row: Option<SettingRow> = self.table(SETTINGS_TABLE).first(&filter).await?;
        Ok(row.and_then(|row| row.value))
    }

    /// Store `value` for `key` in a guild. `None` or an empty value unsets it.
    ///
    /// The existing row is always deleted first, so a key never has more than
    /// one row.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    #[instrument(skip(self))]
    pub async fn set_setting(&self, guild_id: u64, key: &str, value: Option<&str>) -> DbResult<()> {
        let settings = self.table(SETTINGS_TABLE);
        let filter = Filter::new().with("guild_id", guild_id).with("key", key);
        settings.delete(Some(&filter)).await?;

        if let Some(value) = value.filter(|value| !value.is_empty()) {
            settings
                .insert(
                    &Values::new()
                        .set("guild_id", guild_id)
                        .set("key", key)
                        .set("value", value),
                )
                .await?;
        }
        Ok(())
    }

    /// Setting parsed as a snowflake id (role, channel...).
    ///
    /// A value that does not parse is logged and treated as unset.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    pub async fn get_setting_id(&self, guild_id: u64, key: &str) -> DbResult<Option<u64>> {
        let Some(value) = self.get_setting(guild_id, key).await? else {
            return Ok(None);
        };
        match value.parse() {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                warn!(guild_id, key, value = %value, error = %e, "Setting is not a valid id");
                Ok(None)
            }
        }
    }

    /// Run a raw statement and return the number of rows affected.
    ///
    /// Identifiers in `sql` must come from trusted code; values go in `params`.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    pub async fn execute_sql(&self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        let result = sqlx::query_with(sql, arguments(params)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Run a raw query and return its rows.
    ///
    /// # Errors
    /// Propagates the backend error unchanged.
    pub async fn fetch_sql(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<PgRow>> {
        sqlx::query_with(sql, arguments(params)?)
            .fetch_all(&self.pool)
            .await
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
