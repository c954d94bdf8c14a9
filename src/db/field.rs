//! Schema identifiers and column descriptors.

use std::fmt;

/// A table or column name.
///
/// Names are interpolated straight into SQL text, so an `Ident` can only be
/// built from a `&'static str`: compile-time text, never user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub struct Ident(&'static str);

impl Ident {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl From<&'static str> for Ident {
    fn from(name: &'static str) -> Self {
        Self(name)
    }
}

/// A column descriptor used by `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: Ident,
    pub datatype: String,
}

impl Field {
    /// Auto-assigned `id` primary key.
    #[must_use]
    pub fn serial_identifier() -> Self {
        Self::new("id", "BIGSERIAL PRIMARY KEY")
    }

    #[must_use]
    pub fn big_integer(name: &'static str) -> Self {
        Self::new(name, "BIGINT")
    }

    #[must_use]
    pub fn text(name: &'static str) -> Self {
        Self::new(name, "TEXT")
    }

    #[must_use]
    pub fn varchar(name: &'static str, length: u32) -> Self {
        Self::new(name, format!("VARCHAR({length})"))
    }

    #[must_use]
    pub fn boolean(name: &'static str, default: bool) -> Self {
        let default = if default { "TRUE" } else { "FALSE" };
        Self::new(name, format!("BOOLEAN DEFAULT {default}"))
    }

    #[must_use]
    pub fn timestamp(name: &'static str) -> Self {
        Self::new(name, "TIMESTAMPTZ")
    }

    fn new(name: &'static str, datatype: impl Into<String>) -> Self {
        Self {
            name: Ident::new(name),
            datatype: datatype.into(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" {}", self.name, self.datatype)
    }
}

/// Render an idempotent `CREATE TABLE` statement.
#[must_use]
pub fn create_table_sql(name: Ident, fields: &[Field]) -> String {
    let columns = fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {name} ({columns});")
}
