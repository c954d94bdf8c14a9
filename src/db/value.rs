//! Scalar values that travel to the backend as bound parameters.

use chrono::{DateTime, Utc};
use sqlx::Arguments;
use sqlx::postgres::PgArguments;

/// A value bound to a positional placeholder.
///
/// Typed variants carry an `Option` so that a missing value still binds with
/// the right column type. `Null` is the untyped absent value used in filters.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Untyped absent value
    Null,
    BigInt(Option<i64>),
    Integer(Option<i32>),
    Text(Option<String>),
    Bool(Option<bool>),
    Timestamp(Option<DateTime<Utc>>),
    /// Right-hand side of an `__in` condition
    BigIntArray(Vec<i64>),
    /// Right-hand side of an `__in` condition
    TextArray(Vec<String>),
}

impl SqlValue {
    /// Whether this value means "absent" (SQL `NULL`).
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            Self::Null
                | Self::BigInt(None)
                | Self::Integer(None)
                | Self::Text(None)
                | Self::Bool(None)
                | Self::Timestamp(None)
        )
    }

    fn add_to(&self, args: &mut PgArguments) -> Result<(), sqlx::error::BoxDynError> {
        match self {
            // The statement builders write untyped NULL inline, so this only
            // happens for raw SQL params. The server sees a TEXT NULL.
            Self::Null => args.add(Option::<String>::None),
            Self::BigInt(v) => args.add(*v),
            Self::Integer(v) => args.add(*v),
            Self::Text(v) => args.add(v.clone()),
            Self::Bool(v) => args.add(*v),
            Self::Timestamp(v) => args.add(*v),
            Self::BigIntArray(v) => args.add(v.clone()),
            Self::TextArray(v) => args.add(v.clone()),
        }
    }
}

/// Build the argument list for a statement, in placeholder order.
///
/// # Errors
/// Returns `sqlx::Error::Encode` if a value cannot be encoded.
pub fn arguments(values: &[SqlValue]) -> Result<PgArguments, sqlx::Error> {
    let mut args = PgArguments::default();
    for value in values {
        value.add_to(&mut args).map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

/// Convert a Discord snowflake to the `BIGINT` it is stored as.
///
/// Snowflakes use 63 bits, so the conversion is lossless in practice.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn snowflake_to_db(id: u64) -> i64 {
    id as i64
}

/// Convert a stored `BIGINT` back to a Discord snowflake.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn snowflake_from_db(id: i64) -> u64 {
    id as u64
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(Some(value.into()))
                }
            }

            impl From<Option<$ty>> for SqlValue {
                fn from(value: Option<$ty>) -> Self {
                    Self::$variant(value.map(Into::into))
                }
            }
        )*
    };
}

impl_from_scalar! {
    i64 => BigInt,
    i32 => Integer,
    String => Text,
    &str => Text,
    bool => Bool,
    DateTime<Utc> => Timestamp,
}

impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        Self::BigInt(Some(snowflake_to_db(value)))
    }
}

impl From<Option<u64>> for SqlValue {
    fn from(value: Option<u64>) -> Self {
        Self::BigInt(value.map(snowflake_to_db))
    }
}

impl From<Vec<i64>> for SqlValue {
    fn from(value: Vec<i64>) -> Self {
        Self::BigIntArray(value)
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(value: Vec<String>) -> Self {
        Self::TextArray(value)
    }
}
