//! Filter compiler
//!
//! Turns an ordered list of `field[__op] -> value` conditions into a
//! parameterized `WHERE` clause and the values for its placeholders.
//!
//! Conditions on the same field are OR-ed together and the per-field groups are
//! AND-ed, so `expiry_date = NULL` plus `expiry_date__gt = now` reads as
//! "no expiry, or not yet expired". A suffix that is not one of the known
//! operators is left on the field name. An untyped `NULL` compared with a
//! range operator or `__in` is written inline and matches no rows.

use super::value::SqlValue;

/// Comparison operator selected by a key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Bare field name
    Eq,
    /// `__in`
    In,
    /// `__gt`
    Gt,
    /// `__ge`
    Ge,
    /// `__lt`
    Lt,
    /// `__le`
    Le,
    /// `__ne`
    Ne,
}

const SUFFIXES: [(&str, Op); 6] = [
    ("__in", Op::In),
    ("__gt", Op::Gt),
    ("__ge", Op::Ge),
    ("__lt", Op::Lt),
    ("__le", Op::Le),
    ("__ne", Op::Ne),
];

impl Op {
    /// Split a filter key into its field name and operator.
    #[must_use]
    pub fn split_key(key: &'static str) -> (&'static str, Self) {
        SUFFIXES
            .iter()
            .find_map(|(suffix, op)| key.strip_suffix(suffix).map(|field| (field, *op)))
            .unwrap_or((key, Self::Eq))
    }

    /// Condition comparing `field` against `rhs` (a placeholder or `NULL`).
    fn fragment(self, field: &str, rhs: &str) -> String {
        match self {
            Self::Eq => format!("{field} = {rhs}"),
            Self::Ne => format!("{field} != {rhs}"),
            Self::In if rhs == "NULL" => format!("{field} IN (NULL)"),
            Self::In => format!("{field} = ANY({rhs})"),
            Self::Gt => format!("{field} > {rhs}"),
            Self::Ge => format!("{field} >= {rhs}"),
            Self::Lt => format!("{field} < {rhs}"),
            Self::Le => format!("{field} <= {rhs}"),
        }
    }

    fn null_check(self, field: &str) -> String {
        if self == Self::Ne {
            format!("{field} IS NOT NULL")
        } else {
            format!("{field} IS NULL")
        }
    }
}

/// Row-matching conditions, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(&'static str, SqlValue)>,
}

/// Output of [`Filter::compile`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    /// `WHERE ...`, or empty for a filter without conditions
    pub clause: String,
    /// Values in placeholder order
    pub values: Vec<SqlValue>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition. `key` is a field name with an optional operator suffix.
    #[must_use]
    pub fn with(mut self, key: &'static str, value: impl Into<SqlValue>) -> Self {
        self.conditions.push((key, value.into()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Compile with placeholders starting at `$1`.
    #[must_use]
    pub fn compile(&self) -> CompiledFilter {
        self.compile_from(1)
    }

    /// Compile with placeholders starting at `$first_placeholder`.
    #[must_use]
    pub fn compile_from(&self, first_placeholder: usize) -> CompiledFilter {
        let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
        let mut values = Vec::new();
        let mut next = first_placeholder;

        for (key, value) in &self.conditions {
            let (field, op) = Op::split_key(key);
            let fragment = if matches!(op, Op::Eq | Op::Ne) && value.is_absent() {
                op.null_check(field)
            } else if *value == SqlValue::Null {
                // No column type to bind with; the comparison matches nothing
                op.fragment(field, "NULL")
            } else {
                let fragment = op.fragment(field, &format!("${next}"));
                next += 1;
                values.push(value.clone());
                fragment
            };

            match groups.iter_mut().find(|(name, _)| *name == field) {
                Some((_, fragments)) => fragments.push(fragment),
                None => groups.push((field, vec![fragment])),
            }
        }

        if groups.is_empty() {
            return CompiledFilter::default();
        }

        let clause = groups
            .into_iter()
            .map(|(_, fragments)| {
                if fragments.len() > 1 {
                    format!("({})", fragments.join(" OR "))
                } else {
                    fragments.concat()
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        CompiledFilter {
            clause: format!("WHERE {clause}"),
            values,
        }
    }
}
