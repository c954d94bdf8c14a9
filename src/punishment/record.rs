//! Infraction records
//!
//! One row per issued punishment. A row with an expiry date and
//! `completed = false` has a reversal pending; once `completed` is set it is
//! never cleared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::kind::PunishmentKind;
use crate::db::{Field, Filter, Ident, SqlValue, snowflake_from_db};

/// Table holding every issued punishment
pub const INFRACTION_TABLE: Ident = Ident::new("infraction");

/// Column layout of an infraction table
#[must_use]
pub fn infraction_fields() -> Vec<Field> {
    vec![
        Field::serial_identifier(),
        Field::big_integer("guild_id"),
        Field::big_integer("member_id"),
        Field::big_integer("author_id"),
        Field::text("type"),
        Field::text("reason"),
        Field::timestamp("issue_date"),
        Field::timestamp("expiry_date"),
        Field::boolean("completed", false),
    ]
}

/// A stored punishment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Infraction {
    pub id: i64,
    pub guild_id: i64,
    pub member_id: i64,
    pub author_id: i64,
    #[sqlx(rename = "type", try_from = "String")]
    pub kind: PunishmentKind,
    pub reason: String,
    pub issue_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub completed: bool,
}

/// Everything needed to reverse a punishment when it expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryTask {
    pub kind: PunishmentKind,
    pub infraction_id: i64,
    pub guild_id: u64,
    pub member_id: u64,
}

impl Infraction {
    /// The reversal to arm for this record, if one is pending.
    ///
    /// Agrees with [`pending_expiry_filter`]: only uncompleted rows with an
    /// expiry date qualify.
    #[must_use]
    pub fn expiry_task(&self) -> Option<(DateTime<Utc>, ExpiryTask)> {
        if self.completed {
            return None;
        }
        self.expiry_date.map(|fire_at| (fire_at, self.task()))
    }

    /// Reversal for this record regardless of its expiry date.
    #[must_use]
    pub const fn task(&self) -> ExpiryTask {
        ExpiryTask {
            kind: self.kind,
            infraction_id: self.id,
            guild_id: snowflake_from_db(self.guild_id),
            member_id: snowflake_from_db(self.member_id),
        }
    }
}

/// Rows whose reversal has not run yet
#[must_use]
pub fn pending_expiry_filter() -> Filter {
    Filter::new()
        .with("expiry_date__ne", SqlValue::Null)
        .with("completed", false)
}

/// The punishment of `kind` currently in force for a member
#[must_use]
pub fn active_filter(
    kind: PunishmentKind,
    guild_id: u64,
    member_id: u64,
    now: DateTime<Utc>,
) -> Filter {
    Filter::new()
        .with("type", kind.as_str())
        .with("guild_id", guild_id)
        .with("member_id", member_id)
        .with("completed", false)
        .with("expiry_date", SqlValue::Null)
        .with("expiry_date__gt", now)
}

/// Every punishment issued to a member in a guild
#[must_use]
pub fn history_filter(guild_id: u64, member_id: u64) -> Filter {
    Filter::new()
        .with("guild_id", guild_id)
        .with("member_id", member_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_table_sql;
    use chrono::TimeZone;

    fn infraction(expiry_date: Option<DateTime<Utc>>, completed: bool) -> Infraction {
        Infraction {
            id: 7,
            guild_id: 100,
            member_id: 200,
            author_id: 300,
            kind: PunishmentKind::Mute,
            reason: "spam".to_string(),
            issue_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            expiry_date,
            completed,
        }
    }

    #[test]
    fn test_infraction_table_sql() {
        assert_eq!(
            create_table_sql(INFRACTION_TABLE, &infraction_fields()),
            "CREATE TABLE IF NOT EXISTS infraction (\"id\" BIGSERIAL PRIMARY KEY, \
             \"guild_id\" BIGINT, \"member_id\" BIGINT, \"author_id\" BIGINT, \
             \"type\" TEXT, \"reason\" TEXT, \"issue_date\" TIMESTAMPTZ, \
             \"expiry_date\" TIMESTAMPTZ, \"completed\" BOOLEAN DEFAULT FALSE);"
        );
    }

    #[test]
    fn test_expiry_task_only_for_pending_rows() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let (fire_at, task) = infraction(Some(at), false).expiry_task().unwrap();
        assert_eq!(fire_at, at);
        assert_eq!(
            task,
            ExpiryTask {
                kind: PunishmentKind::Mute,
                infraction_id: 7,
                guild_id: 100,
                member_id: 200,
            }
        );

        assert!(infraction(Some(at), true).expiry_task().is_none());
        assert!(infraction(None, false).expiry_task().is_none());
    }

    #[test]
    fn test_pending_expiry_filter() {
        let compiled = pending_expiry_filter().compile();
        assert_eq!(
            compiled.clause,
            "WHERE expiry_date IS NOT NULL AND completed = $1"
        );
        assert_eq!(compiled.values, vec![SqlValue::from(false)]);
    }

    #[test]
    fn test_active_filter() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let compiled = active_filter(PunishmentKind::Ban, 1, 2, now).compile();
        assert_eq!(
            compiled.clause,
            "WHERE type = $1 AND guild_id = $2 AND member_id = $3 AND completed = $4 \
             AND (expiry_date IS NULL OR expiry_date > $5)"
        );
        assert_eq!(compiled.values[0], SqlValue::from("ban"));
        assert_eq!(compiled.values[4], SqlValue::from(now));
    }
}
