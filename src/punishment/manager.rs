//! Punishment lifecycle
//!
//! Issuing a punishment writes an infraction row and, if it expires, arms a
//! deferred reversal. Completing a row is a plain idempotent data mark.
//! Reversal is guarded separately: each infraction id can be claimed for
//! reversal once per process, so a manual lift racing the timer never
//! reverses twice, and a manual completion never swallows the timer's
//! reversal.

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tracing::{info, instrument, warn};

use super::error::{PunishmentError, PunishmentResult};
use super::kind::PunishmentKind;
use super::moderation::Moderation;
use super::record::{
    ExpiryTask, INFRACTION_TABLE, Infraction, active_filter, history_filter, infraction_fields,
    pending_expiry_filter,
};
use crate::db::{Database, Filter, Ident, SelectOptions, Table, Values, snowflake_to_db};
use crate::scheduler::{Recoverable, Scheduler};
use crate::{Error, LIFECYCLE_TARGET};

/// Guild setting holding the id of the role given to muted members
pub const MUTE_ROLE_SETTING: &str = "mute_role";

/// Shared handle to the punishment lifecycle. Cheap to clone.
#[derive(Clone)]
pub struct PunishmentManager(Arc<ManagerInner>);

pub struct ManagerInner {
    pub database: Database,
    pub infractions: Table,
    pub scheduler: Scheduler,
    pub moderation: Arc<dyn Moderation>,
    /// Infractions whose reversal has been claimed
    reversed: DashSet<i64>,
}

impl Deref for PunishmentManager {
    type Target = ManagerInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for PunishmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PunishmentManager")
            .field("infractions", &self.infractions.name())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl PunishmentManager {
    /// Create the infraction table if needed and build the manager.
    ///
    /// Does not arm anything; call [`PunishmentManager::start_tracking`] once
    /// the bot can reach Discord.
    ///
    /// # Errors
    /// Returns the backend error if the table cannot be created.
    pub async fn setup(
        database: Database,
        scheduler: Scheduler,
        moderation: Arc<dyn Moderation>,
    ) -> PunishmentResult<Self> {
        Self::setup_with_table(database, INFRACTION_TABLE, scheduler, moderation).await
    }

    /// [`PunishmentManager::setup`] against a custom table name.
    ///
    /// # Errors
    /// Returns the backend error if the table cannot be created.
    pub async fn setup_with_table(
        database: Database,
        table: Ident,
        scheduler: Scheduler,
        moderation: Arc<dyn Moderation>,
    ) -> PunishmentResult<Self> {
        let infractions = database.new_table(table, &infraction_fields()).await?;
        info!(target: LIFECYCLE_TARGET, table = %table, "Punishment manager ready");

        Ok(Self(Arc::new(ManagerInner {
            database,
            infractions,
            scheduler,
            moderation,
            reversed: DashSet::new(),
        })))
    }

    /// Record a punishment and arm its reversal if it expires.
    ///
    /// Only the record is written here; see [`PunishmentManager::punish`] to
    /// also apply it on Discord.
    ///
    /// # Errors
    /// Returns a `PunishmentError` if the insert fails or the scheduler has
    /// stopped.
    #[instrument(skip(self, reason))]
    pub async fn add_punishment(
        &self,
        kind: PunishmentKind,
        guild_id: u64,
        author_id: u64,
        member_id: u64,
        reason: &str,
        expiry_date: Option<DateTime<Utc>>,
    ) -> PunishmentResult<Infraction> {
        let issue_date = Utc::now();
        let id = self
            .infractions
            .insert_returning_id(
                &Values::new()
                    .set("guild_id", guild_id)
                    .set("member_id", member_id)
                    .set("author_id", author_id)
                    .set("type", kind.as_str())
                    .set("reason", reason)
                    .set("issue_date", issue_date)
                    .set("expiry_date", expiry_date),
            )
            .await?;

        let infraction = Infraction {
            id,
            guild_id: snowflake_to_db(guild_id),
            member_id: snowflake_to_db(member_id),
            author_id: snowflake_to_db(author_id),
            kind,
            reason: reason.to_string(),
            issue_date,
            expiry_date,
            completed: false,
        };

        if let Some((fire_at, task)) = infraction.expiry_task() {
            self.schedule_expiry(fire_at, task)?;
        }

        info!(
            target: LIFECYCLE_TARGET,
            infraction_id = id,
            %kind,
            guild_id,
            member_id,
            expiry_date = ?expiry_date,
            "Punishment recorded"
        );
        Ok(infraction)
    }

    /// Apply a punishment on Discord, then record it.
    ///
    /// A mute needs the guild's mute role to be configured.
    ///
    /// # Errors
    /// Returns a `PunishmentError` if the Discord call fails, no mute role is
    /// configured, or recording fails.
    pub async fn punish(
        &self,
        kind: PunishmentKind,
        guild_id: u64,
        author_id: u64,
        member_id: u64,
        reason: &str,
        expiry_date: Option<DateTime<Utc>>,
    ) -> PunishmentResult<Infraction> {
        match kind {
            PunishmentKind::Ban => self.moderation.ban(guild_id, member_id, reason).await?,
            PunishmentKind::Mute => {
                let role_id = self.mute_role(guild_id).await?;
                self.moderation
                    .add_role(guild_id, member_id, role_id)
                    .await?;
            }
        }
        self.add_punishment(kind, guild_id, author_id, member_id, reason, expiry_date)
            .await
    }

    /// The punishment of `kind` currently in force for a member, if any.
    ///
    /// # Errors
    /// Returns the backend error wrapped in `PunishmentError::Database`.
    pub async fn get_punishment(
        &self,
        kind: PunishmentKind,
        guild_id: u64,
        member_id: u64,
    ) -> PunishmentResult<Option<Infraction>> {
        let filter = active_filter(kind, guild_id, member_id, Utc::now());
        Ok(self.infractions.first(&filter).await?)
    }

    /// Mark an infraction completed. Returns `true` only for the call that
    /// moved it from uncompleted to completed.
    ///
    /// This only touches the record; reversing the punishment is
    /// [`PunishmentManager::end_punishment`]'s job.
    ///
    /// # Errors
    /// Returns the backend error wrapped in `PunishmentError::Database`.
    pub async fn complete_punishment(&self, infraction_id: i64) -> PunishmentResult<bool> {
        let filter = Filter::new()
            .with("id", infraction_id)
            .with("completed", false);
        let updated = self
            .infractions
            .update(Some(&filter), &Values::new().set("completed", true))
            .await?;
        Ok(updated == 1)
    }

    /// Complete an infraction and undo its effect on Discord.
    ///
    /// The reversal runs once per infraction, whether or not the record was
    /// already marked completed. A muted member who has left the guild is
    /// skipped with a warning.
    ///
    /// # Errors
    /// Returns a `PunishmentError` if the update or the Discord call fails, or
    /// a mute role is needed but not configured.
    #[instrument(skip(self), fields(infraction_id = task.infraction_id))]
    pub async fn end_punishment(&self, task: ExpiryTask) -> PunishmentResult<()> {
        self.complete_punishment(task.infraction_id).await?;

        if !self.reversed.insert(task.infraction_id) {
            info!(
                target: LIFECYCLE_TARGET,
                infraction_id = task.infraction_id,
                "Punishment already reversed"
            );
            return Ok(());
        }

        let ExpiryTask {
            kind,
            guild_id,
            member_id,
            ..
        } = task;
        match kind {
            PunishmentKind::Ban => self.moderation.unban(guild_id, member_id).await?,
            PunishmentKind::Mute => {
                let role_id = self.mute_role(guild_id).await?;
                if !self.moderation.is_member(guild_id, member_id).await? {
                    warn!(
                        target: LIFECYCLE_TARGET,
                        guild_id, member_id, "Muted member left the guild, skipping role removal"
                    );
                    return Ok(());
                }
                self.moderation
                    .remove_role(guild_id, member_id, role_id)
                    .await?;
            }
        }

        info!(
            target: LIFECYCLE_TARGET,
            infraction_id = task.infraction_id,
            %kind,
            guild_id,
            member_id,
            "Punishment ended"
        );
        Ok(())
    }

    /// End the active punishment of `kind` for a member now, if there is one.
    ///
    /// A reversal already armed for it becomes a no-op.
    ///
    /// # Errors
    /// Same as [`PunishmentManager::end_punishment`].
    pub async fn lift_punishment(
        &self,
        kind: PunishmentKind,
        guild_id: u64,
        member_id: u64,
    ) -> PunishmentResult<Option<Infraction>> {
        let Some(infraction) = self.get_punishment(kind, guild_id, member_id).await? else {
            return Ok(None);
        };
        self.end_punishment(infraction.task()).await?;
        Ok(Some(infraction))
    }

    /// Arm a reversal for every pending infraction. Returns how many were armed.
    ///
    /// # Errors
    /// Returns `PunishmentError::Recovery` if the query or scheduling fails.
    pub async fn start_tracking(&self) -> PunishmentResult<usize> {
        let count = self
            .scheduler
            .recover(self)
            .await
            .map_err(PunishmentError::Recovery)?;
        info!(target: LIFECYCLE_TARGET, count, "Tracking pending punishments");
        Ok(count)
    }

    /// Every infraction a member has received in a guild, newest first.
    ///
    /// # Errors
    /// Returns the backend error wrapped in `PunishmentError::Database`.
    pub async fn history(&self, guild_id: u64, member_id: u64) -> PunishmentResult<Vec<Infraction>> {
        let options = SelectOptions::new().order_by("id").desc();
        Ok(self
            .infractions
            .filter(&history_filter(guild_id, member_id), &options)
            .await?)
    }

    async fn mute_role(&self, guild_id: u64) -> PunishmentResult<u64> {
        self.database
            .get_setting_id(guild_id, MUTE_ROLE_SETTING)
            .await?
            .ok_or(PunishmentError::MuteRoleNotConfigured(guild_id))
    }

    fn schedule_expiry(&self, fire_at: DateTime<Utc>, task: ExpiryTask) -> PunishmentResult<()> {
        let manager = self.clone();
        self.scheduler
            .schedule(fire_at, move |task| Recoverable::fire(manager, task), task)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Recoverable for PunishmentManager {
    type Args = ExpiryTask;

    async fn pending_actions(&self) -> Result<Vec<(DateTime<Utc>, ExpiryTask)>, Error> {
        let pending: Vec<Infraction> = self
            .infractions
            .filter(&pending_expiry_filter(), &SelectOptions::new())
            .await?;
        Ok(pending.iter().filter_map(Infraction::expiry_task).collect())
    }

    async fn fire(self, task: ExpiryTask) -> Result<(), Error> {
        self.end_punishment(task).await.map_err(Into::into)
    }
}
