//! Discord side of a punishment
//!
//! Applying and reversing punishments goes through [`Moderation`] so the
//! lifecycle can run against a fake guild in tests.

use std::sync::Arc;

use serenity::all::{Error as SerenityError, GuildId, Http, RoleId, UserId};
use serenity::http::HttpError;
use tracing::info;

use super::error::PunishmentResult;
use crate::LIFECYCLE_TARGET;

/// Delete this many days of messages when banning
const BAN_DELETE_MESSAGE_DAYS: u8 = 0;

/// Moderation calls the punishment lifecycle needs from Discord
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Moderation: Send + Sync {
    /// Ban a user from a guild
    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> PunishmentResult<()>;

    /// Lift a ban
    async fn unban(&self, guild_id: u64, user_id: u64) -> PunishmentResult<()>;

    /// Give a member a role
    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> PunishmentResult<()>;

    /// Take a role away from a member
    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64)
    -> PunishmentResult<()>;

    /// Whether the user is still in the guild
    async fn is_member(&self, guild_id: u64, user_id: u64) -> PunishmentResult<bool>;
}

/// [`Moderation`] backed by the Discord HTTP API
#[derive(Clone)]
pub struct SerenityModeration {
    http: Arc<Http>,
}

impl SerenityModeration {
    #[must_use]
    pub const fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl Moderation for SerenityModeration {
    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> PunishmentResult<()> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(user_id), BAN_DELETE_MESSAGE_DAYS, reason)
            .await?;
        info!(target: LIFECYCLE_TARGET, guild_id, user_id, "Banned user");
        Ok(())
    }

    async fn unban(&self, guild_id: u64, user_id: u64) -> PunishmentResult<()> {
        GuildId::new(guild_id)
            .unban(&self.http, UserId::new(user_id))
            .await?;
        info!(target: LIFECYCLE_TARGET, guild_id, user_id, "Unbanned user");
        Ok(())
    }

    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> PunishmentResult<()> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("Muted"),
            )
            .await?;
        info!(target: LIFECYCLE_TARGET, guild_id, user_id, role_id, "Added role");
        Ok(())
    }

    async fn remove_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> PunishmentResult<()> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("Mute expired"),
            )
            .await?;
        info!(target: LIFECYCLE_TARGET, guild_id, user_id, role_id, "Removed role");
        Ok(())
    }

    async fn is_member(&self, guild_id: u64, user_id: u64) -> PunishmentResult<bool> {
        match self
            .http
            .get_member(GuildId::new(guild_id), UserId::new(user_id))
            .await
        {
            Ok(_) => Ok(true),
            Err(SerenityError::Http(HttpError::UnsuccessfulRequest(response)))
                if response.status_code.as_u16() == 404 =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
