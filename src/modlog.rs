//! Moderation log channel
//!
//! A guild can name a text channel in its settings. Every successful ban,
//! mute, unban and unmute is summarized there. Posting is best effort: a
//! missing channel or a failed send is logged and never fails the command.

use crate::db::{Database, DbResult};
use crate::punishment::Infraction;
use crate::{COMMAND_TARGET, Context};
use poise::serenity_prelude as serenity;
use tracing::warn;

/// Setting key holding the log channel id
pub const LOG_CHANNEL_SETTING: &str = "log_channel";

/// Channel configured for the moderation log, if any.
///
/// # Errors
/// Propagates the backend error unchanged.
pub async fn log_channel(database: &Database, guild_id: u64) -> DbResult<Option<u64>> {
    let channel = database.get_setting_id(guild_id, LOG_CHANNEL_SETTING).await?;
    Ok(channel.filter(|id| *id != 0))
}

/// Set the moderation log channel, or clear it with `None`.
///
/// # Errors
/// Propagates the backend error unchanged.
pub async fn set_log_channel(
    database: &Database,
    guild_id: u64,
    channel_id: Option<u64>,
) -> DbResult<()> {
    let value = channel_id.map(|id| id.to_string());
    database
        .set_setting(guild_id, LOG_CHANNEL_SETTING, value.as_deref())
        .await
}

/// One line describing a moderation command and the infraction it touched.
pub fn format_entry(command: &str, moderator_id: u64, infraction: &Infraction) -> String {
    let until = infraction
        .expiry_date
        .map_or_else(|| "permanent".to_string(), |at| format!("until <t:{}:f>", at.timestamp()));
    format!(
        "`{command}` by <@{moderator_id}> on <@{}>: #{} {} ({}, {until})",
        infraction.member_id, infraction.id, infraction.kind, infraction.reason
    )
}

/// Post `entry` to the guild's log channel if one is set.
pub async fn post(ctx: Context<'_>, guild_id: u64, entry: String) {
    let channel_id = match log_channel(&ctx.data().database, guild_id).await {
        Ok(Some(id)) => serenity::ChannelId::new(id),
        Ok(None) => return,
        Err(e) => {
            warn!(target: COMMAND_TARGET, guild_id, error = %e, "Could not read log channel");
            return;
        }
    };

    if let Err(e) = channel_id.say(ctx.serenity_context(), entry).await {
        warn!(
            target: COMMAND_TARGET,
            guild_id,
            channel_id = channel_id.get(),
            error = %e,
            "Could not post to log channel"
        );
    }
}
