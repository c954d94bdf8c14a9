use crate::punishment::{MUTE_ROLE_SETTING, PunishmentKind};
use crate::{Data, EVENT_TARGET, Error};
use poise::serenity_prelude::{self as serenity, Context, EventHandler, FullEvent, GuildId, Ready};
use tracing::{info, warn};

pub struct Handler;

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            target: EVENT_TARGET,
            user = %ready.user.name,
            shard_id = %ctx.shard_id,
            "Connected"
        );
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                guild_count_cache, guild_count, "Cache guild count mismatch"
            );
        }
        info!(target: EVENT_TARGET, guild_count, "Cache ready");
    }
}

/// Framework-level events that need shared data.
///
/// A member who rejoins while muted gets the mute role back.
///
/// # Errors
/// Returns an error if the lookup or the role assignment fails.
pub async fn handle_event(event: &FullEvent, data: &Data) -> Result<(), Error> {
    let FullEvent::GuildMemberAddition { new_member } = event else {
        return Ok(());
    };
    let guild_id = new_member.guild_id.get();
    let member_id = new_member.user.id.get();

    let Some(infraction) = data
        .punishments
        .get_punishment(PunishmentKind::Mute, guild_id, member_id)
        .await?
    else {
        return Ok(());
    };
    let Some(role_id) = data
        .database
        .get_setting_id(guild_id, MUTE_ROLE_SETTING)
        .await?
    else {
        warn!(
            target: EVENT_TARGET,
            guild_id, member_id, "Muted member rejoined but no mute role is configured"
        );
        return Ok(());
    };

    data.punishments
        .moderation
        .add_role(guild_id, member_id, role_id)
        .await?;
    info!(
        target: EVENT_TARGET,
        guild_id,
        member_id,
        infraction_id = infraction.id,
        "Reapplied mute to rejoining member"
    );
    Ok(())
}
