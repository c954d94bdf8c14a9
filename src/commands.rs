use crate::modlog;
use crate::punishment::{Infraction, MUTE_ROLE_SETTING, PunishmentKind};
use crate::{Context, Error};
use chrono::{DateTime, Duration, Utc};
use poise::command;
use poise::serenity_prelude as serenity;

/// Entries shown by `/infractions`
const HISTORY_LIMIT: usize = 10;

/// Ban a user, optionally for a limited time
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "User to ban"] user: serenity::User,
    #[description = "How long, e.g. 30m, 12h or 7d. Permanent if omitted"] duration: Option<
        String,
    >,
    #[description = "Reason for the ban"] reason: Option<String>,
) -> Result<(), Error> {
    punish(ctx, PunishmentKind::Ban, &user, duration, reason).await
}

/// Give a user the mute role, optionally for a limited time
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES"
)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "User to mute"] user: serenity::User,
    #[description = "How long, e.g. 30m, 12h or 7d. Permanent if omitted"] duration: Option<
        String,
    >,
    #[description = "Reason for the mute"] reason: Option<String>,
) -> Result<(), Error> {
    punish(ctx, PunishmentKind::Mute, &user, duration, reason).await
}

/// Lift a user's active mute
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES"
)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "User to unmute"] user: serenity::User,
) -> Result<(), Error> {
    lift(ctx, PunishmentKind::Mute, &user).await
}

/// Lift a user's active ban
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS"
)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User to unban"] user: serenity::User,
) -> Result<(), Error> {
    lift(ctx, PunishmentKind::Ban, &user).await
}

/// Set the role given to muted members, or clear it
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn muterole(
    ctx: Context<'_>,
    #[description = "Role to give muted members. Clears the setting if omitted"] role: Option<
        serenity::Role,
    >,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let value = role.as_ref().map(|role| role.id.get().to_string());
    ctx.data()
        .database
        .set_setting(guild_id.get(), MUTE_ROLE_SETTING, value.as_deref())
        .await?;

    let reply = match role {
        Some(role) => format!("Mute role set to {}", role.name),
        None => "Mute role cleared".to_string(),
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Set the channel that receives the moderation log, or clear it
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn logchannel(
    ctx: Context<'_>,
    #[description = "Channel for the moderation log. Clears the setting if omitted"]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    modlog::set_log_channel(
        &ctx.data().database,
        guild_id.get(),
        channel.as_ref().map(|channel| channel.id.get()),
    )
    .await?;

    let reply = match channel {
        Some(channel) => format!("Moderation log set to <#{}>", channel.id),
        None => "Moderation log cleared".to_string(),
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Show a user's most recent infractions
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn infractions(
    ctx: Context<'_>,
    #[description = "User to look up"] user: serenity::User,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let history = ctx
        .data()
        .punishments
        .history(guild_id.get(), user.id.get())
        .await?;

    if history.is_empty() {
        ctx.say(format!("{} has no infractions", user.name)).await?;
        return Ok(());
    }

    let lines = history
        .iter()
        .take(HISTORY_LIMIT)
        .map(format_infraction)
        .collect::<Vec<_>>()
        .join("\n");
    ctx.say(format!(
        "{} has {} infraction(s):\n{lines}",
        user.name,
        history.len()
    ))
    .await?;
    Ok(())
}

async fn punish(
    ctx: Context<'_>,
    kind: PunishmentKind,
    user: &serenity::User,
    duration: Option<String>,
    reason: Option<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let expiry_date = match duration.as_deref() {
        None => None,
        Some(text) => {
            let Some(expiry_date) = expiry_after(Utc::now(), text) else {
                ctx.say(format!("Could not read duration `{text}`, try 30m, 12h or 7d"))
                    .await?;
                return Ok(());
            };
            Some(expiry_date)
        }
    };
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());

    let infraction = ctx
        .data()
        .punishments
        .punish(
            kind,
            guild_id.get(),
            ctx.author().id.get(),
            user.id.get(),
            &reason,
            expiry_date,
        )
        .await?;

    let until = infraction
        .expiry_date
        .map_or_else(|| "permanently".to_string(), |at| format!("until <t:{}:f>", at.timestamp()));
    ctx.say(format!(
        "Applied {kind} to {} {until} (infraction #{})",
        user.name, infraction.id
    ))
    .await?;

    let entry = modlog::format_entry(&kind.to_string(), ctx.author().id.get(), &infraction);
    modlog::post(ctx, guild_id.get(), entry).await;
    Ok(())
}

async fn lift(ctx: Context<'_>, kind: PunishmentKind, user: &serenity::User) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let lifted = ctx
        .data()
        .punishments
        .lift_punishment(kind, guild_id.get(), user.id.get())
        .await?;

    let Some(infraction) = lifted else {
        ctx.say(format!("{} has no active {kind}", user.name)).await?;
        return Ok(());
    };
    ctx.say(format!("Lifted {kind} #{} for {}", infraction.id, user.name))
        .await?;

    let entry = modlog::format_entry(&format!("un{kind}"), ctx.author().id.get(), &infraction);
    modlog::post(ctx, guild_id.get(), entry).await;
    Ok(())
}

/// Parse `<number><unit>` with unit `s`, `m`, `h`, `d` or `w`.
fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let split = text.len().checked_sub(1)?;
    let (amount, unit) = text.split_at_checked(split)?;
    let amount: i64 = amount.parse().ok().filter(|amount| *amount > 0)?;

    match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => None,
    }
}

/// Expiry `text` from `now`, or `None` if it does not parse or lands past
/// the last representable date.
fn expiry_after(now: DateTime<Utc>, text: &str) -> Option<DateTime<Utc>> {
    now.checked_add_signed(parse_duration(text)?)
}

fn format_infraction(infraction: &Infraction) -> String {
    let status = if infraction.completed {
        "ended".to_string()
    } else {
        match infraction.expiry_date {
            Some(at) if at <= Utc::now() => "expired".to_string(),
            Some(at) => format!("until <t:{}:f>", at.timestamp()),
            None => "permanent".to_string(),
        }
    };
    format!(
        "#{} {} <t:{}:d> by <@{}>: {} ({status})",
        infraction.id,
        infraction.kind,
        infraction.issue_date.timestamp(),
        infraction.author_id,
        infraction.reason
    )
}
