//! Error types for the punishment lifecycle

use thiserror::Error;

use crate::scheduler::SchedulerError;

/// Errors that can occur while issuing or ending punishments
#[derive(Debug, Error)]
pub enum PunishmentError {
    /// Backend failure, passed through untouched
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// Mute reversal needs a configured mute role
    #[error("No mute role configured for guild {0}")]
    MuteRoleNotConfigured(u64),

    /// Expiry could not be scheduled
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Pending punishments could not be re-armed
    #[error("Failed to recover pending punishments: {0}")]
    Recovery(#[source] crate::Error),
}

impl From<poise::serenity_prelude::Error> for PunishmentError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

/// Result type for punishment operations
pub type PunishmentResult<T> = Result<T, PunishmentError>;
