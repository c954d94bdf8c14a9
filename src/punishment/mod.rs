//! Punishment lifecycle
//!
//! Bans and mutes are recorded as infractions. Timed ones are reversed by the
//! deferred action scheduler when they expire, and re-armed from the table
//! after a restart.

mod error;
mod kind;
mod manager;
mod moderation;
mod record;

pub use error::{PunishmentError, PunishmentResult};
pub use kind::{PunishmentKind, UnknownPunishmentKind};
pub use manager::{MUTE_ROLE_SETTING, ManagerInner, PunishmentManager};
pub use moderation::{Moderation, SerenityModeration};
pub use record::{
    ExpiryTask, INFRACTION_TABLE, Infraction, active_filter, history_filter, infraction_fields,
    pending_expiry_filter,
};
