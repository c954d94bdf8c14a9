//! Punishment types

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Kind of punishment, stored as lowercase text in the `type` column
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum PunishmentKind {
    /// Server ban, reversed by unbanning
    #[display("ban")]
    Ban,
    /// Mute role, reversed by removing the role
    #[display("mute")]
    Mute,
}

/// A stored `type` value that is neither `ban` nor `mute`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown punishment type: {0}")]
pub struct UnknownPunishmentKind(pub String);

impl PunishmentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Mute => "mute",
        }
    }
}

impl FromStr for PunishmentKind {
    type Err = UnknownPunishmentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ban" => Ok(Self::Ban),
            "mute" => Ok(Self::Mute),
            other => Err(UnknownPunishmentKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for PunishmentKind {
    type Error = UnknownPunishmentKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_text_round_trip() {
        for kind in [PunishmentKind::Ban, PunishmentKind::Mute] {
            assert_eq!(kind.as_str().parse::<PunishmentKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn test_unknown_kind() {
        let error = PunishmentKind::try_from("kick".to_string()).unwrap_err();
        assert_eq!(error, UnknownPunishmentKind("kick".to_string()));
        assert_eq!(error.to_string(), "Unknown punishment type: kick");
        assert!("Ban".parse::<PunishmentKind>().is_err());
    }
}
