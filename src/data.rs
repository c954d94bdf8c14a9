use std::{ops::Deref, sync::Arc};

use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;

use crate::db::Database;
use crate::punishment::PunishmentManager;

/// Shared state handed to every command.
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Implement TypeMapKey for Data to allow storing it in Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("database", &self.database)
            .field("punishments", &self.punishments)
            .finish()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    #[must_use]
    pub fn new(database: Database, punishments: PunishmentManager) -> Self {
        Self(Arc::new(DataInner {
            database,
            punishments,
        }))
    }
}

pub struct DataInner {
    /// Backend handle, also used for guild settings
    pub database: Database,
    /// Ban and mute lifecycle
    pub punishments: PunishmentManager,
}
