pub mod commands;
pub mod config;
pub mod data;
pub mod db;
pub mod handlers;
pub mod logging;
pub mod modlog;
pub mod punishment;
pub mod scheduler;

pub const BOT_NAME: &str = "infraction_keeper";
pub const COMMAND_TARGET: &str = "infraction_keeper::command";
pub const ERROR_TARGET: &str = "infraction_keeper::error";
pub const EVENT_TARGET: &str = "infraction_keeper::handlers";
pub const SCHEDULER_TARGET: &str = "infraction_keeper::scheduler";
pub const LIFECYCLE_TARGET: &str = "infraction_keeper::punishment";
pub const CONSOLE_TARGET: &str = "infraction_keeper";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
