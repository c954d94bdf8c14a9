use crate::{COMMAND_TARGET, CONSOLE_TARGET, Context, Data, ERROR_TARGET, Error};
use poise::FrameworkError;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// JSON log file name, rotated daily
pub const LOG_FILE: &str = "infraction_keeper";

/// Filter used when `RUST_LOG` is not set
const DEFAULT_DIRECTIVES: [&str; 2] = ["serenity=error", "sqlx=warn"];

/// Initialize the logging system with console and file outputs
///
/// # Errors
/// Returns an error if the log directory cannot be created or a directive
/// does not parse.
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let log_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // Structured file output
    let file_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(log_file);

    tracing_subscriber::registry()
        .with(env_filter()?)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(target: CONSOLE_TARGET, "Logging system initialized");
    Ok(())
}

/// `RUST_LOG` if set, otherwise `info` with noisy dependencies turned down
fn env_filter() -> Result<EnvFilter, Error> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    DEFAULT_DIRECTIVES
        .iter()
        .try_fold(EnvFilter::new("info"), |filter, directive| {
            Ok(filter.add_directive(directive.parse()?))
        })
}

fn guild_label(ctx: Context<'_>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub async fn log_command_start(ctx: Context<'_>) {
    ctx.set_invocation_data(Instant::now()).await;

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = ctx.author().id.get(),
        invocation = %ctx.invocation_string(),
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub async fn log_command_end(ctx: Context<'_>) {
    let duration_ms = ctx
        .invocation_data::<Instant>()
        .await
        .map_or(0, |start| start.elapsed().as_millis());

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = ctx.author().id.get(),
        duration_ms = u64::try_from(duration_ms).unwrap_or(u64::MAX),
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution and tell the invoker
pub async fn log_command_error(error: FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(ctx),
                user_id = ctx.author().id.get(),
                error = %error,
                "Command error"
            );
            if let Err(e) = ctx.say(format!("Something went wrong: {error}")).await {
                error!(target: ERROR_TARGET, error = %e, "Failed to report command error");
            }
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);

            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(ctx),
                user_id = ctx.author().id.get(),
                error = %error_msg,
                "Command check failed"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
            if let Err(e) = poise::builtins::on_error(err).await {
                error!(target: ERROR_TARGET, error = %e, "Failed to handle framework error");
            }
        }
    }
}

pub fn log_console(message: &str) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
