use std::sync::Arc;

use infraction_keeper::config::AppConfig;
use infraction_keeper::db::Database;
use infraction_keeper::punishment::{PunishmentManager, SerenityModeration};
use infraction_keeper::scheduler::Scheduler;
use infraction_keeper::{CONSOLE_TARGET, Data, ERROR_TARGET, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let config = AppConfig::from_env()?;
    let database = Database::connect(&config.database).await?;
    let scheduler = Scheduler::start(config.scheduler);

    let setup_database = database.clone();
    let setup_scheduler = scheduler.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ban(),
                commands::mute(),
                commands::unmute(),
                commands::unban(),
                commands::muterole(),
                commands::logchannel(),
                commands::infractions(),
            ],
            pre_command: |ctx| Box::pin(logging::log_command_start(ctx)),
            post_command: |ctx| Box::pin(logging::log_command_end(ctx)),
            on_error: |error| Box::pin(logging::log_command_error(error)),
            event_handler: |_ctx, event, _framework, data| {
                Box::pin(handlers::handle_event(event, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let moderation = Arc::new(SerenityModeration::new(Arc::clone(&ctx.http)));
                let punishments = PunishmentManager::setup(
                    setup_database.clone(),
                    setup_scheduler,
                    moderation,
                )
                .await?;
                let armed = punishments.start_tracking().await?;
                info!(target: CONSOLE_TARGET, armed, "Punishment tracking started");

                Ok(Data::new(setup_database, punishments))
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: CONSOLE_TARGET, "Shutdown signal received");
            shard_manager.shutdown_all().await;
        }
    });

    info!(target: CONSOLE_TARGET, "Starting bot...");
    if let Err(e) = client.start().await {
        error!(target: ERROR_TARGET, error = %e, "Client stopped with an error");
    }

    scheduler.shutdown();
    database.close().await;
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to build runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
