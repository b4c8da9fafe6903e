use dotenvy::dotenv;
use ocb_poll_bot::bot::PollEventHandler;
use ocb_poll_bot::config::Settings;
use ocb_poll_bot::logging::init_logging;
use ocb_poll_bot::platform::discord::DiscordPlatform;
use ocb_poll_bot::poll::schedule::SystemClock;
use ocb_poll_bot::poll::{PollDeps, PollStateMachine};
use ocb_poll_bot::render::source::HttpImageSource;
use ocb_poll_bot::render::TableRenderer;
use ocb_poll_bot::templates::YamlTemplateStore;
use serenity::all::GatewayIntents;
use serenity::Client;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenv().ok();

    let settings = match Settings::new() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&settings.log_level).map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?;

    info!("Starting game-night poll bot...");

    let source = match HttpImageSource::new() {
        Ok(source) => Arc::new(source),
        Err(e) => {
            error!("Failed to build the image client: {}", e);
            std::process::exit(1);
        }
    };
    let deps = PollDeps {
        platform: Arc::new(DiscordPlatform::from_token(&settings.token)),
        templates: Arc::new(YamlTemplateStore::new(settings.template_file.clone())),
        renderer: Arc::new(TableRenderer::from_settings(&settings, source)),
        clock: Arc::new(SystemClock),
    };

    let token = settings.token.clone();
    let (machine, handle) = PollStateMachine::new(settings, deps);
    let handler = Arc::new(PollEventHandler::new(machine, handle));
    let poll_handle = handler.poll_handle();

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&token, intents)
        .event_handler_arc(handler)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            poll_handle.shutdown().await;
            shard_manager.shutdown_all().await;
        }
    });

    info!("Bot is running...");
    client.start().await?;
    Ok(())
}
