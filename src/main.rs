use std::{process::exit, sync::Arc};

use serenity::{all::GatewayIntents, http::Http, Client};
use songbird::{SerenityInit, Songbird};
use talkingbot::{
    config::load_configuration, dispatcher::AudioEventDispatcher, handler::TalkingBotHandler,
    lavalink::Lavalink, manager::AudioManager, node::NodeClient, parsers::TimecodeParser,
    presence::VoicePresence, registry::SessionRegistry, TalkingBotContext,
};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt::layer, layer::SubscriberExt, registry, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    registry()
        .with(layer())
        .with(EnvFilter::from_default_env())
        .init();

    info!("(main): starting up...");

    let config = load_configuration();

    let Some(token) = config.discord_token.clone() else {
        error!("(main): no discord token, set TALKINGBOT_DISCORD_TOKEN or discord_token in the configuration file");
        exit(1);
    };

    let user_id = match Http::new(&token).get_current_user().await {
        Ok(v) => v.id,
        Err(e) => {
            error!("(main): cannot get the bot user: {}", e);
            exit(1);
        }
    };

    let timecode_parser = match TimecodeParser::new() {
        Ok(v) => Arc::new(v),
        Err(e) => {
            error!("(main): cannot initialize the timecode parser: {}", e);
            exit(1);
        }
    };

    let voice_manager = Songbird::serenity();
    let (event_sender, event_receiver) = unbounded_channel();

    debug!("(main): connecting to lavalink...");
    let lavalink = match Lavalink::connect(
        config.lavalink().into(),
        user_id,
        voice_manager.clone(),
        event_sender,
        config.node_timeout(),
    )
    .await
    {
        Ok(v) => v,
        Err(e) => {
            error!("(main): cannot connect to lavalink: {}", e);
            exit(1);
        }
    };
    info!("(main): connected to lavalink");

    let node = NodeClient::new(lavalink, config.node_timeout());
    let registry = Arc::new(SessionRegistry::new());
    let dispatcher = AudioEventDispatcher::spawn(registry.clone(), node.clone(), event_receiver);
    let manager = AudioManager::new(registry, node, config.search_source());

    let talkingbot = TalkingBotContext {
        presence: VoicePresence::new(manager.clone(), config.idle_timeout()),
        guilds: Arc::new(config.guilds()),
        timecode_parser,
        manager,
    };

    debug!("(main): initializing client...");
    let mut client = match Client::builder(
        token,
        GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES,
    )
    .event_handler(TalkingBotHandler { talkingbot })
    .register_songbird_with(voice_manager)
    .await
    {
        Ok(v) => v,
        Err(e) => {
            error!("(main): cannot initialize the client: {}", e);
            exit(2);
        }
    };

    if let Err(e) = client.start().await {
        error!("(main): cannot start the client: {}", e);
    }

    dispatcher.shutdown().await;
}
