use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use jukebox_bot::{
    audio::driver::SongbirdTransport, bot::JukeboxBot, config::Config, session::SessionManager,
    sources::YouTubeClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let youtube = Arc::new(YouTubeClient::new(
        config.ytdlp_path.clone(),
        config.max_concurrent_lookups,
    ));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&youtube).await;
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Los límites de tiempo de conexión los aplica el gestor de conexiones
    let songbird = Songbird::serenity_from_config(
        songbird::Config::default().gateway_timeout(None),
    );
    let transport = Arc::new(SongbirdTransport::new(
        songbird.clone(),
        config.ytdlp_path.clone(),
    ));
    let session = Arc::new(SessionManager::new(&config, youtube, transport));

    // Crear handler del bot
    let handler = JukeboxBot::new(config.clone(), session);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(youtube: &YouTubeClient) -> Result<()> {
    // Verificar dependencias críticas
    let version = youtube.version().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
