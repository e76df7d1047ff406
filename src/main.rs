use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

use relay_queue::{
    audio::{events::EventBus, player::AudioPlayer, registry::SessionRegistry},
    bot::{announcer, voice::SongbirdTransport, PlayerKey, RelayBot},
    config::Config,
    sources::{DirectUrlResolver, SmartResolver, YouTubeResolver},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_queue=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Relay Queue v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(RelayBot::new(config.clone()))
        .register_songbird_with(songbird.clone())
        .await?;

    // Motor de colas
    let events = EventBus::default();
    let transport = Arc::new(SongbirdTransport::new(songbird, client.cache.clone()));
    let registry = Arc::new(SessionRegistry::new(
        transport,
        events.clone(),
        config.session_settings(),
    ));
    let resolver = Arc::new(SmartResolver::new(
        Arc::new(YouTubeResolver::new(config.max_playlist_size)),
        Arc::new(DirectUrlResolver::new()),
    ));
    let player = Arc::new(AudioPlayer::new(registry, resolver));

    announcer::spawn(&events, client.http.clone());

    {
        let mut data = client.data.write().await;
        data.insert::<PlayerKey>(player.clone());
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ No se pudo registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando sesiones...");
        player.destroy_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = YouTubeResolver::check_available().await;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    match yt_dlp {
        Ok(version) if ffmpeg.status.success() => {
            println!("OK (yt-dlp {version})");
            Ok(())
        }
        _ => anyhow::bail!("Dependencias faltantes"),
    }
}
