use anyhow::Result;
use serenity::{builder::CreateMessage, http::Http};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{
    audio::events::{EventBus, QueueEvent, QueueEventKind},
    ui::embeds,
};

/// Publica en el canal de texto de cada sesión los eventos que le interesan
/// al usuario.
pub fn spawn(events: &EventBus, http: Arc<Http>) -> JoinHandle<()> {
    events.spawn_subscriber("announcer", move |event| {
        let http = http.clone();
        async move { announce(&http, event).await }
    })
}

async fn announce(http: &Http, event: QueueEvent) -> Result<()> {
    let Some(channel) = event.session.text_channel else {
        return Ok(());
    };

    let embed = match &event.kind {
        QueueEventKind::TrackStarted { track } => {
            embeds::create_now_playing_embed(track, &event.session)
        }
        QueueEventKind::Error { track, message } => {
            let description = match track {
                Some(track) => format!("No se pudo reproducir **{}**\n`{}`", track.title(), message),
                None => format!("`{}`", message),
            };
            embeds::create_error_embed("Error de reproducción", &description)
        }
        QueueEventKind::Finished => embeds::create_info_embed(
            "Cola terminada",
            "🏁 No quedan canciones. Usa `/play` para seguir escuchando",
        ),
        QueueEventKind::Empty => embeds::create_info_embed(
            "Canal vacío",
            "🚪 Me desconecté porque no quedaba nadie escuchando",
        ),
        QueueEventKind::Disconnected => embeds::create_warning_embed(
            "Desconectado",
            "🔌 Se perdió la conexión de voz y no se pudo recuperar",
        ),
        QueueEventKind::Reconnected => {
            embeds::create_success_embed("Reconectado", "🔄 Conexión de voz recuperada")
        }
        _ => return Ok(()),
    };

    channel
        .send_message(http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}
