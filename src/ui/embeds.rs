use serenity::all::{CreateEmbed, CreateEmbedFooter, Timestamp};
use std::time::Duration;

use crate::audio::{
    session::{PlaybackState, RepeatMode, SessionSnapshot},
    track::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Relay Queue";

const ITEMS_PER_PAGE: usize = 10;

fn track_line(track: &Track) -> String {
    match track.artist() {
        Some(artist) => format!("**{}** - {}", track.title(), artist),
        None => format!("**{}**", track.title()),
    }
}

fn duration_field(track: &Track) -> String {
    track
        .duration()
        .map(format_duration)
        .unwrap_or_else(|| "🔴 En vivo".to_string())
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, snapshot: &SessionSnapshot) -> CreateEmbed {
    let status = match snapshot.state {
        PlaybackState::Paused => "⏸️ En Pausa",
        _ => "🎵 Reproduciendo Ahora",
    };

    let mut embed = CreateEmbed::default()
        .title(status)
        .description(track_line(track))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_field(track), true)
        .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
        .field("🔁 Repetición", snapshot.repeat_mode.label(), true)
        .field("🔗 Fuente", track.source().label(), true);

    if let Some(user) = track.requested_by() {
        embed = embed.field("👤 Solicitado por", format!("<@{}>", user), true);
    }

    if !snapshot.upcoming().is_empty() {
        embed = embed.field("⏭️ Siguientes", snapshot.upcoming().len().to_string(), true);
    }

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(track.source_url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("{} se ha agregado a la cola", track_line(track)))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_field(track), true)
        .field("📍 Posición", (position + 1).to_string(), true);

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(track.source_url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea un embed para mostrar que una playlist fue agregada
pub fn create_playlist_added_embed(added: usize, first_position: usize) -> CreateEmbed {
    let description = if added == 1 {
        "Se agregó **1 canción** de la playlist a la cola".to_string()
    } else {
        format!("Se agregaron **{} canciones** de la playlist a la cola", added)
    };

    CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .field("📍 Desde la posición", (first_position + 1).to_string(), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con una página de la cola (1-based)
pub fn create_queue_embed(snapshot: &SessionSnapshot, page: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let queue_page = snapshot.page(page, ITEMS_PER_PAGE);
    let mut description = String::new();

    for (position, track) in &queue_page.items {
        let marker = if *position == snapshot.cursor {
            match snapshot.repeat_mode {
                RepeatMode::Track => "🔂",
                RepeatMode::Queue => "🔁",
                RepeatMode::Off => "▶️",
            }
        } else {
            ""
        };
        let duration = track
            .duration()
            .map(|d| format!(" `[{}]`", format_duration(d)))
            .unwrap_or_default();

        description.push_str(&format!(
            "{}**{}**. {}{}\n",
            marker,
            position + 1,
            track_line(track),
            duration
        ));
    }

    let mut info = format!("**Total:** {} canciones", queue_page.total_items);
    let remaining = snapshot.total_duration();
    if remaining > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(remaining)));
    }

    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {} de {} • Relay Queue",
            queue_page.current_page, queue_page.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .description(description)
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed de volumen
pub fn create_volume_embed(volume: u8) -> CreateEmbed {
    let icon = match volume {
        0 => "🔇",
        1..=33 => "🔈",
        34..=66 => "🔉",
        _ => "🔊",
    };
    let filled = (volume as usize) / 10;
    let bar = format!("{}{}", "▰".repeat(filled), "▱".repeat(10 - filled));

    CreateEmbed::default()
        .title(format!("{} Volumen", icon))
        .description(format!("{} **{}%**", bar, volume))
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
