use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::str::FromStr;
use tracing::{info, warn};

use crate::{
    audio::{
        player::AudioPlayer,
        session::{RepeatMode, SessionTarget},
    },
    bot::RelayBot,
    error::QueueError,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &RelayBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let player = super::player(ctx).await?;
    let player = player.as_ref();

    let outcome = match command.data.name.as_str() {
        "play" => return handle_play(ctx, &command, player, guild_id).await,
        "pause" => handle_pause(player, guild_id).await,
        "resume" => handle_resume(player, guild_id).await,
        "skip" => handle_skip(player, guild_id).await,
        "jump" => handle_jump(&command, player, guild_id).await,
        "remove" => handle_remove(&command, player, guild_id).await,
        "stop" => handle_stop(player, guild_id).await,
        "queue" => handle_queue(&command, player, guild_id).await,
        "nowplaying" => handle_nowplaying(player, guild_id).await,
        "shuffle" => handle_shuffle(player, guild_id).await,
        "loop" => handle_loop(&command, player, guild_id).await,
        "volume" => handle_volume(&command, player, bot, guild_id).await,
        _ => Ok(embeds::create_error_embed("Comando no reconocido", "Este comando no existe")),
    };

    let (embed, ephemeral) = match outcome {
        Ok(embed) => (embed, false),
        Err(e) => (error_embed(&e), true),
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

fn error_embed(error: &QueueError) -> CreateEmbed {
    match error {
        QueueError::NoSession | QueueError::NothingPlaying | QueueError::EmptyQueue => {
            embeds::create_warning_embed("Nada que hacer", &error.to_string())
        }
        QueueError::Resolve(e) => embeds::create_error_embed("Sin resultados", &e.to_string()),
        other => embeds::create_error_embed("Error", &other.to_string()),
    }
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn str_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

/// Las posiciones se muestran desde 1
fn position_option(command: &CommandInteraction) -> usize {
    int_option(command, "position")
        .and_then(|p| usize::try_from(p).ok())
        .unwrap_or(1)
        .saturating_sub(1)
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<()> {
    let query = str_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Verificar que el usuario esté en un canal de voz
    let Some(voice_channel) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .embed(embeds::create_warning_embed(
                            "Canal de voz requerido",
                            "Debes estar en un canal de voz",
                        ))
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    // Defer la respuesta ya que la búsqueda puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let target = SessionTarget {
        guild_id,
        voice_channel,
        text_channel: Some(command.channel_id),
    };

    let embed = match player.enqueue(target, query, Some(command.user.id)).await {
        Ok(receipt) if !receipt.playlist => receipt
            .snapshot
            .tracks
            .get(receipt.first_position)
            .map(|track| embeds::create_track_added_embed(track, receipt.first_position))
            .unwrap_or_else(|| embeds::create_playlist_added_embed(1, receipt.first_position)),
        Ok(receipt) => embeds::create_playlist_added_embed(receipt.added, receipt.first_position),
        Err(e) => {
            warn!(guild_id = %guild_id, "⚠️ /play falló: {}", e);
            error_embed(&e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_pause(player: &AudioPlayer, guild_id: GuildId) -> Result<CreateEmbed, QueueError> {
    player.pause(guild_id).await?;
    Ok(embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada"))
}

async fn handle_resume(player: &AudioPlayer, guild_id: GuildId) -> Result<CreateEmbed, QueueError> {
    player.resume(guild_id).await?;
    Ok(embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada"))
}

async fn handle_skip(player: &AudioPlayer, guild_id: GuildId) -> Result<CreateEmbed, QueueError> {
    let snapshot = player.skip(guild_id).await?;
    let description = match snapshot.current() {
        Some(track) if !snapshot.torn_down => format!("⏭️ Siguiente: **{}**", track.title()),
        _ => "⏭️ No quedan canciones en la cola".to_string(),
    };
    Ok(embeds::create_success_embed("Saltado", &description))
}

async fn handle_jump(
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<CreateEmbed, QueueError> {
    let snapshot = player.jump(guild_id, position_option(command)).await?;
    let title = snapshot.current().map(|t| t.title().to_string()).unwrap_or_default();
    Ok(embeds::create_success_embed("Saltando", &format!("📍 Reproduciendo **{}**", title)))
}

async fn handle_remove(
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<CreateEmbed, QueueError> {
    let position = position_option(command);
    player.remove(guild_id, position).await?;
    Ok(embeds::create_success_embed(
        "Eliminada",
        &format!("❌ Se eliminó la canción en la posición {}", position + 1),
    ))
}

async fn handle_stop(player: &AudioPlayer, guild_id: GuildId) -> Result<CreateEmbed, QueueError> {
    player.stop(guild_id).await?;
    Ok(embeds::create_success_embed("Detenido", "⏹️ Reproducción detenida y cola limpiada"))
}

async fn handle_queue(
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<CreateEmbed, QueueError> {
    let page = int_option(command, "page")
        .and_then(|p| usize::try_from(p).ok())
        .unwrap_or(1);
    let snapshot = player.snapshot(guild_id).await?;
    Ok(embeds::create_queue_embed(&snapshot, page))
}

async fn handle_nowplaying(player: &AudioPlayer, guild_id: GuildId) -> Result<CreateEmbed, QueueError> {
    let snapshot = player.snapshot(guild_id).await?;
    match snapshot.current() {
        Some(track) if snapshot.pipeline_attached => {
            Ok(embeds::create_now_playing_embed(track, &snapshot))
        }
        _ => Err(QueueError::NothingPlaying),
    }
}

async fn handle_shuffle(player: &AudioPlayer, guild_id: GuildId) -> Result<CreateEmbed, QueueError> {
    let snapshot = player.shuffle(guild_id).await?;
    Ok(embeds::create_success_embed(
        "Mezclado",
        &format!("🔀 {} canciones mezcladas", snapshot.tracks.len()),
    ))
}

async fn handle_loop(
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<CreateEmbed, QueueError> {
    let mode = str_option(command, "mode")
        .and_then(|m| RepeatMode::from_str(m).ok())
        .unwrap_or_default();
    let snapshot = player.set_repeat_mode(guild_id, mode).await?;
    Ok(embeds::create_info_embed(
        "Repetición",
        &format!("Modo de repetición: **{}**", snapshot.repeat_mode.label()),
    ))
}

async fn handle_volume(
    command: &CommandInteraction,
    player: &AudioPlayer,
    bot: &RelayBot,
    guild_id: GuildId,
) -> Result<CreateEmbed, QueueError> {
    let level = int_option(command, "level").unwrap_or(i64::from(bot.config().default_volume));
    let snapshot = player.set_volume(guild_id, level).await?;
    Ok(embeds::create_volume_embed(snapshot.volume))
}

// Funciones auxiliares

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);
    channel_id
}
