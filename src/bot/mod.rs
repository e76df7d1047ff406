//! # Bot Module
//!
//! Discord front end for the queue engine.
//!
//! - Command registration and handling
//! - Voice adapters for songbird ([`voice`])
//! - Membership tracking from voice state updates
//! - Event announcements into the session's text channel ([`announcer`])
//!
//! ## Architecture
//!
//! [`RelayBot`] implements serenity's [`EventHandler`]. The [`AudioPlayer`] is
//! built after the client (its transport needs the client's cache) and is
//! stored in the client's `TypeMap` under [`PlayerKey`].

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;
pub mod voice;

use crate::{audio::player::AudioPlayer, config::Config};

/// Clave del `TypeMap` donde vive el reproductor
pub struct PlayerKey;

impl TypeMapKey for PlayerKey {
    type Value = Arc<AudioPlayer>;
}

/// Obtiene el reproductor registrado en el contexto
pub async fn player(ctx: &Context) -> Result<Arc<AudioPlayer>> {
    ctx.data
        .read()
        .await
        .get::<PlayerKey>()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Reproductor no inicializado"))
}

/// Serenity event handler for the relay bot.
pub struct RelayBot {
    /// Configuración cargada del entorno
    config: Arc<Config>,
}

impl RelayBot {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers slash commands, per guild when `GUILD_ID` is set (instant
    /// propagation) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Canal de voz donde está el bot según songbird
    async fn bot_channel(ctx: &Context, guild_id: GuildId) -> Option<ChannelId> {
        let manager = songbird::get(ctx).await?;
        let call = manager.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::from(channel.0))
    }
}

#[async_trait]
impl EventHandler for RelayBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Reports "nobody left listening" to the guild's session whenever a voice
    /// state change leaves the bot's channel without human members.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        if new.user_id == ctx.cache.current_user().id && old.is_some() && new.channel_id.is_none() {
            info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
            return;
        }

        let Some(channel_id) = Self::bot_channel(&ctx, guild_id).await else {
            return;
        };

        let listeners = voice::count_listeners(&ctx.cache, guild_id, channel_id);
        debug!(guild_id = %guild_id, listeners, "Cambio de estado de voz");

        if listeners == 0 {
            match player(&ctx).await {
                Ok(player) => player.notify_room_empty(guild_id),
                Err(e) => warn!("⚠️ {}", e),
            }
        }
    }
}
