use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::{
    pipeline::{PipelineHandle, PipelineSignals},
    session::SessionCommand,
    track::Track,
};
use crate::error::{PipelineError, TransportError};

/// Supplies voice connections for guilds and answers membership questions.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Joins `channel_id`; joining again while connected reuses the call.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        signals: ConnectionSignals,
    ) -> Result<Arc<dyn VoiceConnection>, TransportError>;

    /// Best effort: never fails, even if nothing is connected.
    async fn disconnect(&self, guild_id: GuildId);

    /// Non-bot members currently in the channel the bot occupies.
    async fn listener_count(&self, guild_id: GuildId, channel_id: ChannelId) -> usize;
}

/// Connected audio sink able to open pipelines for tracks.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn open(
        &self,
        track: &Track,
        volume: u8,
        signals: PipelineSignals,
    ) -> Result<Box<dyn PipelineHandle>, PipelineError>;
}

/// Reporta caídas de la conexión a la sesión dueña
#[derive(Debug, Clone)]
pub struct ConnectionSignals {
    mailbox: UnboundedSender<SessionCommand>,
}

impl ConnectionSignals {
    pub(crate) fn new(mailbox: UnboundedSender<SessionCommand>) -> Self {
        Self { mailbox }
    }

    pub fn disconnected(&self) {
        if self.mailbox.send(SessionCommand::ConnectionLost).is_err() {
            debug!("Desconexión de una sesión cerrada, descartada");
        }
    }
}
