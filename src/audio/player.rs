use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    events::QueueEvent,
    registry::SessionRegistry,
    session::{EnqueueReceipt, RepeatMode, SessionHandle, SessionSnapshot, SessionTarget},
    track::Track,
};
use crate::{
    error::{QueueError, ResolveError},
    sources::Resolver,
};

/// Public face of the engine for the command layer.
///
/// Every operation addresses a guild; operations other than `enqueue` fail
/// with [`QueueError::NoSession`] when the guild has no live session.
pub struct AudioPlayer {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn Resolver>,
}

impl AudioPlayer {
    pub fn new(registry: Arc<SessionRegistry>, resolver: Arc<dyn Resolver>) -> Self {
        Self { registry, resolver }
    }

    /// Resuelve `query`, lo agrega a la cola y arranca la reproducción si la
    /// sesión estaba inactiva.
    ///
    /// Resolution happens before the session is looked up, so a failed search
    /// never creates a session.
    pub async fn enqueue(
        &self,
        target: SessionTarget,
        query: &str,
        requester: Option<UserId>,
    ) -> Result<EnqueueReceipt, QueueError> {
        let resolved = self.resolver.resolve(query).await?;
        let playlist = resolved.is_playlist();
        let tracks = resolved.into_tracks();
        debug!(guild_id = %target.guild_id, "🔎 {} tracks resueltos para '{}'", tracks.len(), query);

        // Una playlist vacía no debe crear sesión
        if tracks.is_empty() {
            return Err(ResolveError::NotFound(query.to_string()).into());
        }

        let session = self.registry.get_or_create(target)?;
        match Self::add(&session, tracks.clone(), requester, playlist).await {
            // La sesión terminó entre la búsqueda y el enqueue; se crea otra
            Err(QueueError::SessionClosed) => {
                info!(guild_id = %target.guild_id, "♻️ Sesión cerrada durante el enqueue, reintentando");
                let session = self.registry.get_or_create(target)?;
                Self::add(&session, tracks, requester, playlist).await
            }
            other => other,
        }
    }

    async fn add(
        session: &SessionHandle,
        tracks: Vec<Track>,
        requester: Option<UserId>,
        playlist: bool,
    ) -> Result<EnqueueReceipt, QueueError> {
        if playlist {
            session.enqueue_playlist(tracks, requester).await
        } else {
            session.enqueue_and_start(tracks, requester).await
        }
    }

    fn session(&self, guild_id: GuildId) -> Result<SessionHandle, QueueError> {
        self.registry.get(guild_id).ok_or(QueueError::NoSession)
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.registry.get(guild_id)
    }

    pub async fn play(&self, guild_id: GuildId) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.play().await
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.resume().await
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.skip().await
    }

    pub async fn jump(&self, guild_id: GuildId, position: usize) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.jump(position).await
    }

    pub async fn remove(&self, guild_id: GuildId, position: usize) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.remove(position).await
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.stop().await
    }

    pub async fn shuffle(&self, guild_id: GuildId) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.shuffle().await
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: i64) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.set_volume(volume).await
    }

    pub async fn set_repeat_mode(
        &self,
        guild_id: GuildId,
        mode: RepeatMode,
    ) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.set_repeat_mode(mode).await
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Result<SessionSnapshot, QueueError> {
        self.session(guild_id)?.snapshot().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.registry.events().subscribe()
    }

    pub fn notify_room_empty(&self, guild_id: GuildId) {
        self.registry.notify_room_empty(guild_id);
    }

    /// Apaga todas las sesiones (cierre del proceso)
    pub async fn destroy_all(&self) {
        self.registry.destroy_all().await;
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}
