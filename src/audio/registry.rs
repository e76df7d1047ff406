use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info};

use super::{
    events::EventBus,
    session::{self, SessionHandle, SessionId, SessionMap, SessionTarget},
    transport::Transport,
};
use crate::{config::SessionSettings, error::QueueError};

/// Única fuente de verdad `guild → sesión`.
///
/// The map itself is never handed out: sessions are created through
/// [`SessionRegistry::get_or_create`] and leave it on their own when they are
/// torn down.
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    transport: Arc<dyn Transport>,
    events: EventBus,
    settings: Arc<SessionSettings>,
    next_id: AtomicU64,
    closing: AtomicBool,
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn Transport>, events: EventBus, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            transport,
            events,
            settings: Arc::new(settings),
            next_id: AtomicU64::new(1),
            closing: AtomicBool::new(false),
        }
    }

    /// Returns the live session for the guild, creating it if there is none.
    ///
    /// Concurrent callers for the same guild always get the same session: the
    /// lookup and the insertion happen under the map's entry lock.
    pub fn get_or_create(&self, target: SessionTarget) -> Result<SessionHandle, QueueError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(QueueError::ShuttingDown);
        }

        let entry = self.sessions.entry(target.guild_id);
        // Revisado de nuevo bajo el lock: destroy_all pudo empezar entre medio
        if self.closing.load(Ordering::SeqCst) {
            return Err(QueueError::ShuttingDown);
        }

        let handle = match entry {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    // Sesión terminada que aún no salió del mapa
                    let handle = self.spawn_session(target);
                    entry.insert(handle.clone());
                    handle
                } else {
                    entry.get().clone()
                }
            }
            Entry::Vacant(entry) => {
                let handle = self.spawn_session(target);
                entry.insert(handle.clone());
                handle
            }
        };

        Ok(handle)
    }

    fn spawn_session(&self, target: SessionTarget) -> SessionHandle {
        let id: SessionId = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(guild_id = %target.guild_id, session = id, "Creando sesión");

        session::spawn(
            id,
            target,
            self.settings.clone(),
            self.transport.clone(),
            self.events.clone(),
            Arc::downgrade(&self.sessions),
        )
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Destroys the guild's session, if any. Returns whether one existed.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some(handle) = self.get(guild_id) else {
            return false;
        };

        handle.destroy().await;
        self.sessions
            .remove_if(&guild_id, |_, current| current.id() == handle.id());
        true
    }

    pub fn len(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forwards a "room reached zero listeners" notification to the session.
    pub fn notify_room_empty(&self, guild_id: GuildId) {
        if let Some(handle) = self.get(guild_id) {
            handle.notify_room_empty();
        }
    }

    /// Apaga todas las sesiones; ninguna sesión nueva se crea después.
    ///
    /// Repeats until the map is empty, so a session registered while a round
    /// was in flight is destroyed too instead of being dropped from the map
    /// while still running.
    pub async fn destroy_all(&self) {
        self.closing.store(true, Ordering::SeqCst);

        loop {
            let handles: Vec<SessionHandle> = self
                .sessions
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            if handles.is_empty() {
                break;
            }

            info!("🛑 Cerrando {} sesiones", handles.len());
            futures::future::join_all(handles.iter().map(|handle| handle.destroy())).await;

            // Las ya cerradas no se quitan solas del mapa
            for handle in &handles {
                self.sessions
                    .remove_if(&handle.guild_id(), |_, current| current.id() == handle.id());
            }
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
