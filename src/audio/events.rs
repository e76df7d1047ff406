//! Lifecycle events published by sessions.
//!
//! Publishing goes through a [`tokio::sync::broadcast`] channel: sending never
//! waits on subscribers, a slow subscriber only lags its own receiver, and a
//! subscriber that fails or panics is isolated inside its own task.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};

use super::{
    session::{RepeatMode, SessionSnapshot},
    track::Track,
};

/// Qué pasó en la sesión
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEventKind {
    /// La cola vacía recibió sus primeros tracks
    QueueCreated,
    TrackAdded { track: Arc<Track>, position: usize },
    PlaylistAdded { count: usize, first_position: usize },
    TrackStarted { track: Arc<Track> },
    TrackRemoved { track: Arc<Track>, position: usize },
    Paused,
    Resumed,
    Shuffled,
    VolumeChanged { volume: u8 },
    RepeatModeChanged { mode: RepeatMode },
    Stopped,
    Finished,
    /// Teardown por canal vacío
    Empty,
    Disconnected,
    Reconnected,
    /// Sesión destruida explícitamente (remove / apagado)
    Destroyed,
    Error { track: Option<Arc<Track>>, message: String },
}

/// Evento con el estado de la sesión después de la transición
#[derive(Debug, Clone)]
pub struct QueueEvent {
    pub session: Arc<SessionSnapshot>,
    pub kind: QueueEventKind,
    pub at: DateTime<Utc>,
}

/// Fire-and-forget publisher shared by every session.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    /// Publica sin esperar; sin suscriptores el evento se descarta.
    pub fn publish(&self, session: SessionSnapshot, kind: QueueEventKind) {
        let event = QueueEvent {
            session: Arc::new(session),
            kind,
            at: Utc::now(),
        };
        if self.sender.send(event).is_err() {
            debug!("Evento sin suscriptores");
        }
    }

    /// Runs `handler` for every event on its own task until the bus is dropped.
    ///
    /// Errors are logged, panics are caught per event, and lagging only skips
    /// the missed events for this subscriber.
    pub fn spawn_subscriber<F, Fut>(&self, name: &'static str, handler: F) -> JoinHandle<()>
    where
        F: Fn(QueueEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut receiver = self.subscribe();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => match AssertUnwindSafe(async { handler(event).await })
                        .catch_unwind()
                        .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(subscriber = name, "⚠️ Error en suscriptor: {:?}", e),
                        Err(_) => warn!(subscriber = name, "⚠️ Suscriptor entró en pánico"),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(subscriber = name, "⏩ Suscriptor atrasado, {} eventos perdidos", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(subscriber = name, "Suscriptor finalizado");
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
