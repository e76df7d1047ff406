//! Typed failures returned by the queue engine and its collaborators.
//!
//! Only conditions a caller can act on are surfaced here. Pipeline and
//! connection failures that the engine recovers from on its own are reported
//! as [`QueueEventKind::Error`](crate::audio::events::QueueEventKind::Error)
//! events instead.

use thiserror::Error;

/// Errores de las operaciones públicas de la cola.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("La cola está vacía")]
    EmptyQueue,

    #[error("Posición {position} fuera de rango (la cola tiene {len} canciones)")]
    InvalidPosition { position: usize, len: usize },

    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("No hay una sesión activa en este servidor")]
    NoSession,

    #[error("La sesión fue cerrada")]
    SessionClosed,

    #[error("El reproductor se está apagando")]
    ShuttingDown,

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Errores al convertir la entrada del usuario en tracks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No se encontraron resultados para: {0}")]
    NotFound(String),

    #[error("La búsqueda está vacía")]
    EmptyQuery,

    #[error("Entrada inválida: {0}")]
    Invalid(String),

    #[error("Error de la fuente: {0}")]
    Backend(String),
}

/// Errores del adaptador de transporte de voz.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("No se pudo conectar al canal de voz: {0}")]
    Join(String),

    #[error("Tiempo de espera agotado al conectar")]
    Timeout,

    #[error("No hay conexión de voz")]
    NotConnected,
}

/// Errores al abrir un pipeline de audio.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Error en la fuente de audio: {0}")]
    Source(String),

    #[error("Error en el destino de audio: {0}")]
    Sink(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
