use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::time::Duration;

/// Origen de un track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    YouTube,
    DirectUrl,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "YouTube",
            SourceKind::DirectUrl => "URL directa",
        }
    }
}

/// Playable item metadata.
///
/// A `Track` never changes after construction. The requester is attached when
/// the track is enqueued, which produces a new value rather than mutating the
/// resolved one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    id: String,
    title: String,
    artist: Option<String>,
    source_url: String,
    duration: Option<Duration>,
    thumbnail_url: Option<String>,
    requested_by: Option<UserId>,
    source: SourceKind,
}

impl Track {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source_url: impl Into<String>,
        source: SourceKind,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: None,
            source_url: source_url.into(),
            duration: None,
            thumbnail_url: None,
            requested_by: None,
            source,
        }
    }

    // Getters
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn source_url(&self) -> &str {
        &self.source_url
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn duration_secs(&self) -> Option<u64> {
        self.duration.map(|d| d.as_secs())
    }
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }
    pub fn source(&self) -> SourceKind {
        self.source
    }

    // Builders
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    /// Copia del track con el solicitante de la llamada a enqueue.
    pub(crate) fn requested(&self, requester: Option<UserId>) -> Self {
        Self {
            requested_by: requester,
            ..self.clone()
        }
    }
}
