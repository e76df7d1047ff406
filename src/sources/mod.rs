pub mod direct_url;
pub mod youtube;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::{audio::track::Track, error::ResolveError};

pub use direct_url::DirectUrlResolver;
pub use youtube::YouTubeResolver;

/// Resultado de resolver una entrada del usuario
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Track(Track),
    Playlist { title: String, tracks: Vec<Track> },
}

impl Resolved {
    pub fn into_tracks(self) -> Vec<Track> {
        match self {
            Resolved::Track(track) => vec![track],
            Resolved::Playlist { tracks, .. } => tracks,
        }
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self, Resolved::Playlist { .. })
    }
}

/// Convierte texto libre o una URL en tracks reproducibles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, input: &str) -> Result<Resolved, ResolveError>;
}

/// Routes each input to the resolver that understands it: YouTube links and
/// free text go to yt-dlp, direct audio files are streamed over HTTP.
pub struct SmartResolver {
    youtube: Arc<dyn Resolver>,
    direct: Arc<dyn Resolver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    YouTube,
    Direct,
    Search,
}

impl SmartResolver {
    pub fn new(youtube: Arc<dyn Resolver>, direct: Arc<dyn Resolver>) -> Self {
        Self { youtube, direct }
    }

    fn route(input: &str) -> Route {
        if YouTubeResolver::is_youtube_url(input) {
            Route::YouTube
        } else if DirectUrlResolver::is_audio_url(input) {
            Route::Direct
        } else if input.starts_with("http://") || input.starts_with("https://") {
            // yt-dlp entiende muchos otros sitios
            Route::YouTube
        } else {
            Route::Search
        }
    }
}

#[async_trait]
impl Resolver for SmartResolver {
    async fn resolve(&self, input: &str) -> Result<Resolved, ResolveError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ResolveError::EmptyQuery);
        }

        let route = Self::route(input);
        debug!(?route, "🧭 Resolviendo: {}", input);

        match route {
            Route::YouTube => self.youtube.resolve(input).await,
            Route::Direct => self.direct.resolve(input).await,
            Route::Search => self.youtube.resolve(&format!("ytsearch1:{input}")).await,
        }
    }
}
