use async_trait::async_trait;
use url::Url;

use super::{Resolved, Resolver};
use crate::{
    audio::track::{SourceKind, Track},
    error::ResolveError,
};

const AUDIO_EXTENSIONS: [&str; 7] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus", ".aac"];

/// Archivos de audio servidos directamente por HTTP
#[derive(Debug, Default)]
pub struct DirectUrlResolver;

impl DirectUrlResolver {
    pub fn new() -> Self {
        Self
    }

    /// URL http(s) cuyo path termina en una extensión de audio conocida
    pub fn is_audio_url(input: &str) -> bool {
        let Ok(url) = Url::parse(input) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        let path = url.path().to_lowercase();
        AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

#[async_trait]
impl Resolver for DirectUrlResolver {
    async fn resolve(&self, input: &str) -> Result<Resolved, ResolveError> {
        let url = Url::parse(input.trim()).map_err(|e| ResolveError::Invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ResolveError::Invalid(format!("Esquema no soportado: {}", url.scheme())));
        }

        let title = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(file_title)
            .unwrap_or_else(|| url.host_str().unwrap_or("Audio").to_string());

        let track = Track::new(url.as_str(), title, url.as_str(), SourceKind::DirectUrl);
        Ok(Resolved::Track(track))
    }
}

/// Nombre de archivo sin extensión ni escapes `%20`
fn file_title(name: &str) -> String {
    let name = name.replace("%20", " ");
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}
