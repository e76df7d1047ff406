use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{Resolved, Resolver};
use crate::{
    audio::track::{SourceKind, Track},
    error::ResolveError,
};

static YOUTUBE_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/|playlist\?list=)|youtu\.be/|music\.youtube\.com/)",
    )
    .ok()
});

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    #[serde(rename = "_type")]
    kind: Option<String>,
    entries: Option<Vec<YtDlpInfo>>,
}

impl YtDlpInfo {
    fn into_track(self) -> Option<Track> {
        let url = self
            .webpage_url
            .or(self.url)
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.id));
        let title = self.title?;

        let mut track = Track::new(self.id, title, url, SourceKind::YouTube);
        if let Some(artist) = self.uploader.or(self.channel) {
            track = track.with_artist(artist);
        }
        if let Some(duration) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(duration));
        }
        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        Some(track)
    }
}

/// Resolver respaldado por yt-dlp (URLs de YouTube, playlists y búsquedas)
pub struct YouTubeResolver {
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
    max_playlist_size: usize,
}

impl YouTubeResolver {
    pub fn new(max_playlist_size: usize) -> Self {
        Self {
            rate_limiter: Semaphore::new(3),
            max_playlist_size: max_playlist_size.max(1),
        }
    }

    /// Verifica si una URL es de YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL.as_ref().is_some_and(|re| re.is_match(url))
    }

    fn is_playlist_url(url: &str) -> bool {
        url.contains("list=") && !url.contains("watch?v=")
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Backend(e.to_string()))?;

        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .map_err(|e| ResolveError::Backend(format!("Error al ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp error: {}", stderr.trim());
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn resolve_playlist(&self, url: &str) -> Result<Resolved, ResolveError> {
        info!("📋 Obteniendo playlist: {}", url);

        let limit = self.max_playlist_size.to_string();
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-single-json",
                "--playlist-end",
                &limit,
                "--no-warnings",
                url,
            ])
            .await?;

        let info: YtDlpInfo = serde_json::from_str(&stdout)
            .map_err(|e| ResolveError::Backend(format!("Respuesta de yt-dlp inválida: {e}")))?;
        let title = info.title.clone().unwrap_or_else(|| "Playlist".to_string());

        let tracks: Vec<Track> = info
            .entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(YtDlpInfo::into_track)
            .take(self.max_playlist_size)
            .collect();

        if tracks.is_empty() {
            return Err(ResolveError::NotFound(url.to_string()));
        }

        info!("✅ Playlist '{}' con {} canciones", title, tracks.len());
        Ok(Resolved::Playlist { title, tracks })
    }

    async fn resolve_single(&self, input: &str) -> Result<Resolved, ResolveError> {
        debug!("📊 Obteniendo info de: {}", input);

        let stdout = self
            .run(&["--no-playlist", "--dump-single-json", "--skip-download", "--no-warnings", input])
            .await?;

        let info: YtDlpInfo = serde_json::from_str(&stdout)
            .map_err(|e| ResolveError::Backend(format!("Respuesta de yt-dlp inválida: {e}")))?;

        // Las búsquedas ytsearchN: devuelven una playlist con N entradas
        let info = if info.kind.as_deref() == Some("playlist") {
            info.entries
                .and_then(|entries| entries.into_iter().next())
                .ok_or_else(|| ResolveError::NotFound(input.to_string()))?
        } else {
            info
        };

        info.into_track()
            .map(Resolved::Track)
            .ok_or_else(|| ResolveError::NotFound(input.to_string()))
    }

    /// Comprueba que yt-dlp está instalado (usado por `--health-check`)
    pub async fn check_available() -> Result<String, ResolveError> {
        let output = Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await
            .map_err(|e| ResolveError::Backend(format!("yt-dlp no está disponible: {e}")))?;

        if !output.status.success() {
            return Err(ResolveError::Backend("yt-dlp no puede ejecutarse correctamente".into()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Resolver for YouTubeResolver {
    async fn resolve(&self, input: &str) -> Result<Resolved, ResolveError> {
        let input = input.trim();
        if input.is_empty() || input.ends_with(':') {
            return Err(ResolveError::EmptyQuery);
        }

        if Self::is_playlist_url(input) {
            self.resolve_playlist(input).await
        } else {
            self.resolve_single(input).await
        }
    }
}

fn classify_failure(stderr: &str) -> ResolveError {
    let lower = stderr.to_lowercase();
    if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("does not exist")
        || lower.contains("no video results")
    {
        ResolveError::NotFound(stderr.trim().to_string())
    } else if lower.contains("unsupported url") || lower.contains("is not a valid url") {
        ResolveError::Invalid(stderr.trim().to_string())
    } else {
        ResolveError::Backend(stderr.trim().to_string())
    }
}
