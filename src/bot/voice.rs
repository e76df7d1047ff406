//! Songbird-backed implementations of the engine's voice seams.

use async_trait::async_trait;
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    input::{HttpRequest, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        pipeline::{PipelineHandle, PipelineSignals},
        track::{SourceKind, Track},
        transport::{ConnectionSignals, Transport, VoiceConnection},
    },
    error::{PipelineError, TransportError},
};

/// Cuenta miembros humanos en un canal de voz según la caché de serenity
pub fn count_listeners(cache: &Cache, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let bot_id = cache.current_user().id;
    let Some(guild) = cache.guild(guild_id) else {
        return 0;
    };

    let count = guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .filter(|state| {
            let is_bot = state
                .member
                .as_ref()
                .map(|member| member.user.bot)
                .or_else(|| cache.user(state.user_id).map(|user| user.bot))
                .unwrap_or(false);
            !is_bot
        })
        .count();
    count
}

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, cache: Arc<Cache>) -> Self {
        Self {
            manager,
            cache,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        signals: ConnectionSignals,
    ) -> Result<Arc<dyn VoiceConnection>, TransportError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| TransportError::Join(e.to_string()))?;

        {
            let mut handler = call.lock().await;
            // Un solo observador de desconexión por llamada
            handler.remove_all_global_events();
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectForwarder { signals },
            );
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdConnection {
            call,
            http: self.http.clone(),
        }))
    }

    async fn disconnect(&self, guild_id: GuildId) {
        if let Err(e) = self.manager.remove(guild_id).await {
            debug!("Desconexión de guild {} ignorada: {:?}", guild_id, e);
        } else {
            info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        }
    }

    async fn listener_count(&self, guild_id: GuildId, channel_id: ChannelId) -> usize {
        count_listeners(&self.cache, guild_id, channel_id)
    }
}

struct DisconnectForwarder {
    signals: ConnectionSignals,
}

#[async_trait]
impl VoiceEventHandler for DisconnectForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            // Sin razón = desconexión pedida por nosotros
            if let Some(reason) = &data.reason {
                warn!("🔌 Driver de voz desconectado en guild {:?}: {:?}", data.guild_id, reason);
                self.signals.disconnected();
            }
        }
        None
    }
}

pub struct SongbirdConnection {
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
}

impl SongbirdConnection {
    fn input_for(&self, track: &Track) -> Input {
        match track.source() {
            SourceKind::YouTube => YoutubeDl::new(self.http.clone(), track.source_url().to_string()).into(),
            SourceKind::DirectUrl => HttpRequest::new(self.http.clone(), track.source_url().to_string()).into(),
        }
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn open(
        &self,
        track: &Track,
        volume: u8,
        signals: PipelineSignals,
    ) -> Result<Box<dyn PipelineHandle>, PipelineError> {
        let input = self.input_for(track);
        let generation = signals.generation();

        let handle = {
            let mut call = self.call.lock().await;
            if call.current_channel().is_none() {
                return Err(PipelineError::Transport(TransportError::NotConnected));
            }
            call.play_input(input)
        };

        handle
            .set_volume(f32::from(volume) / 100.0)
            .map_err(|e| PipelineError::Sink(e.to_string()))?;
        handle
            .add_event(Event::Track(TrackEvent::End), TrackEndForwarder { signals: signals.clone() })
            .map_err(|e| PipelineError::Sink(e.to_string()))?;
        handle
            .add_event(Event::Track(TrackEvent::Error), TrackErrorForwarder { signals })
            .map_err(|e| PipelineError::Sink(e.to_string()))?;

        debug!(generation, "🎵 Pipeline abierto para: {}", track.title());
        Ok(Box::new(SongbirdPipeline { handle }))
    }
}

struct TrackEndForwarder {
    signals: PipelineSignals,
}

#[async_trait]
impl VoiceEventHandler for TrackEndForwarder {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.signals.ended();
        None
    }
}

struct TrackErrorForwarder {
    signals: PipelineSignals,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let message = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(format!("{e:?}")),
                    _ => None,
                })
                .unwrap_or_else(|| "Error desconocido en el stream".to_string()),
            _ => "Error desconocido en el stream".to_string(),
        };
        self.signals.failed(message);
        None
    }
}

/// Track de songbird en reproducción
pub struct SongbirdPipeline {
    handle: TrackHandle,
}

impl PipelineHandle for SongbirdPipeline {
    fn set_volume(&self, volume: u8) {
        if let Err(e) = self.handle.set_volume(f32::from(volume) / 100.0) {
            debug!("No se pudo ajustar el volumen: {:?}", e);
        }
    }

    fn pause(&self) {
        if let Err(e) = self.handle.pause() {
            debug!("No se pudo pausar: {:?}", e);
        }
    }

    fn resume(&self) {
        if let Err(e) = self.handle.play() {
            debug!("No se pudo reanudar: {:?}", e);
        }
    }

    fn release(&self) {
        // El track puede haber terminado solo; detenerlo de nuevo es inofensivo
        let _ = self.handle.stop();
    }
}
