//! Per-guild session: queue, cursor, playback state machine and the resources
//! it owns (one media pipeline, one idle timer, one voice connection).
//!
//! Every session runs as its own task and applies commands one at a time from
//! its mailbox. User operations, pipeline reports, connection reports and
//! delayed transitions all enter through that mailbox, so two transitions of
//! the same session never interleave while different sessions run fully in
//! parallel.

use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    str::FromStr,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{
    events::{EventBus, QueueEventKind},
    history::History,
    pipeline::{PipelineSignals, PipelineSlot},
    transport::{ConnectionSignals, Transport, VoiceConnection},
    track::Track,
};
use crate::{
    config::SessionSettings,
    error::{QueueError, TransportError},
};

pub type SessionId = u64;

pub(crate) type SessionMap = DashMap<GuildId, SessionHandle>;

type Reply<T> = oneshot::Sender<Result<T, QueueError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl RepeatMode {
    pub fn label(&self) -> &'static str {
        match self {
            RepeatMode::Off => "Desactivado",
            RepeatMode::Track => "Canción",
            RepeatMode::Queue => "Cola",
        }
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "track" => Ok(RepeatMode::Track),
            "queue" => Ok(RepeatMode::Queue),
            other => Err(format!("Modo de repetición desconocido: {other}")),
        }
    }
}

/// Where a session plays and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTarget {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub text_channel: Option<ChannelId>,
}

/// Immutable view of a session at one point in its life.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub text_channel: Option<ChannelId>,
    pub tracks: Vec<Arc<Track>>,
    pub cursor: usize,
    pub state: PlaybackState,
    pub repeat_mode: RepeatMode,
    pub volume: u8,
    pub history: Vec<Arc<Track>>,
    pub pipeline_attached: bool,
    pub idle_timer_pending: bool,
    pub torn_down: bool,
}

impl SessionSnapshot {
    pub fn current(&self) -> Option<&Arc<Track>> {
        self.tracks.get(self.cursor)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks después del actual
    pub fn upcoming(&self) -> &[Arc<Track>] {
        self.tracks.get(self.cursor + 1..).unwrap_or(&[])
    }

    /// Duración conocida desde el track actual hasta el final
    pub fn total_duration(&self) -> Duration {
        self.tracks
            .iter()
            .skip(self.cursor)
            .filter_map(|t| t.duration())
            .sum()
    }

    /// Obtiene una página específica de la cola (1-based)
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        let per_page = per_page.max(1);
        let total_items = self.tracks.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;

        QueuePage {
            items: self
                .tracks
                .iter()
                .enumerate()
                .skip(start)
                .take(per_page)
                .map(|(position, track)| (position, track.clone()))
                .collect(),
            current_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub items: Vec<(usize, Arc<Track>)>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Resultado de un enqueue
#[derive(Debug, Clone)]
pub struct EnqueueReceipt {
    pub snapshot: SessionSnapshot,
    pub first_position: usize,
    pub added: usize,
    /// Se anunció como playlist (un solo evento agregado)
    pub playlist: bool,
}

/// Transitions applied after a delay, tagged with the pipeline generation
/// they were scheduled under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deferred {
    ReplayTrack,
    ForcedAdvance,
}

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Enqueue {
        tracks: Vec<Track>,
        requester: Option<UserId>,
        playlist: bool,
        autostart: bool,
        reply: Reply<EnqueueReceipt>,
    },
    Play { reply: Reply<SessionSnapshot> },
    Pause { reply: Reply<SessionSnapshot> },
    Resume { reply: Reply<SessionSnapshot> },
    Skip { reply: Reply<SessionSnapshot> },
    Jump { position: usize, reply: Reply<SessionSnapshot> },
    Remove { position: usize, reply: Reply<SessionSnapshot> },
    Stop { reply: Reply<SessionSnapshot> },
    Shuffle { reply: Reply<SessionSnapshot> },
    SetVolume { volume: i64, reply: Reply<SessionSnapshot> },
    SetRepeatMode { mode: RepeatMode, reply: Reply<SessionSnapshot> },
    Snapshot { reply: Reply<SessionSnapshot> },
    Destroy { reply: oneshot::Sender<()> },
    RoomEmpty,
    IdleTimerFired { token: u64 },
    PipelineEnded { generation: u64 },
    PipelineFailed { generation: u64, error: String },
    ConnectionLost,
    Deferred { generation: u64, transition: Deferred },
}

/// Cheap, cloneable address of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    guild_id: GuildId,
    mailbox: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// La tarea de la sesión terminó (teardown completado)
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, QueueError> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(build(reply))
            .map_err(|_| QueueError::SessionClosed)?;
        response.await.map_err(|_| QueueError::SessionClosed)?
    }

    /// Appends tracks in the given order without starting playback.
    pub async fn enqueue(
        &self,
        tracks: Vec<Track>,
        requester: Option<UserId>,
    ) -> Result<EnqueueReceipt, QueueError> {
        let playlist = tracks.len() > 1;
        self.request(|reply| SessionCommand::Enqueue {
            tracks,
            requester,
            playlist,
            autostart: false,
            reply,
        })
        .await
    }

    /// Appends tracks and starts playback in the same step if the session is idle.
    pub async fn enqueue_and_start(
        &self,
        tracks: Vec<Track>,
        requester: Option<UserId>,
    ) -> Result<EnqueueReceipt, QueueError> {
        let playlist = tracks.len() > 1;
        self.request(|reply| SessionCommand::Enqueue {
            tracks,
            requester,
            playlist,
            autostart: true,
            reply,
        })
        .await
    }

    /// Like [`enqueue_and_start`](Self::enqueue_and_start), but always
    /// announced as one playlist, whatever its length.
    pub async fn enqueue_playlist(
        &self,
        tracks: Vec<Track>,
        requester: Option<UserId>,
    ) -> Result<EnqueueReceipt, QueueError> {
        self.request(|reply| SessionCommand::Enqueue {
            tracks,
            requester,
            playlist: true,
            autostart: true,
            reply,
        })
        .await
    }

    pub async fn play(&self) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::Resume { reply }).await
    }

    pub async fn skip(&self) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::Skip { reply }).await
    }

    pub async fn jump(&self, position: usize) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::Jump { position, reply })
            .await
    }

    pub async fn remove(&self, position: usize) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::Remove { position, reply })
            .await
    }

    pub async fn stop(&self) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    pub async fn shuffle(&self) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::Shuffle { reply }).await
    }

    pub async fn set_volume(&self, volume: i64) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::SetVolume { volume, reply })
            .await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::SetRepeatMode { mode, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, QueueError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Notifica que el canal de voz quedó sin miembros humanos.
    pub fn notify_room_empty(&self) {
        if self.mailbox.send(SessionCommand::RoomEmpty).is_err() {
            debug!(guild_id = %self.guild_id, "Aviso de canal vacío para una sesión cerrada");
        }
    }

    /// Tears the session down and waits until its resources are released.
    /// Destroying an already closed session is a no-op.
    pub async fn destroy(&self) {
        let (reply, done) = oneshot::channel();
        if self.mailbox.send(SessionCommand::Destroy { reply }).is_ok() {
            let _ = done.await;
        }
    }
}

struct IdleTimer {
    token: u64,
    task: JoinHandle<()>,
}

/// What to do when advancing runs past the last track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exhausted {
    Stop,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Next,
    Ended,
}

struct SessionActor {
    id: SessionId,
    target: SessionTarget,
    settings: Arc<SessionSettings>,
    transport: Arc<dyn Transport>,
    events: EventBus,
    registry: Weak<SessionMap>,
    mailbox: mpsc::UnboundedSender<SessionCommand>,

    tracks: Vec<Arc<Track>>,
    cursor: usize,
    state: PlaybackState,
    repeat_mode: RepeatMode,
    volume: u8,
    history: History,

    pipeline: PipelineSlot,
    generation: u64,
    connection: Option<Arc<dyn VoiceConnection>>,
    idle_timer: Option<IdleTimer>,
    timer_seq: u64,
    /// Generación bajo la que se programó la última transición diferida
    scheduled: Option<u64>,
    torn_down: bool,
}

/// Spawns the session task and returns its handle.
pub(crate) fn spawn(
    id: SessionId,
    target: SessionTarget,
    settings: Arc<SessionSettings>,
    transport: Arc<dyn Transport>,
    events: EventBus,
    registry: Weak<SessionMap>,
) -> SessionHandle {
    let (mailbox, inbox) = mpsc::unbounded_channel();

    let actor = SessionActor {
        id,
        target,
        volume: settings.default_volume.min(100),
        settings,
        transport,
        events,
        registry,
        mailbox: mailbox.clone(),
        tracks: Vec::new(),
        cursor: 0,
        state: PlaybackState::Idle,
        repeat_mode: RepeatMode::Off,
        history: History::default(),
        pipeline: PipelineSlot::default(),
        generation: 0,
        connection: None,
        idle_timer: None,
        timer_seq: 0,
        scheduled: None,
        torn_down: false,
    };

    tokio::spawn(actor.run(inbox));

    SessionHandle {
        id,
        guild_id: target.guild_id,
        mailbox,
    }
}

impl SessionActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionCommand>) {
        info!(guild_id = %self.target.guild_id, session = self.id, "🎶 Sesión creada");

        while let Some(command) = inbox.recv().await {
            self.handle(command).await;
            if self.torn_down {
                break;
            }
        }

        // Lo que quede en el buzón se descarta; los que esperan respuesta
        // reciben SessionClosed.
        inbox.close();
        info!(guild_id = %self.target.guild_id, session = self.id, "👋 Sesión finalizada");
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Enqueue {
                tracks,
                requester,
                playlist,
                autostart,
                reply,
            } => {
                let result = self.enqueue(tracks, requester, playlist, autostart).await;
                let _ = reply.send(result);
            }
            SessionCommand::Play { reply } => {
                let result = self.play().await;
                let _ = reply.send(result);
            }
            SessionCommand::Pause { reply } => {
                let _ = reply.send(Ok(self.pause()));
            }
            SessionCommand::Resume { reply } => {
                let _ = reply.send(Ok(self.resume()));
            }
            SessionCommand::Skip { reply } => {
                let result = self.skip().await;
                let _ = reply.send(result);
            }
            SessionCommand::Jump { position, reply } => {
                let result = self.jump(position).await;
                let _ = reply.send(result);
            }
            SessionCommand::Remove { position, reply } => {
                let result = self.remove(position).await;
                let _ = reply.send(result);
            }
            SessionCommand::Stop { reply } => {
                self.stop(Exhausted::Stop).await;
                let _ = reply.send(Ok(self.snapshot()));
            }
            SessionCommand::Shuffle { reply } => {
                let _ = reply.send(Ok(self.shuffle()));
            }
            SessionCommand::SetVolume { volume, reply } => {
                let _ = reply.send(Ok(self.set_volume(volume)));
            }
            SessionCommand::SetRepeatMode { mode, reply } => {
                let _ = reply.send(Ok(self.set_repeat_mode(mode)));
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            SessionCommand::Destroy { reply } => {
                self.teardown(Some(QueueEventKind::Destroyed)).await;
                let _ = reply.send(());
            }
            SessionCommand::RoomEmpty => self.schedule_idle_timer(),
            SessionCommand::IdleTimerFired { token } => self.idle_timer_fired(token).await,
            SessionCommand::PipelineEnded { generation } => {
                self.pipeline_ended(generation).await
            }
            SessionCommand::PipelineFailed { generation, error } => {
                self.pipeline_failed(generation, error)
            }
            SessionCommand::ConnectionLost => self.connection_lost().await,
            SessionCommand::Deferred {
                generation,
                transition,
            } => self.deferred(generation, transition).await,
        }
    }

    // Operaciones públicas

    async fn enqueue(
        &mut self,
        tracks: Vec<Track>,
        requester: Option<UserId>,
        playlist: bool,
        autostart: bool,
    ) -> Result<EnqueueReceipt, QueueError> {
        if tracks.is_empty() {
            return Err(QueueError::EmptyQueue);
        }

        let max = self.settings.max_queue_size;
        let available = max.saturating_sub(self.tracks.len());
        if available == 0 {
            return Err(QueueError::QueueFull { max });
        }
        self.cancel_idle_timer();

        let first_population = self.tracks.is_empty();
        let first_position = self.tracks.len();
        let added = tracks.len().min(available);
        if added < tracks.len() {
            warn!(
                guild_id = %self.target.guild_id,
                "✂️ Playlist recortada: {} de {} canciones caben en la cola",
                added,
                tracks.len()
            );
        }

        self.tracks.extend(
            tracks
                .iter()
                .take(added)
                .map(|track| Arc::new(track.requested(requester))),
        );

        if first_population {
            self.cursor = 0;
            self.emit(QueueEventKind::QueueCreated);
        }

        if playlist {
            info!(guild_id = %self.target.guild_id, "➕ Agregadas {} canciones a la cola", added);
            self.emit(QueueEventKind::PlaylistAdded {
                count: added,
                first_position,
            });
        } else {
            let track = self.tracks[first_position].clone();
            info!(guild_id = %self.target.guild_id, "➕ Agregado a la cola: {}", track.title());
            self.emit(QueueEventKind::TrackAdded {
                track,
                position: first_position,
            });
        }

        if autostart && self.state == PlaybackState::Idle {
            self.start_current().await;
        }

        Ok(EnqueueReceipt {
            snapshot: self.snapshot(),
            first_position,
            added,
            playlist,
        })
    }

    async fn play(&mut self) -> Result<SessionSnapshot, QueueError> {
        self.cancel_idle_timer();

        if self.state != PlaybackState::Idle {
            return Ok(self.snapshot());
        }
        if self.tracks.is_empty() {
            return Err(QueueError::EmptyQueue);
        }

        self.start_current().await;
        Ok(self.snapshot())
    }

    fn pause(&mut self) -> SessionSnapshot {
        if self.state == PlaybackState::Playing {
            if let Some(pipeline) = self.pipeline.get() {
                pipeline.pause();
            }
            self.state = PlaybackState::Paused;
            info!(guild_id = %self.target.guild_id, "⏸️ Reproducción pausada");
            self.emit(QueueEventKind::Paused);
        }
        self.snapshot()
    }

    fn resume(&mut self) -> SessionSnapshot {
        if self.state == PlaybackState::Paused {
            self.cancel_idle_timer();
            if let Some(pipeline) = self.pipeline.get() {
                pipeline.resume();
            }
            self.state = PlaybackState::Playing;
            info!(guild_id = %self.target.guild_id, "▶️ Reproducción reanudada");
            self.emit(QueueEventKind::Resumed);
        }
        self.snapshot()
    }

    async fn skip(&mut self) -> Result<SessionSnapshot, QueueError> {
        if self.tracks.is_empty() {
            return Err(QueueError::NothingPlaying);
        }

        self.cancel_idle_timer();
        info!(guild_id = %self.target.guild_id, "⏭️ Saltando canción");

        if self.advance(Exhausted::Stop).await == Advance::Next {
            self.start_current().await;
        }
        Ok(self.snapshot())
    }

    async fn jump(&mut self, position: usize) -> Result<SessionSnapshot, QueueError> {
        if position >= self.tracks.len() {
            return Err(QueueError::InvalidPosition {
                position,
                len: self.tracks.len(),
            });
        }

        self.cancel_idle_timer();
        self.push_current_to_history();
        self.release_pipeline();
        self.cursor = position;
        debug!(guild_id = %self.target.guild_id, "📍 Saltando a la posición {}", position);

        self.start_current().await;
        Ok(self.snapshot())
    }

    async fn remove(&mut self, position: usize) -> Result<SessionSnapshot, QueueError> {
        let len = self.tracks.len();
        if position >= len || (position == self.cursor && self.state != PlaybackState::Idle) {
            return Err(QueueError::InvalidPosition { position, len });
        }

        self.cancel_idle_timer();

        // Quitar el track bajo el cursor invalida la transición que esperaba por él
        let resume = position == self.cursor && self.transition_pending();
        if position == self.cursor {
            self.release_pipeline();
        }

        let track = self.tracks.remove(position);
        if position < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.tracks.len() {
            self.cursor = 0;
        }

        debug!(guild_id = %self.target.guild_id, "❌ Track eliminado en posición {}", position);
        self.emit(QueueEventKind::TrackRemoved { track, position });

        if resume {
            self.start_current().await;
        }
        Ok(self.snapshot())
    }

    async fn stop(&mut self, cause: Exhausted) {
        self.tracks.clear();
        self.cursor = 0;
        self.release_pipeline();
        self.cancel_idle_timer();
        self.state = PlaybackState::Idle;

        let (leave, kind) = match cause {
            Exhausted::Stop => (self.settings.leave_on_stop, QueueEventKind::Stopped),
            Exhausted::Finish => (self.settings.leave_on_finish, QueueEventKind::Finished),
        };

        match cause {
            Exhausted::Stop => info!(guild_id = %self.target.guild_id, "⏹️ Reproducción detenida"),
            Exhausted::Finish => info!(guild_id = %self.target.guild_id, "🏁 Cola terminada"),
        }

        if leave {
            self.teardown(Some(kind)).await;
        } else {
            self.emit(kind);
        }
    }

    fn shuffle(&mut self) -> SessionSnapshot {
        if self.tracks.len() <= 1 {
            return self.snapshot();
        }

        self.cancel_idle_timer();
        let current = self.tracks.remove(self.cursor.min(self.tracks.len() - 1));
        self.tracks.shuffle(&mut rand::thread_rng());
        self.tracks.insert(0, current);
        self.cursor = 0;

        info!(guild_id = %self.target.guild_id, "🔀 Cola mezclada");
        self.emit(QueueEventKind::Shuffled);
        self.snapshot()
    }

    fn set_volume(&mut self, volume: i64) -> SessionSnapshot {
        let volume = volume.clamp(0, 100) as u8;
        if volume != self.volume {
            self.volume = volume;
            if let Some(pipeline) = self.pipeline.get() {
                pipeline.set_volume(volume);
            }
            info!(guild_id = %self.target.guild_id, "🔊 Volumen ajustado a {}%", volume);
            self.emit(QueueEventKind::VolumeChanged { volume });
        }
        self.snapshot()
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) -> SessionSnapshot {
        if mode != self.repeat_mode {
            self.repeat_mode = mode;
            match mode {
                RepeatMode::Off => info!("➡️ Repetición desactivada"),
                RepeatMode::Track => info!("🔂 Repetir canción activado"),
                RepeatMode::Queue => info!("🔁 Repetir cola activado"),
            }
            self.emit(QueueEventKind::RepeatModeChanged { mode });
        }
        self.snapshot()
    }

    // Señales asíncronas

    async fn pipeline_ended(&mut self, generation: u64) {
        if !self.is_current(generation) {
            debug!(guild_id = %self.target.guild_id, generation, "Fin de pipeline obsoleto, ignorado");
            return;
        }

        debug!(guild_id = %self.target.guild_id, "Track terminado");
        if self.repeat_mode == RepeatMode::Track {
            self.release_pipeline();
            self.schedule(self.settings.repeat_delay, Deferred::ReplayTrack);
            return;
        }

        self.advance_after_end().await;
    }

    fn pipeline_failed(&mut self, generation: u64, error: String) {
        if !self.is_current(generation) {
            debug!(guild_id = %self.target.guild_id, generation, "Error de pipeline obsoleto, ignorado");
            return;
        }

        let track = self.tracks.get(self.cursor).cloned();
        warn!(guild_id = %self.target.guild_id, "❌ Error en el stream: {}", error);
        self.release_pipeline();
        self.emit(QueueEventKind::Error {
            track,
            message: error,
        });
        self.schedule(self.settings.error_skip_delay, Deferred::ForcedAdvance);
    }

    async fn deferred(&mut self, generation: u64, transition: Deferred) {
        if generation != self.generation {
            debug!(guild_id = %self.target.guild_id, ?transition, "Transición diferida obsoleta, ignorada");
            return;
        }
        self.scheduled = None;

        match transition {
            Deferred::ReplayTrack => {
                if self.cursor < self.tracks.len() {
                    info!(guild_id = %self.target.guild_id, "🔂 Repitiendo track");
                    self.start_current().await;
                }
            }
            Deferred::ForcedAdvance => {
                if !self.tracks.is_empty() {
                    self.advance_after_end().await;
                }
            }
        }
    }

    async fn connection_lost(&mut self) {
        if self.connection.is_none() {
            return;
        }

        warn!(guild_id = %self.target.guild_id, "🔌 Conexión de voz perdida, reintentando una vez");
        let signals = ConnectionSignals::new(self.mailbox.clone());
        let attempt = tokio::time::timeout(
            self.settings.reconnect_timeout,
            self.transport
                .connect(self.target.guild_id, self.target.voice_channel, signals),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout));

        match attempt {
            Ok(connection) => {
                info!(guild_id = %self.target.guild_id, "🔄 Reconectado al canal de voz");
                self.connection = Some(connection);
                self.emit(QueueEventKind::Reconnected);
            }
            Err(e) => {
                warn!(guild_id = %self.target.guild_id, "❌ Reconexión fallida: {}", e);
                self.teardown(Some(QueueEventKind::Disconnected)).await;
            }
        }
    }

    fn schedule_idle_timer(&mut self) {
        if !self.settings.leave_on_empty || self.idle_timer.is_some() {
            return;
        }

        self.timer_seq += 1;
        let token = self.timer_seq;
        let mailbox = self.mailbox.clone();
        let cooldown = self.settings.empty_cooldown;

        let task = tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let _ = mailbox.send(SessionCommand::IdleTimerFired { token });
        });

        info!(
            guild_id = %self.target.guild_id,
            "🚪 Programando auto-desconexión en {}",
            humantime::format_duration(cooldown)
        );
        self.idle_timer = Some(IdleTimer { token, task });
    }

    async fn idle_timer_fired(&mut self, token: u64) {
        match &self.idle_timer {
            Some(timer) if timer.token == token => self.idle_timer = None,
            _ => return,
        }

        let listeners = self
            .transport
            .listener_count(self.target.guild_id, self.target.voice_channel)
            .await;
        if listeners > 0 {
            debug!(guild_id = %self.target.guild_id, listeners, "Canal ya no está vacío, se mantiene la sesión");
            return;
        }

        info!(guild_id = %self.target.guild_id, "🚪 Canal vacío, cerrando sesión");
        self.teardown(Some(QueueEventKind::Empty)).await;
    }

    // Transiciones internas

    /// Releases any stale pipeline, makes sure a connection exists, and opens
    /// a pipeline for the track under the cursor.
    async fn start_current(&mut self) {
        let Some(track) = self.tracks.get(self.cursor).cloned() else {
            return;
        };

        self.release_pipeline();

        let connection = match self.ensure_connection().await {
            Ok(connection) => connection,
            Err(e) => {
                self.acquisition_failed(track, e.to_string());
                return;
            }
        };

        let signals = PipelineSignals::new(self.mailbox.clone(), self.generation);
        match connection.open(&track, self.volume, signals).await {
            Ok(handle) => {
                self.pipeline.attach(handle);
                self.state = PlaybackState::Playing;
                info!(guild_id = %self.target.guild_id, "🎵 Reproduciendo: {}", track.title());
                self.emit(QueueEventKind::TrackStarted { track });
            }
            Err(e) => self.acquisition_failed(track, e.to_string()),
        }
    }

    async fn ensure_connection(&mut self) -> Result<Arc<dyn VoiceConnection>, TransportError> {
        if let Some(connection) = &self.connection {
            return Ok(connection.clone());
        }

        let signals = ConnectionSignals::new(self.mailbox.clone());
        let connection = self
            .transport
            .connect(self.target.guild_id, self.target.voice_channel, signals)
            .await?;

        info!(guild_id = %self.target.guild_id, "🔊 Conectado al canal de voz");
        self.connection = Some(connection.clone());
        Ok(connection)
    }

    fn acquisition_failed(&mut self, track: Arc<Track>, message: String) {
        warn!(guild_id = %self.target.guild_id, "❌ No se pudo reproducir {}: {}", track.title(), message);
        self.release_pipeline();
        self.emit(QueueEventKind::Error {
            track: Some(track),
            message,
        });
        self.schedule(self.settings.retry_backoff, Deferred::ForcedAdvance);
    }

    /// Pipeline-end handling with a forced skip: wrap on repeat-queue,
    /// otherwise move forward or finish.
    async fn advance_after_end(&mut self) {
        if self.advance(Exhausted::Finish).await == Advance::Next {
            self.start_current().await;
        }
    }

    /// Moves the cursor one step forward, recording the current track in the
    /// history. Running past the end wraps on repeat-queue and otherwise stops
    /// the session according to `on_end`.
    async fn advance(&mut self, on_end: Exhausted) -> Advance {
        self.push_current_to_history();
        self.release_pipeline();

        let next = self.cursor + 1;
        if next < self.tracks.len() {
            self.cursor = next;
            return Advance::Next;
        }

        if self.repeat_mode == RepeatMode::Queue && !self.tracks.is_empty() {
            debug!(guild_id = %self.target.guild_id, "🔁 Volviendo al inicio de la cola");
            self.cursor = 0;
            return Advance::Next;
        }

        self.stop(on_end).await;
        Advance::Ended
    }

    /// Releases resources, leaves the registry and the voice channel, and ends
    /// the session task after the current command.
    async fn teardown(&mut self, kind: Option<QueueEventKind>) {
        if self.torn_down {
            return;
        }

        self.tracks.clear();
        self.cursor = 0;
        self.state = PlaybackState::Idle;
        self.release_pipeline();
        self.cancel_idle_timer();

        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if(&self.target.guild_id, |_, handle| handle.id == self.id);
        }
        self.torn_down = true;

        if self.connection.take().is_some() {
            self.transport.disconnect(self.target.guild_id).await;
        }

        if let Some(kind) = kind {
            self.emit(kind);
        }
    }

    fn push_current_to_history(&mut self) {
        if let Some(track) = self.tracks.get(self.cursor) {
            self.history.push(track.clone());
        }
    }

    /// Drops the live pipeline (if any) and invalidates every signal or
    /// delayed transition issued for it.
    fn release_pipeline(&mut self) {
        self.pipeline.release();
        self.generation += 1;
        if self.state != PlaybackState::Idle {
            self.state = PlaybackState::Idle;
        }
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.task.abort();
            debug!(guild_id = %self.target.guild_id, "Auto-desconexión cancelada");
        }
    }

    fn schedule(&mut self, delay: Duration, transition: Deferred) {
        let mailbox = self.mailbox.clone();
        let generation = self.generation;
        self.scheduled = Some(generation);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = mailbox.send(SessionCommand::Deferred {
                generation,
                transition,
            });
        });
    }

    /// Hay una transición diferida que todavía aplicará
    fn transition_pending(&self) -> bool {
        self.scheduled == Some(self.generation)
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.pipeline.is_attached()
    }

    fn emit(&self, kind: QueueEventKind) {
        self.events.publish(self.snapshot(), kind);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            guild_id: self.target.guild_id,
            voice_channel: self.target.voice_channel,
            text_channel: self.target.text_channel,
            tracks: self.tracks.clone(),
            cursor: self.cursor,
            state: self.state,
            repeat_mode: self.repeat_mode,
            volume: self.volume,
            history: self.history.to_vec(),
            pipeline_attached: self.pipeline.is_attached(),
            idle_timer_pending: self.idle_timer.is_some(),
            torn_down: self.torn_down,
        }
    }
}
