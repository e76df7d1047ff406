#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_queue::{
    audio::{
        events::{EventBus, QueueEvent, QueueEventKind},
        pipeline::{PipelineHandle, PipelineSignals},
        registry::SessionRegistry,
        session::{SessionHandle, SessionTarget},
        track::{SourceKind, Track},
        transport::{ConnectionSignals, Transport, VoiceConnection},
    },
    config::SessionSettings,
    error::{PipelineError, TransportError},
};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::broadcast;

/// Everything the fake transport saw.
#[derive(Default)]
pub struct Recorder {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub opened: Mutex<Vec<String>>,
    pub signals: Mutex<Vec<PipelineSignals>>,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub released: AtomicUsize,
    pub volumes: Mutex<Vec<u8>>,
    pub paused: AtomicUsize,
    pub resumed: AtomicUsize,
    pub conn_signals: Mutex<Vec<ConnectionSignals>>,
    pub listeners: AtomicUsize,
    pub fail_open: Mutex<HashSet<String>>,
    pub fail_connect: AtomicBool,
    pub hang_connect: AtomicBool,
}

impl Recorder {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Signals handed to the most recently opened pipeline.
    pub fn last_signals(&self) -> PipelineSignals {
        self.signals
            .lock()
            .last()
            .cloned()
            .expect("no pipeline was opened")
    }

    pub fn signals_at(&self, index: usize) -> PipelineSignals {
        self.signals.lock()[index].clone()
    }

    pub fn last_connection(&self) -> ConnectionSignals {
        self.conn_signals
            .lock()
            .last()
            .cloned()
            .expect("no connection was made")
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct FakePipeline {
    recorder: Arc<Recorder>,
    released: AtomicBool,
}

impl PipelineHandle for FakePipeline {
    fn set_volume(&self, volume: u8) {
        self.recorder.volumes.lock().push(volume);
    }

    fn pause(&self) {
        self.recorder.paused.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.recorder.resumed.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.recorder.live.fetch_sub(1, Ordering::SeqCst);
            self.recorder.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeConnection {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn open(
        &self,
        track: &Track,
        _volume: u8,
        signals: PipelineSignals,
    ) -> Result<Box<dyn PipelineHandle>, PipelineError> {
        if self.recorder.fail_open.lock().contains(track.id()) {
            return Err(PipelineError::Source(format!("cannot open {}", track.id())));
        }

        self.recorder.opened.lock().push(track.id().to_string());
        self.recorder.signals.lock().push(signals);
        let live = self.recorder.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(FakePipeline {
            recorder: self.recorder.clone(),
            released: AtomicBool::new(false),
        }))
    }
}

pub struct FakeTransport {
    pub recorder: Arc<Recorder>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
        signals: ConnectionSignals,
    ) -> Result<Arc<dyn VoiceConnection>, TransportError> {
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        if self.recorder.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.recorder.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Join("refused".into()));
        }

        self.recorder.conn_signals.lock().push(signals);
        Ok(Arc::new(FakeConnection {
            recorder: self.recorder.clone(),
        }))
    }

    async fn disconnect(&self, _guild_id: GuildId) {
        self.recorder.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn listener_count(&self, _guild_id: GuildId, _channel_id: ChannelId) -> usize {
        self.recorder.listeners.load(Ordering::SeqCst)
    }
}

pub struct Fixture {
    pub registry: Arc<SessionRegistry>,
    pub recorder: Arc<Recorder>,
    pub events: broadcast::Receiver<QueueEvent>,
}

impl Fixture {
    pub fn new(settings: SessionSettings) -> Self {
        let recorder = Arc::new(Recorder::default());
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(FakeTransport {
                recorder: recorder.clone(),
            }),
            bus,
            settings,
        ));

        Self {
            registry,
            recorder,
            events,
        }
    }

    pub fn session(&self, guild: u64) -> SessionHandle {
        self.registry
            .get_or_create(target(guild))
            .expect("registry is open")
    }

    /// Event kinds published since the last call.
    pub fn drain(&mut self) -> Vec<QueueEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }
}

/// Defaults with the session kept alive on stop and finish.
pub fn sticky_settings() -> SessionSettings {
    SessionSettings {
        leave_on_stop: false,
        leave_on_finish: false,
        ..SessionSettings::default()
    }
}

pub fn target(guild: u64) -> SessionTarget {
    SessionTarget {
        guild_id: GuildId::new(guild),
        voice_channel: ChannelId::new(guild * 100),
        text_channel: None,
    }
}

pub fn track(id: &str, secs: u64) -> Track {
    Track::new(id, id.to_uppercase(), format!("https://example.com/{id}.mp3"), SourceKind::DirectUrl)
        .with_duration(Duration::from_secs(secs))
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id, 60)).collect()
}

pub fn user(id: u64) -> Option<UserId> {
    Some(UserId::new(id))
}

/// Round-trips through the session mailbox so every command sent before it
/// has been applied. Returns `false` once the session is gone.
pub async fn settle(handle: &SessionHandle) -> bool {
    handle.snapshot().await.is_ok()
}

pub fn ids(tracks: &[Arc<Track>]) -> Vec<String> {
    tracks.iter().map(|t| t.id().to_string()).collect()
}

pub fn started(kinds: &[QueueEventKind]) -> Vec<String> {
    kinds
        .iter()
        .filter_map(|kind| match kind {
            QueueEventKind::TrackStarted { track } => Some(track.id().to_string()),
            _ => None,
        })
        .collect()
}
