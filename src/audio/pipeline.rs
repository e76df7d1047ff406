use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::session::SessionCommand;

/// A live media pipeline: the stream source plus whatever transcoding feeds the
/// voice sink.
///
/// Every method must tolerate a pipeline that already terminated on its own;
/// in particular `release` is idempotent and never fails.
pub trait PipelineHandle: Send + Sync {
    fn set_volume(&self, volume: u8);
    fn pause(&self);
    fn resume(&self);
    fn release(&self);
}

/// Callbacks a pipeline uses to report back into its session.
///
/// Each pipeline gets signals stamped with the generation it was opened
/// under, so reports from a pipeline the session already replaced are
/// discarded by the session.
#[derive(Debug, Clone)]
pub struct PipelineSignals {
    mailbox: UnboundedSender<SessionCommand>,
    generation: u64,
}

impl PipelineSignals {
    pub(crate) fn new(mailbox: UnboundedSender<SessionCommand>, generation: u64) -> Self {
        Self {
            mailbox,
            generation,
        }
    }

    /// El stream terminó normalmente
    pub fn ended(&self) {
        let sent = self.mailbox.send(SessionCommand::PipelineEnded {
            generation: self.generation,
        });
        if sent.is_err() {
            debug!("Fin de pipeline para una sesión cerrada, descartado");
        }
    }

    /// El stream falló a mitad de reproducción
    pub fn failed(&self, error: impl Into<String>) {
        let sent = self.mailbox.send(SessionCommand::PipelineFailed {
            generation: self.generation,
            error: error.into(),
        });
        if sent.is_err() {
            debug!("Error de pipeline para una sesión cerrada, descartado");
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Slot holding at most one pipeline; attaching always releases the previous one.
#[derive(Default)]
pub(crate) struct PipelineSlot {
    current: Option<Box<dyn PipelineHandle>>,
}

impl PipelineSlot {
    pub fn attach(&mut self, handle: Box<dyn PipelineHandle>) {
        self.release();
        self.current = Some(handle);
    }

    pub fn release(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.release();
        }
    }

    pub fn get(&self) -> Option<&dyn PipelineHandle> {
        self.current.as_deref()
    }

    pub fn is_attached(&self) -> bool {
        self.current.is_some()
    }
}

impl Drop for PipelineSlot {
    fn drop(&mut self) {
        self.release();
    }
}
