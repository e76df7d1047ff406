//! Per-guild playback queue and session lifecycle engine for a Discord audio
//! relay bot.
//!
//! The engine lives in [`audio`]; [`sources`] turns user input into tracks and
//! [`bot`] wires everything to serenity and songbird.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;

pub use config::{Config, SessionSettings};
pub use error::{PipelineError, QueueError, ResolveError, TransportError};
