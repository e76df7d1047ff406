//! # Audio Module
//!
//! Per-guild playback queues and their session lifecycle.
//!
//! ## Architecture
//!
//! ### [`session`] - Session actor
//! - One task per guild owning the track list, cursor, playback state and history
//! - Applies user commands, pipeline reports, connection reports and timers
//!   strictly one at a time
//! - Owns at most one media pipeline and one idle timer
//!
//! ### [`registry`] - Session registry
//! - Authoritative `guild → session` mapping
//! - Sessions leave it themselves when they are torn down
//!
//! ### [`player`] - Audio Player
//! - Facade used by the bot: resolve, enqueue, and the playback controls
//!
//! ### [`events`] - Event bus
//! - Exactly one event per state change, published without waiting on subscribers
//!
//! ### [`transport`] / [`pipeline`] - Collaborator seams
//! - Voice connection and media pipeline traits implemented by the songbird
//!   adapter in [`crate::bot::voice`] and by test fakes
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use relay_queue::audio::{player::AudioPlayer, session::SessionTarget};
//! use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(player: &AudioPlayer) -> anyhow::Result<()> {
//! let target = SessionTarget {
//!     guild_id: GuildId::new(123456789),
//!     voice_channel: ChannelId::new(987654321),
//!     text_channel: None,
//! };
//!
//! player.enqueue(target, "lofi hip hop", None).await?;
//! player.pause(target.guild_id).await?;
//! player.resume(target.guild_id).await?;
//! player.skip(target.guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod history;
pub mod pipeline;
pub mod player;
pub mod registry;
pub mod session;
pub mod track;
pub mod transport;

pub use events::{EventBus, QueueEvent, QueueEventKind};
pub use player::AudioPlayer;
pub use registry::SessionRegistry;
pub use session::{
    EnqueueReceipt, PlaybackState, QueuePage, RepeatMode, SessionHandle, SessionSnapshot,
    SessionTarget,
};
pub use track::{SourceKind, Track};
