//! Chronicle ingestion pipeline components.
//!
//! This crate provides the core pipeline for ingesting broadcast-channel
//! posts into the Chronicle archive.
//!
//! # Modules
//!
//! - [`grouper`] - live event intake with album debounce
//! - [`backfill`] - resumable historical backfill per channel
//! - [`refresh`] - tiered view/reaction statistics refresh
//! - [`store`] - the dedup/persistence gateway (SQLite)
//! - [`client`] - platform client seam (replay adapter, rate limiting)
//! - [`media`] - media placement seam
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────┐
//! │   Live Listener  │      │  Backfill Walker │
//! │  (album grouper) │      │  (per channel)   │
//! └────────┬─────────┘      └────────┬─────────┘
//!          │ NewPost                 │ NewPost
//!          └──────────┬──────────────┘
//!                     ▼
//!          ┌──────────────────────┐      ┌──────────────────┐
//!          │  Persistence Gateway │◄─────┤ Tiered Refresher │
//!          │  (dedup + SQLite)    │      │ (hot/warm tiers) │
//!          └──────────────────────┘      └──────────────────┘
//! ```
//!
//! All producers run concurrently against one platform client; dedup is the
//! store's `UNIQUE(channel_id, message_id)` constraint, so the same post
//! arriving via the live feed and a backfill walk lands exactly once.

pub mod backfill;
pub mod client;
pub mod error;
pub mod grouper;
pub mod media;
pub mod normalize;
pub mod refresh;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use backfill::{
    BackfillConfig, BackfillStats, backfill_channel, catch_up_channel, sync_channel,
};
pub use client::{Channel, ChannelClient, MessageStats, ReplayClient, Throttled};
pub use grouper::{AlbumBuffer, GrouperConfig, GrouperStats, run_grouper};
pub use media::{LocalMediaSink, MediaSink, NullMediaSink};
pub use refresh::{CycleStats, RefreshConfig, StatsRefresher};
pub use store::{InsertOutcome, PostStore, StoredPost};
