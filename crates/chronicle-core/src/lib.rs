//! Core types and shared utilities for the Chronicle channel archive.
//!
//! This crate provides:
//! - The inbound message model ([`ChannelMessage`]) shared by the live
//!   listener, the backfill walker, and the replay source
//! - The normalized post model ([`NewPost`]) consumed by the persistence
//!   gateway, plus the pure normalization helpers (representative selection,
//!   reaction totals, permalinks)
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
pub mod message;
pub mod metrics;
pub mod post;

pub use error::{Error, Result};
pub use message::{ChannelMessage, MediaKind, MediaRef, Reaction};
pub use post::{
    NewPost, PostStats, REACTIONS_DISABLED, StatsUpdate, permalink, reactions_total,
    representative,
};
