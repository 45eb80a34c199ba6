//! Platform client adapters.
//!
//! The daemon talks to the messaging platform exclusively through the
//! [`ChannelClient`] trait: a live event subscription, a paged history
//! iterator per channel, and a point lookup for current view/reaction
//! counts. Session and authentication lifecycle are not managed here; an
//! implementation is handed over already connected.
//!
//! # Available Clients
//!
//! - [`ReplayClient`] - serves recorded JSONL channel dumps (local runs, tests)
//! - [`Throttled`] - wraps any client with a fixed inter-request delay
//!
//! All request pacing lives in [`Throttled`] so call sites never sleep on
//! their own; upgrading to a shared token bucket later only touches the
//! wrapper.

mod replay;
mod throttle;

pub use replay::ReplayClient;
pub use throttle::Throttled;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chronicle_core::ChannelMessage;

use crate::error::Result;

/// A resolved broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Platform-assigned numeric id.
    pub id: i64,
    /// Human-readable title.
    pub title: String,
    /// Public handle, if the channel has one.
    pub handle: Option<String>,
}

/// Current engagement counters for one message, as returned by a point lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageStats {
    pub views: i64,
    pub reactions_count: i64,
}

/// A connection to the messaging platform.
///
/// Implementations must be cheap to share (`Arc<dyn ChannelClient>`); every
/// method call is one platform request.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Human-readable name for this client (used in logs).
    fn name(&self) -> &'static str;

    /// Resolve a configured channel reference (handle or numeric id) into a
    /// [`Channel`].
    async fn resolve_channel(&self, reference: &str) -> Result<Channel>;

    /// Subscribe to the live message feed for the given channels.
    ///
    /// The returned receiver yields messages in arrival order until the feed
    /// ends or the receiver is dropped.
    async fn subscribe(&self, channel_ids: &[i64]) -> Result<mpsc::Receiver<ChannelMessage>>;

    /// Fetch one page of a channel's history, newest first.
    ///
    /// `before_message_id` restricts the page to messages with a strictly
    /// smaller id; `None` starts from the newest message. An empty page means
    /// the history is exhausted.
    async fn history_page(
        &self,
        channel_id: i64,
        before_message_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>>;

    /// Look up the current view/reaction counts for one message.
    ///
    /// Returns `None` when the message no longer exists.
    async fn message_stats(&self, channel_id: i64, message_id: i64)
        -> Result<Option<MessageStats>>;
}
