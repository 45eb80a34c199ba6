//! Fixed-delay rate limiting for platform requests.
//!
//! [`Throttled`] wraps any [`ChannelClient`] and sleeps a fixed delay before
//! each request. Backfill walks and stats refresh cycles both go through
//! this wrapper, so the platform request pacing is defined in exactly one
//! place. The delay is per-wrapper, not shared across tasks.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chronicle_core::ChannelMessage;

use super::{Channel, ChannelClient, MessageStats};
use crate::error::Result;

/// A [`ChannelClient`] wrapper inserting a fixed delay before each request.
///
/// The live subscription is exempt: it is a single push-based stream, not a
/// polled request.
pub struct Throttled<C> {
    inner: C,
    delay: Duration,
}

impl<C> Throttled<C> {
    /// Wrap a client with the given inter-request delay.
    pub fn new(inner: C, delay: Duration) -> Self {
        Self { inner, delay }
    }

    /// The configured inter-request delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl<C: ChannelClient> ChannelClient for Throttled<C> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn resolve_channel(&self, reference: &str) -> Result<Channel> {
        tokio::time::sleep(self.delay).await;
        self.inner.resolve_channel(reference).await
    }

    async fn subscribe(&self, channel_ids: &[i64]) -> Result<mpsc::Receiver<ChannelMessage>> {
        self.inner.subscribe(channel_ids).await
    }

    async fn history_page(
        &self,
        channel_id: i64,
        before_message_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .history_page(channel_id, before_message_id, limit)
            .await
    }

    async fn message_stats(
        &self,
        channel_id: i64,
        message_id: i64,
    ) -> Result<Option<MessageStats>> {
        tokio::time::sleep(self.delay).await;
        self.inner.message_stats(channel_id, message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;
    use std::time::Instant;

    #[tokio::test]
    async fn test_passes_calls_through() {
        let mock = MockClient::new(vec![Channel {
            id: 1000,
            title: "Test".to_string(),
            handle: Some("test".to_string()),
        }]);
        mock.set_stats(1000, 5, MessageStats {
            views: 10,
            reactions_count: 2,
        });

        let throttled = Throttled::new(mock, Duration::from_millis(1));

        let channel = throttled.resolve_channel("test").await.unwrap();
        assert_eq!(channel.id, 1000);

        let stats = throttled.message_stats(1000, 5).await.unwrap().unwrap();
        assert_eq!(stats.views, 10);
    }

    #[tokio::test]
    async fn test_delays_each_request() {
        let mock = MockClient::new(vec![Channel {
            id: 1000,
            title: "Test".to_string(),
            handle: None,
        }]);
        let delay = Duration::from_millis(20);
        let throttled = Throttled::new(mock, delay);

        let start = Instant::now();
        let _ = throttled.history_page(1000, None, 10).await.unwrap();
        let _ = throttled.history_page(1000, None, 10).await.unwrap();
        assert!(start.elapsed() >= delay * 2);
    }
}
