//! Tiered statistics refresh.
//!
//! Engagement counters change fastest right after publication and converge
//! over time, so recently-stored posts are re-polled in two freshness tiers:
//!
//! - **Hot tier** - every cycle: posts published within the hot window,
//!   fetched one by one, committed once per cycle.
//! - **Warm tier** - every Nth cycle: posts older than the hot window but
//!   within the warm window, processed and committed in fixed-size batches
//!   to bound transaction size.
//!
//! Posts whose `reactions_count` carries the disabled sentinel are never
//! selected (the store's window query excludes them). A post that fails to
//! fetch is logged and skipped for the cycle; it stays eligible for the
//! next one. Request pacing comes from the [`Throttled`](crate::client::Throttled)
//! client wrapper, not from this module.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use chronicle_core::{PostStats, StatsUpdate};

use crate::client::ChannelClient;
use crate::error::Result;
use crate::store::PostStore;

/// Configuration for the tiered refresher.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Cycle length.
    pub interval: Duration,
    /// Age bound of the hot tier.
    pub hot_window: TimeDelta,
    /// Age bound of the warm tier (includes the hot window).
    pub warm_window: TimeDelta,
    /// The warm tier runs every this-many cycles.
    pub warm_every: u64,
    /// Posts per warm-tier batch (one commit per batch).
    pub batch_size: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            hot_window: TimeDelta::hours(2),
            warm_window: TimeDelta::days(2),
            warm_every: 3,
            batch_size: 25,
        }
    }
}

/// Statistics from one refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub cycle: u64,
    pub hot_selected: usize,
    pub hot_updated: usize,
    pub warm_selected: usize,
    pub warm_updated: usize,
    pub fetch_failures: usize,
}

/// Periodic two-tier statistics refresher.
pub struct StatsRefresher {
    client: Arc<dyn ChannelClient>,
    store: Arc<PostStore>,
    config: RefreshConfig,
}

impl StatsRefresher {
    pub fn new(
        client: Arc<dyn ChannelClient>,
        store: Arc<PostStore>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Run refresh cycles until the running flag is cleared.
    ///
    /// A failed cycle is logged and the loop continues; no cycle failure
    /// aborts the task.
    pub async fn run(&self, running: Arc<AtomicBool>) {
        tracing::info!(
            "Stats refresher started (interval: {:?}, warm every {} cycles)",
            self.config.interval,
            self.config.warm_every
        );

        let mut cycle = 0u64;
        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(self.config.interval).await;
            if !running.load(Ordering::SeqCst) {
                break;
            }

            cycle += 1;
            match self.run_cycle(cycle, Utc::now()).await {
                Ok(stats) => {
                    tracing::debug!(
                        "Cycle {}: hot {}/{} updated, warm {}/{} updated, {} fetch failures",
                        stats.cycle,
                        stats.hot_updated,
                        stats.hot_selected,
                        stats.warm_updated,
                        stats.warm_selected,
                        stats.fetch_failures
                    );
                }
                Err(e) => tracing::error!("Refresh cycle {} failed: {}", cycle, e),
            }
        }

        tracing::info!("Stats refresher stopped after {} cycles", cycle);
    }

    /// Run one refresh cycle at the given instant.
    ///
    /// Split out from [`run`] so tests can drive cycles deterministically.
    pub async fn run_cycle(&self, cycle: u64, now: DateTime<Utc>) -> Result<CycleStats> {
        let mut stats = CycleStats {
            cycle,
            ..CycleStats::default()
        };

        let hot_threshold = now - self.config.hot_window;

        tracing::info!("Updating stats [hot posts]");
        let hot_posts = self.store.stats_window(hot_threshold, None)?;
        stats.hot_selected = hot_posts.len();

        let (updates, failures) = self.fetch_changed(&hot_posts).await;
        stats.fetch_failures += failures;
        if !updates.is_empty() {
            // One commit for the whole hot pass
            stats.hot_updated = self.store.apply_stats(&updates)?;
            metrics::counter!("refresh_posts_updated_total", "tier" => "hot")
                .increment(stats.hot_updated as u64);
            tracing::info!("Stats updated for {} hot posts", stats.hot_updated);
        }

        if cycle % self.config.warm_every.max(1) == 0 {
            tracing::info!("Updating stats [warm posts]");
            let warm_threshold = now - self.config.warm_window;
            let warm_posts = self
                .store
                .stats_window(warm_threshold, Some(hot_threshold))?;
            stats.warm_selected = warm_posts.len();

            if !warm_posts.is_empty() {
                tracing::info!("Found {} warm posts to check", warm_posts.len());
            }

            for batch in warm_posts.chunks(self.config.batch_size.max(1)) {
                let (updates, failures) = self.fetch_changed(batch).await;
                stats.fetch_failures += failures;
                if !updates.is_empty() {
                    // Commit per batch to bound the partial-failure blast radius
                    stats.warm_updated += self.store.apply_stats(&updates)?;
                }
            }

            if stats.warm_updated > 0 {
                metrics::counter!("refresh_posts_updated_total", "tier" => "warm")
                    .increment(stats.warm_updated as u64);
                tracing::info!("Stats updated for {} warm posts", stats.warm_updated);
            } else if stats.warm_selected > 0 {
                tracing::info!("No new stats for warm posts");
            }
        }

        metrics::counter!("refresh_cycles_total").increment(1);
        Ok(stats)
    }

    /// Fetch fresh counters for each post and keep the ones that changed.
    ///
    /// Failures and vanished messages are skipped for this cycle; both stay
    /// eligible for the next.
    async fn fetch_changed(&self, posts: &[PostStats]) -> (Vec<StatsUpdate>, usize) {
        let mut updates = Vec::new();
        let mut failures = 0usize;

        for post in posts {
            match self
                .client
                .message_stats(post.channel_id, post.message_id)
                .await
            {
                Ok(Some(fresh)) => {
                    if fresh.views != post.views || fresh.reactions_count != post.reactions_count {
                        updates.push(StatsUpdate {
                            channel_id: post.channel_id,
                            message_id: post.message_id,
                            views: fresh.views,
                            reactions_count: fresh.reactions_count,
                        });
                    }
                }
                Ok(None) => {
                    tracing::debug!("Message {} gone; skipping this cycle", post.message_id);
                }
                Err(e) => {
                    failures += 1;
                    metrics::counter!("refresh_fetch_failures_total").increment(1);
                    tracing::warn!("Cannot update post ID {}: {}", post.message_id, e);
                }
            }
        }

        (updates, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Channel, MessageStats};
    use crate::testing::{FakeMediaSink, MockClient, dated_message};
    use crate::normalize;

    fn base_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    /// Store with one hot post (id 1), one warm post (id 2), one cold post
    /// (id 3) and one reactions-disabled hot post (id 4).
    async fn seeded() -> (Arc<PostStore>, MockClient) {
        let t = base_time();
        let store = Arc::new(PostStore::open_in_memory().unwrap());
        let sink = FakeMediaSink::default();

        let mut hot = dated_message(1, t - TimeDelta::hours(1), None);
        hot.views = Some(100);
        hot.reactions = Some(vec![]);
        let mut warm = dated_message(2, t - TimeDelta::hours(12), None);
        warm.views = Some(100);
        warm.reactions = Some(vec![]);
        let mut cold = dated_message(3, t - TimeDelta::days(10), None);
        cold.views = Some(100);
        cold.reactions = Some(vec![]);
        let disabled = dated_message(4, t - TimeDelta::hours(1), None);

        for msg in [&hot, &warm, &cold, &disabled] {
            normalize::persist_group(std::slice::from_ref(msg), &store, &sink)
                .await
                .unwrap();
        }

        let client = MockClient::new(vec![Channel {
            id: 1000,
            title: "Test".to_string(),
            handle: Some("test".to_string()),
        }]);

        (store, client)
    }

    fn refresher(client: MockClient, store: Arc<PostStore>) -> StatsRefresher {
        StatsRefresher::new(Arc::new(client), store, RefreshConfig::default())
    }

    #[tokio::test]
    async fn test_hot_tier_updates_changed_posts() {
        let (store, client) = seeded().await;
        // Views grew 100 -> 150 since ingestion
        client.set_stats(1000, 1, MessageStats {
            views: 150,
            reactions_count: 0,
        });

        let refresher = refresher(client, Arc::clone(&store));
        let stats = refresher.run_cycle(1, base_time()).await.unwrap();

        assert_eq!(stats.hot_selected, 1);
        assert_eq!(stats.hot_updated, 1);
        assert_eq!(store.get_post(1000, 1).unwrap().unwrap().views, 150);
    }

    #[tokio::test]
    async fn test_unchanged_posts_not_rewritten() {
        let (store, client) = seeded().await;
        client.set_stats(1000, 1, MessageStats {
            views: 100,
            reactions_count: 0,
        });

        let refresher = refresher(client, store);
        let stats = refresher.run_cycle(1, base_time()).await.unwrap();

        assert_eq!(stats.hot_selected, 1);
        assert_eq!(stats.hot_updated, 0);
    }

    #[tokio::test]
    async fn test_warm_tier_only_every_nth_cycle() {
        let (store, client) = seeded().await;
        client.set_stats(1000, 2, MessageStats {
            views: 200,
            reactions_count: 0,
        });

        let refresher = refresher(client, Arc::clone(&store));

        // Cycles 1 and 2: hot only
        let stats = refresher.run_cycle(1, base_time()).await.unwrap();
        assert_eq!(stats.warm_selected, 0);
        let stats = refresher.run_cycle(2, base_time()).await.unwrap();
        assert_eq!(stats.warm_selected, 0);
        assert_eq!(store.get_post(1000, 2).unwrap().unwrap().views, 100);

        // Cycle 3: warm tier runs, disjoint from hot
        let stats = refresher.run_cycle(3, base_time()).await.unwrap();
        assert_eq!(stats.warm_selected, 1);
        assert_eq!(stats.warm_updated, 1);
        assert_eq!(store.get_post(1000, 2).unwrap().unwrap().views, 200);
    }

    #[tokio::test]
    async fn test_disabled_reactions_never_selected() {
        let (store, client) = seeded().await;
        // Even with fresh counters available, the sentinel row is not polled
        client.set_stats(1000, 4, MessageStats {
            views: 999,
            reactions_count: 9,
        });

        let refresher = refresher(client, Arc::clone(&store));
        let stats = refresher.run_cycle(3, base_time()).await.unwrap();

        assert_eq!(stats.hot_selected, 1);
        let post = store.get_post(1000, 4).unwrap().unwrap();
        assert_eq!(post.views, 0);
        assert_eq!(post.reactions_count, -1);
    }

    #[tokio::test]
    async fn test_cold_posts_out_of_both_tiers() {
        let (store, client) = seeded().await;
        client.set_stats(1000, 3, MessageStats {
            views: 500,
            reactions_count: 0,
        });

        let refresher = refresher(client, Arc::clone(&store));
        let stats = refresher.run_cycle(3, base_time()).await.unwrap();

        assert_eq!(stats.hot_selected + stats.warm_selected, 2);
        assert_eq!(store.get_post(1000, 3).unwrap().unwrap().views, 100);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_post_but_not_cycle() {
        let (store, client) = seeded().await;
        client.set_stats(1000, 2, MessageStats {
            views: 200,
            reactions_count: 0,
        });
        client.fail_stats_for(1000, 1);

        let refresher = refresher(client, Arc::clone(&store));
        let stats = refresher.run_cycle(3, base_time()).await.unwrap();

        assert_eq!(stats.fetch_failures, 1);
        // The failing hot post is untouched; the warm post still updated
        assert_eq!(store.get_post(1000, 1).unwrap().unwrap().views, 100);
        assert_eq!(store.get_post(1000, 2).unwrap().unwrap().views, 200);
    }

    #[tokio::test]
    async fn test_vanished_message_skipped() {
        let (store, client) = seeded().await;
        // No stats registered for post 1: the lookup returns None

        let refresher = refresher(client, store);
        let stats = refresher.run_cycle(1, base_time()).await.unwrap();

        assert_eq!(stats.hot_updated, 0);
        assert_eq!(stats.fetch_failures, 0);
    }
}
