//! Live event grouping with album debounce.
//!
//! Albums arrive as several messages sharing a `grouped_id`, with no
//! platform-side "album complete" signal and no size known in advance. The
//! grouper buffers album members and flushes a group once a quiet period (the
//! debounce delay) elapses with no further arrivals; every new arrival for an
//! album resets its timer. Ungrouped messages pass through immediately.
//!
//! The buffer and all timer state are owned exclusively by one driver task
//! ([`run_grouper`]); the event source communicates with it only through a
//! channel. [`AlbumBuffer`] itself is a pure state machine over injected
//! instants, so completion logic is testable without waiting on real timers.
//!
//! An album still buffered when the process stops is dropped; the buffer is
//! deliberately not persisted.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use chronicle_core::ChannelMessage;

use crate::media::MediaSink;
use crate::normalize;
use crate::store::{InsertOutcome, PostStore};

/// Configuration for the event grouper.
#[derive(Debug, Clone)]
pub struct GrouperConfig {
    /// Quiet period after which a buffered album is considered complete.
    pub debounce: Duration,
}

impl Default for GrouperConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
        }
    }
}

/// How often the driver re-checks the shutdown flag while idle.
const SHUTDOWN_POLL: Duration = Duration::from_millis(500);

/// One album being collected.
#[derive(Debug)]
struct PendingAlbum {
    messages: Vec<ChannelMessage>,
    deadline: Instant,
}

/// Debounce buffer keyed by album identifier.
///
/// Pure state machine: callers supply the current instant, so tests can
/// drive timer expiry deterministically.
pub struct AlbumBuffer {
    debounce: Duration,
    groups: HashMap<i64, PendingAlbum>,
}

impl AlbumBuffer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            groups: HashMap::new(),
        }
    }

    /// Feed one inbound message.
    ///
    /// Returns a complete group immediately for ungrouped messages; album
    /// members are buffered (resetting the album's timer) and `None` is
    /// returned.
    pub fn push(&mut self, message: ChannelMessage, now: Instant) -> Option<Vec<ChannelMessage>> {
        let Some(grouped_id) = message.grouped_id else {
            return Some(vec![message]);
        };

        let album = self.groups.entry(grouped_id).or_insert_with(|| PendingAlbum {
            messages: Vec::new(),
            deadline: now + self.debounce,
        });
        album.messages.push(message);
        // Each arrival restarts the quiet period
        album.deadline = now + self.debounce;

        None
    }

    /// The earliest pending flush deadline, if any album is buffered.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.groups.values().map(|album| album.deadline).min()
    }

    /// Remove and return every album whose quiet period has elapsed.
    pub fn flush_due(&mut self, now: Instant) -> Vec<Vec<ChannelMessage>> {
        let due: Vec<i64> = self
            .groups
            .iter()
            .filter(|(_, album)| album.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        due.into_iter()
            .filter_map(|id| self.groups.remove(&id))
            .map(|album| album.messages)
            .collect()
    }

    /// Number of albums currently buffered.
    pub fn pending(&self) -> usize {
        self.groups.len()
    }
}

/// Statistics from a grouper run.
#[derive(Debug, Clone, Default)]
pub struct GrouperStats {
    /// Ungrouped messages forwarded immediately.
    pub singles: usize,
    /// Albums flushed after their quiet period.
    pub albums: usize,
    /// Posts written to the store.
    pub saved: usize,
    /// Posts absorbed as duplicates.
    pub duplicates: usize,
}

/// Drive the grouper over a live event feed until the feed ends or the
/// running flag is cleared.
///
/// Owns the [`AlbumBuffer`] exclusively; completed groups are normalized and
/// committed through the gateway. Persistence failures are logged and the
/// next group processed. After the feed closes, albums still waiting on
/// their timers are allowed to flush before returning; on shutdown, albums
/// still buffered are dropped.
pub async fn run_grouper(
    mut events: mpsc::Receiver<ChannelMessage>,
    store: Arc<PostStore>,
    media: Arc<dyn MediaSink>,
    config: GrouperConfig,
    running: Arc<AtomicBool>,
) -> GrouperStats {
    let mut buffer = AlbumBuffer::new(config.debounce);
    let mut stats = GrouperStats::default();
    let mut open = true;

    tracing::info!("Event grouper started (debounce: {:?})", config.debounce);

    loop {
        if !running.load(Ordering::SeqCst) {
            if buffer.pending() > 0 {
                tracing::warn!(
                    "Dropping {} albums still buffered at shutdown",
                    buffer.pending()
                );
            }
            break;
        }

        let deadline = buffer.next_deadline();
        if !open && deadline.is_none() {
            break;
        }

        tokio::select! {
            maybe = events.recv(), if open => match maybe {
                Some(message) => {
                    tracing::debug!(
                        "New message «{}» [ID: {}]",
                        message.channel_name,
                        message.message_id
                    );
                    if let Some(group) = buffer.push(message, Instant::now()) {
                        stats.singles += 1;
                        persist(&group, &store, media.as_ref(), &mut stats).await;
                    }
                    metrics::gauge!("ingest_albums_pending").set(buffer.pending() as f64);
                }
                None => {
                    open = false;
                }
            },
            _ = sleep_until(deadline), if deadline.is_some() => {
                for group in buffer.flush_due(Instant::now()) {
                    tracing::info!(
                        "Album {} complete with {} parts",
                        group.first().and_then(|m| m.grouped_id).unwrap_or_default(),
                        group.len()
                    );
                    stats.albums += 1;
                    metrics::counter!("ingest_albums_grouped_total").increment(1);
                    persist(&group, &store, media.as_ref(), &mut stats).await;
                }
                metrics::gauge!("ingest_albums_pending").set(buffer.pending() as f64);
            }
            // Re-check the running flag even while the feed is quiet
            _ = tokio::time::sleep(SHUTDOWN_POLL) => {}
        }
    }

    tracing::info!(
        "Event grouper stopped: {} singles, {} albums, {} saved, {} duplicates",
        stats.singles,
        stats.albums,
        stats.saved,
        stats.duplicates
    );

    stats
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        // Guarded out by the caller; never completes
        None => std::future::pending().await,
    }
}

async fn persist(
    group: &[ChannelMessage],
    store: &PostStore,
    media: &dyn MediaSink,
    stats: &mut GrouperStats,
) {
    match normalize::persist_group(group, store, media).await {
        Ok(InsertOutcome::Inserted) => {
            stats.saved += 1;
            metrics::counter!("ingest_posts_saved_total").increment(1);
        }
        Ok(InsertOutcome::Duplicate) => {
            stats.duplicates += 1;
            metrics::counter!("ingest_posts_duplicate_total").increment(1);
        }
        Err(e) => {
            // One bad post never stops the feed
            tracing::error!("Failed to save post group: {}", e);
        }
    }
}
