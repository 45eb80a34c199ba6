//! Historical channel backfill.
//!
//! For each configured channel not yet marked synced, the walker pages the
//! channel's history newest-first down to a fixed cutoff date, persisting
//! every non-duplicate post, and records a completion marker only when the
//! walk finishes cleanly. A failed walk leaves no marker and simply restarts
//! from the top on the next launch.
//!
//! Album members are skipped during backfill: reconstructing albums while
//! walking history backwards is not attempted, only the representative
//! message is expected to be captured.
//!
//! Channels that already carry a marker get a catch-up walk instead: history
//! is paged newest-first only down to the latest stored message id, closing
//! the gap accumulated while the daemon was offline.

use chrono::{DateTime, Utc};

use crate::client::{Channel, ChannelClient};
use crate::error::Result;
use crate::media::MediaSink;
use crate::normalize;
use crate::store::{InsertOutcome, PostStore};

/// Configuration for history walks.
///
/// Pacing between page fetches comes from the
/// [`Throttled`](crate::client::Throttled) client wrapper, which delays every
/// platform request.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Posts older than this date are not ingested; reaching one stops the walk.
    pub cutoff: DateTime<Utc>,
    /// Messages per history page.
    pub page_size: usize,
}

/// Statistics from one history walk.
#[derive(Debug, Clone, Default)]
pub struct BackfillStats {
    /// Messages examined.
    pub scanned: usize,
    /// Posts written to the store.
    pub saved: usize,
    /// Posts absorbed as duplicates.
    pub duplicates: usize,
    /// Album members skipped.
    pub skipped_albums: usize,
}

/// Sync one configured channel reference: full backfill for unseen channels,
/// catch-up for channels already marked synced.
///
/// The completion marker is written here, and only after a clean full walk.
pub async fn sync_channel(
    client: &dyn ChannelClient,
    store: &PostStore,
    media: &dyn MediaSink,
    reference: &str,
    config: &BackfillConfig,
) -> Result<BackfillStats> {
    let channel = client.resolve_channel(reference).await?;

    if store.is_channel_synced(channel.id)? {
        tracing::info!(
            "Channel «{}» already synced; catching up on new posts",
            channel.title
        );
        return catch_up_channel(client, store, media, &channel, config).await;
    }

    let stats = backfill_channel(client, store, media, &channel, config).await?;
    store.mark_channel_synced(channel.id)?;
    metrics::counter!("backfill_channels_synced_total").increment(1);

    tracing::info!(
        "Channel «{}» synced: {} posts saved ({} messages scanned, {} album members skipped)",
        channel.title,
        stats.saved,
        stats.scanned,
        stats.skipped_albums
    );

    Ok(stats)
}

/// Walk a channel's full history down to the cutoff date.
///
/// Does not write the completion marker; [`sync_channel`] does, so an
/// aborted walk stays eligible for a retry from the very start.
pub async fn backfill_channel(
    client: &dyn ChannelClient,
    store: &PostStore,
    media: &dyn MediaSink,
    channel: &Channel,
    config: &BackfillConfig,
) -> Result<BackfillStats> {
    tracing::info!("Starting historical backfill for «{}»", channel.title);
    walk_history(client, store, media, channel, config, None).await
}

/// Walk a synced channel's history down to the latest stored message id.
///
/// No-op when the channel has no stored posts yet.
pub async fn catch_up_channel(
    client: &dyn ChannelClient,
    store: &PostStore,
    media: &dyn MediaSink,
    channel: &Channel,
    config: &BackfillConfig,
) -> Result<BackfillStats> {
    let Some(latest) = store.latest_message_id(channel.id)? else {
        tracing::info!("No stored posts for «{}»; nothing to catch up", channel.title);
        return Ok(BackfillStats::default());
    };

    let stats = walk_history(client, store, media, channel, config, Some(latest)).await?;
    if stats.saved > 0 {
        tracing::info!(
            "Caught up «{}»: {} new posts since message {}",
            channel.title,
            stats.saved,
            latest
        );
    } else {
        tracing::info!("No new posts for «{}»", channel.title);
    }

    Ok(stats)
}

/// Page history newest-first until the cutoff date, the known-id floor, or
/// the beginning of the channel.
///
/// Persistence failures for individual posts are logged and skipped (the row
/// is simply retried by a future walk); a failed page fetch aborts the walk
/// with an error.
async fn walk_history(
    client: &dyn ChannelClient,
    store: &PostStore,
    media: &dyn MediaSink,
    channel: &Channel,
    config: &BackfillConfig,
    stop_at_message_id: Option<i64>,
) -> Result<BackfillStats> {
    let mut stats = BackfillStats::default();
    let mut before: Option<i64> = None;

    'walk: loop {
        let page = client
            .history_page(channel.id, before, config.page_size)
            .await?;
        if page.is_empty() {
            break;
        }

        for message in &page {
            if message.date < config.cutoff {
                break 'walk;
            }
            if let Some(floor) = stop_at_message_id {
                if message.message_id <= floor {
                    break 'walk;
                }
            }

            stats.scanned += 1;
            metrics::counter!("backfill_messages_total").increment(1);

            if message.is_grouped() {
                stats.skipped_albums += 1;
                continue;
            }

            match normalize::persist_group(std::slice::from_ref(message), store, media).await {
                Ok(InsertOutcome::Inserted) => {
                    stats.saved += 1;
                    metrics::counter!("backfill_posts_saved_total").increment(1);
                }
                Ok(InsertOutcome::Duplicate) => stats.duplicates += 1,
                Err(e) => {
                    tracing::error!(
                        "Failed to save message {} from «{}»: {}",
                        message.message_id,
                        channel.title,
                        e
                    );
                }
            }
        }

        before = page.last().map(|m| m.message_id);
    }

    Ok(stats)
}
