//! Group normalization: message group → normalized post record.
//!
//! A group is either a single ungrouped message or a complete album. The
//! representative message supplies the stored identity, text, date, and
//! engagement counters; media is unioned across the whole group.

use chronicle_core::{ChannelMessage, MediaKind, NewPost, permalink, reactions_total, representative};

use crate::error::Result;
use crate::media::MediaSink;
use crate::store::{InsertOutcome, PostStore};

/// Normalize a message group into a [`NewPost`].
///
/// Media placement failures are logged and the asset skipped; one bad
/// download never loses the post.
pub async fn build_post(messages: &[ChannelMessage], media: &dyn MediaSink) -> Result<NewPost> {
    let rep = representative(messages).ok_or(chronicle_core::Error::EmptyGroup)?;

    let mut photo_paths = Vec::new();
    let mut video_paths = Vec::new();
    for message in messages {
        for (index, media_ref) in message.media.iter().enumerate() {
            match media.place(message, media_ref, index).await {
                Ok(Some(path)) => match media_ref.kind {
                    MediaKind::Photo => photo_paths.push(path),
                    MediaKind::Video => video_paths.push(path),
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        "Failed to place media for message {}: {}",
                        message.message_id,
                        e
                    );
                }
            }
        }
    }

    Ok(NewPost {
        message_id: rep.message_id,
        channel_id: rep.channel_id,
        grouped_id: rep.grouped_id,
        channel_name: rep.channel_name.clone(),
        post_text: rep.text.clone(),
        post_date: rep.date,
        views: rep.views.unwrap_or(0),
        reactions_count: reactions_total(rep),
        link: permalink(rep.channel_handle.as_deref(), rep.channel_id, rep.message_id),
        raw_data: serde_json::to_value(messages)?,
        photo_paths,
        video_paths,
    })
}

/// Normalize a group and commit it through the gateway.
pub async fn persist_group(
    messages: &[ChannelMessage],
    store: &PostStore,
    media: &dyn MediaSink,
) -> Result<InsertOutcome> {
    let post = build_post(messages, media).await?;
    let outcome = store.insert_post(&post)?;

    if outcome == InsertOutcome::Inserted {
        tracing::info!(
            "Saved post [ID: {}] channel «{}»",
            post.message_id,
            post.channel_name
        );
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMediaSink, album_message};
    use chronicle_core::REACTIONS_DISABLED;

    #[tokio::test]
    async fn test_album_normalization() {
        // Album of three: only the middle message carries text, the outer two
        // carry one photo each.
        let group = vec![
            album_message(101, 9, "", &[MediaKind::Photo]),
            album_message(102, 9, "Launch day!", &[]),
            album_message(103, 9, "", &[MediaKind::Photo]),
        ];

        let sink = FakeMediaSink::default();
        let post = build_post(&group, &sink).await.unwrap();

        assert_eq!(post.message_id, 102);
        assert_eq!(post.post_text, "Launch day!");
        assert_eq!(post.grouped_id, Some(9));
        assert_eq!(post.photo_paths.len(), 2);
        assert!(post.video_paths.is_empty());
        assert_eq!(post.raw_data.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reactions_sentinel_carried() {
        let group = vec![album_message(7, 1, "text", &[])];
        let sink = FakeMediaSink::default();
        let post = build_post(&group, &sink).await.unwrap();
        // album_message builds messages without reaction data
        assert_eq!(post.reactions_count, REACTIONS_DISABLED);
    }

    #[tokio::test]
    async fn test_link_uses_handle() {
        let group = vec![album_message(42, 1, "text", &[])];
        let sink = FakeMediaSink::default();
        let post = build_post(&group, &sink).await.unwrap();
        assert_eq!(post.link, "https://t.me/testchannel/42");
    }

    #[tokio::test]
    async fn test_empty_group_rejected() {
        let sink = FakeMediaSink::default();
        let err = build_post(&[], &sink).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Core(chronicle_core::Error::EmptyGroup)
        ));
    }

    #[tokio::test]
    async fn test_persist_group_dedups() {
        let store = PostStore::open_in_memory().unwrap();
        let sink = FakeMediaSink::default();
        let group = vec![album_message(101, 9, "hello", &[])];

        assert_eq!(
            persist_group(&group, &store, &sink).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            persist_group(&group, &store, &sink).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.post_count().unwrap(), 1);
    }
}
