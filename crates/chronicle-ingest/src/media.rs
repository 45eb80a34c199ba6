//! Media placement.
//!
//! The ingestion core never interprets media: it asks a [`MediaSink`] to
//! place each asset and records whatever path string comes back in the
//! post's media lists. Placement (local disk, object storage) is the sink's
//! concern.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use chronicle_core::{ChannelMessage, MediaRef};

use crate::error::Result;

/// A destination for media assets.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Place one media asset attached to `message`.
    ///
    /// `index` disambiguates multiple assets on the same message. Returns the
    /// stored path, or `None` when the asset is unavailable (missing or
    /// empty source); the caller records the string verbatim.
    async fn place(
        &self,
        message: &ChannelMessage,
        media: &MediaRef,
        index: usize,
    ) -> Result<Option<String>>;
}

/// Sink that stores nothing. Used for media-less runs.
pub struct NullMediaSink;

#[async_trait]
impl MediaSink for NullMediaSink {
    async fn place(
        &self,
        _message: &ChannelMessage,
        _media: &MediaRef,
        _index: usize,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Local-filesystem sink: copies assets under
/// `<root>/<channel_id>/<message_id>[-n].<ext>`.
pub struct LocalMediaSink {
    root: PathBuf,
}

impl LocalMediaSink {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MediaSink for LocalMediaSink {
    async fn place(
        &self,
        message: &ChannelMessage,
        media: &MediaRef,
        index: usize,
    ) -> Result<Option<String>> {
        let source = Path::new(&media.source);

        let meta = match tokio::fs::metadata(source).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!("Media source {} unavailable: {}", source.display(), e);
                return Ok(None);
            }
        };
        if meta.len() == 0 {
            return Ok(None);
        }

        let dir = self.root.join(message.channel_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = if index == 0 {
            format!("{}.{}", message.message_id, media.kind.extension())
        } else {
            format!("{}-{}.{}", message.message_id, index, media.kind.extension())
        };
        let dest = dir.join(file_name);

        tokio::fs::copy(source, &dest).await?;

        Ok(Some(dest.to_string_lossy().replace('\\', "/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::MediaKind;
    use chrono::DateTime;
    use std::io::Write;
    use tempfile::TempDir;

    fn message(channel_id: i64, message_id: i64) -> ChannelMessage {
        ChannelMessage {
            message_id,
            channel_id,
            channel_name: "Test".to_string(),
            channel_handle: None,
            grouped_id: None,
            text: String::new(),
            date: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            views: None,
            reactions: None,
            media: Vec::new(),
        }
    }

    fn write_source(dir: &Path, name: &str, contents: &[u8]) -> String {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_places_photo() {
        let sources = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let sink = LocalMediaSink::new(dest.path());

        let source = write_source(sources.path(), "orig.jpg", b"jpeg bytes");
        let media = MediaRef {
            kind: MediaKind::Photo,
            source,
        };

        let path = sink
            .place(&message(1000, 42), &media, 0)
            .await
            .unwrap()
            .unwrap();
        assert!(path.ends_with("1000/42.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_index_disambiguates_file_names() {
        let sources = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let sink = LocalMediaSink::new(dest.path());

        let source = write_source(sources.path(), "orig.mp4", b"mp4 bytes");
        let media = MediaRef {
            kind: MediaKind::Video,
            source,
        };

        let first = sink
            .place(&message(1000, 42), &media, 0)
            .await
            .unwrap()
            .unwrap();
        let second = sink
            .place(&message(1000, 42), &media, 1)
            .await
            .unwrap()
            .unwrap();
        assert!(first.ends_with("42.mp4"));
        assert!(second.ends_with("42-1.mp4"));
    }

    #[tokio::test]
    async fn test_skips_missing_and_empty_sources() {
        let sources = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let sink = LocalMediaSink::new(dest.path());

        let missing = MediaRef {
            kind: MediaKind::Photo,
            source: sources.path().join("nope.jpg").to_string_lossy().into_owned(),
        };
        assert!(sink.place(&message(1, 1), &missing, 0).await.unwrap().is_none());

        let empty_path = write_source(sources.path(), "empty.jpg", b"");
        let empty = MediaRef {
            kind: MediaKind::Photo,
            source: empty_path,
        };
        assert!(sink.place(&message(1, 2), &empty, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_null_sink_stores_nothing() {
        let media = MediaRef {
            kind: MediaKind::Photo,
            source: "anything".to_string(),
        };
        assert!(NullMediaSink
            .place(&message(1, 1), &media, 0)
            .await
            .unwrap()
            .is_none());
    }
}
