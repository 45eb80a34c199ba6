//! The persistence gateway.
//!
//! [`PostStore`] is the single point where a normalized post record is
//! deduplicated and committed; the live grouper, the backfill walker, and the
//! stats refresher all write through it.
//!
//! # Dedup contract
//!
//! The `UNIQUE(channel_id, message_id)` constraint is the authoritative
//! guard: [`PostStore::insert_post`] performs an application-level existence
//! check first (to avoid constraint churn on the common duplicate path) and
//! then an `INSERT OR IGNORE`, so a concurrent insert of the same identity is
//! absorbed rather than surfaced as an error.
//!
//! # Concurrency
//!
//! The connection lives behind a `parking_lot::Mutex` and each method holds
//! the lock only for one logical unit of work (one post, one batch). No lock
//! is held across an await point.

pub mod schema;

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use chronicle_core::{NewPost, PostStats, StatsUpdate};

use crate::error::Result;

/// Outcome of a gateway insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// A row with the same `(channel_id, message_id)` already existed.
    Duplicate,
}

/// A stored post row, as read back for inspection.
#[derive(Debug, Clone)]
pub struct StoredPost {
    pub channel_id: i64,
    pub message_id: i64,
    pub grouped_id: Option<i64>,
    pub channel_name: String,
    pub post_text: String,
    pub post_date: DateTime<Utc>,
    pub views: i64,
    pub reactions_count: i64,
    pub link: Option<String>,
    pub photo_paths: Vec<String>,
    pub video_paths: Vec<String>,
}

/// SQLite-backed post store.
///
/// Thread-safe: can be shared across tasks via `Arc<PostStore>`.
pub struct PostStore {
    conn: Mutex<Connection>,
}

impl PostStore {
    /// Open or create a post store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!("Opening post store at {}", path.display());

        let conn = Connection::open(path)?;

        // WAL mode for better concurrency between writers and readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a normalized post unless its `(channel_id, message_id)` identity
    /// already exists.
    ///
    /// The existence check is an optimization; the UNIQUE constraint backs it
    /// up, so a concurrent producer inserting the same identity still results
    /// in exactly one row and [`InsertOutcome::Duplicate`] for the loser.
    pub fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome> {
        let conn = self.conn.lock();

        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM posts WHERE channel_id = ? AND message_id = ?",
                rusqlite::params![post.channel_id, post.message_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(InsertOutcome::Duplicate);
        }

        let changed = conn.execute(
            "INSERT OR IGNORE INTO posts
             (channel_id, message_id, grouped_id, channel_name, post_text, post_date,
              views, reactions_count, link, raw_data, photo_paths, video_paths)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                post.channel_id,
                post.message_id,
                post.grouped_id,
                post.channel_name,
                post.post_text,
                post.post_date.timestamp(),
                post.views,
                post.reactions_count,
                post.link,
                post.raw_data.to_string(),
                serde_json::to_string(&post.photo_paths)?,
                serde_json::to_string(&post.video_paths)?,
            ],
        )?;

        if changed == 0 {
            // Lost the race to a concurrent producer; absorbed silently.
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Fetch one post row by identity.
    pub fn get_post(&self, channel_id: i64, message_id: i64) -> Result<Option<StoredPost>> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                "SELECT channel_id, message_id, grouped_id, channel_name, post_text,
                        post_date, views, reactions_count, link, photo_paths, video_paths
                 FROM posts WHERE channel_id = ? AND message_id = ?",
                rusqlite::params![channel_id, message_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, String>(10)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            channel_id,
            message_id,
            grouped_id,
            channel_name,
            post_text,
            post_date,
            views,
            reactions_count,
            link,
            photo_paths,
            video_paths,
        )) = row
        else {
            return Ok(None);
        };

        let post_date = DateTime::from_timestamp(post_date, 0)
            .ok_or(chronicle_core::Error::InvalidTimestamp(post_date))?;

        Ok(Some(StoredPost {
            channel_id,
            message_id,
            grouped_id,
            channel_name,
            post_text,
            post_date,
            views,
            reactions_count,
            link,
            photo_paths: serde_json::from_str(&photo_paths)?,
            video_paths: serde_json::from_str(&video_paths)?,
        }))
    }

    /// Select the stats slice of posts with `post_date` in `[since, until)`,
    /// newest first. An `until` of `None` means no upper bound.
    ///
    /// Posts whose `reactions_count` carries the disabled sentinel are never
    /// returned; refreshing them is known to be useless.
    pub fn stats_window(
        &self,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<PostStats>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT channel_id, message_id, views, reactions_count
             FROM posts
             WHERE post_date >= ?1
               AND (?2 IS NULL OR post_date < ?2)
               AND reactions_count != -1
             ORDER BY post_date DESC",
        )?;

        let rows = stmt
            .query_map(
                rusqlite::params![since.timestamp(), until.map(|t| t.timestamp())],
                |row| {
                    Ok(PostStats {
                        channel_id: row.get(0)?,
                        message_id: row.get(1)?,
                        views: row.get(2)?,
                        reactions_count: row.get(3)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// Apply a batch of statistics updates in one transaction.
    ///
    /// Returns the number of rows actually touched.
    pub fn apply_stats(&self, updates: &[StatsUpdate]) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut touched = 0usize;
        for update in updates {
            touched += tx.execute(
                "UPDATE posts SET views = ?, reactions_count = ?
                 WHERE channel_id = ? AND message_id = ?",
                rusqlite::params![
                    update.views,
                    update.reactions_count,
                    update.channel_id,
                    update.message_id
                ],
            )?;
        }

        tx.commit()?;
        Ok(touched)
    }

    /// The highest stored `message_id` for a channel, if any post exists.
    ///
    /// Used by the catch-up walk to know where the archive ends.
    pub fn latest_message_id(&self, channel_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock();

        let max: Option<i64> = conn.query_row(
            "SELECT MAX(message_id) FROM posts WHERE channel_id = ?",
            [channel_id],
            |row| row.get(0),
        )?;

        Ok(max)
    }

    /// Whether a channel's historical backfill has completed.
    pub fn is_channel_synced(&self, channel_id: i64) -> Result<bool> {
        let conn = self.conn.lock();

        let row: Option<i64> = conn
            .query_row(
                "SELECT channel_id FROM synced_channels WHERE channel_id = ?",
                [channel_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(row.is_some())
    }

    /// All channel ids whose backfill has completed.
    pub fn synced_channel_ids(&self) -> Result<HashSet<i64>> {
        let conn = self.conn.lock();

        let ids = conn
            .prepare("SELECT channel_id FROM synced_channels")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<i64>>>()?;

        Ok(ids)
    }

    /// Record that a channel's backfill completed down to the cutoff date.
    ///
    /// Written exactly once per channel; re-marking is a no-op.
    pub fn mark_channel_synced(&self, channel_id: i64) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR IGNORE INTO synced_channels (channel_id) VALUES (?)",
            [channel_id],
        )?;

        Ok(())
    }

    /// Total number of stored posts.
    pub fn post_count(&self) -> Result<u64> {
        let conn = self.conn.lock();

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
