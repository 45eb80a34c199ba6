//! SQLite schema for the post archive.
//!
//! This module defines the database schema and provides migration utilities
//! for the post store.

use rusqlite::{Connection, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema.
///
/// Creates all tables if they don't exist and runs any pending migrations.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        // Fresh database - create all tables
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        migrate(conn, current_version, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Create all tables for a fresh database.
fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per logical post. For albums, the row carries the
        -- representative message's id; the other members are absorbed.
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            channel_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            grouped_id INTEGER,
            channel_name TEXT NOT NULL DEFAULT '',
            post_text TEXT NOT NULL DEFAULT '',
            post_date INTEGER NOT NULL,
            views INTEGER NOT NULL DEFAULT 0,
            reactions_count INTEGER NOT NULL DEFAULT 0,
            link TEXT,
            raw_data TEXT,
            photo_paths TEXT NOT NULL DEFAULT '[]',
            video_paths TEXT NOT NULL DEFAULT '[]',
            UNIQUE(channel_id, message_id)
        );

        -- Completion markers: a row means the channel's historical backfill
        -- finished down to the cutoff date and must never re-run.
        CREATE TABLE IF NOT EXISTS synced_channels (
            channel_id INTEGER PRIMARY KEY
        );

        -- Indexes for the refresh window scans
        CREATE INDEX IF NOT EXISTS idx_posts_post_date ON posts(post_date);
        CREATE INDEX IF NOT EXISTS idx_posts_grouped_id ON posts(grouped_id);
        "#,
    )?;

    Ok(())
}

/// Run migrations from one version to another.
fn migrate(conn: &Connection, from: i32, to: i32) -> Result<()> {
    for version in from..to {
        if version == 1 {
            migrate_v1_to_v2(conn)?;
        }
    }
    set_schema_version(conn, to)?;
    Ok(())
}

/// Migrate from v1 to v2: fold the legacy single `photo_path`/`video_path`
/// columns into the JSON-array `photo_paths`/`video_paths` columns.
fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE posts ADD COLUMN photo_paths TEXT NOT NULL DEFAULT '[]';
        ALTER TABLE posts ADD COLUMN video_paths TEXT NOT NULL DEFAULT '[]';
        "#,
    )?;

    // Wrap existing single paths as one-element arrays. Serialize through
    // serde_json so path strings are escaped correctly.
    let rows: Vec<(i64, Option<String>, Option<String>)> = conn
        .prepare("SELECT id, photo_path, video_path FROM posts")?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<_>>()?;

    for (id, photo_path, video_path) in rows {
        if let Some(path) = photo_path.filter(|p| !p.is_empty()) {
            let json = serde_json::Value::from(vec![path]).to_string();
            conn.execute(
                "UPDATE posts SET photo_paths = ? WHERE id = ?",
                rusqlite::params![json, id],
            )?;
        }
        if let Some(path) = video_path.filter(|p| !p.is_empty()) {
            let json = serde_json::Value::from(vec![path]).to_string();
            conn.execute(
                "UPDATE posts SET video_paths = ? WHERE id = ?",
                rusqlite::params![json, id],
            )?;
        }
    }

    conn.execute_batch(
        r#"
        ALTER TABLE posts DROP COLUMN photo_path;
        ALTER TABLE posts DROP COLUMN video_path;
        "#,
    )?;

    Ok(())
}
