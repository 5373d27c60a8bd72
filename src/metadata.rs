#![forbid(unsafe_code)]

//! SQLite mirror of every `info.json` written under the download directory.
//!
//! One row per video, keyed by `video_id`. List-valued fields are stored as
//! JSON text so the table stays flat.

use std::path::Path;

use anyhow::{Context, Result};
use libsql::{Builder, Connection, Row, params};

use crate::info::InfoDocument;

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_edited_title TEXT,
            user_download_date_time TEXT,
            user_notes TEXT,
            user_tags_json TEXT DEFAULT '[]',
            title TEXT,
            target_url TEXT,
            thumbnail_url TEXT,
            uploader TEXT,
            uploader_id TEXT,
            uploader_url TEXT,
            channel TEXT,
            channel_id TEXT,
            channel_url TEXT,
            duration TEXT,
            serial_duration INTEGER,
            upload_date TEXT,
            release_date TEXT,
            video_id TEXT NOT NULL UNIQUE,
            site_name TEXT,
            highest_video_quality TEXT,
            highest_audio_quality TEXT,
            actual_video_quality TEXT,
            actual_audio_quality TEXT,
            video_width INTEGER,
            video_height INTEGER,
            age_limit INTEGER,
            view_count INTEGER,
            like_count INTEGER,
            dislike_count INTEGER,
            categories_json TEXT DEFAULT '[]',
            video_tags_json TEXT DEFAULT '[]',
            description_json TEXT DEFAULT '[]',
            thumbnail_path TEXT,
            created_at TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%S','now')),
            updated_at TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%S','now'))
        );

        CREATE INDEX IF NOT EXISTS idx_videos_video_id ON videos(video_id);
        CREATE INDEX IF NOT EXISTS idx_videos_channel_id ON videos(channel_id);
        CREATE INDEX IF NOT EXISTS idx_videos_uploader_id ON videos(uploader_id);
        "#,
    )
    .await?;
    Ok(())
}

/// Row shape returned by [`MetadataStore::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVideo {
    pub video_id: String,
    pub title: String,
    pub user_edited_title: String,
    pub channel_id: String,
    pub view_count: i64,
    pub video_tags: Vec<String>,
    pub description: Vec<String>,
    pub thumbnail_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Wrapper around the SQLite-compatible connection that performs read/write operations.
pub struct MetadataStore {
    conn: Connection,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore").finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Opens (and if necessary creates) the SQLite DB and ensures the expected
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating metadata directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening metadata DB {}", path.display()))?;

        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Inserts the document, or refreshes every column of an existing row with
    /// the same `video_id`. The stored thumbnail path is left alone.
    pub async fn upsert_info(&self, document: &InfoDocument) -> Result<()> {
        let user = &document.user_data;
        let raw = &document.raw_data;
        let user_tags_json =
            serde_json::to_string(&user.user_tags).context("serializing user tags")?;
        let categories_json =
            serde_json::to_string(&raw.categories).context("serializing categories")?;
        let video_tags_json =
            serde_json::to_string(&raw.video_tags).context("serializing video tags")?;
        let description_json =
            serde_json::to_string(&raw.description).context("serializing description")?;

        self.conn
            .execute(
                r#"
                INSERT INTO videos (
                    user_edited_title, user_download_date_time, user_notes, user_tags_json,
                    title, target_url, thumbnail_url, uploader, uploader_id, uploader_url,
                    channel, channel_id, channel_url, duration, serial_duration,
                    upload_date, release_date, video_id, site_name,
                    highest_video_quality, highest_audio_quality,
                    actual_video_quality, actual_audio_quality,
                    video_width, video_height, age_limit, view_count, like_count, dislike_count,
                    categories_json, video_tags_json, description_json
                ) VALUES (
                    :user_edited_title, :user_download_date_time, :user_notes, :user_tags_json,
                    :title, :target_url, :thumbnail_url, :uploader, :uploader_id, :uploader_url,
                    :channel, :channel_id, :channel_url, :duration, :serial_duration,
                    :upload_date, :release_date, :video_id, :site_name,
                    :highest_video_quality, :highest_audio_quality,
                    :actual_video_quality, :actual_audio_quality,
                    :video_width, :video_height, :age_limit, :view_count, :like_count, :dislike_count,
                    :categories_json, :video_tags_json, :description_json
                )
                ON CONFLICT(video_id) DO UPDATE SET
                    user_edited_title = excluded.user_edited_title,
                    user_download_date_time = excluded.user_download_date_time,
                    user_notes = excluded.user_notes,
                    user_tags_json = excluded.user_tags_json,
                    title = excluded.title,
                    target_url = excluded.target_url,
                    thumbnail_url = excluded.thumbnail_url,
                    uploader = excluded.uploader,
                    uploader_id = excluded.uploader_id,
                    uploader_url = excluded.uploader_url,
                    channel = excluded.channel,
                    channel_id = excluded.channel_id,
                    channel_url = excluded.channel_url,
                    duration = excluded.duration,
                    serial_duration = excluded.serial_duration,
                    upload_date = excluded.upload_date,
                    release_date = excluded.release_date,
                    site_name = excluded.site_name,
                    highest_video_quality = excluded.highest_video_quality,
                    highest_audio_quality = excluded.highest_audio_quality,
                    actual_video_quality = excluded.actual_video_quality,
                    actual_audio_quality = excluded.actual_audio_quality,
                    video_width = excluded.video_width,
                    video_height = excluded.video_height,
                    age_limit = excluded.age_limit,
                    view_count = excluded.view_count,
                    like_count = excluded.like_count,
                    dislike_count = excluded.dislike_count,
                    categories_json = excluded.categories_json,
                    video_tags_json = excluded.video_tags_json,
                    description_json = excluded.description_json,
                    updated_at = strftime('%Y-%m-%d %H:%M:%S','now')
                "#,
                params![
                    user.user_edited_title.as_str(),
                    user.user_download_date_time.as_str(),
                    user.user_notes.as_str(),
                    user_tags_json,
                    raw.title.as_str(),
                    raw.target_url.as_str(),
                    raw.thumbnail_url.as_str(),
                    raw.uploader.as_str(),
                    raw.uploader_id.as_str(),
                    raw.uploader_url.as_str(),
                    raw.channel.as_str(),
                    raw.channel_id.as_str(),
                    raw.channel_url.as_str(),
                    raw.duration.as_str(),
                    raw.serial_duration,
                    raw.upload_date.as_str(),
                    raw.release_date.as_str(),
                    raw.video_id.as_str(),
                    raw.site_name.as_str(),
                    raw.highest_video_quality.as_str(),
                    raw.highest_audio_quality.as_str(),
                    raw.actual_video_quality.as_str(),
                    raw.actual_audio_quality.as_str(),
                    raw.video_width,
                    raw.video_height,
                    raw.age_limit,
                    raw.view_count,
                    raw.like_count,
                    raw.dislike_count,
                    categories_json,
                    video_tags_json,
                    description_json,
                ],
            )
            .await?;

        Ok(())
    }

    /// Records where the resolver stored the thumbnail. Returns `false` when
    /// no row exists for `video_id`.
    pub async fn set_thumbnail_path(&self, video_id: &str, path: &Path) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                r#"
                UPDATE videos
                SET thumbnail_path = ?2,
                    updated_at = strftime('%Y-%m-%d %H:%M:%S','now')
                WHERE video_id = ?1
                "#,
                params![video_id, path.to_string_lossy().into_owned()],
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn get(&self, video_id: &str) -> Result<Option<StoredVideo>> {
        let stmt = self
            .conn
            .prepare(
                r#"
                SELECT video_id, title, user_edited_title, channel_id, view_count,
                       video_tags_json, description_json, thumbnail_path,
                       created_at, updated_at
                FROM videos
                WHERE video_id = ?1
                "#,
            )
            .await?;

        let mut rows = stmt.query([video_id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_stored_video(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn count(&self) -> Result<i64> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM videos", params![]).await?;
        let row = rows.next().await?.context("missing count row")?;
        Ok(row.get(0)?)
    }
}

/// Column order must match the SELECT in [`MetadataStore::get`].
fn row_to_stored_video(row: &Row) -> Result<StoredVideo> {
    let tags_json: String = row.get(5)?;
    let description_json: String = row.get(6)?;
    Ok(StoredVideo {
        video_id: row.get(0)?,
        title: row.get(1)?,
        user_edited_title: row.get(2)?,
        channel_id: row.get(3)?,
        view_count: row.get(4)?,
        video_tags: serde_json::from_str(&tags_json).context("parsing stored tags JSON")?,
        description: serde_json::from_str(&description_json)
            .context("parsing stored description JSON")?,
        thumbnail_path: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
