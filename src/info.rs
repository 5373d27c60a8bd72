#![forbid(unsafe_code)]

//! The per-video `info.json` document.
//!
//! yt-dlp hands us a large, loosely typed info dict. [`VideoInfo`] keeps only
//! the fields we read, all optional because older uploads may lack any of
//! them. [`InfoDocument`] is what lands on disk: an editable `user_data`
//! block plus the normalized `raw_data` block.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::thumbnail::ThumbnailCandidate;

pub const INFO_JSON_FILE: &str = "info.json";
pub const UNKNOWN: &str = "unknown";

const DOWNLOAD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Subset of `yt-dlp --dump-single-json` output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub webpage_url: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailEntry>,
    pub uploader: Option<String>,
    pub uploader_id: Option<String>,
    pub uploader_url: Option<String>,
    pub channel: Option<String>,
    pub channel_id: Option<String>,
    pub channel_url: Option<String>,
    pub duration: Option<f64>,
    pub upload_date: Option<String>,
    pub release_date: Option<String>,
    pub extractor: Option<String>,
    pub age_limit: Option<i64>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub dislike_count: Option<i64>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub formats: Vec<FormatInfo>,
    #[serde(default)]
    pub requested_formats: Vec<FormatInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThumbnailEntry {
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatInfo {
    pub format_id: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub abr: Option<f64>,
}

impl FormatInfo {
    /// yt-dlp marks missing streams with the literal string `none`.
    fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }

    fn has_audio(&self) -> bool {
        self.acodec.as_deref() != Some("none")
    }
}

impl VideoInfo {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).context("deserializing yt-dlp info dict")
    }

    /// Thumbnails listed by the provider. Falls back to the single
    /// `thumbnail` field when the list is empty.
    pub fn thumbnail_candidates(&self) -> Vec<ThumbnailCandidate> {
        let mut candidates: Vec<ThumbnailCandidate> = self
            .thumbnails
            .iter()
            .filter_map(|entry| {
                let url = entry.url.as_deref()?.trim();
                (!url.is_empty()).then(|| ThumbnailCandidate {
                    url: url.to_string(),
                    width: entry.width,
                    height: entry.height,
                })
            })
            .collect();

        if candidates.is_empty()
            && let Some(url) = self.thumbnail.as_deref().map(str::trim)
            && !url.is_empty()
        {
            candidates.push(ThumbnailCandidate {
                url: url.to_string(),
                width: None,
                height: None,
            });
        }
        candidates
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub user_edited_title: String,
    pub user_download_date_time: String,
    pub user_notes: String,
    pub user_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    pub title: String,
    pub target_url: String,
    pub thumbnail_url: String,
    pub uploader: String,
    pub uploader_id: String,
    pub uploader_url: String,
    pub channel: String,
    pub channel_id: String,
    pub channel_url: String,
    pub duration: String,
    pub serial_duration: i64,
    pub upload_date: String,
    pub release_date: String,
    pub video_id: String,
    pub site_name: String,
    pub highest_video_quality: String,
    pub highest_audio_quality: String,
    pub actual_video_quality: String,
    pub actual_audio_quality: String,
    pub video_width: Option<i64>,
    pub video_height: Option<i64>,
    pub age_limit: i64,
    pub view_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub categories: Vec<String>,
    pub video_tags: Vec<String>,
    pub description: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoDocument {
    pub user_data: UserData,
    pub raw_data: RawData,
}

fn or_unknown(value: &Option<String>) -> String {
    value
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Renders seconds as `H:MM:SS`, prefixed with `N day(s), ` past 24 hours
/// (`1 day, 2:03:04`).
pub fn format_duration(total_seconds: i64) -> String {
    let total = total_seconds.max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    let clock = format!("{hours}:{minutes:02}:{seconds:02}");
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        _ => format!("{days} days, {clock}"),
    }
}

fn video_quality(format: &FormatInfo) -> Option<String> {
    format.height.map(|height| format!("{height}p"))
}

fn audio_quality(format: &FormatInfo) -> Option<String> {
    format.abr.map(|abr| format!("{abr}kbps"))
}

impl InfoDocument {
    pub fn from_info(info: &VideoInfo) -> Self {
        Self::from_info_at(info, Local::now().format(DOWNLOAD_TIME_FORMAT).to_string())
    }

    fn from_info_at(info: &VideoInfo, downloaded_at: String) -> Self {
        let downloaded_video = info
            .requested_formats
            .iter()
            .find(|format| format.has_video());
        let downloaded_audio = info
            .requested_formats
            .iter()
            .find(|format| format.has_audio());

        let highest_video = info
            .formats
            .iter()
            .filter(|format| format.has_video() && format.height.is_some())
            .max_by_key(|format| format.height);
        let highest_audio = info
            .formats
            .iter()
            .filter(|format| format.has_audio() && format.abr.is_some())
            .max_by(|a, b| a.abr.unwrap_or(0.0).total_cmp(&b.abr.unwrap_or(0.0)));

        let description = match info.description.as_deref() {
            Some(text) if !text.is_empty() => text.lines().map(str::to_string).collect(),
            _ => vec![UNKNOWN.to_string()],
        };
        let serial_duration = info.duration.map(|secs| secs as i64).unwrap_or(0);
        let title = or_unknown(&info.title);

        let raw_data = RawData {
            title: title.clone(),
            target_url: or_unknown(&info.webpage_url),
            thumbnail_url: or_unknown(&info.thumbnail),
            uploader: or_unknown(&info.uploader),
            uploader_id: or_unknown(&info.uploader_id),
            uploader_url: or_unknown(&info.uploader_url),
            channel: or_unknown(&info.channel),
            channel_id: or_unknown(&info.channel_id),
            channel_url: or_unknown(&info.channel_url),
            duration: format_duration(serial_duration),
            serial_duration,
            upload_date: or_unknown(&info.upload_date),
            release_date: or_unknown(&info.release_date),
            video_id: or_unknown(&info.id),
            site_name: or_unknown(&info.extractor),
            highest_video_quality: highest_video
                .and_then(video_quality)
                .unwrap_or_else(|| UNKNOWN.into()),
            highest_audio_quality: highest_audio
                .and_then(audio_quality)
                .unwrap_or_else(|| UNKNOWN.into()),
            actual_video_quality: downloaded_video
                .and_then(video_quality)
                .unwrap_or_else(|| UNKNOWN.into()),
            actual_audio_quality: downloaded_audio
                .and_then(audio_quality)
                .unwrap_or_else(|| UNKNOWN.into()),
            video_width: downloaded_video.and_then(|format| format.width),
            video_height: downloaded_video.and_then(|format| format.height),
            age_limit: info.age_limit.unwrap_or(0),
            view_count: info.view_count.unwrap_or(0),
            like_count: info.like_count.unwrap_or(0),
            dislike_count: info.dislike_count.unwrap_or(0),
            categories: info.categories.clone().unwrap_or_default(),
            video_tags: info.tags.clone().unwrap_or_default(),
            description,
        };

        let user_data = UserData {
            user_edited_title: title,
            user_download_date_time: downloaded_at,
            user_notes: String::new(),
            user_tags: Vec::new(),
        };

        Self {
            user_data,
            raw_data,
        }
    }
}

/// Writes `info.json` into `video_dir`, creating the directory if needed.
pub fn write_info_json(document: &InfoDocument, video_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(video_dir)
        .with_context(|| format!("creating video directory {}", video_dir.display()))?;
    let path = video_dir.join(INFO_JSON_FILE);
    let json = serde_json::to_string_pretty(document).context("serializing info document")?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_info() -> VideoInfo {
        VideoInfo::from_json(json!({
            "id": "M5eCWUBs-1o",
            "title": "夜に駆ける",
            "description": "line one\nline two",
            "webpage_url": "https://www.youtube.com/watch?v=M5eCWUBs-1o",
            "thumbnail": "https://i.ytimg.com/vi/M5eCWUBs-1o/hqdefault.jpg",
            "thumbnails": [
                {"url": "https://i.ytimg.com/vi/M5eCWUBs-1o/default.jpg", "width": 120, "height": 90},
                {"url": "https://i.ytimg.com/vi/M5eCWUBs-1o/hqdefault.jpg", "width": 480, "height": 360},
                {"url": "", "width": 1, "height": 1},
                {"id": "no-url"}
            ],
            "uploader": "Ayase",
            "channel_id": "UC123",
            "duration": 3725,
            "extractor": "youtube",
            "view_count": 1000,
            "tags": ["music"],
            "formats": [
                {"format_id": "18", "vcodec": "avc1", "acodec": "mp4a", "height": 360, "abr": 96.0},
                {"format_id": "137", "vcodec": "avc1", "acodec": "none", "height": 1080, "width": 1920},
                {"format_id": "140", "vcodec": "none", "acodec": "mp4a", "abr": 129.5}
            ],
            "requested_formats": [
                {"format_id": "137", "vcodec": "avc1", "acodec": "none", "height": 1080, "width": 1920},
                {"format_id": "140", "vcodec": "none", "acodec": "mp4a", "abr": 129.5}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn duration_matches_timedelta_rendering() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(125), "0:02:05");
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(format_duration(86_400 + 61), "1 day, 0:01:01");
        assert_eq!(format_duration(2 * 86_400), "2 days, 0:00:00");
    }

    #[test]
    fn document_reports_actual_and_highest_quality() {
        let doc = InfoDocument::from_info_at(&sample_info(), "2024-01-01 00:00:00".into());
        let raw = &doc.raw_data;
        assert_eq!(raw.highest_video_quality, "1080p");
        assert_eq!(raw.highest_audio_quality, "129.5kbps");
        assert_eq!(raw.actual_video_quality, "1080p");
        assert_eq!(raw.actual_audio_quality, "129.5kbps");
        assert_eq!(raw.video_width, Some(1920));
        assert_eq!(raw.video_height, Some(1080));
    }

    #[test]
    fn document_fills_unknowns_and_splits_description() {
        let doc = InfoDocument::from_info_at(&sample_info(), "2024-01-01 00:00:00".into());
        let raw = &doc.raw_data;
        assert_eq!(raw.title, "夜に駆ける");
        assert_eq!(raw.uploader_id, UNKNOWN);
        assert_eq!(raw.release_date, UNKNOWN);
        assert_eq!(raw.duration, "1:02:05");
        assert_eq!(raw.serial_duration, 3725);
        assert_eq!(raw.description, vec!["line one", "line two"]);
        assert_eq!(raw.like_count, 0);
        assert!(raw.categories.is_empty());
        assert_eq!(doc.user_data.user_edited_title, "夜に駆ける");
        assert_eq!(doc.user_data.user_download_date_time, "2024-01-01 00:00:00");
    }

    #[test]
    fn empty_info_is_all_unknown() {
        let doc = InfoDocument::from_info_at(&VideoInfo::default(), String::new());
        assert_eq!(doc.raw_data.video_id, UNKNOWN);
        assert_eq!(doc.raw_data.highest_video_quality, UNKNOWN);
        assert_eq!(doc.raw_data.actual_audio_quality, UNKNOWN);
        assert_eq!(doc.raw_data.description, vec![UNKNOWN]);
        assert_eq!(doc.raw_data.video_width, None);
    }

    #[test]
    fn thumbnail_candidates_skip_entries_without_url() {
        let candidates = sample_info().thumbnail_candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].width, Some(480));
        assert_eq!(candidates[1].height, Some(360));
    }

    #[test]
    fn thumbnail_candidates_fall_back_to_single_thumbnail() {
        let info = VideoInfo {
            thumbnail: Some("https://example.com/t.webp".into()),
            ..VideoInfo::default()
        };
        let candidates = info.thumbnail_candidates();
        assert_eq!(
            candidates,
            vec![ThumbnailCandidate {
                url: "https://example.com/t.webp".into(),
                width: None,
                height: None,
            }]
        );
        assert!(VideoInfo::default().thumbnail_candidates().is_empty());
    }

    #[test]
    fn info_json_keeps_non_ascii_text() {
        let dir = tempdir().unwrap();
        let doc = InfoDocument::from_info_at(&sample_info(), "2024-01-01 00:00:00".into());
        let path = write_info_json(&doc, &dir.path().join("M5eCWUBs-1o")).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("夜に駆ける"));
        let parsed: InfoDocument = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, doc);
    }
}
