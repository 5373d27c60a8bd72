#![forbid(unsafe_code)]

//! Thin wrapper around the `yt-dlp` executable.
//!
//! yt-dlp is the metadata provider and the media downloader; we only shape its
//! arguments and read the JSON it prints.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use log::{debug, info};
use serde_json::Value;

use crate::info::VideoInfo;

pub const MEDIA_STEM: &str = "media";

const LISTING_CLIENTS: &str = "youtube:player_client=tv,web,ios,android";
const DOWNLOAD_CLIENTS: &str = "youtube:player_client=tv";
const SKIPPED_AVAILABILITY: [&str; 3] = ["private", "needs_auth", "scheduled"];
const SKIPPED_LIVE_STATUS: [&str; 2] = ["not_started", "is_upcoming"];

/// Rejects anything that is not a YouTube URL before spawning yt-dlp.
pub fn validate_video_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        bail!("video URL is empty");
    }
    if !(url.contains("youtube.com/") || url.contains("youtu.be/")) {
        bail!("not a YouTube URL: {url}");
    }
    Ok(())
}

/// Channel handle URLs list nothing useful on their own; point them at the
/// uploads tab.
pub fn normalize_listing_url(url: &str) -> String {
    let url = url.trim();
    if url.contains('@') && !url.trim_end_matches('/').ends_with("/videos") {
        format!("{}/videos", url.trim_end_matches('/'))
    } else {
        url.to_string()
    }
}

fn str_field<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str)
}

/// Why a listing entry cannot be downloaded right now, if it cannot.
fn skip_reason(entry: &Value, now: i64) -> Option<String> {
    if let Some(availability) = str_field(entry, "availability")
        && SKIPPED_AVAILABILITY.contains(&availability)
    {
        return Some(format!("availability={availability}"));
    }
    if let Some(live_status) = str_field(entry, "live_status")
        && SKIPPED_LIVE_STATUS.contains(&live_status)
    {
        return Some(format!("live_status={live_status}"));
    }
    if let Some(premiere) = entry.get("premiere_timestamp").and_then(Value::as_f64)
        && premiere > now as f64
    {
        return Some("premiere in the future".into());
    }
    None
}

fn watch_url(entry: &Value) -> Option<String> {
    str_field(entry, "url")
        .or_else(|| str_field(entry, "webpage_url"))
        .filter(|url| url.contains("watch?v="))
        .map(str::to_string)
}

/// Picks downloadable watch URLs out of a flat `--dump-single-json` listing.
/// A payload without entries is treated as a single video.
pub fn select_entries(listing: &Value, now: i64) -> Vec<String> {
    if let Some(entries) = listing.get("entries").and_then(Value::as_array)
        && !entries.is_empty()
    {
        return entries
            .iter()
            .filter(|entry| !entry.is_null())
            .filter_map(|entry| {
                if let Some(reason) = skip_reason(entry, now) {
                    info!(
                        "skipping {} ({reason})",
                        str_field(entry, "id").unwrap_or("<no id>")
                    );
                    return None;
                }
                watch_url(entry)
            })
            .collect();
    }

    if let Some(reason) = skip_reason(listing, now) {
        info!(
            "skipping single video {} ({reason})",
            str_field(listing, "webpage_url").unwrap_or("<no url>")
        );
        return Vec::new();
    }
    str_field(listing, "webpage_url")
        .filter(|url| url.contains("watch?v="))
        .map(|url| vec![url.to_string()])
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    ffmpeg_dir: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ffmpeg_dir: None,
        }
    }

    pub fn with_ffmpeg_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.ffmpeg_dir = dir;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(dir) = &self.ffmpeg_dir {
            command.arg("--ffmpeg-location").arg(dir);
        }
        command
    }

    /// Runs `command` and parses its stdout as one JSON document.
    fn run_json(&self, mut command: Command, label: &str) -> Result<Value> {
        debug!("running {:?}", command);
        let output = command
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("running {} for {label}", self.program.display()))?;

        if !output.status.success() {
            bail!("yt-dlp failed for {label} (status {})", output.status);
        }

        let raw = String::from_utf8(output.stdout).context("yt-dlp output is not UTF-8")?;
        serde_json::from_str(raw.trim()).with_context(|| format!("parsing yt-dlp JSON for {label}"))
    }

    /// Expands a video, playlist, or channel URL into watch URLs.
    pub fn extract_video_urls(&self, input_url: &str) -> Result<Vec<String>> {
        let listing_url = normalize_listing_url(input_url);
        let mut command = self.command();
        command
            .arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .arg("--extractor-args")
            .arg(LISTING_CLIENTS)
            .arg(&listing_url);

        let listing = self.run_json(command, &listing_url)?;
        let urls = select_entries(&listing, Utc::now().timestamp());
        info!("{} video(s) to process from {listing_url}", urls.len());
        Ok(urls)
    }

    /// Downloads one video into `<download_dir>/<id>/media.<ext>` and returns
    /// the info dict yt-dlp printed for it.
    pub fn download_video(
        &self,
        video_url: &str,
        download_dir: &Path,
        selector: &str,
    ) -> Result<VideoInfo> {
        validate_video_url(video_url)?;
        let output_template = download_dir.join("%(id)s").join(format!("{MEDIA_STEM}.%(ext)s"));

        let mut command = self.command();
        command
            .arg("--format")
            .arg(selector)
            .arg("--output")
            .arg(&output_template)
            .arg("--no-playlist")
            .arg("--dump-single-json")
            .arg("--no-simulate")
            .arg("--no-progress")
            .arg("--extractor-args")
            .arg(DOWNLOAD_CLIENTS)
            .arg(video_url);

        let raw = self.run_json(command, video_url)?;
        let info = VideoInfo::from_json(raw)?;
        if info.id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            bail!("yt-dlp returned no video id for {video_url}");
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    #[cfg(unix)]
    use std::fs;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    #[cfg(unix)]
    use tempfile::tempdir;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn validate_accepts_youtube_hosts_only() {
        assert!(validate_video_url("https://www.youtube.com/watch?v=abc").is_ok());
        assert!(validate_video_url("https://youtu.be/abc").is_ok());
        assert!(validate_video_url("https://vimeo.com/123").is_err());
        assert!(validate_video_url("   ").is_err());
    }

    #[test]
    fn handle_urls_point_at_uploads() {
        assert_eq!(
            normalize_listing_url("https://www.youtube.com/@chan/"),
            "https://www.youtube.com/@chan/videos"
        );
        assert_eq!(
            normalize_listing_url("https://www.youtube.com/@chan/videos"),
            "https://www.youtube.com/@chan/videos"
        );
        assert_eq!(
            normalize_listing_url("https://www.youtube.com/watch?v=abc"),
            "https://www.youtube.com/watch?v=abc"
        );
    }

    #[test]
    fn select_entries_filters_unavailable_items() {
        let listing = json!({
            "entries": [
                {"id": "a", "url": "https://www.youtube.com/watch?v=a"},
                null,
                {"id": "b", "url": "https://www.youtube.com/watch?v=b", "availability": "private"},
                {"id": "c", "url": "https://www.youtube.com/watch?v=c", "live_status": "is_upcoming"},
                {"id": "d", "url": "https://www.youtube.com/watch?v=d", "premiere_timestamp": NOW + 60},
                {"id": "e", "url": "https://www.youtube.com/watch?v=e", "premiere_timestamp": NOW - 60},
                {"id": "f", "webpage_url": "https://www.youtube.com/watch?v=f"},
                {"id": "g", "url": "https://www.youtube.com/shorts/g"}
            ]
        });
        assert_eq!(
            select_entries(&listing, NOW),
            vec![
                "https://www.youtube.com/watch?v=a",
                "https://www.youtube.com/watch?v=e",
                "https://www.youtube.com/watch?v=f",
            ]
        );
    }

    #[test]
    fn select_entries_handles_single_video() {
        let single = json!({"id": "a", "webpage_url": "https://www.youtube.com/watch?v=a"});
        assert_eq!(
            select_entries(&single, NOW),
            vec!["https://www.youtube.com/watch?v=a"]
        );

        let upcoming = json!({
            "id": "a",
            "webpage_url": "https://www.youtube.com/watch?v=a",
            "live_status": "not_started"
        });
        assert!(select_entries(&upcoming, NOW).is_empty());
        assert!(select_entries(&json!({"entries": []}), NOW).is_empty());
    }

    #[cfg(unix)]
    fn install_stub(dir: &Path, body: &str) -> PathBuf {
        let script_path = dir.join("yt-dlp");
        fs::write(&script_path, format!("#!/usr/bin/env bash\nset -eu\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();
        script_path
    }

    #[cfg(unix)]
    #[test]
    fn download_video_passes_selector_and_parses_info() -> Result<()> {
        let dir = tempdir()?;
        let args_log = dir.path().join("args.txt");
        let stub = install_stub(
            dir.path(),
            &format!(
                r#"printf '%s\n' "$@" > '{}'
echo '{{"id": "abc", "title": "Sample", "thumbnails": [{{"url": "https://i.ytimg.com/vi/abc/hqdefault.jpg", "width": 480, "height": 360}}]}}'"#,
                args_log.display()
            ),
        );
        let ffmpeg = dir.path().join("ffmpeg");
        fs::create_dir_all(&ffmpeg)?;

        let ytdlp = YtDlp::new(stub).with_ffmpeg_dir(Some(ffmpeg.clone()));
        let info = ytdlp.download_video(
            "https://www.youtube.com/watch?v=abc",
            &dir.path().join("dl"),
            "bestaudio",
        )?;

        assert_eq!(info.id.as_deref(), Some("abc"));
        assert_eq!(info.title.as_deref(), Some("Sample"));
        assert_eq!(info.thumbnail_candidates().len(), 1);

        let args = fs::read_to_string(&args_log)?;
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(args[0], "--ffmpeg-location");
        assert_eq!(args[1], ffmpeg.to_string_lossy());
        assert!(args.windows(2).any(|pair| pair == ["--format", "bestaudio"]));
        assert!(args.contains(&"--no-playlist"));
        let template = dir
            .path()
            .join("dl")
            .join("%(id)s")
            .join("media.%(ext)s")
            .to_string_lossy()
            .into_owned();
        assert!(args.contains(&template.as_str()));
        assert_eq!(args.last().copied(), Some("https://www.youtube.com/watch?v=abc"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn download_video_reports_failures() {
        let dir = tempdir().unwrap();
        let failing = YtDlp::new(install_stub(dir.path(), "exit 1"));
        assert!(
            failing
                .download_video("https://www.youtube.com/watch?v=abc", dir.path(), "best")
                .is_err()
        );

        let no_id = YtDlp::new(install_stub(dir.path(), "echo '{\"title\": \"x\"}'"));
        let err = no_id
            .download_video("https://www.youtube.com/watch?v=abc", dir.path(), "best")
            .unwrap_err();
        assert!(err.to_string().contains("no video id"));
    }

    #[test]
    fn download_video_rejects_foreign_urls_without_spawning() {
        let ytdlp = YtDlp::new("/nonexistent/yt-dlp");
        let err = ytdlp
            .download_video("https://vimeo.com/1", Path::new("dl"), "best")
            .unwrap_err();
        assert!(err.to_string().contains("not a YouTube URL"));
    }

    #[cfg(unix)]
    #[test]
    fn extract_video_urls_uses_flat_listing() -> Result<()> {
        let dir = tempdir()?;
        let stub = install_stub(
            dir.path(),
            r#"echo '{"entries": [{"id": "a", "url": "https://www.youtube.com/watch?v=a"}, {"id": "b", "url": "https://www.youtube.com/watch?v=b", "availability": "needs_auth"}]}'"#,
        );
        let urls = YtDlp::new(stub).extract_video_urls("https://www.youtube.com/@chan")?;
        assert_eq!(urls, vec!["https://www.youtube.com/watch?v=a"]);
        Ok(())
    }
}
