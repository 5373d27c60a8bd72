#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use vidfolder_tools::config::{RuntimeOverrides, RuntimeSettings, resolve_runtime_settings};
use vidfolder_tools::formats::{DEFAULT_FORMAT_CODE, format_selector};
use vidfolder_tools::http::UreqClient;
use vidfolder_tools::info::{InfoDocument, write_info_json};
use vidfolder_tools::logging::init_logging;
use vidfolder_tools::metadata::MetadataStore;
use vidfolder_tools::thumbnail::{ThumbnailResolver, ThumbnailSource};
use vidfolder_tools::title::create_title_file;
use vidfolder_tools::ytdlp::{MEDIA_STEM, YtDlp};

/// Download videos into per-video folders with metadata, thumbnail, and a
/// title marker.
#[derive(Debug, Parser)]
#[command(name = "vidfolder", version)]
struct Cli {
    /// Video, playlist, or channel URL.
    input: String,

    /// Preset (`d`, `a`, `144`..`4320`) or a five digit custom format code.
    #[arg(short, long, default_value = DEFAULT_FORMAT_CODE)]
    format: String,

    /// Root folder for `<video_id>/` directories.
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// SQLite metadata database.
    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Everything one finished video produced.
#[derive(Debug)]
struct VideoSummary {
    video_id: String,
    title: String,
    video_dir: PathBuf,
    media_file: Option<PathBuf>,
    info_json: PathBuf,
    thumbnail: Option<PathBuf>,
    title_file: Option<PathBuf>,
}

impl VideoSummary {
    fn print(&self) {
        println!("Title: {}", self.title);
        println!("Video ID: {}", self.video_id);
        println!("Folder: {}", self.video_dir.display());
        println!("Media: {}", display_or_missing(self.media_file.as_deref()));
        println!("Info JSON: {}", self.info_json.display());
        println!("Thumbnail: {}", display_or_missing(self.thumbnail.as_deref()));
        println!("Title file: {}", display_or_missing(self.title_file.as_deref()));
    }
}

fn display_or_missing(path: Option<&Path>) -> String {
    path.map(|path| path.display().to_string())
        .unwrap_or_else(|| "(missing)".to_string())
}

/// yt-dlp names the merged output `media.<ext>`; the extension depends on the
/// selected containers.
fn find_media_file(video_dir: &Path) -> Option<PathBuf> {
    let prefix = format!("{MEDIA_STEM}.");
    let mut matches: Vec<PathBuf> = fs::read_dir(video_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && !name.ends_with(".part"))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

struct Pipeline {
    settings: RuntimeSettings,
    selector: String,
    ytdlp: YtDlp,
    store: MetadataStore,
    resolver: ThumbnailResolver<UreqClient>,
}

impl Pipeline {
    async fn new(settings: RuntimeSettings, format_code: &str) -> Result<Self> {
        let selector = format_selector(format_code)?;
        fs::create_dir_all(&settings.download_dir).with_context(|| {
            format!(
                "creating download directory {}",
                settings.download_dir.display()
            )
        })?;
        let store = MetadataStore::open(&settings.metadata_db)
            .await
            .context("initializing metadata database")?;
        let ytdlp = YtDlp::new(&settings.yt_dlp).with_ffmpeg_dir(settings.ffmpeg_dir.clone());
        let resolver = ThumbnailResolver::new(UreqClient::new(
            settings.http_timeout,
            &settings.user_agent,
        ))
        .with_host(settings.thumbnail_host.clone());
        Ok(Self {
            settings,
            selector,
            ytdlp,
            store,
            resolver,
        })
    }

    async fn process_video(&self, video_url: &str) -> Result<VideoSummary> {
        let info = self.ytdlp.download_video(
            video_url,
            &self.settings.download_dir,
            &self.selector,
        )?;
        let document = InfoDocument::from_info(&info);
        let video_id = document.raw_data.video_id.clone();
        let video_dir = self.settings.download_dir.join(&video_id);

        let info_json = write_info_json(&document, &video_dir)?;
        self.store
            .upsert_info(&document)
            .await
            .with_context(|| format!("storing metadata for {video_id}"))?;

        let source = ThumbnailSource::Video {
            video_id: video_id.clone(),
            candidates: info.thumbnail_candidates(),
        };
        let thumbnail = match self.resolver.resolve(&source, &video_dir) {
            Ok(resolved) => {
                info!(
                    "{video_id}: thumbnail from {} ({} bytes)",
                    resolved.source_url,
                    resolved.bytes.len()
                );
                if let Err(err) = self
                    .store
                    .set_thumbnail_path(&video_id, &resolved.destination_path)
                    .await
                {
                    warn!("{video_id}: could not record thumbnail path: {err:#}");
                }
                Some(resolved.destination_path)
            }
            Err(err) => {
                warn!("{video_id}: no thumbnail: {err}");
                None
            }
        };

        let title = document.raw_data.title.clone();
        let title_file = match create_title_file(&title, &video_dir) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("{video_id}: {err:#}");
                None
            }
        };

        Ok(VideoSummary {
            media_file: find_media_file(&video_dir),
            video_id,
            title,
            video_dir,
            info_json,
            thumbnail,
            title_file,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = resolve_runtime_settings(RuntimeOverrides {
        download_dir: cli.download_dir,
        metadata_db: cli.db,
        ffmpeg_dir: None,
        env_path: Some(cli.env_file),
    })?;

    println!("===================================");
    println!("vidfolder");
    println!("===================================");
    println!("Input: {}", cli.input);
    println!("Format: {}", cli.format);
    println!("Download directory: {}", settings.download_dir.display());
    println!("Metadata database: {}", settings.metadata_db.display());
    println!();

    let pipeline = Pipeline::new(settings, &cli.format).await?;
    let urls = pipeline.ytdlp.extract_video_urls(&cli.input)?;
    if urls.is_empty() {
        println!("No downloadable videos found.");
        return Ok(());
    }

    let total = urls.len();
    let mut failed = 0usize;
    for (index, url) in urls.iter().enumerate() {
        println!("===== Video {}/{} =====", index + 1, total);
        match pipeline.process_video(url).await {
            Ok(summary) => summary.print(),
            Err(err) => {
                failed += 1;
                warn!("{url}: {err:#}");
                println!("Failed: {url}");
            }
        }
        println!();
    }

    println!("===================================");
    println!("Done: {} succeeded, {} failed", total - failed, failed);
    println!(
        "Stored videos: {}",
        pipeline.store.count().await.unwrap_or_default()
    );
    Ok(())
}
