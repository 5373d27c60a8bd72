#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use vidfolder_tools::config::{RuntimeOverrides, resolve_runtime_settings};
use vidfolder_tools::http::UreqClient;
use vidfolder_tools::info::{InfoDocument, UNKNOWN, VideoInfo};
use vidfolder_tools::logging::init_logging;
use vidfolder_tools::thumbnail::{ThumbnailCandidate, ThumbnailResolver, ThumbnailSource};

/// Fetch the best thumbnail for one video into `<dest>/thumbnail.<ext>`.
#[derive(Debug, Parser)]
#[command(name = "fetch-thumbnail", version)]
struct Cli {
    /// Literal image URL, downloaded as-is.
    #[arg(long, conflicts_with = "video_id", required_unless_present = "video_id")]
    url: Option<String>,

    #[arg(long)]
    video_id: Option<String>,

    /// yt-dlp info dict or a vidfolder `info.json` to take candidates from.
    #[arg(long, requires = "video_id")]
    info_json: Option<PathBuf>,

    #[arg(long)]
    dest: PathBuf,

    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Accepts both the raw yt-dlp dump and our own `info.json`, which only keeps
/// a single `raw_data.thumbnail_url`.
fn load_candidates(path: &Path) -> Result<Vec<ThumbnailCandidate>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    if value.get("raw_data").is_some() {
        let document: InfoDocument = serde_json::from_value(value)
            .with_context(|| format!("reading info document {}", path.display()))?;
        let url = document.raw_data.thumbnail_url;
        if url.trim().is_empty() || url == UNKNOWN {
            return Ok(Vec::new());
        }
        return Ok(vec![ThumbnailCandidate {
            url,
            width: None,
            height: None,
        }]);
    }

    Ok(VideoInfo::from_json(value)?.thumbnail_candidates())
}

fn source_from_cli(cli: &Cli) -> Result<ThumbnailSource> {
    if let Some(url) = &cli.url {
        return Ok(ThumbnailSource::Url(url.clone()));
    }
    let video_id = cli.video_id.clone().unwrap_or_default();
    let candidates = match &cli.info_json {
        Some(path) => load_candidates(path)?,
        None => Vec::new(),
    };
    Ok(ThumbnailSource::Video {
        video_id,
        candidates,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = resolve_runtime_settings(RuntimeOverrides {
        env_path: Some(cli.env_file.clone()),
        ..RuntimeOverrides::default()
    })?;
    let source = source_from_cli(&cli)?;

    let resolver = ThumbnailResolver::new(UreqClient::new(
        settings.http_timeout,
        &settings.user_agent,
    ))
    .with_host(settings.thumbnail_host);
    let resolved = resolver
        .resolve(&source, &cli.dest)
        .context("fetching thumbnail")?;

    println!("Source: {}", resolved.source_url);
    println!("Bytes: {}", resolved.bytes.len());
    println!("Saved: {}", resolved.destination_path.display());
    Ok(())
}
