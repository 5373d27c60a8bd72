#![forbid(unsafe_code)]

//! Picks and stores the best available thumbnail for a video.
//!
//! The hosting site publishes a fixed ladder of thumbnail URLs per video
//! (`default` up to `maxresdefault`) but only the small ones are guaranteed to
//! exist, and the metadata often lists a mid-sized image as the "best" one.
//! The resolver therefore starts from what the metadata offers and spends a
//! small, bounded number of HEAD requests checking whether a bigger tier is
//! really there. Byte size stands in for resolution: a tier must be at least
//! 20% larger than what we already hold to count as an upgrade.
//!
//! Every call writes at most one file, `thumbnail.<ext>`, into the
//! destination directory.

use std::cmp::Reverse;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::DEFAULT_THUMBNAIL_HOST;
use crate::http::{FetchError, HeadInfo, HttpClient};

pub const THUMBNAIL_STEM: &str = "thumbnail";

/// Candidates at or above this size are trusted without probing.
const MIN_TRUSTED_WIDTH: u32 = 640;
const MIN_TRUSTED_HEIGHT: u32 = 480;

/// An upgrade must be at least `UPGRADE_NUM / UPGRADE_DEN` (1.2x) the bytes of
/// the image it replaces.
const UPGRADE_NUM: u64 = 6;
const UPGRADE_DEN: u64 = 5;

/// Thumbnail descriptor as reported by the metadata provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailCandidate {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl ThumbnailCandidate {
    fn sort_key(&self) -> (u32, u32) {
        (self.height.unwrap_or(0), self.width.unwrap_or(0))
    }

    /// Unknown or small dimensions mean a bigger tier may exist.
    fn worth_upgrading(&self) -> bool {
        match (self.width, self.height) {
            (Some(width), Some(height)) => {
                width < MIN_TRUSTED_WIDTH && height < MIN_TRUSTED_HEIGHT
            }
            _ => true,
        }
    }
}

/// Outcome of a successful HEAD request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    pub content_length: Option<u64>,
}

/// The image that was chosen and written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedThumbnail {
    pub source_url: String,
    pub bytes: Vec<u8>,
    pub destination_path: PathBuf,
}

/// What the caller knows about the thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailSource {
    /// A literal image URL, fetched as-is.
    Url(String),
    /// A video id plus whatever thumbnails its metadata listed.
    Video {
        video_id: String,
        candidates: Vec<ThumbnailCandidate>,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("thumbnail download failed: {0}")]
    Transport(#[source] FetchError),
    #[error("thumbnail at {url} was empty")]
    EmptyBody { url: String },
    #[error("no usable thumbnail: {0}")]
    NoCandidate(String),
    #[error("could not write thumbnail into {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<FetchError> for ResolveError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::EmptyBody { url } => ResolveError::EmptyBody { url },
            other => ResolveError::Transport(other),
        }
    }
}

/// Well-known thumbnail tiers, largest guaranteed resolution first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    MaxRes,
    Sd,
    High,
    Medium,
    Default,
}

impl Tier {
    pub const DESCENDING: [Tier; 5] = [
        Tier::MaxRes,
        Tier::Sd,
        Tier::High,
        Tier::Medium,
        Tier::Default,
    ];

    pub fn file_stem(self) -> &'static str {
        match self {
            Tier::MaxRes => "maxresdefault",
            Tier::Sd => "sddefault",
            Tier::High => "hqdefault",
            Tier::Medium => "mqdefault",
            Tier::Default => "default",
        }
    }
}

/// Image encodings the host serves the tier ladder in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFamily {
    Jpeg,
    Webp,
}

impl ImageFamily {
    fn path_prefix(self) -> &'static str {
        match self {
            ImageFamily::Jpeg => "vi",
            ImageFamily::Webp => "vi_webp",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ImageFamily::Jpeg => "jpg",
            ImageFamily::Webp => "webp",
        }
    }
}

/// `true` when `candidate_len` is at least 1.2x `baseline_len`.
pub fn is_upgrade(candidate_len: u64, baseline_len: u64) -> bool {
    candidate_len.saturating_mul(UPGRADE_DEN) >= baseline_len.saturating_mul(UPGRADE_NUM)
}

/// Extension for the stored file, taken from the URL path only.
pub fn extension_for_url(url: &str) -> &'static str {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    };
    if path.ends_with(".webp") {
        "webp"
    } else if path.ends_with(".png") {
        "png"
    } else {
        "jpg"
    }
}

/// Bytes we currently hold together with where they came from.
#[derive(Debug)]
struct Fetched {
    url: String,
    bytes: Vec<u8>,
}

impl Fetched {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub struct ThumbnailResolver<C> {
    client: C,
    host: String,
}

impl<C: HttpClient> ThumbnailResolver<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            host: DEFAULT_THUMBNAIL_HOST.to_string(),
        }
    }

    /// Points the tier ladder at another image host (mirrors, local tests).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim_end_matches('/').to_string();
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn tier_url(&self, video_id: &str, tier: Tier, family: ImageFamily) -> String {
        format!(
            "{}/{}/{}/{}.{}",
            self.host,
            family.path_prefix(),
            video_id,
            tier.file_stem(),
            family.extension()
        )
    }

    /// Finds the best thumbnail for `source` and stores it as
    /// `destination_dir/thumbnail.<ext>`.
    pub fn resolve(
        &self,
        source: &ThumbnailSource,
        destination_dir: &Path,
    ) -> Result<ResolvedThumbnail, ResolveError> {
        if destination_dir.as_os_str().is_empty() {
            return Err(ResolveError::Write {
                path: destination_dir.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty destination path"),
            });
        }

        let chosen = match source {
            ThumbnailSource::Url(url) => self.fetch_literal(url)?,
            ThumbnailSource::Video {
                video_id,
                candidates,
            } => self.fetch_for_video(video_id, candidates)?,
        };

        persist(destination_dir, chosen)
    }

    fn fetch_literal(&self, url: &str) -> Result<Fetched, ResolveError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ResolveError::NoCandidate("empty thumbnail URL".into()));
        }
        debug!("GET {url}");
        let bytes = self.client.get(url)?;
        Ok(Fetched {
            url: url.to_string(),
            bytes,
        })
    }

    fn fetch_for_video(
        &self,
        video_id: &str,
        candidates: &[ThumbnailCandidate],
    ) -> Result<Fetched, ResolveError> {
        let video_id = video_id.trim();
        if video_id.is_empty() {
            return Err(ResolveError::NoCandidate("empty video id".into()));
        }

        let Some(best) = candidates
            .iter()
            .filter(|candidate| !candidate.url.trim().is_empty())
            .min_by_key(|candidate| Reverse(candidate.sort_key()))
        else {
            debug!("{video_id}: no thumbnail candidates, trying well-known tiers");
            return self.fetch_well_known(video_id);
        };

        debug!(
            "{video_id}: provisional thumbnail {} ({:?}x{:?})",
            best.url, best.width, best.height
        );
        let provisional = match self.client.get(&best.url) {
            Ok(bytes) => Fetched {
                url: best.url.clone(),
                bytes,
            },
            Err(err) => {
                warn!("{video_id}: provisional thumbnail failed ({err}), trying well-known tiers");
                return self.fetch_well_known(video_id);
            }
        };

        if best.worth_upgrading() {
            Ok(self.upgrade(video_id, provisional))
        } else {
            Ok(provisional)
        }
    }

    /// Checks the sd and max tiers against the provisional image. Costs at most
    /// two HEADs and one GET.
    fn upgrade(&self, video_id: &str, provisional: Fetched) -> Fetched {
        let baseline = provisional.len();

        let sd_url = self.tier_url(video_id, Tier::Sd, ImageFamily::Jpeg);
        match self.probe(&sd_url) {
            Some(ProbeResult {
                content_length: Some(len),
                ..
            }) => {
                if is_upgrade(len, baseline) {
                    return self.take_upgrade(sd_url, provisional);
                }
                debug!("{video_id}: sd tier is {len} bytes, not an upgrade over {baseline}");
            }
            Some(_) => {
                // No length to compare: one GET decides, and max is not probed.
                return match self.client.get(&sd_url) {
                    Ok(bytes) if is_upgrade(bytes.len() as u64, baseline) => {
                        info!("{video_id}: upgraded thumbnail to {sd_url}");
                        Fetched { url: sd_url, bytes }
                    }
                    Ok(bytes) => {
                        debug!(
                            "{video_id}: sd tier is {} bytes, not an upgrade over {baseline}",
                            bytes.len()
                        );
                        provisional
                    }
                    Err(err) => {
                        debug!("{video_id}: sd tier GET failed: {err}");
                        provisional
                    }
                };
            }
            None => {}
        }

        let max_url = self.tier_url(video_id, Tier::MaxRes, ImageFamily::Jpeg);
        match self.probe(&max_url) {
            Some(ProbeResult {
                content_length: Some(len),
                ..
            }) if is_upgrade(len, baseline) => self.take_upgrade(max_url, provisional),
            _ => provisional,
        }
    }

    fn take_upgrade(&self, url: String, provisional: Fetched) -> Fetched {
        match self.client.get(&url) {
            Ok(bytes) => {
                info!("upgraded thumbnail to {url}");
                Fetched { url, bytes }
            }
            Err(err) => {
                warn!("upgrade {url} failed after a good HEAD: {err}");
                provisional
            }
        }
    }

    /// Walks the tier ladder without any metadata. The JPEG default tier always
    /// exists, so its size is the baseline for both families and its GET is
    /// the last resort.
    fn fetch_well_known(&self, video_id: &str) -> Result<Fetched, ResolveError> {
        let default_url = self.tier_url(video_id, Tier::Default, ImageFamily::Jpeg);
        match self.probe(&default_url).and_then(|probe| probe.content_length) {
            Some(baseline) => {
                for family in [ImageFamily::Jpeg, ImageFamily::Webp] {
                    if let Some(found) = self.first_upgrade_in(video_id, family, baseline) {
                        return Ok(found);
                    }
                }
            }
            None => debug!("{video_id}: no baseline size, skipping larger tiers"),
        }

        debug!("{video_id}: falling back to {default_url}");
        let bytes = self.client.get(&default_url)?;
        Ok(Fetched {
            url: default_url,
            bytes,
        })
    }

    fn first_upgrade_in(
        &self,
        video_id: &str,
        family: ImageFamily,
        baseline: u64,
    ) -> Option<Fetched> {
        let larger = Tier::DESCENDING
            .iter()
            .copied()
            .filter(|tier| *tier != Tier::Default)
            .map(|tier| self.tier_url(video_id, tier, family));
        for url in larger {
            let Some(len) = self.probe(&url).and_then(|probe| probe.content_length) else {
                continue;
            };
            if !is_upgrade(len, baseline) {
                debug!("{url}: {len} bytes is not an upgrade over {baseline}");
                continue;
            }
            match self.client.get(&url) {
                Ok(bytes) => return Some(Fetched { url, bytes }),
                Err(err) => warn!("{url}: GET failed after a good HEAD: {err}"),
            }
        }
        None
    }

    /// HEAD `url`; `None` when the tier is missing or unreachable. Zero
    /// lengths are treated as unknown.
    fn probe(&self, url: &str) -> Option<ProbeResult> {
        match self.client.head(url) {
            Ok(HeadInfo { content_length }) => {
                debug!("HEAD {url}: {content_length:?}");
                Some(ProbeResult {
                    url: url.to_string(),
                    content_length: content_length.filter(|len| *len > 0),
                })
            }
            Err(err) => {
                debug!("HEAD {url} failed: {err}");
                None
            }
        }
    }
}

/// Writes through a sibling temp file so a failed write never leaves a
/// truncated `thumbnail.*` behind.
fn persist(destination_dir: &Path, chosen: Fetched) -> Result<ResolvedThumbnail, ResolveError> {
    let write_err = |path: &Path, source: io::Error| ResolveError::Write {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(destination_dir).map_err(|err| write_err(destination_dir, err))?;

    let ext = extension_for_url(&chosen.url);
    let destination_path = destination_dir.join(format!("{THUMBNAIL_STEM}.{ext}"));
    let tmp_path = destination_dir.join(format!(".{THUMBNAIL_STEM}.{ext}.part"));

    if let Err(err) =
        fs::write(&tmp_path, &chosen.bytes).and_then(|_| fs::rename(&tmp_path, &destination_path))
    {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_err(&destination_path, err));
    }

    info!(
        "saved thumbnail {} ({} bytes) from {}",
        destination_path.display(),
        chosen.bytes.len(),
        chosen.url
    );
    Ok(ResolvedThumbnail {
        source_url: chosen.url,
        bytes: chosen.bytes,
        destination_path,
    })
}
