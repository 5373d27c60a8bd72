#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DOWNLOAD_DIR: &str = "dl";
pub const METADATA_DB_FILE: &str = "metadata.sqlite3";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_THUMBNAIL_HOST: &str = "https://i.ytimg.com";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";

pub fn default_user_agent() -> String {
    format!("vidfolder-tools/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub download_dir: PathBuf,
    pub metadata_db: PathBuf,
    pub ffmpeg_dir: Option<PathBuf>,
    pub yt_dlp: PathBuf,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub thumbnail_host: String,
}

pub fn load_runtime_settings() -> Result<RuntimeSettings> {
    resolve_runtime_settings(RuntimeOverrides::default())
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub download_dir: Option<PathBuf>,
    pub metadata_db: Option<PathBuf>,
    pub ffmpeg_dir: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeSettings> {
    build_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeSettings> {
    let download_dir = overrides
        .download_dir
        .or_else(|| lookup_value("DOWNLOAD_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR));
    let metadata_db = overrides
        .metadata_db
        .or_else(|| lookup_value("METADATA_DB", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| download_dir.join(METADATA_DB_FILE));
    let ffmpeg_dir = overrides
        .ffmpeg_dir
        .or_else(|| lookup_value("FFMPEG_DIR", file_vars, &env_lookup).map(PathBuf::from));
    if let Some(dir) = &ffmpeg_dir
        && !dir.is_dir()
    {
        bail!("FFMPEG_DIR {} is not a directory", dir.display());
    }
    let yt_dlp = lookup_value("YT_DLP", file_vars, &env_lookup)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP));
    let http_timeout = lookup_value("HTTP_TIMEOUT_SECS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
    let user_agent = lookup_value("USER_AGENT", file_vars, &env_lookup)
        .unwrap_or_else(default_user_agent);
    let thumbnail_host = lookup_value("THUMBNAIL_HOST", file_vars, &env_lookup)
        .map(|host| host.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_THUMBNAIL_HOST.to_string());

    Ok(RuntimeSettings {
        download_dir,
        metadata_db,
        ffmpeg_dir,
        yt_dlp,
        http_timeout,
        user_agent,
        thumbnail_host,
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| non_blank(&value))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).and_then(|value| non_blank(value)))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
