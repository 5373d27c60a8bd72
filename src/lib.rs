#![forbid(unsafe_code)]

//! Building blocks for the vidfolder binaries: every downloaded video ends up
//! in `<download_dir>/<video_id>/` next to its `info.json`, thumbnail, and a
//! `.title` marker file.

pub mod config;
pub mod formats;
pub mod http;
pub mod info;
pub mod logging;
pub mod metadata;
pub mod thumbnail;
pub mod title;
pub mod ytdlp;
