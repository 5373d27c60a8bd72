#![forbid(unsafe_code)]

//! Format codes accepted on the command line and the yt-dlp selectors they
//! expand to.
//!
//! Two kinds of codes exist. Presets (`d`, `a`, or a height such as `720`)
//! cover the common cases. Custom codes are five digits, one per column:
//! video container, resolution, audio container, audio quality, codec.

use anyhow::{Result, anyhow, bail};

pub const DEFAULT_FORMAT_CODE: &str = "d";

const AUDIO_ONLY_SELECTOR: &str = "bestaudio[ext=m4a]/bestaudio/best";
const PRESET_HEIGHTS: [u32; 9] = [144, 240, 360, 480, 720, 1080, 1440, 2160, 4320];
const DEFAULT_PRESET_HEIGHT: u32 = 1080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoContainer {
    Mp4,
    Webm,
    Flv,
    Mkv,
    Avi,
    Mov,
}

impl VideoContainer {
    fn from_digit(digit: char) -> Option<Self> {
        Some(match digit {
            '0' => Self::Mp4,
            '1' => Self::Webm,
            '2' => Self::Flv,
            '3' => Self::Mkv,
            '4' => Self::Avi,
            '5' => Self::Mov,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Flv => "flv",
            Self::Mkv => "mkv",
            Self::Avi => "avi",
            Self::Mov => "mov",
        }
    }
}

/// Resolution column: the digit indexes into the preset height ladder.
fn resolution_from_digit(digit: char) -> Option<u32> {
    let index = digit.to_digit(10)? as usize;
    PRESET_HEIGHTS.get(index).copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContainer {
    M4a,
    Webm,
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
}

impl AudioContainer {
    fn from_digit(digit: char) -> Option<Self> {
        Some(match digit {
            '0' => Self::M4a,
            '1' => Self::Webm,
            '2' => Self::Mp3,
            '3' => Self::Opus,
            '4' => Self::Aac,
            '5' => Self::Flac,
            '6' => Self::Wav,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M4a => "m4a",
            Self::Webm => "webm",
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }
}

/// Audio bitrate column in kbit/s. `0` is not a valid digit here.
fn audio_kbps_from_digit(digit: char) -> Option<u32> {
    Some(match digit {
        '1' => 64,
        '2' => 96,
        '3' => 128,
        '4' => 160,
        '5' => 192,
        '6' => 256,
        '7' => 320,
        '8' => 384,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Vp9,
    Av1,
    H265,
    Vp8,
    Theora,
    Mpeg4,
}

impl VideoCodec {
    fn from_digit(digit: char) -> Option<Self> {
        Some(match digit {
            '0' => Self::H264,
            '1' => Self::Vp9,
            '2' => Self::Av1,
            '3' => Self::H265,
            '4' => Self::Vp8,
            '5' => Self::Theora,
            '6' => Self::Mpeg4,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::H265 => "h265",
            Self::Vp8 => "vp8",
            Self::Theora => "theora",
            Self::Mpeg4 => "mpeg4",
        }
    }
}

/// A fully specified five-digit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomFormat {
    pub video: VideoContainer,
    pub height: u32,
    pub audio: AudioContainer,
    pub audio_kbps: u32,
    pub codec: VideoCodec,
}

impl CustomFormat {
    pub fn parse(code: &str) -> Option<Self> {
        let digits: Vec<char> = code.chars().collect();
        let [video, height, audio, kbps, codec] = digits.as_slice() else {
            return None;
        };
        Some(Self {
            video: VideoContainer::from_digit(*video)?,
            height: resolution_from_digit(*height)?,
            audio: AudioContainer::from_digit(*audio)?,
            audio_kbps: audio_kbps_from_digit(*kbps)?,
            codec: VideoCodec::from_digit(*codec)?,
        })
    }

    pub fn selector(&self) -> String {
        format!(
            "bestvideo[ext={video}][vcodec^={codec}][height<={height}]+bestaudio[ext={audio}][abr<={kbps}]/best[ext={video}]",
            video = self.video.as_str(),
            codec = self.codec.as_str(),
            height = self.height,
            audio = self.audio.as_str(),
            kbps = self.audio_kbps,
        )
    }
}

fn height_capped_selector(height: u32) -> String {
    format!("bestvideo[ext=mp4][height<={height}]+bestaudio[ext=m4a]/best[ext=mp4]")
}

/// Expands a format code into the selector handed to `yt-dlp --format`.
pub fn format_selector(code: &str) -> Result<String> {
    let code = code.trim();
    match code {
        "" => bail!("format code is empty"),
        "d" => return Ok(height_capped_selector(DEFAULT_PRESET_HEIGHT)),
        "a" => return Ok(AUDIO_ONLY_SELECTOR.to_string()),
        _ => {}
    }

    // Exact match only: zero-padded five digit codes are custom codes.
    if let Some(height) = PRESET_HEIGHTS
        .iter()
        .copied()
        .find(|height| height.to_string() == code)
    {
        return Ok(height_capped_selector(height));
    }

    CustomFormat::parse(code)
        .map(|custom| custom.selector())
        .ok_or_else(|| anyhow!("unknown format code: {code}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preset_caps_at_1080() {
        assert_eq!(
            format_selector("d").unwrap(),
            "bestvideo[ext=mp4][height<=1080]+bestaudio[ext=m4a]/best[ext=mp4]"
        );
    }

    #[test]
    fn audio_only_preset() {
        assert_eq!(format_selector(" a ").unwrap(), AUDIO_ONLY_SELECTOR);
    }

    #[test]
    fn height_presets_use_their_cap() {
        assert_eq!(
            format_selector("720").unwrap(),
            "bestvideo[ext=mp4][height<=720]+bestaudio[ext=m4a]/best[ext=mp4]"
        );
        assert!(format_selector("4320").unwrap().contains("height<=4320"));
    }

    #[test]
    fn custom_code_maps_each_column() {
        let custom = CustomFormat::parse("14231").unwrap();
        assert_eq!(custom.video, VideoContainer::Webm);
        assert_eq!(custom.height, 720);
        assert_eq!(custom.audio, AudioContainer::Mp3);
        assert_eq!(custom.audio_kbps, 128);
        assert_eq!(custom.codec, VideoCodec::Vp9);
        assert_eq!(
            format_selector("14231").unwrap(),
            "bestvideo[ext=webm][vcodec^=vp9][height<=720]+bestaudio[ext=mp3][abr<=128]/best[ext=webm]"
        );
    }

    #[test]
    fn zero_padded_codes_are_custom_not_presets() {
        assert_eq!(
            format_selector("01080").unwrap(),
            CustomFormat::parse("01080").unwrap().selector()
        );
        assert!(format_selector("01080").unwrap().contains("vcodec^="));
        assert!(format_selector("0720").is_err());
    }

    #[test]
    fn custom_code_rejects_unknown_digits() {
        // audio quality has no `0`
        assert!(CustomFormat::parse("01204").is_none());
        assert!(CustomFormat::parse("9".repeat(5).as_str()).is_none());
        assert!(CustomFormat::parse("0123").is_none());
    }

    #[test]
    fn unknown_codes_are_errors() {
        for code in ["", "x", "1000", "012345"] {
            assert!(format_selector(code).is_err(), "{code:?} should be rejected");
        }
    }
}
