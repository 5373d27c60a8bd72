#![forbid(unsafe_code)]

//! `<title>.title` marker files. They carry no data the tools read back; they
//! only make a `dl/<video_id>/` folder recognizable in a file browser.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const TITLE_EXTENSION: &str = "title";
const MARKER_HEADER: &str = "## Marker file for identifying this folder";
const FALLBACK_NAME: &str = "untitled";

/// Removes characters that are not allowed in file names on common platforms.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|ch| !matches!(ch, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn create_title_file(title: &str, video_dir: &Path) -> Result<PathBuf> {
    let path = video_dir.join(format!("{}.{TITLE_EXTENSION}", sanitize_title(title)));
    fs::write(&path, format!("{MARKER_HEADER}\ntitle : {title}"))
        .with_context(|| format!("writing title file {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_strips_reserved_characters() {
        assert_eq!(sanitize_title(r#"a/b\c:d*e?f"g<h>i|j"#), "abcdefghij");
        assert_eq!(sanitize_title("夜に駆ける / YOASOBI"), "夜に駆ける  YOASOBI");
    }

    #[test]
    fn sanitize_falls_back_for_blank_titles() {
        assert_eq!(sanitize_title("  "), FALLBACK_NAME);
        assert_eq!(sanitize_title("???"), FALLBACK_NAME);
    }

    #[test]
    fn title_file_keeps_original_title_inside() -> Result<()> {
        let dir = tempdir()?;
        let path = create_title_file("What? Why: now", dir.path())?;
        assert_eq!(path, dir.path().join("What Why now.title"));
        let contents = fs::read_to_string(&path)?;
        assert!(contents.starts_with(MARKER_HEADER));
        assert!(contents.ends_with("title : What? Why: now"));
        Ok(())
    }

    #[test]
    fn title_file_requires_existing_directory() {
        let dir = tempdir().unwrap();
        assert!(create_title_file("x", &dir.path().join("missing")).is_err());
    }
}
