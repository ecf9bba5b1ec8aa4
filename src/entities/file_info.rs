//! Sequence-aware file names
//!
//! `render.1-10.exr` names a whole sequence, `render.0005.exr` names one
//! frame of a (possibly undiscovered) sequence. FileInfo splits a path into
//! `base`, frame token and extension, and expands per-frame paths using the
//! sequence pad.
//!
//! Sequence discovery on disk globs `<base>*<ext>` next to the file and
//! collects the trailing frame numbers.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::sequence::{Number, Sequence};
use crate::error::IoError;

/// Trailing frame token of a file stem: digits, optionally with `,` and `-`
static FRAME_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)(\d[\d,\-]*\d|\d)$").expect("valid frame token regex"));

/// File path split into base name, frame sequence and extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    directory: PathBuf,
    base: String,
    extension: String,
    sequence: Option<Sequence>,
}

impl FileInfo {
    /// Parse a path.
    ///
    /// A trailing token that does not parse as a sequence (e.g. `shot-2-3-4`)
    /// stays part of the base name.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let (stem, extension) = match file_name.rfind('.') {
            Some(pos) if pos > 0 => (file_name[..pos].to_string(), file_name[pos..].to_string()),
            _ => (file_name.clone(), String::new()),
        };

        let (base, sequence) = match FRAME_TOKEN.captures(&stem) {
            Some(caps) => {
                let base = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let token = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                match token.parse::<Sequence>() {
                    Ok(seq) if seq.is_valid() => (base.to_string(), Some(seq)),
                    _ => (stem.clone(), None),
                }
            }
            None => (stem.clone(), None),
        };

        Self {
            directory,
            base,
            extension,
            sequence,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Name before the frame token, e.g. `render.`
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Extension including the dot, e.g. `.exr`
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Lower-case extension without the dot, for plugin lookup
    pub fn extension_key(&self) -> String {
        self.extension.trim_start_matches('.').to_lowercase()
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        self.sequence.as_ref()
    }

    pub fn set_sequence(&mut self, sequence: Sequence) {
        self.sequence = Some(sequence);
    }

    /// True if the name covers more than one frame
    pub fn is_sequence(&self) -> bool {
        self.sequence.as_ref().is_some_and(|s| s.size() > 1)
    }

    /// Name with the sequence token, e.g. `render.1-10.exr`
    pub fn file_name(&self) -> String {
        match &self.sequence {
            Some(seq) => format!("{}{}{}", self.base, seq, self.extension),
            None => format!("{}{}", self.base, self.extension),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(self.file_name())
    }

    /// Path of a single frame, padded to the sequence pad
    pub fn frame_path(&self, number: Number) -> PathBuf {
        match &self.sequence {
            Some(seq) => self.directory.join(format!(
                "{}{:0width$}{}",
                self.base,
                number,
                self.extension,
                width = seq.pad
            )),
            None => self.path(),
        }
    }

    /// Glob `<base>*<ext>` next to the file and replace the sequence with
    /// the frame numbers found on disk. Returns true if frames were found.
    pub fn detect_sequence(&mut self) -> Result<bool, IoError> {
        let pattern = self
            .directory
            .join(format!("{}*{}", glob::Pattern::escape(&self.base), self.extension));
        let pattern = pattern.to_string_lossy().to_string();

        let mut frames: Vec<Number> = Vec::new();
        let mut pad = 0usize;
        let entries = glob::glob(&pattern)
            .map_err(|e| IoError::Io(format!("Glob error for pattern {}: {}", pattern, e)))?;

        for entry in entries.flatten() {
            let Some(name) = entry.file_name().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let Some(token) = name
                .strip_prefix(self.base.as_str())
                .and_then(|rest| rest.strip_suffix(self.extension.as_str()))
            else {
                continue;
            };
            if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if let Ok(number) = token.parse::<Number>() {
                if token.len() > 1 && token.starts_with('0') {
                    pad = pad.max(token.len());
                }
                frames.push(number);
            }
        }

        if frames.is_empty() {
            return Ok(false);
        }

        let mut seq = Sequence::from_frames(&frames);
        seq.pad = pad;
        debug!("Detected sequence {}{}{} ({} frames)", self.base, seq, self.extension, seq.size());
        self.sequence = Some(seq);
        Ok(true)
    }
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sequence_name() {
        let info = FileInfo::new("render.1-10.exr");
        assert_eq!(info.base(), "render.");
        assert_eq!(info.extension(), ".exr");
        assert_eq!(info.extension_key(), "exr");

        let seq = info.sequence().unwrap();
        assert_eq!(seq.pad, 0);
        assert_eq!(seq.size(), 10);
        assert_eq!(seq.index(5), 4);
        assert_eq!(info.file_name(), "render.1-10.exr");
        assert!(info.is_sequence());
    }

    #[test]
    fn test_parse_padded_multi_range() {
        let info = FileInfo::new("/shots/a/comp_v2.0001-0010,0020-0030.png");
        assert_eq!(info.directory(), Path::new("/shots/a"));
        assert_eq!(info.base(), "comp_v2.");
        let seq = info.sequence().unwrap();
        assert_eq!(seq.pad, 4);
        assert_eq!(seq.size(), 21);
        assert_eq!(info.file_name(), "comp_v2.0001-0010,0020-0030.png");
        assert_eq!(info.frame_path(7), PathBuf::from("/shots/a/comp_v2.0007.png"));
    }

    #[test]
    fn test_single_frame_and_plain_names() {
        let info = FileInfo::new("plate.0042.tif");
        assert!(!info.is_sequence());
        assert_eq!(info.sequence().unwrap().frame(0), 42);
        assert_eq!(info.frame_path(43), PathBuf::from("plate.0043.tif"));

        let plain = FileInfo::new("poster.jpg");
        assert!(plain.sequence().is_none());
        assert_eq!(plain.base(), "poster");
        assert_eq!(plain.file_name(), "poster.jpg");
        assert_eq!(plain.frame_path(3), PathBuf::from("poster.jpg"));
    }

    #[test]
    fn test_detect_sequence_on_disk() {
        let dir = std::env::temp_dir().join(format!("seqcache_fi_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for n in [1, 2, 3, 7] {
            std::fs::write(dir.join(format!("shot.{:04}.png", n)), b"x").unwrap();
        }
        std::fs::write(dir.join("shot.notes.png"), b"x").unwrap();

        let mut info = FileInfo::new(dir.join("shot.0001.png"));
        assert!(info.detect_sequence().unwrap());
        assert_eq!(info.file_name(), "shot.0001-0003,0007.png");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
