//! Stream metadata resolved when a source is opened

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::frame::{AudioFormat, ImageInfo};
use super::sequence::Sequence;

/// Playback speed as a rational frame rate (`scale / duration` fps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speed {
    pub scale: u32,
    pub duration: u32,
}

impl Default for Speed {
    fn default() -> Self {
        Self { scale: 24, duration: 1 }
    }
}

impl Speed {
    pub fn new(scale: u32, duration: u32) -> Self {
        Self {
            scale,
            duration: duration.max(1),
        }
    }

    /// Nearest rational speed; NTSC rates map to `*000/1001`
    pub fn from_fps(fps: f32) -> Self {
        const NTSC: &[(f32, u32)] = &[(23.976, 24_000), (29.97, 30_000), (47.952, 48_000), (59.94, 60_000)];
        for &(rate, scale) in NTSC {
            if (fps - rate).abs() < 0.01 {
                return Self::new(scale, 1001);
            }
        }
        Self::new(fps.round().max(1.0) as u32, 1)
    }

    pub fn fps(&self) -> f32 {
        self.scale as f32 / self.duration.max(1) as f32
    }
}

/// Video stream information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub info: ImageInfo,
    pub speed: Speed,
    pub sequence: Sequence,
    pub codec: String,
}

impl VideoInfo {
    pub fn new(info: ImageInfo, speed: Speed, sequence: Sequence) -> Self {
        Self {
            info,
            speed,
            sequence,
            codec: String::new(),
        }
    }
}

/// Audio stream information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub format: AudioFormat,
    pub codec: String,
}

/// Everything known about an opened source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub file_name: String,
    pub video: Vec<VideoInfo>,
    pub audio: Vec<AudioInfo>,
    pub tags: IndexMap<String, String>,
}

impl Info {
    pub fn with_video(file_name: impl Into<String>, video: VideoInfo) -> Self {
        Self {
            file_name: file_name.into(),
            video: vec![video],
            ..Default::default()
        }
    }

    /// Frame count of the first video stream (0 for audio-only or unbounded)
    pub fn sequence_size(&self) -> usize {
        self.video.first().map(|v| v.sequence.size()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_from_fps() {
        assert_eq!(Speed::from_fps(24.0), Speed::new(24, 1));
        assert_eq!(Speed::from_fps(29.97), Speed::new(30_000, 1001));
        assert!((Speed::from_fps(23.976).fps() - 23.976).abs() < 0.001);
        assert_eq!(Speed::new(25, 0).duration, 1);
    }
}
