//! Decoded frames with multi-format pixel buffers (U8, F16, F32)
//!
//! **Why**: Different sources need different pixel representations:
//! - JPG/PNG: 8-bit RGBA (u8)
//! - EXR HALF: 16-bit float (half::f16)
//! - EXR FLOAT / HDR: 32-bit float (f32)
//!
//! **Used by**: FrameQueue (decode worker → consumer hand-off),
//! FrameCache (resident images), FrameSource/FrameSink implementations
//!
//! # Sharing
//!
//! Decoded buffers are immutable once produced and live behind an `Arc`.
//! The queue, the cache and the consumer each hold a clone of the same
//! `Image`; evicting it from the cache never invalidates a copy already
//! handed to the consumer.

use std::sync::Arc;

use half::f16 as F16;
use serde::{Deserialize, Serialize};

use super::sequence::Index;

/// Pixel buffer format - stores different precision levels
#[derive(Debug, Clone)]
pub enum PixelBuffer {
    U8(Vec<u8>),   // LDR formats (PNG, JPEG, TGA) - 8-bit per channel
    F16(Vec<F16>), // HDR half-precision (EXR HALF)
    F32(Vec<f32>), // HDR full-precision (EXR FLOAT, HDR)
}

impl PixelBuffer {
    /// Memory size in bytes
    pub fn byte_count(&self) -> usize {
        match self {
            PixelBuffer::U8(vec) => vec.len(),
            PixelBuffer::F16(vec) => vec.len() * 2,
            PixelBuffer::F32(vec) => vec.len() * 4,
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            PixelBuffer::U8(_) => PixelFormat::Rgba8,
            PixelBuffer::F16(_) => PixelFormat::RgbaF16,
            PixelBuffer::F32(_) => PixelFormat::RgbaF32,
        }
    }
}

/// Pixel format type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba8,
    RgbaF16,
    RgbaF32,
}

impl PixelFormat {
    /// Bytes per RGBA pixel
    pub fn pixel_bytes(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::RgbaF16 => 8,
            PixelFormat::RgbaF32 => 16,
        }
    }
}

/// Image dimensions and layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub pixel_format: PixelFormat,
}

impl ImageInfo {
    pub fn new(width: usize, height: usize, pixel_format: PixelFormat) -> Self {
        Self {
            name: String::new(),
            width,
            height,
            pixel_format,
        }
    }

    /// Expected buffer size in bytes
    pub fn byte_count(&self) -> usize {
        self.width * self.height * self.pixel_format.pixel_bytes()
    }
}

/// Immutable, reference-counted decoded image
#[derive(Debug, Clone)]
pub struct Image {
    info: ImageInfo,
    data: Arc<PixelBuffer>,
}

impl Image {
    /// Wrap a decoded buffer. The pixel format follows the buffer variant.
    pub fn new(width: usize, height: usize, buffer: PixelBuffer) -> Self {
        let info = ImageInfo::new(width, height, buffer.pixel_format());
        Self {
            info,
            data: Arc::new(buffer),
        }
    }

    pub fn from_rgba8(width: usize, height: usize, pixels: Vec<u8>) -> Self {
        Self::new(width, height, PixelBuffer::U8(pixels))
    }

    /// Dark green placeholder, shown when a frame is not available
    pub fn placeholder(width: usize, height: usize) -> Self {
        let mut buffer = vec![0u8; width * height * 4];
        for px in buffer.chunks_mut(4) {
            px.copy_from_slice(&[0, 100, 0, 255]);
        }
        Self::from_rgba8(width, height, buffer)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn width(&self) -> usize {
        self.info.width
    }

    pub fn height(&self) -> usize {
        self.info.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.info.pixel_format
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.data
    }

    /// Memory size in bytes
    pub fn byte_count(&self) -> usize {
        self.data.byte_count()
    }

    /// True if both images share the same decoded buffer
    pub fn same_data(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Audio sample layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48_000,
        }
    }
}

/// Immutable, reference-counted block of interleaved f32 samples
#[derive(Debug, Clone)]
pub struct AudioData {
    format: AudioFormat,
    samples: Arc<Vec<f32>>,
}

impl AudioData {
    pub fn new(format: AudioFormat, samples: Vec<f32>) -> Self {
        Self {
            format,
            samples: Arc::new(samples),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Samples per channel
    pub fn sample_count(&self) -> usize {
        match self.format.channels {
            0 => 0,
            c => self.samples.len() / c as usize,
        }
    }

    pub fn byte_count(&self) -> usize {
        self.samples.len() * 4
    }
}

/// Decoded video frame tagged with its sequence index
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub frame: Index,
    pub image: Image,
}

impl VideoFrame {
    pub fn new(frame: Index, image: Image) -> Self {
        Self { frame, image }
    }
}

impl PartialEq for VideoFrame {
    fn eq(&self, other: &Self) -> bool {
        self.frame == other.frame && self.image.same_data(&other.image)
    }
}

/// Decoded audio block tagged with its sample position
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub position: i64,
    pub audio: AudioData,
}

impl AudioFrame {
    pub fn new(position: i64, audio: AudioData) -> Self {
        Self { position, audio }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: Buffer sizes per pixel format
    #[test]
    fn test_byte_counts() {
        let u8_img = Image::from_rgba8(4, 4, vec![0u8; 4 * 4 * 4]);
        assert_eq!(u8_img.byte_count(), 64);
        assert_eq!(u8_img.byte_count(), u8_img.info().byte_count());

        let f16_img = Image::new(4, 4, PixelBuffer::F16(vec![F16::ZERO; 4 * 4 * 4]));
        assert_eq!(f16_img.byte_count(), 128);
        assert_eq!(f16_img.pixel_format(), PixelFormat::RgbaF16);

        let f32_img = Image::new(4, 4, PixelBuffer::F32(vec![0.0; 4 * 4 * 4]));
        assert_eq!(f32_img.byte_count(), 256);
        assert_eq!(f32_img.info().byte_count(), 256);
    }

    /// Test: Clones share one buffer
    #[test]
    fn test_shared_buffer() {
        let img = Image::placeholder(8, 8);
        let copy = img.clone();
        assert!(img.same_data(&copy));
        assert!(!img.same_data(&Image::placeholder(8, 8)));

        let a = VideoFrame::new(3, img.clone());
        let b = VideoFrame::new(3, copy);
        assert_eq!(a, b);
        assert_ne!(a, VideoFrame::new(4, img));
    }

    #[test]
    fn test_audio_sample_count() {
        let audio = AudioData::new(AudioFormat { channels: 2, sample_rate: 48_000 }, vec![0.0; 2000]);
        assert_eq!(audio.sample_count(), 1000);
        assert_eq!(audio.byte_count(), 8000);
    }
}
