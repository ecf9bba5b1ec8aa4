//! Numbered image sequences through the `image` crate
//!
//! Formats: PNG, JPEG, TIFF, TGA (8-bit RGBA) and EXR, HDR (RGBA half).
//! One file per frame; frame paths come from the sequence in the file name.
//!
//! Float sources are converted to f16 on the session's decode pool.

use std::path::{Path, PathBuf};

use half::f16 as F16;
use image::{DynamicImage, Rgba32FImage, RgbaImage};
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::options::{ReadOptions, WriteOptions};
use super::plugin::IoPlugin;
use crate::entities::file_info::FileInfo;
use crate::entities::frame::{Image, ImageInfo, PixelBuffer, PixelFormat, VideoFrame};
use crate::entities::info::{Info, Speed, VideoInfo};
use crate::entities::sequence::{INVALID, Index, Sequence};
use crate::entities::traits::{DecodeContext, FrameSink, FrameSource};
use crate::error::IoError;

pub const PLUGIN_NAME: &str = "ImageSequence";

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "tga", "exr", "hdr"];

/// Extensions decoded to float pixels
fn is_float_format(ext: &str) -> bool {
    matches!(ext, "exr" | "hdr")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSequenceOptions {
    /// Frame rate reported for sequences (files carry none)
    pub speed: f32,
}

impl Default for ImageSequenceOptions {
    fn default() -> Self {
        Self { speed: 24.0 }
    }
}

#[derive(Debug, Default)]
pub struct ImageSequencePlugin {
    options: ImageSequenceOptions,
}

impl IoPlugin for ImageSequencePlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn info(&self) -> &str {
        "Numbered image files (PNG, JPEG, TIFF, TGA, EXR, HDR)"
    }

    fn file_extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    fn can_sequence(&self) -> bool {
        true
    }

    fn read(&self, file: &FileInfo, _options: &ReadOptions) -> Result<Box<dyn FrameSource>, IoError> {
        Ok(Box::new(ImageSequenceReader::new(file.clone(), self.options.clone())))
    }

    fn write(&self, file: &FileInfo, info: &Info, _options: &WriteOptions) -> Result<Box<dyn FrameSink>, IoError> {
        let sequence = info
            .video
            .first()
            .map(|v| v.sequence.clone())
            .filter(Sequence::is_valid)
            .or_else(|| file.sequence().cloned());
        Ok(Box::new(ImageSequenceWriter {
            file: file.clone(),
            sequence,
        }))
    }

    fn options(&self) -> serde_json::Value {
        serde_json::to_value(&self.options).unwrap_or(serde_json::Value::Null)
    }

    fn set_options(&mut self, options: serde_json::Value) -> Result<(), IoError> {
        self.options = serde_json::from_value(options).map_err(|e| IoError::InvalidOptions(e.to_string()))?;
        debug!("{} options: {:?}", PLUGIN_NAME, self.options);
        Ok(())
    }
}

pub struct ImageSequenceReader {
    file: FileInfo,
    options: ImageSequenceOptions,
    sequence: Sequence,
}

impl ImageSequenceReader {
    pub fn new(file: FileInfo, options: ImageSequenceOptions) -> Self {
        let sequence = file.sequence().cloned().unwrap_or_else(|| Sequence::single(0));
        Self {
            file,
            options,
            sequence,
        }
    }

    fn frame_path(&self, index: Index) -> Option<PathBuf> {
        if self.file.sequence().is_none() {
            return (index == 0).then(|| self.file.path());
        }
        match self.sequence.frame(index) {
            INVALID => None,
            number => Some(self.file.frame_path(number)),
        }
    }
}

impl FrameSource for ImageSequenceReader {
    fn open(&mut self, _ctx: &DecodeContext) -> Result<Info, IoError> {
        let first = self.frame_path(0).ok_or_else(|| IoError::Open {
            path: self.file.path(),
            message: "Empty sequence".into(),
        })?;
        let (width, height) = image::image_dimensions(&first).map_err(|e| IoError::Open {
            path: first.clone(),
            message: e.to_string(),
        })?;

        let ext = self.file.extension_key();
        let pixel_format = if is_float_format(&ext) {
            PixelFormat::RgbaF16
        } else {
            PixelFormat::Rgba8
        };
        let mut video = VideoInfo::new(
            ImageInfo::new(width as usize, height as usize, pixel_format),
            Speed::from_fps(self.options.speed),
            self.sequence.clone(),
        );
        video.codec = ext.to_uppercase();

        debug!("{}: {}x{} {:?}, {} frames", self.file, width, height, pixel_format, self.sequence.size());
        let mut info = Info::with_video(self.file.file_name(), video);
        info.tags.insert("directory".into(), self.file.directory().display().to_string());
        Ok(info)
    }

    fn read_video(&mut self, index: Index, ctx: &DecodeContext) -> Result<Option<Image>, IoError> {
        let Some(path) = self.frame_path(index) else {
            return Ok(None);
        };
        trace!("Loading {}", path.display());
        let float = is_float_format(&self.file.extension_key());
        load_image(&path, float, ctx)
            .map(Some)
            .map_err(|message| IoError::Decode { frame: index, message })
    }
}

fn load_image(path: &Path, float: bool, ctx: &DecodeContext) -> Result<Image, String> {
    let img = image::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let width = img.width() as usize;
    let height = img.height() as usize;

    let buffer = if float {
        let rgba = img.to_rgba32f();
        let pixels = rgba.as_raw();
        let half: Vec<F16> = ctx.pool.install(|| pixels.par_iter().map(|&v| F16::from_f32(v)).collect());
        PixelBuffer::F16(half)
    } else {
        PixelBuffer::U8(img.to_rgba8().into_raw())
    };

    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    Ok(Image::new(width, height, buffer).with_name(name))
}

pub struct ImageSequenceWriter {
    file: FileInfo,
    sequence: Option<Sequence>,
}

impl ImageSequenceWriter {
    fn frame_path(&self, index: Index) -> PathBuf {
        let number = match &self.sequence {
            Some(seq) => match seq.frame(index) {
                INVALID => index,
                n => n,
            },
            None => return self.file.path(),
        };
        self.file.frame_path(number)
    }
}

impl FrameSink for ImageSequenceWriter {
    fn write_video(&mut self, frame: &VideoFrame, ctx: &DecodeContext) -> Result<(), IoError> {
        let image = &frame.image;
        let (w, h) = (image.width() as u32, image.height() as u32);
        let mismatch = || IoError::Write {
            frame: frame.frame,
            message: format!("Pixel buffer does not match {}x{}", w, h),
        };

        let dynamic = match image.buffer() {
            PixelBuffer::U8(px) => RgbaImage::from_raw(w, h, px.clone()).map(DynamicImage::ImageRgba8),
            PixelBuffer::F16(px) => {
                let pixels: Vec<f32> = ctx.pool.install(|| px.par_iter().map(|v| v.to_f32()).collect());
                Rgba32FImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgba32F)
            }
            PixelBuffer::F32(px) => Rgba32FImage::from_raw(w, h, px.clone()).map(DynamicImage::ImageRgba32F),
        }
        .ok_or_else(mismatch)?;

        let dynamic = match self.file.extension_key().as_str() {
            "exr" => DynamicImage::ImageRgba32F(dynamic.to_rgba32f()),
            "hdr" => DynamicImage::ImageRgb32F(dynamic.to_rgb32f()),
            "jpg" | "jpeg" => DynamicImage::ImageRgb8(dynamic.to_rgb8()),
            _ => DynamicImage::ImageRgba8(dynamic.to_rgba8()),
        };

        let path = self.frame_path(frame.frame);
        trace!("Saving {}", path.display());
        dynamic.save(&path).map_err(|e| IoError::Write {
            frame: frame.frame,
            message: format!("{}: {}", path.display(), e),
        })
    }
}
