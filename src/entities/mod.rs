//! Entities module - plain data types shared by sessions and plugins
//!
//! - `sequence` - frame numbers, ranges and sequence strings
//! - `file_info` - paths split into directory, base, frame number and extension
//! - `frame` - decoded images and audio with their frame positions
//! - `info` - stream description returned when a file is opened
//! - `traits` - `FrameSource`/`FrameSink` seams implemented by plugins

pub mod file_info;
pub mod frame;
pub mod info;
pub mod sequence;
pub mod traits;

pub use file_info::FileInfo;
pub use frame::{AudioData, AudioFormat, AudioFrame, Image, ImageInfo, PixelBuffer, PixelFormat, VideoFrame};
pub use info::{AudioInfo, Info, Speed, VideoInfo};
pub use sequence::{FrameRange, Index, Number, Sequence};
pub use traits::{DecodeContext, FrameSink, FrameSource};
