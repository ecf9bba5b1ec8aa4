//! Codec-side interfaces.
//!
//! The read/write sessions own threads, queues and the cache; everything
//! format-specific lives behind these traits. Plugins hand out boxed
//! implementations and never see the session internals.

use std::sync::Arc;

use super::frame::{AudioData, Image, VideoFrame};
use super::info::Info;
use super::sequence::Index;
use crate::error::IoError;

/// Per-session decode environment passed to every codec call.
#[derive(Clone)]
pub struct DecodeContext {
    /// Pool for intra-frame parallel work (tiles, scanlines, conversion).
    /// Sized by `IoOptions::thread_count`.
    pub pool: Arc<rayon::ThreadPool>,
    /// Layer to decode from multi-layer sources
    pub layer: usize,
    /// Color space hint, empty for the file default
    pub color_space: String,
}

impl DecodeContext {
    pub fn new(threads: usize) -> Result<Self, IoError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("seqcache-decode-{}", i))
            .build()
            .map_err(|e| IoError::Io(format!("Failed to build decode pool: {}", e)))?;
        Ok(Self {
            pool: Arc::new(pool),
            layer: 0,
            color_space: String::new(),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl std::fmt::Debug for DecodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeContext")
            .field("threads", &self.threads())
            .field("layer", &self.layer)
            .field("color_space", &self.color_space)
            .finish()
    }
}

/// A decoder for one opened source. Called only from the session's worker.
pub trait FrameSource: Send {
    /// Open the source and read its header.
    fn open(&mut self, ctx: &DecodeContext) -> Result<Info, IoError>;

    /// Random access by index is supported (finite, seekable sequence).
    /// Unbounded streams return false and are read strictly in order.
    fn can_seek(&self) -> bool {
        true
    }

    /// Decode the video frame at `index`.
    ///
    /// `Ok(None)` signals end of stream and is only meaningful for sources
    /// that cannot seek.
    fn read_video(&mut self, index: Index, ctx: &DecodeContext) -> Result<Option<Image>, IoError>;

    /// Audio block that plays with the video frame at `index`, if any.
    fn read_audio(&mut self, _index: Index, _ctx: &DecodeContext) -> Result<Option<AudioData>, IoError> {
        Ok(None)
    }
}

/// An encoder for one output. Called only from the write session's worker.
pub trait FrameSink: Send {
    fn write_video(&mut self, frame: &VideoFrame, ctx: &DecodeContext) -> Result<(), IoError>;

    /// Flush and close the output.
    fn finish(&mut self) -> Result<(), IoError> {
        Ok(())
    }
}
