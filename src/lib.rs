//! seqcache - image sequence reading with a playback-aware frame cache
//!
//! Re-exports all modules for use by the binary target.

// Core engine (queues, cache, sessions)
pub mod core;

pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod io;
pub mod text;

// Re-export commonly used types
pub use crate::core::{Direction, FrameCache, FrameQueue, InOutPoints, ReadSession, SessionEvent, WriteSession};
pub use entities::{FileInfo, Image, Info, Sequence, VideoFrame};
pub use error::{IoError, ParseError, QueueError};
pub use io::{IoPlugin, IoSystem, ReadOptions, WriteOptions};
