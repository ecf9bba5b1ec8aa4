//! Options handed to plugins when opening a reader or writer

use serde::{Deserialize, Serialize};

use crate::core::queue::{DEFAULT_AUDIO_QUEUE_SIZE, DEFAULT_VIDEO_QUEUE_SIZE};

/// Default log target of read sessions
pub const DEFAULT_COMPONENT: &str = "seqcache::session";

/// Upper bound of the default decode thread count
const MAX_DEFAULT_THREADS: usize = 4;

/// Queue sizes and decode parallelism shared by readers and writers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoOptions {
    pub video_queue_size: usize,
    pub audio_queue_size: usize,
    /// Threads for intra-frame decode work of one session
    pub thread_count: usize,
}

impl Default for IoOptions {
    fn default() -> Self {
        Self {
            video_queue_size: DEFAULT_VIDEO_QUEUE_SIZE,
            audio_queue_size: DEFAULT_AUDIO_QUEUE_SIZE,
            thread_count: num_cpus::get().clamp(1, MAX_DEFAULT_THREADS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    #[serde(flatten)]
    pub io: IoOptions,
    /// Layer of multi-layer sources (EXR parts, PSD layers)
    pub layer: usize,
    /// Color space hint, empty for the file default
    pub color_space: String,
    /// Log target used by the session
    pub component: String,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            io: IoOptions::default(),
            layer: 0,
            color_space: String::new(),
            component: DEFAULT_COMPONENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    #[serde(flatten)]
    pub io: IoOptions,
    pub color_space: String,
}
