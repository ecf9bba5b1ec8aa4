//! Write session: drains a frame queue into an encoder on a worker thread

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use super::queue::VideoQueue;
use super::session::{CancelToken, POLL_INTERVAL};
use crate::entities::file_info::FileInfo;
use crate::entities::frame::VideoFrame;
use crate::entities::info::Info;
use crate::entities::traits::{DecodeContext, FrameSink};
use crate::error::{IoError, QueueError};
use crate::io::options::WriteOptions;

/// Result of a completed write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub frames_written: usize,
    pub errors: usize,
}

pub struct WriteSession {
    path: String,
    queue: Arc<VideoQueue>,
    cancel: CancelToken,
    handle: Option<JoinHandle<Result<WriteStats, IoError>>>,
}

impl WriteSession {
    pub fn new(
        file_info: FileInfo,
        info: &Info,
        options: WriteOptions,
        sink: Box<dyn FrameSink>,
    ) -> Result<Self, IoError> {
        let mut ctx = DecodeContext::new(options.io.thread_count)?;
        ctx.color_space = options.color_space.clone();

        let path = file_info.to_string();
        let queue = Arc::new(VideoQueue::new(options.io.video_queue_size));
        let cancel = CancelToken::new();
        debug!("Writing {} ({} frames expected)", path, info.sequence_size());

        let handle = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            let path = path.clone();
            thread::Builder::new()
                .name("seqcache-write".into())
                .spawn(move || run(path, queue, cancel, sink, ctx))
                .map_err(|e| IoError::Io(format!("Failed to spawn write worker: {}", e)))?
        };

        Ok(Self {
            path,
            queue,
            cancel,
            handle: Some(handle),
        })
    }

    /// Queue feeding the encoder, for producers on other threads
    pub fn queue(&self) -> Arc<VideoQueue> {
        Arc::clone(&self.queue)
    }

    /// Queue one frame, blocking while the encoder is behind
    pub fn write(&self, frame: VideoFrame) -> Result<(), IoError> {
        self.queue.add_frame(frame).map_err(|e| match e {
            QueueError::Closed => IoError::Closed,
            other => IoError::Io(other.to_string()),
        })
    }

    /// Flush remaining frames, close the output and wait for the worker.
    /// Returns the first write error, if any.
    pub fn finish(mut self) -> Result<WriteStats, IoError> {
        self.queue.set_finished(true);
        let handle = self.handle.take().ok_or(IoError::Closed)?;
        handle
            .join()
            .map_err(|_| IoError::Io(format!("Write worker panicked: {}", self.path)))?
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // Abandoned without finish(): discard pending frames
            self.cancel.cancel();
            self.queue.close();
            let _ = handle.join();
        }
    }
}

fn run(
    path: String,
    queue: Arc<VideoQueue>,
    cancel: CancelToken,
    mut sink: Box<dyn FrameSink>,
    ctx: DecodeContext,
) -> Result<WriteStats, IoError> {
    let mut stats = WriteStats::default();
    let mut first_error: Option<IoError> = None;

    while !cancel.is_cancelled() {
        match queue.wait_frame(POLL_INTERVAL) {
            Some(frame) => match sink.write_video(&frame, &ctx) {
                Ok(()) => stats.frames_written += 1,
                Err(e) => {
                    warn!("{}: {}", path, e);
                    stats.errors += 1;
                    first_error.get_or_insert(e);
                }
            },
            None if queue.is_drained() || queue.is_closed() => break,
            None => {}
        }
    }

    sink.finish()?;
    info!("Wrote {}: {} frames, {} errors", path, stats.frames_written, stats.errors);
    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}
