//! Bounded producer/consumer frame queue
//!
//! **Why**: The decode worker must run ahead of playback without unbounded
//! memory growth, and the playback thread must never wait on decode.
//!
//! **Used by**: ReadSession (decode worker → playback), WriteSession
//! (application → encode worker), audio callback threads
//!
//! # Blocking Model
//!
//! - Producer: `add_frame` blocks while the queue is full (backpressure).
//! - Consumer: `pop_frame`/`frame` never block; an empty queue yields `None`
//!   and the caller drops the tick.
//! - `clear_frames()` bumps the queue generation and wakes a blocked
//!   producer, which gets `QueueError::Interrupted` (or `Stale` when it
//!   tagged its push with an older generation). This is how a seek discards
//!   in-flight work without deadlocking against a full queue.
//!
//! # Capacity Changes
//!
//! `set_max` on a non-empty queue drops the OLDEST frames until the new
//! capacity holds; the newest decoded frames are the ones playback needs
//! next.
//!
//! # End of Stream
//!
//! `finished` is monotone: once set it is never reset. Finished and empty
//! means the stream ended.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::entities::frame::{AudioFrame, VideoFrame};
use crate::error::QueueError;

/// Default video queue capacity
pub const DEFAULT_VIDEO_QUEUE_SIZE: usize = 1;

/// Default audio queue capacity
pub const DEFAULT_AUDIO_QUEUE_SIZE: usize = 30;

/// Queue of decoded video frames
pub type VideoQueue = FrameQueue<VideoFrame>;

/// Queue of decoded audio blocks
pub type AudioQueue = FrameQueue<AudioFrame>;

#[derive(Debug)]
struct QueueState<T> {
    frames: VecDeque<T>,
    max: usize,
    finished: bool,
    closed: bool,
    /// Bumped by `clear_frames()`
    generation: u64,
    /// Bumped by `interrupt()`
    interrupts: u64,
}

/// Thread-safe bounded FIFO between one producer and its consumers
#[derive(Debug)]
pub struct FrameQueue<T> {
    state: Mutex<QueueState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T: Clone> FrameQueue<T> {
    /// Create queue holding at most `max` frames (at least 1)
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(max),
                max,
                finished: false,
                closed: false,
                generation: 0,
                interrupts: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max(&self) -> usize {
        self.lock().max
    }

    /// Change capacity. Shrinking drops the oldest frames; growing wakes
    /// blocked producers.
    pub fn set_max(&self, max: usize) {
        let max = max.max(1);
        let mut st = self.lock();
        if st.max == max {
            return;
        }
        let mut dropped = 0;
        while st.frames.len() > max {
            st.frames.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Queue capacity {} -> {}: dropped {} oldest frames", st.max, max, dropped);
        }
        st.max = max;
        self.not_full.notify_all();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    pub fn count(&self) -> usize {
        self.lock().frames.len()
    }

    /// Oldest frame without removing it
    pub fn frame(&self) -> Option<T> {
        self.lock().frames.front().cloned()
    }

    /// Remove and return the oldest frame. Never blocks.
    pub fn pop_frame(&self) -> Option<T> {
        let mut st = self.lock();
        let frame = st.frames.pop_front();
        if frame.is_some() {
            self.not_full.notify_one();
        }
        frame
    }

    /// Blocking pop for encode workers. Returns `None` on timeout, or
    /// immediately once the queue is finished/closed and empty.
    pub fn wait_frame(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        loop {
            if let Some(frame) = st.frames.pop_front() {
                self.not_full.notify_one();
                return Some(frame);
            }
            if st.finished || st.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            st = self
                .not_empty
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// Drop all queued frames and start a new generation. Wakes a producer
    /// blocked on a full queue.
    pub fn clear_frames(&self) {
        let mut st = self.lock();
        st.frames.clear();
        st.generation += 1;
        trace!("Queue cleared (generation {})", st.generation);
        self.not_full.notify_all();
    }

    /// Wake a blocked producer without discarding frames
    pub fn interrupt(&self) {
        let mut st = self.lock();
        st.interrupts += 1;
        self.not_full.notify_all();
    }

    /// Current generation; capture before decoding and pass to `add_frame_in`
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Push, blocking while full
    pub fn add_frame(&self, frame: T) -> Result<(), QueueError> {
        self.push(None, frame, None)
    }

    /// Push a frame decoded during `generation`, blocking while full.
    /// Rejected with `Stale` once the queue moved to a newer generation.
    pub fn add_frame_in(&self, generation: u64, frame: T) -> Result<(), QueueError> {
        self.push(Some(generation), frame, None)
    }

    /// Push, blocking at most `timeout`
    pub fn add_frame_timeout(&self, frame: T, timeout: Duration) -> Result<(), QueueError> {
        self.push(None, frame, Some(Instant::now() + timeout))
    }

    /// Push without blocking; gives the frame back when full or closed
    pub fn try_add_frame(&self, frame: T) -> Result<(), T> {
        let mut st = self.lock();
        if st.closed || st.frames.len() >= st.max {
            return Err(frame);
        }
        st.frames.push_back(frame);
        self.not_empty.notify_one();
        Ok(())
    }

    fn push(&self, expected: Option<u64>, frame: T, deadline: Option<Instant>) -> Result<(), QueueError> {
        let mut st = self.lock();
        let generation = expected.unwrap_or(st.generation);
        let interrupts = st.interrupts;
        loop {
            if st.closed {
                return Err(QueueError::Closed);
            }
            if st.generation != generation {
                return Err(match expected {
                    Some(_) => QueueError::Stale,
                    None => QueueError::Interrupted,
                });
            }
            if st.interrupts != interrupts {
                return Err(QueueError::Interrupted);
            }
            if st.frames.len() < st.max {
                st.frames.push_back(frame);
                self.not_empty.notify_one();
                return Ok(());
            }
            st = match deadline {
                None => self.not_full.wait(st).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QueueError::Timeout);
                    }
                    self.not_full
                        .wait_timeout(st, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Mark end of stream. Monotone: `false` after `true` is ignored.
    pub fn set_finished(&self, finished: bool) {
        let mut st = self.lock();
        if st.finished && !finished {
            debug!("Ignoring attempt to reset finished queue");
            return;
        }
        st.finished = finished;
        self.not_empty.notify_all();
    }

    /// Finished and nothing left to consume
    pub fn is_drained(&self) -> bool {
        let st = self.lock();
        st.finished && st.frames.is_empty()
    }

    /// Refuse further pushes and wake every waiter. Terminal.
    pub fn close(&self) {
        let mut st = self.lock();
        st.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl<T: Clone> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_VIDEO_QUEUE_SIZE)
    }
}
