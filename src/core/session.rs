//! Read session: one decode worker per open source
//!
//! **Why**: Decoding must never run on the playback thread. Each open source
//! gets a worker that fills a bounded video/audio queue ahead of playback and
//! prefetches into the frame cache while idle.
//!
//! **Used by**: IoSystem::read (construction), the playback consumer (queue
//! pops, seek/play controls), UI telemetry (cache getters)
//!
//! # States
//!
//! ```text
//! Idle → Opening → InfoReady → Decoding ⇄ Seeking → Finished/Closed
//! ```
//!
//! # Threading
//!
//! Controls (`seek`, `set_playback`, ...) write the shared control block and
//! signal a condvar; the worker reads them once per iteration. `seek` bumps
//! the queue generations while holding the control lock, so a frame decoded
//! for the old position is rejected as stale when pushed.
//!
//! The worker blocks only on a full queue and on the control condvar (with a
//! bounded poll interval). `close()` cancels, closes both queues to release a
//! blocked push, and joins.
//!
//! Lock order: control → queue and control → cache. The cache lock is never
//! held together with a queue lock. Inserts into the cache happen under the
//! control lock so they cannot race with `set_cache_enabled(false)`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use log::{debug, info, trace, warn};
use uuid::Uuid;

use super::cache::{Direction, FrameCache, InOutPoints};
use super::events::{EVENT_CHANNEL_SIZE, SessionEvent};
use super::queue::{AudioQueue, VideoQueue};
use crate::entities::file_info::FileInfo;
use crate::entities::frame::{AudioFrame, Image, VideoFrame};
use crate::entities::info::Info;
use crate::entities::sequence::{Index, Sequence, last_index_for};
use crate::entities::traits::{DecodeContext, FrameSource};
use crate::error::{IoError, QueueError};
use crate::io::options::ReadOptions;
use crate::text::{TextResolver, ids};

/// Upper bound on how long the worker sleeps before re-checking controls
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared cancellation flag checked by the worker at its yield points
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    InfoReady,
    Decoding,
    Seeking,
    Finished,
    Closed,
}

type InfoResult = Result<Info, IoError>;

/// Pending stream info. Resolves once, when the worker has opened the source.
#[derive(Debug)]
pub struct InfoFuture {
    rx: Receiver<InfoResult>,
}

impl InfoFuture {
    /// Block until the info is available
    pub fn wait(self) -> InfoResult {
        self.rx.recv().unwrap_or(Err(IoError::Closed))
    }

    /// `None` if the info is still pending after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<InfoResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(IoError::Closed)),
        }
    }

    /// Non-blocking poll
    pub fn try_get(&self) -> Option<InfoResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(IoError::Closed)),
        }
    }
}

/// Control block written by the API, read by the worker
struct Control {
    state: SessionState,
    info: Option<InfoResult>,
    info_waiters: Vec<Sender<InfoResult>>,
    seek: Option<(Index, Direction)>,
    direction: Direction,
    playback: bool,
    looping: bool,
    in_out: InOutPoints,
    cache_enabled: bool,
    thread_count: usize,
    closed: bool,
}

/// What the worker acts on during one iteration
struct Snapshot {
    seek: Option<(Index, Direction)>,
    direction: Direction,
    playback: bool,
    looping: bool,
    in_out: InOutPoints,
    cache_enabled: bool,
    thread_count: usize,
    video_generation: u64,
    audio_generation: u64,
}

struct Shared {
    id: Uuid,
    component: String,
    path: String,
    can_seek: bool,
    control: Mutex<Control>,
    wake: Condvar,
    cache: Mutex<FrameCache>,
    video: Arc<VideoQueue>,
    audio: Arc<AudioQueue>,
    cancel: CancelToken,
    events: Sender<SessionEvent>,
    text: Arc<dyn TextResolver>,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cache(&self) -> MutexGuard<'_, FrameCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SessionState) {
        let mut ctl = self.control();
        if ctl.state != state && ctl.state != SessionState::Closed {
            trace!(target: self.component.as_str(), "{}: {:?} -> {:?}", self.path, ctl.state, state);
            ctl.state = state;
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.try_send(event).is_err() {
            trace!(target: self.component.as_str(), "{}: event channel full, dropping event", self.path);
        }
    }

    fn resolve_info(&self, result: InfoResult) {
        let mut ctl = self.control();
        for tx in ctl.info_waiters.drain(..) {
            let _ = tx.send(result.clone());
        }
        ctl.info = Some(result);
    }

    /// Insert into the cache unless caching was disabled meanwhile
    fn cache_add(&self, index: Index, image: Image) -> bool {
        let ctl = self.control();
        ctl.cache_enabled && self.cache().add(index, image)
    }

    /// Apply a control change unless the session is closed
    fn update(&self, f: impl FnOnce(&mut Control)) {
        let mut ctl = self.control();
        if ctl.closed {
            return;
        }
        f(&mut ctl);
        self.wake.notify_all();
    }
}

/// An open media source with its decode worker, queues and cache
pub struct ReadSession {
    shared: Arc<Shared>,
    events: Receiver<SessionEvent>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReadSession {
    /// Spawn the decode worker for `source`. Opening happens on the worker;
    /// use [`ReadSession::info`] for the result.
    pub fn new(
        file_info: FileInfo,
        options: ReadOptions,
        source: Box<dyn FrameSource>,
        text: Arc<dyn TextResolver>,
    ) -> Result<Self, IoError> {
        let mut ctx = DecodeContext::new(options.io.thread_count)?;
        ctx.layer = options.layer;
        ctx.color_space = options.color_space.clone();

        let id = Uuid::new_v4();
        let (tx, rx) = bounded(EVENT_CHANNEL_SIZE);
        let shared = Arc::new(Shared {
            id,
            component: options.component.clone(),
            path: file_info.to_string(),
            can_seek: source.can_seek(),
            control: Mutex::new(Control {
                state: SessionState::Idle,
                info: None,
                info_waiters: Vec::new(),
                seek: None,
                direction: Direction::Forward,
                playback: false,
                looping: false,
                in_out: InOutPoints::default(),
                cache_enabled: false,
                thread_count: ctx.threads(),
                closed: false,
            }),
            wake: Condvar::new(),
            cache: Mutex::new(FrameCache::default()),
            video: Arc::new(VideoQueue::new(options.io.video_queue_size)),
            audio: Arc::new(AudioQueue::new(options.io.audio_queue_size)),
            cancel: CancelToken::new(),
            events: tx,
            text,
        });

        debug!(target: shared.component.as_str(), "Opening {} (session {})", shared.path, id);

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("seqcache-read-{}", &id.simple().to_string()[..8]))
            .spawn(move || run(worker, source, ctx))
            .map_err(|e| IoError::Io(format!("Failed to spawn decode worker: {}", e)))?;

        Ok(Self {
            shared,
            events: rx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Handle carried by every event of this session
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Stream info, resolved by the worker after opening. Never blocks.
    pub fn info(&self) -> InfoFuture {
        let (tx, rx) = bounded(1);
        let mut ctl = self.shared.control();
        match &ctl.info {
            Some(result) => {
                let _ = tx.send(result.clone());
            }
            // Dropping `tx` resolves the future to `Closed`
            None if ctl.closed => {}
            None => ctl.info_waiters.push(tx),
        }
        InfoFuture { rx }
    }

    /// Discard queued and in-flight frames and resume at `index`.
    /// While paused exactly one frame is produced.
    pub fn seek(&self, index: Index, direction: Direction) {
        if !self.shared.can_seek {
            debug!(target: self.shared.component.as_str(), "{}: source cannot seek", self.shared.path);
            return;
        }
        let shared = &self.shared;
        shared.update(|ctl| {
            ctl.seek = Some((index, direction));
            ctl.direction = direction;
            shared.video.clear_frames();
            shared.audio.clear_frames();
        });
    }

    pub fn set_playback(&self, playback: bool) {
        let shared = &self.shared;
        shared.update(|ctl| {
            if ctl.playback != playback {
                ctl.playback = playback;
                if !playback {
                    // Release a push blocked on a consumer that stopped popping
                    shared.video.interrupt();
                    shared.audio.interrupt();
                }
            }
        });
    }

    pub fn is_playback(&self) -> bool {
        self.shared.control().playback
    }

    pub fn set_loop(&self, looping: bool) {
        self.shared.update(|ctl| ctl.looping = looping);
    }

    pub fn is_loop(&self) -> bool {
        self.shared.control().looping
    }

    pub fn set_in_out_points(&self, points: InOutPoints) {
        self.shared.update(|ctl| ctl.in_out = points);
    }

    pub fn in_out_points(&self) -> InOutPoints {
        self.shared.control().in_out
    }

    pub fn direction(&self) -> Direction {
        self.shared.control().direction
    }

    /// Report the frame the consumer is showing; re-evaluates cache priority
    pub fn set_current_frame(&self, index: Index) {
        let mut cache = self.shared.cache();
        cache.set_current_frame(index);
        cache.recompute();
    }

    /// Only finite, seekable sources support caching
    pub fn has_cache(&self) -> bool {
        self.shared.can_seek
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        if enabled && !self.has_cache() {
            debug!(target: self.shared.component.as_str(), "{}: caching not supported", self.shared.path);
            return;
        }
        let shared = &self.shared;
        shared.update(|ctl| {
            ctl.cache_enabled = enabled;
            if !enabled {
                shared.cache().clear();
            }
        });
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.shared.control().cache_enabled
    }

    pub fn set_cache_max_byte_count(&self, max: usize) {
        self.shared.cache().set_max(max);
        self.shared.wake.notify_all();
    }

    pub fn cache_max_byte_count(&self) -> usize {
        self.shared.cache().max()
    }

    pub fn cache_byte_count(&self) -> usize {
        self.shared.cache().total_byte_count()
    }

    /// Frames the cache currently wants resident
    pub fn cache_sequence(&self) -> Sequence {
        self.shared.cache().sequence()
    }

    /// Frames currently resident
    pub fn cached_frames(&self) -> Sequence {
        self.shared.cache().frames()
    }

    pub fn cache_read_behind(&self) -> usize {
        self.shared.cache().read_behind()
    }

    pub fn set_cache_read_behind(&self, frames: usize) {
        let mut cache = self.shared.cache();
        cache.set_read_behind(frames);
        cache.recompute();
    }

    pub fn video_queue(&self) -> Arc<VideoQueue> {
        Arc::clone(&self.shared.video)
    }

    pub fn audio_queue(&self) -> Arc<AudioQueue> {
        Arc::clone(&self.shared.audio)
    }

    pub fn state(&self) -> SessionState {
        self.shared.control().state
    }

    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events.clone()
    }

    pub fn thread_count(&self) -> usize {
        self.shared.control().thread_count
    }

    /// Resize the decode pool; applied by the worker before its next frame
    pub fn set_thread_count(&self, threads: usize) {
        self.shared.update(|ctl| ctl.thread_count = threads.max(1));
    }

    pub fn is_running(&self) -> bool {
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker and wait for it. Idempotent.
    pub fn close(&self) {
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(handle) = handle else {
            return;
        };

        let shared = &self.shared;
        shared.cancel.cancel();
        {
            let mut ctl = shared.control();
            ctl.closed = true;
            shared.video.close();
            shared.audio.close();
            shared.wake.notify_all();
        }
        if handle.join().is_err() {
            warn!(target: shared.component.as_str(), "{}: decode worker panicked", shared.path);
        }

        {
            let mut ctl = shared.control();
            ctl.state = SessionState::Closed;
            ctl.info_waiters.clear();
        }
        shared.cache().clear();
        shared.emit(SessionEvent::Closed { session: shared.id });
        debug!(target: shared.component.as_str(), "Closed {}", shared.path);
    }
}

impl Drop for ReadSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Outcome of producing one frame
enum Produced {
    Pushed,
    Skipped,
    Retry,
    EndOfStream,
    Closed,
}

/// Next index to deliver, or `None` when idle at the end of a non-looping
/// range
fn resolve_next(next: Index, snap: &Snapshot, size: usize, single: bool) -> Option<Index> {
    let range = snap.in_out.range(size)?.sorted();
    if range.contains(next) {
        return Some(next);
    }
    let (start, end) = match snap.direction {
        Direction::Forward => (range.min, range.max),
        Direction::Reverse => (range.max, range.min),
    };
    let past_end = (next - end) * snap.direction.step() > 0;
    if !past_end || snap.looping {
        Some(start)
    } else if single {
        Some(end)
    } else {
        None
    }
}

fn run(shared: Arc<Shared>, mut source: Box<dyn FrameSource>, mut ctx: DecodeContext) {
    let target = shared.component.clone();
    let target = target.as_str();

    shared.set_state(SessionState::Opening);
    let info = match source.open(&ctx) {
        Ok(info) => info,
        Err(e) => {
            let detail = match &e {
                IoError::Open { message, .. } => message.clone(),
                other => other.to_string(),
            };
            let error = IoError::Open {
                path: shared.path.clone().into(),
                message: format!("{} ({})", shared.text.text(ids::ERROR_OPEN), detail),
            };
            warn!(target: target, "{}", error);
            shared.resolve_info(Err(error.clone()));
            shared.emit(SessionEvent::OpenFailed { session: shared.id, error });
            shared.video.set_finished(true);
            shared.audio.set_finished(true);
            shared.set_state(SessionState::Finished);
            return;
        }
    };

    let size = info.sequence_size();
    {
        let mut cache = shared.cache();
        cache.set_sequence_size(size);
        cache.recompute();
    }
    info!(
        target: target,
        "Opened {}: {} frames, {} video, {} audio stream(s)",
        shared.path,
        size,
        info.video.len(),
        info.audio.len()
    );
    shared.resolve_info(Ok(info.clone()));
    shared.emit(SessionEvent::InfoReady { session: shared.id, info });
    shared.set_state(SessionState::InfoReady);

    let mut next: Index = 0;
    // First frame is delivered even while paused so the viewer has an image
    let mut single = true;
    // Window frames that failed to decode or could not be cached; not
    // prefetched again until the next seek
    let mut skipped: HashSet<Index> = HashSet::new();

    while !shared.cancel.is_cancelled() {
        let snap = {
            let mut ctl = shared.control();
            Snapshot {
                seek: ctl.seek.take(),
                direction: ctl.direction,
                playback: ctl.playback,
                looping: ctl.looping,
                in_out: ctl.in_out,
                cache_enabled: ctl.cache_enabled,
                thread_count: ctl.thread_count,
                video_generation: shared.video.generation(),
                audio_generation: shared.audio.generation(),
            }
        };

        if snap.thread_count != ctx.threads() {
            match DecodeContext::new(snap.thread_count) {
                Ok(mut resized) => {
                    debug!(target: target, "{}: decode threads {} -> {}", shared.path, ctx.threads(), snap.thread_count);
                    resized.layer = ctx.layer;
                    resized.color_space = std::mem::take(&mut ctx.color_space);
                    ctx = resized;
                }
                Err(e) => warn!(target: target, "{}: {}", shared.path, e),
            }
        }

        if let Some((index, direction)) = snap.seek {
            shared.set_state(SessionState::Seeking);
            next = match size {
                0 => 0,
                n => index.clamp(0, last_index_for(n)),
            };
            {
                let mut cache = shared.cache();
                cache.set_in_out_points(snap.in_out);
                cache.set_direction(direction);
                cache.seek(next);
                cache.recompute();
            }
            single = true;
            skipped.clear();
            debug!(target: target, "{}: seek to {} {:?}", shared.path, next, direction);
            shared.emit(SessionEvent::Seeked { session: shared.id, frame: next });
        }

        if !shared.can_seek {
            if snap.playback || single {
                shared.set_state(SessionState::Decoding);
                match produce(&shared, source.as_mut(), &ctx, &snap, next, false) {
                    Produced::Pushed | Produced::Skipped => {
                        next += 1;
                        single = false;
                    }
                    Produced::Retry => {}
                    Produced::EndOfStream => {
                        info!(target: target, "{}: end of stream after {} frames", shared.path, next);
                        shared.video.set_finished(true);
                        shared.audio.set_finished(true);
                        shared.set_state(SessionState::Finished);
                        shared.emit(SessionEvent::Finished { session: shared.id });
                        wait_for_cancel(&shared);
                        break;
                    }
                    Produced::Closed => break,
                }
                continue;
            }
        } else if snap.playback || single {
            if let Some(index) = resolve_next(next, &snap, size, single) {
                shared.set_state(SessionState::Decoding);
                match produce(&shared, source.as_mut(), &ctx, &snap, index, snap.cache_enabled) {
                    Produced::Pushed | Produced::Skipped | Produced::EndOfStream => {
                        next = index + snap.direction.step();
                        single = false;
                    }
                    Produced::Retry => {}
                    Produced::Closed => break,
                }
                continue;
            }
        }

        if snap.cache_enabled && shared.can_seek {
            let missing = {
                let mut cache = shared.cache();
                cache.set_in_out_points(snap.in_out);
                cache.recompute();
                cache.missing().find(|i| !skipped.contains(i))
            };
            if let Some(index) = missing {
                match source.read_video(index, &ctx) {
                    Ok(Some(image)) => {
                        trace!(target: target, "{}: prefetched {}", shared.path, index);
                        if !shared.cache_add(index, image) {
                            skipped.insert(index);
                        }
                    }
                    Ok(None) => {
                        skipped.insert(index);
                    }
                    Err(e) => {
                        skipped.insert(index);
                        report_decode_error(&shared, index, e);
                    }
                }
                continue;
            }
        }

        let ctl = shared.control();
        if ctl.seek.is_none() && !shared.cancel.is_cancelled() {
            let _ = shared.wake.wait_timeout(ctl, POLL_INTERVAL);
        }
    }

    trace!(target: target, "{}: decode worker stopped", shared.path);
}

/// Fetch (cache or decode) the frame at `index` and push it
fn produce(
    shared: &Shared,
    source: &mut dyn FrameSource,
    ctx: &DecodeContext,
    snap: &Snapshot,
    index: Index,
    use_cache: bool,
) -> Produced {
    let cached = if use_cache { shared.cache().get(index) } else { None };
    let from_cache = cached.is_some();
    let image: Image = match cached {
        Some(image) => image,
        None => match source.read_video(index, ctx) {
            Ok(Some(image)) => image,
            Ok(None) if !shared.can_seek => return Produced::EndOfStream,
            Ok(None) => {
                let error = IoError::Decode {
                    frame: index,
                    message: shared.text.text(ids::ERROR_READ),
                };
                report_decode_error(shared, index, error);
                return Produced::Skipped;
            }
            Err(e) => {
                report_decode_error(shared, index, e);
                return Produced::Skipped;
            }
        },
    };

    if use_cache {
        let ctl = shared.control();
        if ctl.cache_enabled {
            let mut cache = shared.cache();
            cache.set_in_out_points(snap.in_out);
            cache.set_direction(snap.direction);
            cache.set_current_frame(index);
            if !from_cache {
                cache.add(index, image.clone());
            }
            cache.recompute();
        }
    }

    match shared.video.add_frame_in(snap.video_generation, VideoFrame::new(index, image)) {
        Ok(()) => {}
        Err(QueueError::Closed) => return Produced::Closed,
        Err(QueueError::Stale) => {
            trace!(target: shared.component.as_str(), "{}: dropped stale frame {}", shared.path, index);
            return Produced::Retry;
        }
        Err(_) => return Produced::Retry,
    }

    match source.read_audio(index, ctx) {
        Ok(Some(audio)) => {
            let position = index * audio.sample_count() as i64;
            match shared.audio.add_frame_in(snap.audio_generation, AudioFrame::new(position, audio)) {
                Ok(()) => {}
                Err(QueueError::Closed) => return Produced::Closed,
                Err(e) => trace!(target: shared.component.as_str(), "{}: audio for {} dropped: {}", shared.path, index, e),
            }
        }
        Ok(None) => {}
        Err(e) => debug!(target: shared.component.as_str(), "{}: audio for {} failed: {}", shared.path, index, e),
    }

    Produced::Pushed
}

fn report_decode_error(shared: &Shared, index: Index, error: IoError) {
    let error = match error {
        e @ IoError::Decode { .. } => e,
        other => IoError::Decode {
            frame: index,
            message: format!("{}: {}", shared.text.text(ids::ERROR_READ), other),
        },
    };
    warn!(target: shared.component.as_str(), "{}: {}", shared.path, error);
    shared.emit(SessionEvent::DecodeError {
        session: shared.id,
        frame: index,
        error,
    });
}

fn wait_for_cancel(shared: &Shared) {
    let mut ctl = shared.control();
    while !shared.cancel.is_cancelled() {
        ctl = shared
            .wake
            .wait_timeout(ctl, POLL_INTERVAL)
            .unwrap_or_else(|e| e.into_inner())
            .0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::frame::{AudioData, AudioFormat, ImageInfo, PixelFormat};
    use crate::entities::info::{Speed, VideoInfo};
    use crate::text::{IdentityText, TextTable};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Scripted source: frame `i` is a 2x2 image filled with `i`
    #[derive(Default)]
    struct MockSource {
        frames: usize,
        fail: HashSet<Index>,
        unbounded: bool,
        fail_open: bool,
        open_delay: Duration,
        read_delay: Duration,
        audio: bool,
        reads: Arc<AtomicUsize>,
    }

    impl MockSource {
        fn new(frames: usize) -> Self {
            Self {
                frames,
                ..Default::default()
            }
        }
    }

    impl FrameSource for MockSource {
        fn open(&mut self, _ctx: &DecodeContext) -> Result<Info, IoError> {
            thread::sleep(self.open_delay);
            if self.fail_open {
                return Err(IoError::Io("no such file".into()));
            }
            let sequence = if self.unbounded {
                Sequence::default()
            } else {
                Sequence::new(1, self.frames as i64, 0)
            };
            let video = VideoInfo::new(ImageInfo::new(2, 2, PixelFormat::Rgba8), Speed::default(), sequence);
            Ok(Info::with_video("mock.1-10.png", video))
        }

        fn can_seek(&self) -> bool {
            !self.unbounded
        }

        fn read_video(&mut self, index: Index, _ctx: &DecodeContext) -> Result<Option<Image>, IoError> {
            thread::sleep(self.read_delay);
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail.contains(&index) {
                return Err(IoError::Decode { frame: index, message: "corrupt".into() });
            }
            if index < 0 || index as usize >= self.frames {
                return Ok(None);
            }
            Ok(Some(Image::from_rgba8(2, 2, vec![index as u8; 16])))
        }

        fn read_audio(&mut self, _index: Index, _ctx: &DecodeContext) -> Result<Option<AudioData>, IoError> {
            if !self.audio {
                return Ok(None);
            }
            Ok(Some(AudioData::new(AudioFormat::default(), vec![0.0; 2000])))
        }
    }

    fn session(source: MockSource) -> ReadSession {
        let file_info = FileInfo::new("mock.1-10.png");
        let mut options = ReadOptions::default();
        options.io.thread_count = 1;
        ReadSession::new(file_info, options, Box::new(source), Arc::new(IdentityText)).unwrap()
    }

    fn pop_wait(queue: &VideoQueue) -> Option<VideoFrame> {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if let Some(frame) = queue.pop_frame() {
                return Some(frame);
            }
            thread::sleep(Duration::from_millis(1));
        }
        None
    }

    fn wait_until(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_info_resolves() {
        let s = session(MockSource::new(10));
        let info = s.info().wait_timeout(TIMEOUT).unwrap().unwrap();
        assert_eq!(info.sequence_size(), 10);
        assert!(s.has_cache());

        let events = s.events();
        let event = events.recv_timeout(TIMEOUT).unwrap();
        assert!(matches!(event, SessionEvent::InfoReady { .. }));
        assert_eq!(event.session(), s.id());

        // Late callers get the resolved value
        assert!(s.info().try_get().unwrap().is_ok());
    }

    #[test]
    fn test_info_does_not_block() {
        let s = session(MockSource {
            open_delay: Duration::from_millis(100),
            ..MockSource::new(3)
        });
        let pending = s.info();
        assert!(pending.try_get().is_none());
        assert_eq!(pending.wait().unwrap().sequence_size(), 3);
    }

    #[test]
    fn test_open_failure() {
        let file_info = FileInfo::new("missing.png");
        let source = MockSource {
            fail_open: true,
            ..MockSource::new(1)
        };
        let s = ReadSession::new(
            file_info,
            ReadOptions::default(),
            Box::new(source),
            Arc::new(TextTable::default()),
        )
        .unwrap();

        match s.info().wait() {
            Err(IoError::Open { message, .. }) => assert!(message.starts_with("Cannot open file")),
            other => panic!("expected open error, got {:?}", other),
        }
        assert!(matches!(
            s.events().recv_timeout(TIMEOUT).unwrap(),
            SessionEvent::OpenFailed { .. }
        ));
        assert!(wait_until(|| s.state() == SessionState::Finished));
        assert!(s.video_queue().is_drained());
    }

    #[test]
    fn test_playback_in_order() {
        let s = session(MockSource::new(10));
        s.set_playback(true);
        let q = s.video_queue();
        let frames: Vec<Index> = (0..10).map(|_| pop_wait(&q).unwrap().frame).collect();
        assert_eq!(frames, (0..10).collect::<Vec<_>>());
        assert!(q.count() <= q.max());
    }

    #[test]
    fn test_reverse_playback() {
        let s = session(MockSource::new(10));
        s.info().wait().unwrap();
        s.seek(9, Direction::Reverse);
        s.set_playback(true);
        let q = s.video_queue();
        let frames: Vec<Index> = (0..10).map(|_| pop_wait(&q).unwrap().frame).collect();
        assert_eq!(frames, (0..10).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_seek_discards_old_frames() {
        let s = session(MockSource::new(10));
        s.set_playback(true);
        let q = s.video_queue();
        assert_eq!(pop_wait(&q).unwrap().frame, 0);

        s.seek(7, Direction::Forward);
        let frames: Vec<Index> = (0..3).map(|_| pop_wait(&q).unwrap().frame).collect();
        assert_eq!(frames, vec![7, 8, 9]);

        let events: Vec<_> = s.events().try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Seeked { frame: 7, .. })));
    }

    #[test]
    fn test_paused_seek_produces_one_frame() {
        let s = session(MockSource::new(10));
        s.info().wait().unwrap();
        s.seek(4, Direction::Forward);
        let q = s.video_queue();
        assert!(wait_until(|| q.frame().is_some_and(|f| f.frame == 4)));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.count(), 1);
        assert_eq!(q.pop_frame().unwrap().frame, 4);
        thread::sleep(Duration::from_millis(50));
        assert!(q.is_empty());
    }

    #[test]
    fn test_loop_within_in_out_points() {
        let s = session(MockSource::new(10));
        s.info().wait().unwrap();
        s.set_in_out_points(InOutPoints::new(true, 2, 4));
        s.set_loop(true);
        s.seek(2, Direction::Forward);
        s.set_playback(true);
        let q = s.video_queue();
        let frames: Vec<Index> = (0..7).map(|_| pop_wait(&q).unwrap().frame).collect();
        assert_eq!(frames, vec![2, 3, 4, 2, 3, 4, 2]);
    }

    #[test]
    fn test_stops_at_end_without_loop() {
        let s = session(MockSource::new(3));
        s.set_playback(true);
        let q = s.video_queue();
        for expected in 0..3 {
            assert_eq!(pop_wait(&q).unwrap().frame, expected);
        }
        thread::sleep(Duration::from_millis(50));
        assert!(q.is_empty());
        assert!(!q.is_finished());
    }

    #[test]
    fn test_decode_error_skips_frame() {
        let mut source = MockSource::new(6);
        source.fail.insert(3);
        let s = session(source);
        s.set_playback(true);
        let q = s.video_queue();
        let frames: Vec<Index> = (0..5).map(|_| pop_wait(&q).unwrap().frame).collect();
        assert_eq!(frames, vec![0, 1, 2, 4, 5]);

        let events: Vec<_> = s.events().try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::DecodeError { frame: 3, .. })));
    }

    #[test]
    fn test_cache_serves_replay() {
        let source = MockSource::new(10);
        let reads = Arc::clone(&source.reads);
        let s = session(source);
        s.info().wait().unwrap();
        s.set_cache_max_byte_count(10 * 16);
        s.set_cache_enabled(true);
        assert!(s.is_cache_enabled());

        // Paused: prefetch fills the whole window
        assert!(wait_until(|| s.cached_frames().size() == 10));
        assert_eq!(s.cache_byte_count(), 160);
        let decoded = reads.load(Ordering::SeqCst);

        s.seek(0, Direction::Forward);
        s.set_playback(true);
        let q = s.video_queue();
        let frames: Vec<VideoFrame> = (0..10).map(|_| pop_wait(&q).unwrap()).collect();
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.frame, i as Index);
            match frame.image.buffer() {
                crate::entities::frame::PixelBuffer::U8(px) => assert_eq!(px[0], i as u8),
                other => panic!("unexpected buffer {:?}", other),
            }
        }
        assert_eq!(reads.load(Ordering::SeqCst), decoded);

        s.set_cache_max_byte_count(0);
        assert_eq!(s.cache_byte_count(), 0);
        assert!(s.cached_frames().ranges.is_empty());
    }

    #[test]
    fn test_disable_cache_during_decode() {
        let s = session(MockSource {
            read_delay: Duration::from_millis(150),
            ..MockSource::new(10)
        });
        s.info().wait().unwrap();
        // Let the first (uncached) frame through so the worker is idle
        assert_eq!(pop_wait(&s.video_queue()).unwrap().frame, 0);
        s.set_cache_max_byte_count(10 * 16);
        s.set_cache_enabled(true);
        // Disable while the worker is inside a slow prefetch decode
        thread::sleep(Duration::from_millis(50));
        s.set_cache_enabled(false);
        thread::sleep(Duration::from_millis(500));

        assert!(!s.is_cache_enabled());
        assert_eq!(s.cache_byte_count(), 0);
        assert!(s.cached_frames().ranges.is_empty());
    }

    #[test]
    fn test_unbounded_source_finishes() {
        let s = session(MockSource {
            unbounded: true,
            ..MockSource::new(3)
        });
        assert!(!s.has_cache());
        s.set_cache_enabled(true);
        assert!(!s.is_cache_enabled());

        s.set_playback(true);
        let q = s.video_queue();
        for expected in 0..3 {
            assert_eq!(pop_wait(&q).unwrap().frame, expected);
        }
        assert!(wait_until(|| q.is_drained()));
        assert!(wait_until(|| s.state() == SessionState::Finished));
        let events: Vec<_> = s.events().try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Finished { .. })));
    }

    #[test]
    fn test_audio_consumed_from_other_thread() {
        let s = session(MockSource {
            audio: true,
            ..MockSource::new(10)
        });
        let audio = s.audio_queue();
        let consumer = thread::spawn(move || {
            let mut positions = Vec::new();
            let deadline = Instant::now() + TIMEOUT;
            while positions.len() < 5 && Instant::now() < deadline {
                match audio.pop_frame() {
                    Some(frame) => positions.push(frame.position),
                    None => thread::sleep(Duration::from_millis(1)),
                }
            }
            positions
        });

        s.set_playback(true);
        let q = s.video_queue();
        for _ in 0..5 {
            pop_wait(&q).unwrap();
        }
        let positions = consumer.join().unwrap();
        assert_eq!(positions, vec![0, 1000, 2000, 3000, 4000]);
    }

    #[test]
    fn test_close_releases_blocked_worker() {
        let s = session(MockSource::new(100));
        s.set_playback(true);
        let q = s.video_queue();
        // Nobody pops: the worker blocks on the full queue
        assert!(wait_until(|| q.count() == q.max()));
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        s.close();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(s.state(), SessionState::Closed);
        assert!(!s.is_running());

        // Controls after close are ignored
        s.set_playback(false);
        assert!(s.is_playback());
        s.close();
    }

    #[test]
    fn test_thread_count() {
        let s = session(MockSource::new(4));
        assert_eq!(s.thread_count(), 1);
        s.set_thread_count(3);
        assert_eq!(s.thread_count(), 3);
        s.set_thread_count(0);
        assert_eq!(s.thread_count(), 1);
    }

    #[test]
    fn test_drop_joins_worker() {
        let s = session(MockSource::new(100));
        s.set_playback(true);
        drop(s);
    }
}
