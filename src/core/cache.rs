//! Byte-budgeted frame cache with playhead-distance eviction
//!
//! **Why**: Scrubbing and looping over a sequence should not re-decode frames
//! the user just saw, but 4K float frames are tens of MB each, so residency
//! has to follow the playhead rather than insertion order.
//!
//! **Used by**: ReadSession (decode worker inserts, prefetch), UI telemetry
//! (`frames()` for the cache-coverage bar)
//!
//! # Retained Window
//!
//! Recomputed from `sequence_size`, `in_out`, `direction` and
//! `current_frame`:
//! - look-ahead: the current frame and the frames following it in
//!   `direction`, while their accumulated size stays within `max`;
//! - read-behind: up to `read_behind` frames on the other side of the
//!   current frame.
//!
//! Both are clipped to the in/out range (whole sequence when disabled).
//! Sizes of non-resident frames are estimated from the last inserted image.
//!
//! # Eviction
//!
//! Resident frames outside the in/out range (or past the end of the
//! sequence) are dropped on every recompute, whatever the budget. Then
//! resident frames outside the window (and not the current frame) are
//! evicted farthest-from-playhead first while the resident total exceeds
//! `max`. A frame inserted far from the playhead therefore goes before an
//! older frame next to it.
//!
//! The read-behind tail is a frame-count allowance on top of the look-ahead
//! budget: when every window frame is resident the total can exceed `max`
//! by at most `read_behind` frames, see [`FrameCache::resident_bound`].
//!
//! # Seeks
//!
//! [`FrameCache::seek`] clears the cache when the jump is longer than the
//! retained window (look-ahead plus read-behind frames) and lands on a frame
//! that is not resident. Shorter jumps, and jumps back into resident frames
//! such as a loop wrap, keep the cache.
//!
//! # Update Boundary
//!
//! Setters only mark the cache dirty. The owner calls `recompute()` once
//! after a batch of changes. `add()` always evicts against a fresh window.

use std::collections::BTreeMap;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::entities::frame::Image;
use crate::entities::sequence::{FrameRange, Index, Sequence, last_index_for};

/// Frames kept behind the playhead by default
pub const DEFAULT_READ_BEHIND: usize = 10;

/// Playback direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// Index delta of one playback step
    pub fn step(&self) -> Index {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// Optional playback sub-range `[in_point, out_point]` (indices)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InOutPoints {
    pub enabled: bool,
    pub in_point: Index,
    pub out_point: Index,
}

impl InOutPoints {
    /// Bounds are swapped if given reversed
    pub fn new(enabled: bool, a: Index, b: Index) -> Self {
        Self {
            enabled,
            in_point: a.min(b),
            out_point: a.max(b),
        }
    }

    /// Effective index range for a sequence of `size` frames, clamped to
    /// `[0, size)`. `None` for an empty sequence.
    pub fn range(&self, size: usize) -> Option<FrameRange> {
        if size == 0 {
            return None;
        }
        let last = last_index_for(size);
        if !self.enabled {
            return Some(FrameRange::new(0, last));
        }
        Some(FrameRange::new(self.in_point.clamp(0, last), self.out_point.clamp(0, last)))
    }
}

/// Resident frames keyed by sequence index
#[derive(Debug)]
pub struct FrameCache {
    max: usize,
    sequence_size: usize,
    in_out: InOutPoints,
    direction: Direction,
    current_frame: Index,
    read_behind: usize,

    images: BTreeMap<Index, Image>,
    byte_count: usize,
    frame_byte_estimate: usize,

    /// Look-ahead run in playback order, starting at the current frame
    ahead: Vec<Index>,
    /// Read-behind tail, nearest first
    behind: Vec<Index>,
    dirty: bool,
}

impl FrameCache {
    /// Create cache with a byte budget. `max == 0` disables caching.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            sequence_size: 0,
            in_out: InOutPoints::default(),
            direction: Direction::Forward,
            current_frame: 0,
            read_behind: DEFAULT_READ_BEHIND,
            images: BTreeMap::new(),
            byte_count: 0,
            frame_byte_estimate: 0,
            ahead: Vec::new(),
            behind: Vec::new(),
            dirty: true,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Change the byte budget. Zero clears and disables the cache;
    /// otherwise evicts immediately down to the new budget.
    pub fn set_max(&mut self, max: usize) {
        if max == self.max {
            return;
        }
        debug!("Cache budget: {} MB -> {} MB", self.max / 1024 / 1024, max / 1024 / 1024);
        self.max = max;
        if max == 0 {
            self.clear();
        }
        self.dirty = true;
        self.recompute();
    }

    pub fn sequence_size(&self) -> usize {
        self.sequence_size
    }

    pub fn set_sequence_size(&mut self, size: usize) {
        if size == self.sequence_size {
            return;
        }
        self.sequence_size = size;
        self.current_frame = self.clamp_index(self.current_frame);
        self.dirty = true;
    }

    pub fn in_out_points(&self) -> InOutPoints {
        self.in_out
    }

    pub fn set_in_out_points(&mut self, points: InOutPoints) {
        if points == self.in_out {
            return;
        }
        self.in_out = points;
        self.dirty = true;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        if direction == self.direction {
            return;
        }
        self.direction = direction;
        self.dirty = true;
    }

    pub fn current_frame(&self) -> Index {
        self.current_frame
    }

    /// Move the playhead. Out-of-range indices are clamped into
    /// `[0, sequence_size)`.
    pub fn set_current_frame(&mut self, index: Index) {
        let index = self.clamp_index(index);
        if index == self.current_frame {
            return;
        }
        self.current_frame = index;
        self.dirty = true;
    }

    pub fn read_behind(&self) -> usize {
        self.read_behind
    }

    pub fn set_read_behind(&mut self, frames: usize) {
        if frames == self.read_behind {
            return;
        }
        self.read_behind = frames;
        self.dirty = true;
    }

    /// Move the playhead for a seek; clears the cache on a discontinuity.
    /// Returns true if the cache was cleared.
    pub fn seek(&mut self, index: Index) -> bool {
        self.recompute();
        let index = self.clamp_index(index);
        let window = self.ahead.len() + self.behind.len();
        let distance = (index - self.current_frame).unsigned_abs() as usize;
        let cleared = !self.images.is_empty() && distance > window && !self.images.contains_key(&index);
        if cleared {
            debug!(
                "Seek {} -> {} beyond window of {} frames, clearing cache",
                self.current_frame, index, window
            );
            self.clear();
        }
        self.set_current_frame(index);
        cleared
    }

    /// Upper bound of `total_byte_count()` once the window is settled:
    /// the budget plus the read-behind tail at the current frame size.
    pub fn resident_bound(&self) -> usize {
        if self.max == 0 {
            return 0;
        }
        self.max
            .saturating_add(self.read_behind.saturating_mul(self.frame_byte_estimate))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Recompute the retained window and evict. Returns false if nothing
    /// changed since the last recompute.
    pub fn recompute(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.update_window();
        self.evict();
        self.dirty = false;
        true
    }

    pub fn contains(&self, index: Index) -> bool {
        self.images.contains_key(&index)
    }

    /// Resident image at `index`. Does not affect eviction priority.
    pub fn get(&self, index: Index) -> Option<Image> {
        self.images.get(&index).cloned()
    }

    /// Insert or replace the image at `index`, then evict against a fresh
    /// window. Returns true if the frame is resident afterwards.
    ///
    /// Rejected (not an error) when caching is disabled, the index is outside
    /// the sequence, or the image alone exceeds the budget.
    pub fn add(&mut self, index: Index, image: Image) -> bool {
        if self.max == 0 {
            return false;
        }
        if index < 0 || index as usize >= self.sequence_size {
            trace!("Not caching frame {}: outside sequence of {}", index, self.sequence_size);
            return false;
        }
        let bytes = image.byte_count();
        if bytes > self.max {
            warn!(
                "Frame {} ({} bytes) exceeds cache budget ({} bytes), not cached",
                index, bytes, self.max
            );
            return false;
        }

        if let Some(old) = self.images.insert(index, image) {
            self.byte_count -= old.byte_count();
        }
        self.byte_count += bytes;
        self.frame_byte_estimate = bytes;

        self.dirty = true;
        self.recompute();
        self.images.contains_key(&index)
    }

    /// Drop all resident frames
    pub fn clear(&mut self) {
        if !self.images.is_empty() {
            debug!("Cache cleared: {} frames, {} bytes", self.images.len(), self.byte_count);
        }
        self.images.clear();
        self.byte_count = 0;
    }

    /// Sum of resident image sizes
    pub fn total_byte_count(&self) -> usize {
        self.byte_count
    }

    pub fn count(&self) -> usize {
        self.images.len()
    }

    /// Resident indices as a sequence (contiguous runs merged)
    pub fn frames(&self) -> Sequence {
        let indices: Vec<Index> = self.images.keys().copied().collect();
        Sequence::from_frames(&indices)
    }

    /// The retained window as a sequence
    pub fn sequence(&self) -> Sequence {
        let indices: Vec<Index> = self.ahead.iter().chain(self.behind.iter()).copied().collect();
        Sequence::from_frames(&indices)
    }

    /// First window frame that is not resident: look-ahead in playback
    /// order, then the read-behind tail nearest first.
    pub fn next_missing(&self) -> Option<Index> {
        self.missing().next()
    }

    /// Every non-resident window frame, in `next_missing` order
    pub fn missing(&self) -> impl Iterator<Item = Index> + '_ {
        self.ahead
            .iter()
            .chain(self.behind.iter())
            .copied()
            .filter(|i| !self.images.contains_key(i))
    }

    fn clamp_index(&self, index: Index) -> Index {
        match self.sequence_size {
            0 => 0,
            n => index.clamp(0, last_index_for(n)),
        }
    }

    fn frame_bytes(&self, index: Index) -> usize {
        self.images
            .get(&index)
            .map(Image::byte_count)
            .unwrap_or(self.frame_byte_estimate)
    }

    fn update_window(&mut self) {
        self.ahead.clear();
        self.behind.clear();
        let Some(range) = self.in_out.range(self.sequence_size) else {
            return;
        };
        if self.max == 0 {
            return;
        }

        let step = self.direction.step();
        let start = self.current_frame.clamp(range.min, range.max);

        let mut total = 0usize;
        let mut i = start;
        while range.contains(i) {
            let bytes = self.frame_bytes(i);
            total = total.saturating_add(bytes);
            if total > self.max {
                break;
            }
            self.ahead.push(i);
            i += step;
        }

        let mut i = start - step;
        while self.behind.len() < self.read_behind && range.contains(i) {
            self.behind.push(i);
            i -= step;
        }

        trace!(
            "Cache window: current {} {:?}, {} ahead, {} behind",
            self.current_frame,
            self.direction,
            self.ahead.len(),
            self.behind.len()
        );
    }

    fn evict(&mut self) {
        let range = self.in_out.range(self.sequence_size).map(FrameRange::sorted);
        let outside: Vec<Index> = self
            .images
            .keys()
            .copied()
            .filter(|&i| !range.is_some_and(|r| r.contains(i)))
            .collect();
        for index in &outside {
            if let Some(image) = self.images.remove(index) {
                self.byte_count -= image.byte_count();
            }
        }
        if !outside.is_empty() {
            debug!("Dropped {} frames outside the play range", outside.len());
        }

        if self.byte_count <= self.max {
            return;
        }
        let current = self.current_frame;
        let mut candidates: Vec<Index> = self
            .images
            .keys()
            .copied()
            .filter(|&i| i != current && !self.ahead.contains(&i) && !self.behind.contains(&i))
            .collect();
        // Farthest first; ties go to the frame behind the playhead
        let step = self.direction.step();
        candidates.sort_by_key(|&i| {
            let behind = (i - current) * step < 0;
            (std::cmp::Reverse((i - current).abs()), !behind)
        });

        let mut evicted = 0usize;
        for index in candidates {
            if self.byte_count <= self.max {
                break;
            }
            if let Some(image) = self.images.remove(&index) {
                self.byte_count -= image.byte_count();
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(
                "Evicted {} frames, {} resident ({} / {} bytes)",
                evicted,
                self.images.len(),
                self.byte_count,
                self.max
            );
        }
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 5x5 RGBA8 = 100 bytes
    fn frame100() -> Image {
        Image::from_rgba8(5, 5, vec![0u8; 100])
    }

    fn resident(cache: &FrameCache) -> Vec<Index> {
        (0..cache.sequence_size() as Index).filter(|&i| cache.contains(i)).collect()
    }

    fn cache(max: usize, read_behind: usize, size: usize, current: Index) -> FrameCache {
        let mut c = FrameCache::new(max);
        c.set_read_behind(read_behind);
        c.set_sequence_size(size);
        c.set_current_frame(current);
        c.recompute();
        c
    }

    /// max=300, readBehind=2, 10 frames of 100 bytes, current=5 forward
    #[test]
    fn test_window_around_playhead() {
        let mut c = cache(300, 2, 10, 5);
        for i in 0..10 {
            c.add(i, frame100());
        }
        assert_eq!(resident(&c), vec![3, 4, 5, 6, 7]);
        assert_eq!(c.total_byte_count(), 500);
        assert_eq!(c.frames().to_string(), "3-7");
        assert_eq!(c.sequence().to_string(), "3-7");
    }

    /// Same scenario, frames loaded first and the playhead moved after
    #[test]
    fn test_recompute_after_batch() {
        let mut c = cache(usize::MAX / 2, 2, 10, 0);
        for i in 0..10 {
            assert!(c.add(i, frame100()));
        }
        assert_eq!(c.count(), 10);

        c.set_current_frame(5);
        c.set_direction(Direction::Forward);
        assert!(c.is_dirty());
        // Budget change recomputes on its own
        c.set_max(300);
        assert!(!c.is_dirty());
        assert!(!c.recompute());
        assert_eq!(resident(&c), vec![3, 4, 5, 6, 7]);
    }

    /// Insertions in increasing distance from the playhead keep the
    /// nearest max-fitting subset
    #[test]
    fn test_budget_respected_without_read_behind() {
        let mut c = cache(300, 0, 10, 0);
        for i in 0..10 {
            c.add(i, frame100());
            assert!(c.total_byte_count() <= c.max());
        }
        assert_eq!(resident(&c), vec![0, 1, 2]);

        let mut r = cache(300, 0, 10, 9);
        r.set_direction(Direction::Reverse);
        r.recompute();
        for i in (0..10).rev() {
            r.add(i, frame100());
            assert!(r.total_byte_count() <= r.max());
        }
        assert_eq!(resident(&r), vec![7, 8, 9]);
    }

    /// A new frame far from the playhead goes before older near frames
    #[test]
    fn test_far_insert_evicted_first() {
        let mut c = cache(300, 0, 100, 10);
        for i in 10..13 {
            c.add(i, frame100());
        }
        assert!(!c.add(90, frame100()));
        assert_eq!(resident(&c), vec![10, 11, 12]);
    }

    #[test]
    fn test_direction_flip_changes_candidates() {
        let mut c = cache(300, 1, 10, 5);
        for i in 4..8 {
            c.add(i, frame100());
        }
        let before = resident(&c);
        assert_eq!(before, vec![4, 5, 6, 7]);

        c.set_direction(Direction::Reverse);
        c.recompute();
        let after = resident(&c);
        assert_eq!(after, vec![4, 5, 6]);
        let removed: Vec<_> = before.iter().filter(|i| !after.contains(i)).collect();
        assert_eq!(removed, vec![&7]);
        assert_eq!(c.sequence().to_string(), "3-6");
    }

    #[test]
    fn test_in_out_points_limit_window() {
        let mut c = cache(1000, 2, 20, 8);
        c.set_in_out_points(InOutPoints::new(true, 10, 5));
        c.recompute();
        // Current 8, forward run clipped at out=10, read-behind 7,6
        assert_eq!(c.sequence().to_string(), "6-10");

        for i in 0..20 {
            c.add(i, frame100());
        }
        assert!(c.total_byte_count() <= 1000);
        for i in 6..=10 {
            assert!(c.contains(i));
        }
        assert!(!c.contains(19));
    }

    #[test]
    fn test_in_out_change_drops_out_of_range_frames() {
        let mut c = cache(10_000, 2, 20, 7);
        for i in 0..20 {
            assert!(c.add(i, frame100()));
        }
        assert_eq!(c.count(), 20);

        c.set_in_out_points(InOutPoints::new(true, 5, 9));
        c.recompute();
        assert_eq!(resident(&c), vec![5, 6, 7, 8, 9]);
        assert_eq!(c.total_byte_count(), 500);

        // Frames outside the range are not accepted either
        assert!(!c.add(12, frame100()));
        assert!(!c.contains(12));

        // Shrinking the sequence drops the tail
        c.set_in_out_points(InOutPoints::default());
        c.set_sequence_size(7);
        c.recompute();
        assert_eq!(resident(&c), vec![5, 6]);
    }

    #[test]
    fn test_far_seek_clears_cache() {
        let mut c = cache(1000, 1, 100, 0);
        for i in 0..5 {
            c.add(i, frame100());
        }
        // Window: 10 frames ahead of 0, nothing behind
        assert!(c.seek(50));
        assert_eq!(c.count(), 0);
        assert_eq!(c.current_frame(), 50);

        c.add(50, frame100());
        c.add(51, frame100());
        assert!(!c.seek(55));
        assert_eq!(resident(&c), vec![50, 51]);

        // Jumping back onto a resident frame keeps the cache
        assert!(!c.seek(50));
        c.add(90, frame100());
        assert!(!c.seek(90));
        assert_eq!(resident(&c), vec![50, 51, 90]);
    }

    #[test]
    fn test_read_behind_overshoot_bounded() {
        for current in [0, 2, 5, 9] {
            let mut c = cache(300, 2, 10, current);
            for i in 0..10 {
                c.add(i, frame100());
                assert!(c.total_byte_count() <= c.resident_bound());
            }
            assert_eq!(c.resident_bound(), 500);
        }
        assert_eq!(FrameCache::new(0).resident_bound(), 0);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut c = cache(50, 0, 10, 0);
        assert!(!c.add(0, frame100()));
        assert_eq!(c.count(), 0);
        assert_eq!(c.total_byte_count(), 0);
    }

    #[test]
    fn test_zero_budget_disables() {
        let mut c = cache(1000, 2, 10, 0);
        for i in 0..5 {
            c.add(i, frame100());
        }
        assert_eq!(c.total_byte_count(), 500);

        c.set_max(0);
        assert_eq!(c.total_byte_count(), 0);
        for i in 0..10 {
            assert!(!c.contains(i));
        }
        assert!(!c.add(1, frame100()));
        assert_eq!(c.next_missing(), None);
    }

    #[test]
    fn test_current_frame_clamped() {
        let mut c = cache(1000, 0, 10, 0);
        c.set_current_frame(50);
        assert_eq!(c.current_frame(), 9);
        c.set_current_frame(-3);
        assert_eq!(c.current_frame(), 0);
        assert!(!c.contains(-3));
        assert!(!c.contains(10));
    }

    #[test]
    fn test_setters_mark_dirty_only_on_change() {
        let mut c = cache(1000, 0, 10, 3);
        assert!(!c.is_dirty());
        c.set_current_frame(3);
        c.set_direction(Direction::Forward);
        c.set_sequence_size(10);
        assert!(!c.is_dirty());
        c.set_current_frame(4);
        assert!(c.is_dirty());
        assert!(c.recompute());
        assert!(!c.recompute());
    }

    #[test]
    fn test_replace_keeps_byte_count() {
        let mut c = cache(1000, 0, 10, 0);
        c.add(2, frame100());
        c.add(2, Image::from_rgba8(10, 5, vec![0u8; 200]));
        assert_eq!(c.count(), 1);
        assert_eq!(c.total_byte_count(), 200);
        c.clear();
        assert_eq!(c.total_byte_count(), 0);
    }

    #[test]
    fn test_next_missing_order() {
        let mut c = cache(300, 1, 10, 5);
        // No size estimate yet: whole range ahead
        assert_eq!(c.next_missing(), Some(5));
        c.add(5, frame100());
        assert_eq!(c.sequence().to_string(), "4-7");
        assert_eq!(c.next_missing(), Some(6));
        c.add(6, frame100());
        c.add(7, frame100());
        assert_eq!(c.next_missing(), Some(4));
        c.add(4, frame100());
        assert_eq!(c.next_missing(), None);
    }

    #[test]
    fn test_get_is_read_only() {
        let mut c = cache(1000, 0, 10, 0);
        let img = frame100();
        c.add(1, img.clone());
        assert!(c.get(1).unwrap().same_data(&img));
        assert!(c.get(2).is_none());
        assert!(!c.is_dirty());
    }

    #[test]
    fn test_in_out_range() {
        assert_eq!(InOutPoints::default().range(0), None);
        assert_eq!(InOutPoints::default().range(10), Some(FrameRange::new(0, 9)));
        assert_eq!(InOutPoints::new(true, 3, 50).range(10), Some(FrameRange::new(3, 9)));
        assert_eq!(Direction::Reverse.step(), -1);
        assert_eq!(Direction::Forward.reversed(), Direction::Reverse);
    }
}
