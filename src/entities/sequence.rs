//! Frame number sequences (e.g. `1-10,20-30,33`)
//!
//! **Why**: A playback range on disk is rarely one clean run of numbers.
//! Renders skip frames, get re-rendered in chunks, or are declared by a
//! container. A sequence is an ordered union of inclusive ranges plus the
//! zero-pad width used when the numbers are written into file names.
//!
//! **Used by**: FileInfo (file name syntax), FrameCache (cache coverage
//! telemetry), ReadSession (index → frame number when decoding)
//!
//! # Index vs Number
//!
//! A frame **index** is the 0-based position inside the sequence. A frame
//! **number** is the value written in the file name. For `5-7,10`:
//! index 0 → 5, index 3 → 10, number 8 → `INVALID_INDEX`.
//!
//! # String Syntax
//!
//! Ranges are joined with `,`, bounds with `-`. Numbers are zero-padded to
//! `pad` digits. Parsing infers `pad` from the widest zero-padded token, so a
//! pad is only recoverable when at least one number actually carries a
//! leading zero (`0001-0010` → pad 4, `100-200` → pad 0).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Frame number as written in a file name or stream.
pub type Number = i64;

/// 0-based position of a frame inside a sequence.
pub type Index = i64;

/// Invalid frame number.
pub const INVALID: Number = i64::MIN;

/// Invalid frame index.
pub const INVALID_INDEX: Index = i64::MIN;

/// Inclusive range of frame numbers.
///
/// Bounds are stored as given; a reversed range (`min > max`) is legal until
/// [`Sequence::sort`] normalises it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub min: Number,
    pub max: Number,
}

impl FrameRange {
    pub fn new(min: Number, max: Number) -> Self {
        Self { min, max }
    }

    /// Range holding exactly one frame
    pub fn single(frame: Number) -> Self {
        Self { min: frame, max: frame }
    }

    /// Copy with `min <= max`
    pub fn sorted(self) -> Self {
        if self.min <= self.max {
            self
        } else {
            Self { min: self.max, max: self.min }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min != INVALID && self.max != INVALID
    }

    /// Number of frames covered, saturating at `usize::MAX`
    pub fn len(&self) -> usize {
        usize::try_from(self.max.abs_diff(self.min))
            .unwrap_or(usize::MAX)
            .saturating_add(1)
    }

    pub fn contains(&self, frame: Number) -> bool {
        let r = self.sorted();
        frame >= r.min && frame <= r.max
    }

    /// Frame at `offset` walking from `min` towards `max`
    fn frame_at(&self, offset: i64) -> Number {
        if self.min <= self.max {
            self.min + offset
        } else {
            self.min - offset
        }
    }

    /// Offset of `frame` walking from `min` towards `max`
    fn offset_of(&self, frame: Number) -> i64 {
        if self.min <= self.max {
            frame.saturating_sub(self.min)
        } else {
            self.min.saturating_sub(frame)
        }
    }
}

/// Last index of a sequence holding `size > 0` frames
pub(crate) fn last_index_for(size: usize) -> Index {
    Index::try_from(size - 1).unwrap_or(Index::MAX)
}

/// Range length as an index delta
fn range_len(range: &FrameRange) -> i64 {
    i64::try_from(range.len()).unwrap_or(i64::MAX)
}

/// Ordered union of frame ranges with a zero-pad width
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub ranges: Vec<FrameRange>,
    pub pad: usize,
}

impl Sequence {
    pub fn new(min: Number, max: Number, pad: usize) -> Self {
        Self {
            ranges: vec![FrameRange::new(min, max)],
            pad,
        }
    }

    pub fn from_range(range: FrameRange, pad: usize) -> Self {
        Self { ranges: vec![range], pad }
    }

    pub fn from_ranges(ranges: Vec<FrameRange>, pad: usize) -> Self {
        Self { ranges, pad }
    }

    /// Single-frame sequence
    pub fn single(frame: Number) -> Self {
        Self::new(frame, frame, 0)
    }

    /// Build from a list of frame numbers; consecutive numbers coalesce.
    pub fn from_frames(frames: &[Number]) -> Self {
        let mut sorted = frames.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut ranges: Vec<FrameRange> = Vec::new();
        for frame in sorted {
            match ranges.last_mut() {
                Some(last) if last.max + 1 == frame => last.max = frame,
                _ => ranges.push(FrameRange::single(frame)),
            }
        }
        Self { ranges, pad: 0 }
    }

    /// All frame numbers in sequence order
    pub fn to_frames(&self) -> Vec<Number> {
        let mut out = Vec::with_capacity(self.size());
        for range in &self.ranges {
            for offset in 0..range.len() as i64 {
                out.push(range.frame_at(offset));
            }
        }
        out
    }

    pub fn is_valid(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Total number of frames, saturating at `usize::MAX`
    pub fn size(&self) -> usize {
        self.ranges
            .iter()
            .map(FrameRange::len)
            .fold(0usize, usize::saturating_add)
    }

    /// True if `index` is a valid position inside the sequence
    pub fn contains(&self, index: Index) -> bool {
        index >= 0 && (index as usize) < self.size()
    }

    /// Frame number at `index`, or [`INVALID`]
    pub fn frame(&self, index: Index) -> Number {
        if index < 0 {
            return INVALID;
        }
        let mut remaining = index;
        for range in &self.ranges {
            let len = range_len(range);
            if remaining < len {
                return range.frame_at(remaining);
            }
            remaining -= len;
        }
        INVALID
    }

    /// Index of frame `number`, or [`INVALID_INDEX`]
    pub fn index(&self, number: Number) -> Index {
        let mut base: Index = 0;
        for range in &self.ranges {
            if range.contains(number) {
                return base.saturating_add(range.offset_of(number));
            }
            base = base.saturating_add(range_len(range));
        }
        INVALID_INDEX
    }

    /// Last valid index, or [`INVALID_INDEX`] when empty
    pub fn last_index(&self) -> Index {
        match self.size() {
            0 => INVALID_INDEX,
            n => last_index_for(n),
        }
    }

    /// Normalise reversed ranges, order ranges ascending and coalesce
    /// overlapping or touching ranges (`1-3,4-6` → `1-6`).
    pub fn sort(&mut self) {
        let mut ranges: Vec<FrameRange> = self.ranges.iter().map(|r| r.sorted()).collect();
        ranges.sort_by_key(|r| (r.min, r.max));

        let mut merged: Vec<FrameRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.min <= last.max.saturating_add(1) => {
                    last.max = last.max.max(range.max);
                }
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    /// Insert `range`, coalescing with existing ranges.
    ///
    /// Returns true if the range overlapped or touched an existing range
    /// (i.e. it did not end up as a separate run).
    pub fn merge(&mut self, range: FrameRange) -> bool {
        let before = {
            let mut s = self.clone();
            s.sort();
            s.ranges.len()
        };
        self.ranges.push(range);
        self.sort();
        self.ranges.len() <= before
    }

    fn format_number(&self, n: Number) -> String {
        format!("{:0width$}", n, width = self.pad)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if range.min == range.max {
                f.write_str(&self.format_number(range.min))?;
            } else {
                write!(
                    f,
                    "{}-{}",
                    self.format_number(range.min),
                    self.format_number(range.max)
                )?;
            }
        }
        Ok(())
    }
}

/// Pad is inferred from zero-padded tokens only: `0001-0010` gives pad 4,
/// while `100-200` gives pad 0 even if it was formatted with pad 3.
impl FromStr for Sequence {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let mut seq = Sequence::default();
        if input.is_empty() {
            return Ok(seq);
        }

        for token in input.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(ParseError::EmptyToken(input.to_string()));
            }

            let parts: Vec<&str> = token.split('-').collect();
            let numbers = match parts.as_slice() {
                [single] => vec![*single],
                [a, b] => vec![*a, *b],
                _ => return Err(ParseError::InvalidRange(token.to_string())),
            };

            let mut values = Vec::with_capacity(2);
            for part in numbers {
                let part = part.trim();
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ParseError::InvalidNumber {
                        token: part.to_string(),
                        input: input.to_string(),
                    });
                }
                let value = part.parse::<Number>().map_err(|_| ParseError::InvalidNumber {
                    token: part.to_string(),
                    input: input.to_string(),
                })?;
                if part.len() > 1 && part.starts_with('0') {
                    seq.pad = seq.pad.max(part.len());
                }
                values.push(value);
            }

            let range = match values.as_slice() {
                [v] => FrameRange::single(*v),
                [a, b] => FrameRange::new(*a, *b),
                _ => unreachable!(),
            };
            seq.ranges.push(range);
        }

        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_and_mapping() {
        let seq: Sequence = "1-10".parse().unwrap();
        assert_eq!(seq.size(), 10);
        assert_eq!(seq.index(5), 4);
        assert_eq!(seq.frame(4), 5);
        assert_eq!(seq.last_index(), 9);
        assert_eq!(seq.to_string(), "1-10");
    }

    #[test]
    fn test_multi_range_mapping() {
        let seq: Sequence = "5-7,10,20-21".parse().unwrap();
        assert_eq!(seq.size(), 6);
        assert_eq!(seq.frame(0), 5);
        assert_eq!(seq.frame(3), 10);
        assert_eq!(seq.frame(5), 21);
        assert_eq!(seq.frame(6), INVALID);
        assert_eq!(seq.frame(-1), INVALID);
        assert_eq!(seq.index(8), INVALID_INDEX);
        assert_eq!(seq.index(20), 4);
        assert!(seq.contains(5));
        assert!(!seq.contains(6));
    }

    #[test]
    fn test_index_number_inverse() {
        let seq: Sequence = "3-9,15,40-44".parse().unwrap();
        for i in 0..seq.size() as Index {
            let n = seq.frame(i);
            assert_eq!(seq.frame(seq.index(n)), n);
            assert_eq!(seq.index(n), i);
        }
    }

    #[test]
    fn test_round_trip_with_pad() {
        for pad in 0..=6usize {
            let seq = Sequence::from_ranges(
                vec![FrameRange::new(1, 10), FrameRange::new(20, 30), FrameRange::single(33)],
                pad,
            );
            let text = seq.to_string();
            let parsed: Sequence = text.parse().unwrap();
            // Pad is observable here because "1" is shorter than any pad > 1
            let expected_pad = if pad > 1 { pad } else { 0 };
            assert_eq!(parsed.ranges, seq.ranges, "pad {}", pad);
            assert_eq!(parsed.pad, expected_pad, "pad {}", pad);
        }

        // No number is zero-padded, so the pad is not recoverable
        let wide = Sequence::new(100, 200, 3);
        assert_eq!(wide.to_string(), "100-200");
        let parsed: Sequence = wide.to_string().parse().unwrap();
        assert_eq!(parsed.ranges, wide.ranges);
        assert_eq!(parsed.pad, 0);
    }

    #[test]
    fn test_huge_ranges_do_not_overflow() {
        let seq: Sequence = "0-9223372036854775807,0-9223372036854775807".parse().unwrap();
        assert_eq!(seq.size(), usize::MAX);
        assert_eq!(seq.frame(5), 5);
        assert_eq!(seq.index(9223372036854775807), i64::MAX);
        assert!(seq.contains(1_000_000));

        let full = FrameRange::new(i64::MIN, i64::MAX);
        assert_eq!(full.len(), usize::MAX);
        let seq = Sequence::from_range(full, 0);
        assert_eq!(seq.index(i64::MAX), i64::MAX);
        assert_eq!(seq.last_index(), i64::MAX);
    }

    #[test]
    fn test_padded_format() {
        let seq = Sequence::new(1, 10, 4);
        assert_eq!(seq.to_string(), "0001-0010");
        let parsed: Sequence = "0001-0010".parse().unwrap();
        assert_eq!(parsed, seq);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("1-x".parse::<Sequence>(), Err(ParseError::InvalidNumber { .. })));
        assert!(matches!("abc".parse::<Sequence>(), Err(ParseError::InvalidNumber { .. })));
        assert!(matches!("1,,3".parse::<Sequence>(), Err(ParseError::EmptyToken(_))));
        assert!(matches!("1-2-3".parse::<Sequence>(), Err(ParseError::InvalidRange(_))));
        assert!("".parse::<Sequence>().unwrap().ranges.is_empty());
    }

    #[test]
    fn test_reversed_range_normalised_by_sort() {
        let mut seq: Sequence = "10-1".parse().unwrap();
        assert_eq!(seq.ranges, vec![FrameRange::new(10, 1)]);
        assert_eq!(seq.size(), 10);
        assert_eq!(seq.frame(0), 10);
        seq.sort();
        assert_eq!(seq.ranges, vec![FrameRange::new(1, 10)]);
    }

    #[test]
    fn test_sort_merges_touching() {
        let mut seq = Sequence::from_ranges(
            vec![FrameRange::new(20, 30), FrameRange::new(1, 3), FrameRange::new(4, 6), FrameRange::new(25, 40)],
            0,
        );
        seq.sort();
        assert_eq!(seq.to_string(), "1-6,20-40");
    }

    #[test]
    fn test_merge() {
        let mut seq = Sequence::new(1, 10, 0);
        assert!(seq.merge(FrameRange::new(11, 15)));
        assert_eq!(seq.to_string(), "1-15");
        assert!(!seq.merge(FrameRange::new(20, 25)));
        assert_eq!(seq.to_string(), "1-15,20-25");
        assert!(seq.merge(FrameRange::new(14, 21)));
        assert_eq!(seq.to_string(), "1-25");
    }

    #[test]
    fn test_from_frames() {
        let seq = Sequence::from_frames(&[7, 1, 2, 3, 5, 6, 3, 10]);
        assert_eq!(seq.to_string(), "1-3,5-7,10");
        assert_eq!(seq.to_frames(), vec![1, 2, 3, 5, 6, 7, 10]);
        assert!(!Sequence::from_frames(&[]).is_valid());
    }
}
