//! Visit order of the `(leaves, index)` plane.
//!
//! The plane is cut into tiles of `leaves_tile` leaf counts by `iter_tile`
//! indices. Tiles are numbered along a Z-order curve so that consecutive
//! Morton numbers stay close in both coordinates.

use std::{collections::BTreeMap, ops::RangeInclusive};

use crate::decision::compact_even_bits;

/// Extract the even bits of `x`.
pub fn morton1(x: u32) -> u32 {
    compact_even_bits(x as u64) as u32
}

/// Split a Morton number into its odd-bit and even-bit coordinates.
pub fn morton2(z: u32) -> (u32, u32) {
    (morton1(z >> 1), morton1(z))
}

/// Lower-left corner of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub leaves: usize,
    pub index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    pub morton: u32,
    pub leaves: RangeInclusive<usize>,
    pub indices: RangeInclusive<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tiling {
    pub start_leaves: usize,
    pub max_leaves: usize,
    pub leaves_tile: usize,
    pub iter_tile: u64,
}

impl Tiling {
    /// Each group of eight Morton numbers covers a 2x4 block of tiles; the
    /// groups are stacked along the index axis.
    pub fn morton_to_coordinate(&self, morton: u32) -> Point {
        let multiplier = morton / 8;
        let (leaves_tile, i_tile) = morton2(morton % 8);
        let i_tile = i_tile + multiplier * 4;
        Point {
            leaves: leaves_tile as usize * self.leaves_tile + self.start_leaves,
            index: i_tile as u64 * self.iter_tile,
        }
    }

    /// The tile for `morton`, clipped to the leaf bounds. `None` if the tile
    /// lies entirely past `max_leaves`.
    pub fn tile(&self, morton: u32) -> Option<Tile> {
        let point = self.morton_to_coordinate(morton);
        let leaves_start = point.leaves.max(self.start_leaves);
        let leaves_end = (point.leaves + self.leaves_tile - 1).min(self.max_leaves);
        if leaves_start > leaves_end {
            return None;
        }
        Some(Tile {
            morton,
            leaves: leaves_start..=leaves_end,
            indices: point.index..=point.index + self.iter_tile - 1,
        })
    }
}

/// A set of `u64` stored as disjoint closed intervals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntervalSet {
    // start -> end, both inclusive; touching intervals are merged
    ranges: BTreeMap<u64, u64>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: u64) {
        self.insert_range(value, value);
    }

    pub fn insert_range(&mut self, lo: u64, hi: u64) {
        assert!(lo <= hi, "empty interval [{}, {}]", lo, hi);
        let mut lo = lo;
        let mut hi = hi;
        // merge with a predecessor that overlaps or touches
        if let Some((&start, &end)) = self.ranges.range(..=lo).next_back() {
            if end.saturating_add(1) >= lo {
                lo = start;
                hi = hi.max(end);
                self.ranges.remove(&start);
            }
        }
        let absorbed: Vec<u64> = self
            .ranges
            .range(lo..=hi.saturating_add(1))
            .map(|(&start, _)| start)
            .collect();
        for start in absorbed {
            if let Some(end) = self.ranges.remove(&start) {
                hi = hi.max(end);
            }
        }
        self.ranges.insert(lo, hi);
    }

    pub fn contains(&self, value: u64) -> bool {
        match self.ranges.range(..=value).next_back() {
            Some((_, &end)) => value <= end,
            None => false,
        }
    }

    /// The parts of `[lo, hi]` not in the set, in increasing order.
    pub fn gaps(&self, lo: u64, hi: u64) -> Vec<RangeInclusive<u64>> {
        let mut out = vec![];
        if lo > hi {
            return out;
        }
        let mut next = lo;
        let first = match self.ranges.range(..=lo).next_back() {
            Some((&start, _)) => start,
            None => lo,
        };
        for (&start, &end) in self.ranges.range(first..=hi) {
            if end < next {
                continue;
            }
            if start > next {
                out.push(next..=start - 1);
            }
            if end >= hi {
                return out;
            }
            next = end + 1;
        }
        out.push(next..=hi);
        out
    }

    /// Number of disjoint intervals.
    pub fn interval_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
