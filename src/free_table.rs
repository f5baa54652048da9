//! Free-space bookkeeping for the entry region.
//!
//! In memory the table is a vector of byte ranges sorted by start offset,
//! which makes adjacency checks a single neighbour comparison on insert
//! instead of the pairwise slot scan the fixed array needed. On disk it is
//! still the fixed table of [`MAX_FREE_SPACES`](crate::layout::MAX_FREE_SPACES)
//! slots the format prescribes; persisting more ranges than the table holds
//! fails with `CapacityExceeded` rather than dropping a range.
//!
//! Allocation is first-fit: the lowest-offset range large enough wins, and
//! is consumed from its start.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::error::{Result, StarError};
use crate::layout::{FREE_SLOT_SIZE, FREE_TABLE_OFFSET, MAX_FREE_SPACES};

/// A byte range in the entry region not occupied by any live record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreeRange {
    pub start: u64,
    pub size: u64,
}

impl FreeRange {
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// A successful allocation: the placement offset and how much of the chosen
/// range remains free after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub offset: u64,
    pub leftover: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeTable {
    // Sorted by start; non-empty, non-overlapping, never adjacent.
    ranges: Vec<FreeRange>,
}

impl FreeTable {
    pub const CAPACITY: usize = MAX_FREE_SPACES;

    pub fn ranges(&self) -> &[FreeRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// The range containing `pos`, if any. Traversal uses this to step over
    /// non-record bytes; a position can land mid-range when an intact deleted
    /// record at the range's start has already been walked past.
    pub fn range_containing(&self, pos: u64) -> Option<FreeRange> {
        let idx = self.ranges.partition_point(|r| r.start <= pos);
        if idx == 0 {
            return None;
        }
        let range = self.ranges[idx - 1];
        (range.end() > pos).then_some(range)
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Record that `range` became free, merging with byte-adjacent
    /// neighbours. Returns the resulting (possibly merged) range.
    ///
    /// Fails with `CapacityExceeded` before touching the table if the result
    /// could no longer be persisted in the fixed on-disk slots.
    pub fn release(&mut self, range: FreeRange) -> Result<FreeRange> {
        if range.size == 0 {
            return Ok(range);
        }
        let idx = match self.ranges.binary_search_by_key(&range.start, |r| r.start) {
            // A range already starts here: the table no longer matches the
            // entry region. Refuse rather than corrupt it further.
            Ok(_) => return Err(StarError::CorruptHeader { offset: range.start }),
            Err(i) => i,
        };
        debug_assert!(idx == 0 || self.ranges[idx - 1].end() <= range.start);
        debug_assert!(idx == self.ranges.len() || range.end() <= self.ranges[idx].start);

        let merge_prev = idx > 0 && self.ranges[idx - 1].end() == range.start;
        let merge_next = idx < self.ranges.len() && range.end() == self.ranges[idx].start;

        let merges = merge_prev as usize + merge_next as usize;
        if self.ranges.len() + 1 - merges > Self::CAPACITY {
            return Err(StarError::CapacityExceeded {
                capacity: Self::CAPACITY,
            });
        }

        let merged = match (merge_prev, merge_next) {
            (true, true) => {
                self.ranges[idx - 1].size += range.size + self.ranges[idx].size;
                self.ranges.remove(idx);
                self.ranges[idx - 1]
            }
            (true, false) => {
                self.ranges[idx - 1].size += range.size;
                self.ranges[idx - 1]
            }
            (false, true) => {
                self.ranges[idx].start = range.start;
                self.ranges[idx].size += range.size;
                self.ranges[idx]
            }
            (false, false) => {
                self.ranges.insert(idx, range);
                range
            }
        };
        Ok(merged)
    }

    /// First-fit: consume `size` bytes from the start of the lowest-offset
    /// range large enough, or `None` when nothing fits.
    pub fn allocate(&mut self, size: u64) -> Option<Allocation> {
        let idx = self.ranges.iter().position(|r| r.size >= size)?;
        Some(self.consume(idx, size))
    }

    /// Consume `size` bytes from the range starting exactly at `start`,
    /// used to re-target a range that was just freed. `None` when no such
    /// range exists or it is too small.
    pub fn claim(&mut self, start: u64, size: u64) -> Option<Allocation> {
        let idx = self
            .ranges
            .binary_search_by_key(&start, |r| r.start)
            .ok()?;
        if self.ranges[idx].size < size {
            return None;
        }
        Some(self.consume(idx, size))
    }

    fn consume(&mut self, idx: usize, size: u64) -> Allocation {
        let offset = self.ranges[idx].start;
        self.ranges[idx].start += size;
        self.ranges[idx].size -= size;
        let leftover = self.ranges[idx].size;
        if leftover == 0 {
            self.ranges.remove(idx);
        }
        Allocation { offset, leftover }
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    /// Read the legacy count and the full slot table (the section spanning
    /// offsets 0..[`METADATA_OFFSET`](crate::layout::METADATA_OFFSET)).
    /// The legacy count is ignored; slot content is authoritative.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let _legacy_count = reader.read_i32::<LittleEndian>()?;
        let mut ranges = Vec::new();
        for slot in 0..MAX_FREE_SPACES {
            let start = reader.read_i32::<LittleEndian>()?;
            let size = reader.read_i32::<LittleEndian>()?;
            if size == 0 {
                continue;
            }
            if start < 0 || size < 0 {
                return Err(StarError::CorruptHeader {
                    offset: FREE_TABLE_OFFSET + slot as u64 * FREE_SLOT_SIZE,
                });
            }
            ranges.push(FreeRange {
                start: start as u64,
                size: size as u64,
            });
        }
        ranges.sort_by_key(|r| r.start);
        Ok(Self { ranges })
    }

    /// Write the legacy count (number of occupied slots) and the slot table,
    /// zero-filling unused slots.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        if self.ranges.len() > Self::CAPACITY {
            return Err(StarError::CapacityExceeded {
                capacity: Self::CAPACITY,
            });
        }
        writer.write_i32::<LittleEndian>(self.ranges.len() as i32)?;
        for r in &self.ranges {
            writer.write_i32::<LittleEndian>(r.start as i32)?;
            writer.write_i32::<LittleEndian>(r.size as i32)?;
        }
        for _ in self.ranges.len()..Self::CAPACITY {
            writer.write_i32::<LittleEndian>(0)?;
            writer.write_i32::<LittleEndian>(0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn r(start: u64, size: u64) -> FreeRange {
        FreeRange { start, size }
    }

    #[test]
    fn release_keeps_ranges_sorted() {
        let mut t = FreeTable::default();
        t.release(r(500, 10)).unwrap();
        t.release(r(100, 10)).unwrap();
        t.release(r(300, 10)).unwrap();
        let starts: Vec<u64> = t.ranges().iter().map(|x| x.start).collect();
        assert_eq!(starts, vec![100, 300, 500]);
    }

    #[test]
    fn release_merges_adjacent_neighbours() {
        let mut t = FreeTable::default();
        t.release(r(100, 50)).unwrap();
        t.release(r(200, 50)).unwrap();
        // Fills the gap exactly: all three collapse into one range.
        let merged = t.release(r(150, 50)).unwrap();
        assert_eq!(merged, r(100, 150));
        assert_eq!(t.ranges(), &[r(100, 150)]);
    }

    #[test]
    fn allocate_is_first_fit_and_shrinks_from_start() {
        let mut t = FreeTable::default();
        t.release(r(100, 30)).unwrap();
        t.release(r(400, 100)).unwrap();
        let a = t.allocate(20).unwrap();
        assert_eq!(a, Allocation { offset: 100, leftover: 10 });
        // 30 no longer fits in the shrunk first range.
        let b = t.allocate(30).unwrap();
        assert_eq!(b.offset, 400);
        assert_eq!(t.ranges(), &[r(120, 10), r(430, 70)]);
    }

    #[test]
    fn allocate_exact_fit_removes_the_range() {
        let mut t = FreeTable::default();
        t.release(r(100, 30)).unwrap();
        let a = t.allocate(30).unwrap();
        assert_eq!(a, Allocation { offset: 100, leftover: 0 });
        assert!(t.is_empty());
    }

    #[test]
    fn claim_targets_a_specific_range() {
        let mut t = FreeTable::default();
        t.release(r(100, 30)).unwrap();
        t.release(r(400, 100)).unwrap();
        assert!(t.claim(400, 50).is_some());
        assert!(t.claim(999, 1).is_none());
        assert!(t.claim(100, 31).is_none());
    }

    #[test]
    fn range_containing_finds_interior_positions() {
        let mut t = FreeTable::default();
        t.release(r(100, 50)).unwrap();
        t.release(r(400, 10)).unwrap();
        assert_eq!(t.range_containing(100), Some(r(100, 50)));
        assert_eq!(t.range_containing(149), Some(r(100, 50)));
        assert_eq!(t.range_containing(150), None);
        assert_eq!(t.range_containing(99), None);
        assert_eq!(t.range_containing(405), Some(r(400, 10)));
    }

    #[test]
    fn release_past_capacity_is_an_error() {
        let mut t = FreeTable::default();
        for i in 0..FreeTable::CAPACITY as u64 {
            t.release(r(i * 100, 10)).unwrap();
        }
        let err = t.release(r(1_000_000, 10)).unwrap_err();
        assert!(matches!(err, StarError::CapacityExceeded { .. }));
        assert_eq!(t.len(), FreeTable::CAPACITY);
    }

    #[test]
    fn disk_round_trip() {
        let mut t = FreeTable::default();
        t.release(r(900, 40)).unwrap();
        t.release(r(812, 20)).unwrap();

        let mut buf = Vec::new();
        t.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, crate::layout::METADATA_OFFSET);

        let back = FreeTable::read(Cursor::new(&buf)).unwrap();
        assert_eq!(back, t);
    }
}
