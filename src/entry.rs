//! Entry-region traversal and the record locator.
//!
//! The walk reads one header at a time and skips exactly `file_size` content
//! bytes between records. The entry region can also contain non-record bytes:
//! the zero-padded remainder left when an `append` reuses only part of a free
//! range. Those bytes never parse as a valid header (the `start_position`
//! self-check fails on zeros), and they always lie inside a registered free
//! range, so the walk steps over them by consulting the free table. Bytes
//! that are neither a valid record nor inside a registered range are
//! corruption.
//!
//! Deleted records whose headers are still intact are yielded like any other
//! record; callers filter on status. That is what lets `delete` distinguish
//! an already-deleted member from an absent one.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Result, StarError};
use crate::free_table::FreeTable;
use crate::layout::{clamp_name, FileInfo, FileStatus, RawHeader, ENTRY_REGION_OFFSET, FILE_INFO_SIZE};

pub struct EntryWalker<'a, R> {
    reader: &'a mut R,
    free: &'a FreeTable,
    pos: u64,
    end: u64,
}

impl<'a, R: Read + Seek> EntryWalker<'a, R> {
    pub fn new(reader: &'a mut R, free: &'a FreeTable, end: u64) -> Self {
        Self {
            reader,
            free,
            pos: ENTRY_REGION_OFFSET,
            end,
        }
    }

    /// Next record (Active or intact Deleted) in position order, with its
    /// header offset. `Ok(None)` at the end of the entry region.
    pub fn next_record(&mut self) -> Result<Option<(u64, FileInfo)>> {
        loop {
            if self.pos == self.end {
                return Ok(None);
            }
            if self.pos > self.end {
                return Err(StarError::Truncated {
                    needed: self.pos,
                    available: self.end,
                });
            }

            if self.end - self.pos >= FILE_INFO_SIZE {
                self.reader.seek(SeekFrom::Start(self.pos))?;
                let raw = RawHeader::read(&mut *self.reader)?;
                if let Some(info) = raw.validate(self.pos, self.end) {
                    let header_offset = self.pos;
                    self.pos = info.end_offset();
                    return Ok(Some((header_offset, info)));
                }
            }

            // Not a record: must lie inside a registered free range. Free
            // ranges never overlap a live record, so skipping to the range
            // end cannot lose one.
            match self.free.range_containing(self.pos) {
                Some(range) => self.pos = range.end(),
                None => return Err(StarError::CorruptHeader { offset: self.pos }),
            }
        }
    }
}

/// Where a name resolved to, including logically-deleted matches.
#[derive(Debug, Clone)]
pub enum Located {
    Active(u64, FileInfo),
    Deleted(u64, FileInfo),
}

/// Resolve `name` to a record. An Active match wins over a Deleted one with
/// the same name (an `update` leaves both on disk until compaction).
/// Comparison is byte-exact after clamping to the stored field width.
pub fn locate<R: Read + Seek>(
    reader: &mut R,
    free: &FreeTable,
    end: u64,
    name: &str,
) -> Result<Option<Located>> {
    let wanted = clamp_name(name);
    let mut deleted: Option<(u64, FileInfo)> = None;
    let mut walker = EntryWalker::new(reader, free, end);
    while let Some((offset, info)) = walker.next_record()? {
        if info.name != wanted {
            continue;
        }
        match info.status {
            FileStatus::Active => return Ok(Some(Located::Active(offset, info))),
            FileStatus::Deleted => {
                if deleted.is_none() {
                    deleted = Some((offset, info));
                }
            }
        }
    }
    Ok(deleted.map(|(off, info)| Located::Deleted(off, info)))
}
