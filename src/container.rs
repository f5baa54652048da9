//! The .star storage engine.
//!
//! [`Container`] operates on any `Read + Write + Seek` backend and owns the
//! three header sections (legacy count, free-space table, metadata) as cached
//! in-memory state, persisting them after every mutation. The entry region is
//! never held in memory; records are read and written at computed offsets.
//!
//! # Mutation model
//! `append` asks the free table for a first-fit placement and falls back to
//! the end of the entry region. `delete` flips a record's status in place and
//! releases its full span (header + content). `update` is delete-then-append,
//! with the append targeting the just-freed range first. `defragment` is the
//! only operation that moves records.
//!
//! # Ordering discipline
//! Every fallible piece of bookkeeping runs before the first byte of the
//! container is modified, so a failed operation (say, a full free table)
//! leaves the file exactly as it was. There is no recovery log; a crash
//! between the record write and the header-section writes can still leave the
//! two inconsistent.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::entry::{locate, EntryWalker, Located};
use crate::error::{Result, StarError};
use crate::free_table::{FreeRange, FreeTable};
use crate::layout::{
    clamp_name, ArchiveMetadata, FileInfo, FileStatus, ENTRY_REGION_OFFSET, FILE_INFO_SIZE,
    FREE_COUNT_OFFSET, METADATA_OFFSET,
};

// ── Operation outcomes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Placed inside a previously freed range.
    Reused,
    /// Placed past the last entry-region byte, growing the container.
    EndOfFile,
}

#[derive(Debug, Clone, Copy)]
pub struct AppendOutcome {
    pub header_offset: u64,
    pub content_offset: u64,
    pub placement: Placement,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteOutcome {
    /// The released span after coalescing with its neighbours.
    pub freed: FreeRange,
}

#[derive(Debug, Clone, Copy)]
pub struct PackOutcome {
    /// File length after compaction; the backing store should be truncated
    /// to this (the engine cannot shorten a generic backend).
    pub new_len: u64,
    pub records_kept: usize,
    pub bytes_reclaimed: u64,
}

// ── Container ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Container<F> {
    file: F,
    metadata: ArchiveMetadata,
    free: FreeTable,
}

impl<F> Container<F> {
    pub fn metadata(&self) -> ArchiveMetadata {
        self.metadata
    }

    pub fn free_table(&self) -> &FreeTable {
        &self.free
    }

    pub fn get_ref(&self) -> &F {
        &self.file
    }

    pub fn get_mut(&mut self) -> &mut F {
        &mut self.file
    }

    pub fn into_inner(self) -> F {
        self.file
    }
}

impl<F: Read + Seek> Container<F> {
    /// Open an existing container, reading and sanity-checking the fixed
    /// header sections.
    pub fn open(mut file: F) -> Result<Self> {
        let len = file.seek(SeekFrom::End(0))?;
        if len < ENTRY_REGION_OFFSET {
            return Err(StarError::Truncated {
                needed: ENTRY_REGION_OFFSET,
                available: len,
            });
        }
        file.seek(SeekFrom::Start(0))?;
        let free = FreeTable::read(&mut file)?;
        let metadata = ArchiveMetadata::read(&mut file)?;
        if metadata.num_files < 0 || metadata.total_size < 0 {
            return Err(StarError::CorruptHeader {
                offset: METADATA_OFFSET,
            });
        }
        if metadata.entry_end() > len {
            return Err(StarError::Truncated {
                needed: metadata.entry_end(),
                available: len,
            });
        }
        Ok(Self {
            file,
            metadata,
            free,
        })
    }

    /// All Active records in position order.
    pub fn list(&mut self) -> Result<Vec<FileInfo>> {
        let end = self.metadata.entry_end();
        let mut out = Vec::new();
        let mut walker = EntryWalker::new(&mut self.file, &self.free, end);
        while let Some((_, info)) = walker.next_record()? {
            if info.status == FileStatus::Active {
                out.push(info);
            }
        }
        Ok(out)
    }

    /// Contents of the named Active record. A logically-deleted name is
    /// `NotFound` even though its bytes are still on disk.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let end = self.metadata.entry_end();
        match locate(&mut self.file, &self.free, end, name)? {
            Some(Located::Active(_, info)) => self.read_content(&info),
            _ => Err(StarError::NotFound {
                name: name.to_owned(),
            }),
        }
    }

    /// Every Active record with its contents, in position order.
    pub fn read_all(&mut self) -> Result<Vec<(FileInfo, Vec<u8>)>> {
        let infos = self.list()?;
        let mut out = Vec::with_capacity(infos.len());
        for info in infos {
            let data = self.read_content(&info)?;
            out.push((info, data));
        }
        Ok(out)
    }

    fn read_content(&mut self, info: &FileInfo) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(info.content_offset()))?;
        let mut buf = vec![0u8; info.file_size as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<F: Read + Write + Seek> Container<F> {
    /// Write a fresh container: empty free table, metadata, then each member
    /// back-to-back. Member names must be non-empty after clamping.
    pub fn create(mut file: F, members: &[(String, Vec<u8>)]) -> Result<Self> {
        for (name, data) in members {
            if clamp_name(name).is_empty() {
                return Err(StarError::InvalidName(name.clone()));
            }
            check_record_size(data.len())?;
        }

        let free = FreeTable::default();
        let mut metadata = ArchiveMetadata::default();

        file.seek(SeekFrom::Start(0))?;
        free.write(&mut file)?;
        metadata.write(&mut file)?;

        let mut cursor = ENTRY_REGION_OFFSET;
        for (name, data) in members {
            let need = FILE_INFO_SIZE + data.len() as u64;
            check_offset(cursor + need, data.len())?;
            let info = FileInfo {
                name: clamp_name(name).to_owned(),
                file_size: data.len() as i32,
                start_position: (cursor + FILE_INFO_SIZE) as i32,
                status: FileStatus::Active,
            };
            info.write(&mut file)?;
            file.write_all(data)?;
            cursor += need;
            metadata.num_files += 1;
        }
        metadata.total_size = (cursor - ENTRY_REGION_OFFSET) as i32;

        file.seek(SeekFrom::Start(METADATA_OFFSET))?;
        metadata.write(&mut file)?;

        Ok(Self {
            file,
            metadata,
            free,
        })
    }

    /// Add one record, reusing freed space first-fit or growing the file.
    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<AppendOutcome> {
        self.place_record(name, data, None)
    }

    /// Mark the named record Deleted and release its span to the free table,
    /// coalescing with adjacent free ranges. The record's bytes stay on disk
    /// until compaction.
    pub fn delete(&mut self, name: &str) -> Result<DeleteOutcome> {
        let end = self.metadata.entry_end();
        let (offset, mut info) = match locate(&mut self.file, &self.free, end, name)? {
            Some(Located::Active(offset, info)) => (offset, info),
            Some(Located::Deleted(..)) => {
                return Err(StarError::AlreadyDeleted {
                    name: name.to_owned(),
                })
            }
            None => {
                return Err(StarError::NotFound {
                    name: name.to_owned(),
                })
            }
        };

        // A full table must fail the delete before the header is touched.
        let mut table = self.free.clone();
        let freed = table.release(FreeRange {
            start: offset,
            size: info.span(),
        })?;

        info.status = FileStatus::Deleted;
        self.file.seek(SeekFrom::Start(offset))?;
        info.write(&mut self.file)?;

        self.free = table;
        self.save_free_table()?;
        Ok(DeleteOutcome { freed })
    }

    /// Replace the named record's contents: delete, then append under the
    /// same name. The append targets the just-freed range before falling
    /// back to the usual first-fit search.
    pub fn update(&mut self, name: &str, data: &[u8]) -> Result<AppendOutcome> {
        let DeleteOutcome { freed } = self.delete(name)?;
        self.place_record(name, data, Some(freed))
    }

    /// Rewrite all Active records contiguously from the start of the entry
    /// region, drop Deleted ones, reset the metadata counts, and empty the
    /// free table. Invalidates every previously returned offset.
    pub fn defragment(&mut self) -> Result<PackOutcome> {
        let end = self.metadata.entry_end();
        let mut records = Vec::new();
        {
            let mut walker = EntryWalker::new(&mut self.file, &self.free, end);
            while let Some(record) = walker.next_record()? {
                records.push(record);
            }
        }

        let mut write_pos = ENTRY_REGION_OFFSET;
        let mut kept = 0usize;
        for (_, mut info) in records {
            if info.status != FileStatus::Active {
                continue;
            }
            // The write cursor never passes the read cursor, and the content
            // is buffered before its old bytes can be overwritten.
            let content = self.read_content(&info)?;
            info.start_position = (write_pos + FILE_INFO_SIZE) as i32;
            self.file.seek(SeekFrom::Start(write_pos))?;
            info.write(&mut self.file)?;
            self.file.write_all(&content)?;
            write_pos += info.span();
            kept += 1;
        }

        let reclaimed = end - write_pos;
        self.metadata.num_files = kept as i32;
        self.metadata.total_size = (write_pos - ENTRY_REGION_OFFSET) as i32;
        self.free.clear();
        self.save_free_table()?;
        self.save_metadata()?;

        Ok(PackOutcome {
            new_len: write_pos,
            records_kept: kept,
            bytes_reclaimed: reclaimed,
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn place_record(
        &mut self,
        name: &str,
        data: &[u8],
        prefer: Option<FreeRange>,
    ) -> Result<AppendOutcome> {
        let name = clamp_name(name);
        if name.is_empty() {
            return Err(StarError::InvalidName(name.to_owned()));
        }
        check_record_size(data.len())?;
        let need = FILE_INFO_SIZE + data.len() as u64;

        // Reused placements always sit below the entry end, so only the
        // end-of-file path can push an offset past the format limit. That
        // check happens before the table is consumed.
        let allocation = prefer
            .and_then(|r| self.free.claim(r.start, need))
            .or_else(|| self.free.allocate(need));

        let (header_offset, placement, leftover) = match allocation {
            Some(a) => (a.offset, Placement::Reused, a.leftover),
            None => {
                let offset = self.metadata.entry_end();
                check_offset(offset + need, data.len())?;
                (offset, Placement::EndOfFile, 0)
            }
        };

        let info = FileInfo {
            name: name.to_owned(),
            file_size: data.len() as i32,
            start_position: (header_offset + FILE_INFO_SIZE) as i32,
            status: FileStatus::Active,
        };
        self.file.seek(SeekFrom::Start(header_offset))?;
        info.write(&mut self.file)?;
        self.file.write_all(data)?;
        if leftover > 0 {
            // The remainder of a reused range must never parse as a record
            // header, or traversal would walk into stale bytes.
            self.write_zeros(leftover)?;
        }

        self.metadata.num_files += 1;
        if placement == Placement::EndOfFile {
            self.metadata.total_size += need as i32;
        }
        self.save_free_table()?;
        self.save_metadata()?;

        Ok(AppendOutcome {
            header_offset,
            content_offset: header_offset + FILE_INFO_SIZE,
            placement,
        })
    }

    fn write_zeros(&mut self, count: u64) -> Result<()> {
        const ZEROS: [u8; 8192] = [0u8; 8192];
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(ZEROS.len() as u64) as usize;
            self.file.write_all(&ZEROS[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    fn save_free_table(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(FREE_COUNT_OFFSET))?;
        self.free.write(&mut self.file)
    }

    fn save_metadata(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(METADATA_OFFSET))?;
        self.metadata.write(&mut self.file)?;
        Ok(())
    }
}

fn check_record_size(len: usize) -> Result<()> {
    if len as u64 + FILE_INFO_SIZE > i32::MAX as u64 {
        return Err(StarError::MemberTooLarge { size: len as u64 });
    }
    Ok(())
}

fn check_offset(end: u64, len: usize) -> Result<()> {
    if end > i32::MAX as u64 {
        return Err(StarError::MemberTooLarge { size: len as u64 });
    }
    Ok(())
}
