use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{self, Read, Write};

/// Capacity of the on-disk free-space table.
pub const MAX_FREE_SPACES: usize = 100;

/// Stored filename field width: 254 significant bytes + NUL terminator.
pub const FILENAME_FIELD: usize = 255;
pub const FILENAME_MAX: usize = FILENAME_FIELD - 1;

/// Serialized sizes. No struct padding exists on disk; every field is
/// written with its exact width.
pub const FREE_SLOT_SIZE: u64 = 8;
pub const METADATA_SIZE: u64 = 8;
pub const FILE_INFO_SIZE: u64 = FILENAME_FIELD as u64 + 4 + 4 + 4;

/// Section offsets, in file order: legacy slot count, free-space table,
/// metadata, entry region.
pub const FREE_COUNT_OFFSET: u64 = 0;
pub const FREE_TABLE_OFFSET: u64 = 4;
pub const METADATA_OFFSET: u64 = FREE_TABLE_OFFSET + MAX_FREE_SPACES as u64 * FREE_SLOT_SIZE;
pub const ENTRY_REGION_OFFSET: u64 = METADATA_OFFSET + METADATA_SIZE;

/// Clamp a member name to the stored field width, backing off to a char
/// boundary so the stored bytes stay valid UTF-8.
pub fn clamp_name(name: &str) -> &str {
    if name.len() <= FILENAME_MAX {
        return name;
    }
    let mut end = FILENAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

// ── FileStatus ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Active,
    Deleted,
}

impl FileStatus {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(FileStatus::Active),
            1 => Some(FileStatus::Deleted),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            FileStatus::Active => 0,
            FileStatus::Deleted => 1,
        }
    }
}

// ── FileInfo ─────────────────────────────────────────────────────────────────

/// One record header. Invariant: `start_position` is the offset of the
/// record's content, i.e. header offset + [`FILE_INFO_SIZE`]. Traversal uses
/// that redundancy as a validity check, so every writer must maintain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub file_size: i32,
    pub start_position: i32,
    pub status: FileStatus,
}

impl FileInfo {
    pub fn content_offset(&self) -> u64 {
        self.start_position as u64
    }

    /// Offset one past the record's content.
    pub fn end_offset(&self) -> u64 {
        self.start_position as u64 + self.file_size as u64
    }

    /// Full extent on disk: header + content.
    pub fn span(&self) -> u64 {
        FILE_INFO_SIZE + self.file_size as u64
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut field = [0u8; FILENAME_FIELD];
        let bytes = clamp_name(&self.name).as_bytes();
        field[..bytes.len()].copy_from_slice(bytes);
        writer.write_all(&field)?;
        writer.write_i32::<LittleEndian>(self.file_size)?;
        writer.write_i32::<LittleEndian>(self.start_position)?;
        writer.write_i32::<LittleEndian>(self.status.as_raw())?;
        Ok(())
    }
}

// ── RawHeader ────────────────────────────────────────────────────────────────

/// Header bytes as read from disk, before validation. The entry region can
/// legitimately contain non-record bytes (zero-padded remainders of reused
/// free ranges), so parsing and accepting are separate steps.
#[derive(Debug, Clone)]
pub struct RawHeader {
    pub filename: [u8; FILENAME_FIELD],
    pub file_size: i32,
    pub start_position: i32,
    pub status: i32,
}

impl RawHeader {
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut filename = [0u8; FILENAME_FIELD];
        reader.read_exact(&mut filename)?;
        Ok(Self {
            filename,
            file_size: reader.read_i32::<LittleEndian>()?,
            start_position: reader.read_i32::<LittleEndian>()?,
            status: reader.read_i32::<LittleEndian>()?,
        })
    }

    /// Accept these bytes as a record header read at `header_offset` only if
    /// they are self-consistent: known status tag, non-negative size, the
    /// `start_position` invariant holds, and the content fits inside
    /// `region_end`.
    pub fn validate(&self, header_offset: u64, region_end: u64) -> Option<FileInfo> {
        let status = FileStatus::from_raw(self.status)?;
        if self.file_size < 0 || self.start_position < 0 {
            return None;
        }
        if self.start_position as u64 != header_offset + FILE_INFO_SIZE {
            return None;
        }
        if self.start_position as u64 + self.file_size as u64 > region_end {
            return None;
        }
        let len = self
            .filename
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILENAME_FIELD);
        let name = String::from_utf8_lossy(&self.filename[..len]).into_owned();
        Some(FileInfo {
            name,
            file_size: self.file_size,
            start_position: self.start_position,
            status,
        })
    }
}

// ── ArchiveMetadata ──────────────────────────────────────────────────────────

/// `num_files` counts record slots ever written (active + deleted) until a
/// compaction resets it to the active count. `total_size` is the byte length
/// of the entry region and bounds every traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub num_files: i32,
    pub total_size: i32,
}

impl ArchiveMetadata {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.num_files)?;
        writer.write_i32::<LittleEndian>(self.total_size)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            num_files: reader.read_i32::<LittleEndian>()?,
            total_size: reader.read_i32::<LittleEndian>()?,
        })
    }

    /// Offset one past the last entry-region byte.
    pub fn entry_end(&self) -> u64 {
        ENTRY_REGION_OFFSET + self.total_size as u64
    }
}
