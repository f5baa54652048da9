pub mod layout;
pub mod free_table;
pub mod entry;
pub mod container;
pub mod archive;
pub mod report;
pub mod error;

pub use archive::{Archive, CreateReport};
pub use container::{AppendOutcome, Container, DeleteOutcome, PackOutcome, Placement};
pub use error::{Result, StarError};
pub use free_table::{Allocation, FreeRange, FreeTable};
pub use layout::{ArchiveMetadata, FileInfo, FileStatus, FILE_INFO_SIZE, MAX_FREE_SPACES};
pub use report::{Reporter, Verbosity};
