use thiserror::Error;

#[derive(Error, Debug)]
pub enum StarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no such member: {name}")]
    NotFound { name: String },

    #[error("member already deleted: {name}")]
    AlreadyDeleted { name: String },

    #[error("free-space table is full ({capacity} slots)")]
    CapacityExceeded { capacity: usize },

    #[error("container truncated: need {needed} bytes, have {available}")]
    Truncated { needed: u64, available: u64 },

    #[error("corrupt record header at offset {offset}")]
    CorruptHeader { offset: u64 },

    #[error("invalid member name: {0:?}")]
    InvalidName(String),

    #[error("member too large for the container format: {size} bytes")]
    MemberTooLarge { size: u64 },
}

pub type Result<T> = std::result::Result<T, StarError>;
