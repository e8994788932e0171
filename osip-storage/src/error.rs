//! Error types for OSIP table and image operations

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OsipError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Table signature mismatch: expected {expected:#010x}, got {actual:#010x}")]
    SignatureMismatch { expected: u32, actual: u32 },

    #[error("No backup table was taken in this session")]
    MissingBackup,

    #[error("No descriptor carries attribute {0:#04x}")]
    AttributeNotFound(u8),

    #[error("Descriptor slot {slot} is out of range (table holds {max} entries)")]
    SlotOutOfRange { slot: usize, max: usize },

    #[error("Payload verification mismatch at device offset {offset:#x}")]
    VerifyMismatch { offset: u64 },
}

pub type Result<T> = std::result::Result<T, OsipError>;
