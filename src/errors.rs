use std::str;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MachError {
    #[error("unsupported magic 0x{magic:08x} at offset {offset}.")]
    UnsupportedMagic { magic: u32, offset: usize },

    #[error("{what} at offset {offset} with {size} bytes is out of bounds, limit {limit}.")]
    OutOfBounds {
        what: &'static str,
        offset: u64,
        size: u64,
        limit: u64,
    },

    #[error("malformed load command #{index} (cmd 0x{cmd:x}) at offset {offset}, {reason}.")]
    MalformedLoadCommand {
        index: u32,
        cmd: u32,
        offset: usize,
        reason: String,
    },

    #[error("malformed fat header, {0}.")]
    MalformedArchiveHeader(String),

    #[error("invalid SuperBlob magic 0x{magic:08x} at offset {offset}.")]
    InvalidSuperBlobMagic { magic: u32, offset: usize },

    #[error(
        "truncated CodeDirectory at offset {offset}, version 0x{version:x} needs {required} bytes but length is {length}."
    )]
    TruncatedCodeDirectory {
        version: u32,
        offset: usize,
        length: u32,
        required: u32,
    },

    #[error("malformed CodeDirectory, {0}.")]
    MalformedCodeDirectory(String),

    #[error("fail to interpret a sequence of u8 as a string, {0}.")]
    Utf8Error(#[from] str::Utf8Error),
}

pub type Result<T> = ::std::result::Result<T, MachError>;
