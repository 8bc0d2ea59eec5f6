use std::string::FromUtf8Error;

/// Everything that can go wrong while parsing or serializing a BFEVFL file.
///
/// None of these are retried or recovered from internally; they all propagate
/// to the library caller, who is left holding whatever partial state existed
/// at the point of failure (undefined, and not meant to be inspected further).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bad magic: expected `BFEVFL\\0\\0`, got {0:?}")]
    MagicMismatch(Vec<u8>),

    #[error("unsupported version: 0x{0:04x} (expected 0x0300)")]
    VersionUnsupported(u16),

    #[error("unsupported byte order mark: 0x{0:04x} (expected 0xfeff, little-endian only)")]
    EndianUnsupported(u16),

    #[error("attempted to read {requested} byte(s) at offset {offset}, but the buffer is only {len} byte(s) long")]
    Truncated {
        offset: usize,
        requested: usize,
        len: usize,
    },

    #[error("invalid string bytes at offset {offset}: {source}")]
    InvalidString {
        offset: usize,
        #[source]
        source: FromUtf8Error,
    },

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("unknown tag: {0}")]
    UnknownTag(String),

    #[error("unresolved cross-reference: {0}")]
    Unresolved(String),

    #[error("an EventFlow must contain exactly one of {{flowchart, timeline}}, found {found}")]
    EmptyContent { found: &'static str },

    #[error("corrupt data: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;
