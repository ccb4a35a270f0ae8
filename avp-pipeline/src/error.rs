use std::{io, result};

/// Result type of all avp-pipeline calls.
pub type Result<T, E = Error> = result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("element already exists: {0}")]
    ElementExists(String),

    #[error("closed")]
    Closed,

    #[error("queue closed")]
    QueueClosed,

    #[error("config error: {0}")]
    Config(String),

    #[error("record too large: {0} bytes")]
    RecordTooLarge(usize),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
