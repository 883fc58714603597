//! Error taxonomy for the connection multiplexer.
//!
//! Every malformed-input condition surfaces as a single `ConnectionError`
//! to the caller, which owns the decision to close the transport. The
//! parser never retries internally.

use thiserror::Error;

/// Connection-fatal outcomes. Any of these means the caller must tear down
/// the underlying transport session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("bad client preface byte 0x{0:02x}")]
    BadPreface(u8),

    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    MalformedSettings(#[from] SettingsError),

    #[error("header block error: {0}")]
    HeaderBlock(#[from] HeaderSinkError),

    #[error("window update overflows tx credit on stream {stream_id}")]
    FlowControlOverflow { stream_id: u32 },

    #[error("remote GOAWAY: last stream {last_stream_id}, error code 0x{error_code:08x}")]
    RemoteGoaway { last_stream_id: u32, error_code: u32 },

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("transport write failed")]
    Io(#[from] std::io::Error),

    #[error("short write: {written} of {expected} payload bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("connection already failed")]
    Closed,
}

/// Stream-scoped failures. Creation failures reject the stream without
/// tearing down sibling streams; the parser escalates them when it cannot
/// resolve a frame target.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("peer MAX_CONCURRENT_STREAMS limit reached")]
    AdmissionRejected,

    #[error("per-stream user data allocation failed")]
    ResourceExhaustion,

    #[error("stream not present in parent child list")]
    NotFound,
}

/// Malformed SETTINGS payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("settings payload length {0} is not a multiple of 6")]
    BadLength(usize),
}

/// Failure reported by a [`HeaderSink`](crate::session::HeaderSink)
/// collaborator while attaching a header store or consuming a block byte.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HeaderSinkError(pub String);
