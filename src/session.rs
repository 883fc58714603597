//! Collaborator interfaces consumed by the multiplexer.
//!
//! The core is sans-I/O: it never opens sockets, never decodes HPACK tables
//! and never dispatches requests itself. The surrounding server supplies
//! these three seams and the core calls into them synchronously while
//! parsing or while draining deferred actions.

use std::io;

use crate::error::HeaderSinkError;

/// Raw transport write primitive.
///
/// A write either completes (possibly short) or reports a definitive error;
/// partial-write resumption belongs to the transport layer, not here.
pub trait Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Whether the session runs over an encrypted transport. Gates the
    /// post-handshake promotion of upgrade headers to stream 1.
    fn is_encrypted(&self) -> bool {
        false
    }
}

/// Opaque handle to a header store owned by the [`HeaderSink`].
///
/// The connection only moves handles around: it attaches one to a stream on
/// first use and transfers a pre-upgrade store to stream 1 during the
/// handshake promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderStoreHandle(pub usize);

/// Where a HEADERS/CONTINUATION payload starts, derived from frame flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderBlockStart {
    /// PADDED: a padding-length prefix byte comes first.
    Padding,
    /// PRIORITY: a 4-byte exclusive/dependency word then a 1-byte weight.
    PriorityDependency,
    /// Neither flag: field-type decoding starts immediately.
    Fields,
}

/// HPACK decode sink fed one octet at a time.
pub trait HeaderSink {
    /// Allocate a header store for a stream. Called lazily on the first
    /// header-block byte for a stream without one.
    fn attach(&mut self, stream_id: u32) -> Result<HeaderStoreHandle, HeaderSinkError>;

    /// A HEADERS or CONTINUATION frame header completed; the next bytes for
    /// this block start in the given mode.
    fn begin_block(&mut self, stream_id: u32, start: HeaderBlockStart);

    /// Consume one header-block octet into the given store.
    fn consume(&mut self, store: HeaderStoreHandle, byte: u8) -> Result<(), HeaderSinkError>;
}

/// Application collaborator: request dispatch and per-stream user data.
pub trait Application {
    /// Allocate opaque per-stream user data. Returning `false` fails the
    /// stream creation; the core then issues [`destroy_notify`].
    ///
    /// [`destroy_notify`]: Application::destroy_notify
    fn allocate_user_data(&mut self, stream_id: u32) -> bool;

    /// A stream that failed creation (or was torn down) releases any
    /// partial application state.
    fn destroy_notify(&mut self, stream_id: u32);

    /// Run the request on a stream whose headers are complete. The result
    /// code is logged by the core, never treated as a failure.
    fn run_request(&mut self, stream_id: u32) -> i32;

    /// A stream parked waiting for transmit credit became writable.
    fn signal_writable(&mut self, stream_id: u32);
}
