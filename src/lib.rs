//! h2-mux: a sans-I/O HTTP/2 server connection multiplexer
//!
//! This crate turns the raw byte stream of one HTTP/2 connection into
//! framed, flow-controlled logical streams, and frames outgoing
//! application data back into bytes. It is the multiplexing core of a
//! server endpoint: preface handshake, frame parsing, stream lifecycle,
//! settings negotiation and transmit-credit accounting.
//!
//! # Features
//!
//! - **Sans-I/O design**: no sockets, no async runtime; the caller feeds
//!   bytes and supplies a raw write primitive
//! - **Resumable parsing**: one byte at a time, suspendable at any read
//!   boundary, identical behavior for any chunking
//! - **Stream tree**: admission-controlled stream creation, lookup and
//!   removal under one connection
//! - **Flow control**: signed per-stream transmit credit, WINDOW_UPDATE
//!   application with overflow detection, writability unblocking
//! - **Deferred actions**: SETTINGS announce/ack and PING echo are
//!   scheduled during parsing and emitted by a separate dispatch step
//! - **HPACK seam**: header blocks are fed octet-wise to a pluggable sink;
//!   a default sink backed by `fluke-hpack` is included
//!
//! # Quick Start
//!
//! ```rust
//! use h2_mux::{Connection, BufferedHeaderSink, Application, Transport, CONNECTION_PREFACE};
//!
//! struct App;
//! impl Application for App {
//!     fn allocate_user_data(&mut self, _sid: u32) -> bool { true }
//!     fn destroy_notify(&mut self, _sid: u32) {}
//!     fn run_request(&mut self, _sid: u32) -> i32 { 0 }
//!     fn signal_writable(&mut self, _sid: u32) {}
//! }
//!
//! struct Wire(Vec<u8>);
//! impl Transport for Wire {
//!     fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
//!         self.0.extend_from_slice(buf);
//!         Ok(buf.len())
//!     }
//! }
//!
//! let mut conn = Connection::new();
//! let mut sink = BufferedHeaderSink::new();
//! let (mut app, mut wire) = (App, Wire(Vec::new()));
//!
//! // client preface; drain our scheduled SETTINGS announce
//! conn.feed_all(CONNECTION_PREFACE, &mut sink, &mut app).unwrap();
//! conn.dispatch_pending(&mut wire, &mut app).unwrap();
//!
//! // the client's empty SETTINGS frame; drain our ack (this also
//! // completes the handshake and promotes the upgrade request)
//! conn.feed_all(&[0, 0, 0, 4, 0, 0, 0, 0, 0], &mut sink, &mut app).unwrap();
//! conn.dispatch_pending(&mut wire, &mut app).unwrap();
//! ```
//!
//! # Architecture
//!
//! The core consumes three collaborator seams and nothing else:
//! - [`Transport`]: raw write + encrypted-session probe (TLS stays outside)
//! - [`HeaderSink`]: HPACK decode fed one octet at a time
//! - [`Application`]: request dispatch, per-stream user data, writability
//!
//! It does NOT provide TCP/TLS, HPACK table internals, HTTP/1.1 parsing or
//! server push generation.

pub mod connection;
pub mod error;
pub mod frame;
pub mod hpack;
pub mod session;
pub mod settings;
pub mod stream;

pub use connection::{Connection, ConnectionState, PendingAction, GOAWAY_DEBUG_MAX};
pub use error::{ConnectionError, HeaderSinkError, SettingsError, StreamError};
pub use frame::{
    encode_frame_header, error_code, flags, frame_type, is_h2c_preface, CONNECTION_PREFACE,
    FRAME_HEADER_LEN,
};
pub use hpack::{BufferedHeaderSink, H2Header, HpackEncoder};
pub use session::{Application, HeaderBlockStart, HeaderSink, HeaderStoreHandle, Transport};
pub use settings::{encode_settings_entry, settings_id, Settings, SETTINGS_ENTRY_LEN};
pub use stream::{Stream, DEFAULT_WEIGHT, INITIAL_TX_CREDIT};
