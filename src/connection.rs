//! The per-connection state machine.
//!
//! A [`Connection`] turns a raw byte stream into framed, flow-controlled
//! logical streams and turns outgoing application data back into correctly
//! framed bytes. The parser is incremental and byte-at-a-time: it can be
//! suspended at any read boundary and resumed later, so the caller owns the
//! event loop and simply feeds whatever the transport produced.
//!
//! Parsing proceeds in three stages per frame: the 24-byte client preface
//! (once), the 9-byte frame header, then a type-specific payload phase.
//! Actions that must emit frames (settings announce/ack, ping echo) are
//! never written from inside the parser; they land in a single pending slot
//! drained by [`Connection::dispatch_pending`].

use log::{debug, error, warn};

use crate::error::{ConnectionError, SettingsError, StreamError};
use crate::frame::{
    encode_frame_header, flags, frame_type, CONNECTION_PREFACE, FRAME_HEADER_LEN,
};
use crate::session::{Application, HeaderBlockStart, HeaderSink, HeaderStoreHandle, Transport};
use crate::settings::{settings_id, Settings, SETTINGS_ENTRY_LEN};
use crate::stream::{NodeId, Stream, StreamArena, INITIAL_TX_CREDIT, ROOT};

/// Usable capacity of the GOAWAY debug-string buffer; longer strings are
/// silently truncated.
pub const GOAWAY_DEBUG_MAX: usize = 127;

/// Connection lifecycle. Terminal on `Established` for a healthy session;
/// any protocol violation parks the connection in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingPreface,
    EstablishedPreSettings,
    Established,
    Failed,
}

/// Deferred frame-emitting action, scheduled by the parser and drained
/// outside it. The slot holds at most one action; scheduling another
/// replaces the unsent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// Announce all non-default local settings (possibly empty payload).
    AnnounceSettings,
    /// Empty SETTINGS frame with the ACK flag.
    AckSettings,
    /// PING echo with the ACK flag, carrying the captured payload.
    Pong([u8; 8]),
}

/// Per-frame payload scratch, selected once at header completion so each
/// frame type only carries the state it needs.
#[derive(Debug)]
enum Payload {
    Settings {
        entry: [u8; SETTINGS_ENTRY_LEN],
    },
    HeaderBlock,
    GoAway {
        last_stream_id: u32,
        error_code: u32,
        debug: Vec<u8>,
    },
    Ping {
        payload: [u8; 8],
    },
    WindowUpdate {
        accum: u32,
    },
    /// DATA, PRIORITY, RST_STREAM, PUSH_PROMISE: bytes counted, content
    /// discarded.
    Skip,
}

/// Resumable cursor of the incremental parser.
#[derive(Debug)]
struct ParseState {
    /// Preface progress or frame-header assembly position; equals
    /// [`FRAME_HEADER_LEN`] during the payload phase.
    frame_state: usize,
    /// Preface cursor, then payload byte counter.
    count: u32,
    length: u32,
    frame_type: u8,
    flags: u8,
    stream_id: u32,
    /// Target stream node for the in-progress frame's payload.
    target: NodeId,
    payload: Payload,
}

impl ParseState {
    fn new() -> Self {
        Self {
            frame_state: 0,
            count: 0,
            length: 0,
            frame_type: 0,
            flags: 0,
            stream_id: 0,
            target: ROOT,
            payload: Payload::Skip,
        }
    }
}

/// An HTTP/2 server-side network connection: settings pair, stream tree,
/// parse state and the deferred-action slot.
#[derive(Debug)]
pub struct Connection {
    my_settings: Settings,
    peer_settings: Settings,
    streams: StreamArena,
    state: ConnectionState,
    parse: ParseState,
    pending: Option<PendingAction>,
    /// Header store carried over from an HTTP/1.1 upgrade, transferred to
    /// stream 1 when the settings handshake completes.
    upgrade_store: Option<HeaderStoreHandle>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// New connection awaiting the client preface, with default local
    /// settings. Configure via [`my_settings_mut`](Self::my_settings_mut)
    /// before feeding bytes.
    pub fn new() -> Self {
        Self {
            my_settings: Settings::default(),
            peer_settings: Settings::default(),
            streams: StreamArena::new(),
            state: ConnectionState::AwaitingPreface,
            parse: ParseState::new(),
            pending: None,
            upgrade_store: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Currently scheduled deferred action, if any.
    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Local settings, mutable for configuration before negotiation.
    pub fn my_settings_mut(&mut self) -> &mut Settings {
        &mut self.my_settings
    }

    pub fn my_settings(&self) -> &Settings {
        &self.my_settings
    }

    /// The peer's negotiated settings (updated by inbound SETTINGS frames).
    pub fn peer_settings(&self) -> &Settings {
        &self.peer_settings
    }

    /// Stream by wire id; id 0 resolves to the connection's control context.
    pub fn stream(&self, stream_id: u32) -> Option<&Stream> {
        if stream_id == 0 {
            self.streams.get(ROOT)
        } else {
            self.streams.find(ROOT, stream_id).and_then(|n| self.streams.get(n))
        }
    }

    /// Transmit credit remaining for a stream (0 = control context).
    pub fn tx_credit(&self, stream_id: u32) -> Option<i32> {
        self.stream(stream_id).map(|s| s.tx_credit)
    }

    /// Number of live streams under this connection.
    pub fn stream_count(&self) -> usize {
        self.streams.stream_count()
    }

    /// Look a stream up by id, creating it (admission-checked, with
    /// application user-data allocation) on a miss.
    pub fn open_stream<A: Application>(
        &mut self,
        stream_id: u32,
        app: &mut A,
    ) -> Result<(), StreamError> {
        let max = self.peer_settings.get(settings_id::MAX_CONCURRENT_STREAMS);
        self.streams.find_or_create(ROOT, stream_id, max, app)?;
        Ok(())
    }

    /// Remove a stream, unlinking it from the tree. Reports `NotFound`
    /// rather than panicking when the stream is not present.
    pub fn remove_stream(&mut self, stream_id: u32) -> Result<(), StreamError> {
        let node = self
            .streams
            .find(ROOT, stream_id)
            .ok_or(StreamError::NotFound)?;
        self.streams.remove(node)
    }

    /// Park a stream until a WINDOW_UPDATE makes its credit positive again;
    /// the unpark is signalled through [`Application::signal_writable`].
    pub fn mark_waiting_for_credit(&mut self, stream_id: u32) -> bool {
        let node = if stream_id == 0 {
            Some(ROOT)
        } else {
            self.streams.find(ROOT, stream_id)
        };
        match node.and_then(|n| self.streams.get_mut(n)) {
            Some(s) => {
                s.waiting_for_credit = true;
                true
            }
            None => false,
        }
    }

    /// Hand over the header store holding pre-upgrade HTTP/1.1 headers; the
    /// handshake promotion moves it onto stream 1.
    pub fn set_upgrade_store(&mut self, store: HeaderStoreHandle) {
        self.upgrade_store = Some(store);
    }

    /// Feed one byte from the transport.
    ///
    /// An `Err` means the caller must close the underlying transport
    /// session; the connection is terminal afterwards and further bytes are
    /// rejected with [`ConnectionError::Closed`].
    pub fn feed<S: HeaderSink, A: Application>(
        &mut self,
        c: u8,
        sink: &mut S,
        app: &mut A,
    ) -> Result<(), ConnectionError> {
        match self.run_byte(c, sink, app) {
            Ok(()) => Ok(()),
            Err(e) => {
                if !matches!(e, ConnectionError::Closed) {
                    warn!("connection failed: {}", e);
                    self.state = ConnectionState::Failed;
                }
                Err(e)
            }
        }
    }

    /// Feed a buffer; behaves exactly like calling [`feed`](Self::feed)
    /// once per byte.
    pub fn feed_all<S: HeaderSink, A: Application>(
        &mut self,
        data: &[u8],
        sink: &mut S,
        app: &mut A,
    ) -> Result<(), ConnectionError> {
        for &c in data {
            self.feed(c, sink, app)?;
        }
        Ok(())
    }

    fn run_byte<S: HeaderSink, A: Application>(
        &mut self,
        c: u8,
        sink: &mut S,
        app: &mut A,
    ) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Failed => Err(ConnectionError::Closed),
            ConnectionState::AwaitingPreface => {
                if CONNECTION_PREFACE[self.parse.count as usize] != c {
                    return Err(ConnectionError::BadPreface(c));
                }
                self.parse.count += 1;
                if self.parse.count as usize == CONNECTION_PREFACE.len() {
                    debug!("http2: preface complete, established pre-settings");
                    self.state = ConnectionState::EstablishedPreSettings;
                    self.parse.count = 0;
                    self.parse.frame_state = 0;
                    if let Some(root) = self.streams.get_mut(ROOT) {
                        root.tx_credit = INITIAL_TX_CREDIT;
                    }
                    self.schedule(PendingAction::AnnounceSettings);
                }
                Ok(())
            }
            ConnectionState::EstablishedPreSettings | ConnectionState::Established => {
                self.frame_byte(c, sink, app)
            }
        }
    }

    fn frame_byte<S: HeaderSink, A: Application>(
        &mut self,
        c: u8,
        sink: &mut S,
        app: &mut A,
    ) -> Result<(), ConnectionError> {
        if self.parse.frame_state == FRAME_HEADER_LEN {
            return self.payload_byte(c, sink, app);
        }

        match self.parse.frame_state {
            0 => {
                self.parse.length = c as u32;
                self.parse.stream_id = 0;
            }
            1 | 2 => {
                self.parse.length = (self.parse.length << 8) | c as u32;
            }
            3 => self.parse.frame_type = c,
            4 => self.parse.flags = c,
            // bytes 5..=8: the 4-byte stream id, reserved bit kept as-is
            _ => {
                self.parse.stream_id = (self.parse.stream_id << 8) | c as u32;
            }
        }
        self.parse.frame_state += 1;

        if self.parse.frame_state == FRAME_HEADER_LEN {
            self.header_complete(sink, app)?;
        }
        Ok(())
    }

    /// The complete 9-byte frame header just arrived: resolve the target
    /// stream, select the payload scratch and run type-specific validation.
    fn header_complete<S: HeaderSink, A: Application>(
        &mut self,
        sink: &mut S,
        app: &mut A,
    ) -> Result<(), ConnectionError> {
        self.parse.count = 0;
        self.parse.target = ROOT;
        if self.parse.stream_id != 0 {
            let max = self.peer_settings.get(settings_id::MAX_CONCURRENT_STREAMS);
            self.parse.target =
                self.streams
                    .find_or_create(ROOT, self.parse.stream_id, max, app)?;
        }

        debug!(
            "frame header: type 0x{:x}, flags 0x{:x}, sid {}, len {}",
            self.parse.frame_type, self.parse.flags, self.parse.stream_id, self.parse.length
        );

        self.parse.payload = match self.parse.frame_type {
            frame_type::SETTINGS => Payload::Settings {
                entry: [0; SETTINGS_ENTRY_LEN],
            },
            frame_type::HEADERS | frame_type::CONTINUATION => Payload::HeaderBlock,
            frame_type::GOAWAY => Payload::GoAway {
                last_stream_id: 0,
                error_code: 0,
                debug: Vec::new(),
            },
            frame_type::PING => Payload::Ping { payload: [0; 8] },
            frame_type::WINDOW_UPDATE => Payload::WindowUpdate { accum: 0 },
            frame_type::DATA
            | frame_type::PRIORITY
            | frame_type::RST_STREAM
            | frame_type::PUSH_PROMISE => Payload::Skip,
            _ => {
                warn!("unhandled frame type {}", self.parse.frame_type);
                return Err(ConnectionError::Malformed("unknown frame type"));
            }
        };

        match self.parse.frame_type {
            frame_type::SETTINGS => {
                // nonzero sid on settings is illegal
                if self.parse.stream_id != 0 {
                    return Err(ConnectionError::Malformed("SETTINGS on nonzero stream"));
                }
                if self.parse.length as usize % SETTINGS_ENTRY_LEN != 0 {
                    return Err(SettingsError::BadLength(self.parse.length as usize).into());
                }
                if self.parse.flags & flags::ACK == 0 {
                    // non-ACK coming in means we must ACK it
                    self.schedule(PendingAction::AckSettings);
                }
            }
            frame_type::PING => {
                if self.parse.stream_id != 0 {
                    return Err(ConnectionError::Malformed("PING on nonzero stream"));
                }
                if self.parse.length != 8 {
                    return Err(ConnectionError::Malformed("PING length must be 8"));
                }
            }
            frame_type::CONTINUATION => {
                if self.streams.get(ROOT).is_some_and(|r| r.end_headers) {
                    return Err(ConnectionError::Malformed(
                        "CONTINUATION after END_HEADERS",
                    ));
                }
                self.update_end_headers(sink);
            }
            frame_type::HEADERS => {
                if self.parse.stream_id == 0 {
                    return Err(ConnectionError::Malformed("HEADERS on stream 0"));
                }
                // END_STREAM means after servicing this, close the stream
                let end_stream = self.parse.flags & flags::END_STREAM != 0;
                if let Some(root) = self.streams.get_mut(ROOT) {
                    root.end_stream = end_stream;
                }
                self.update_end_headers(sink);
            }
            frame_type::WINDOW_UPDATE => {
                if self.parse.length != 4 {
                    return Err(ConnectionError::Malformed(
                        "WINDOW_UPDATE length must be 4",
                    ));
                }
            }
            _ => {}
        }

        if self.parse.length == 0 {
            self.finish_frame(app)?;
        }
        Ok(())
    }

    /// Shared HEADERS/CONTINUATION tail: record END_HEADERS for the current
    /// header sequence and point the sink at the right block start.
    fn update_end_headers<S: HeaderSink>(&mut self, sink: &mut S) {
        // no END_HEADERS means CONTINUATION must come
        let end_headers = self.parse.flags & flags::END_HEADERS != 0;
        if let Some(root) = self.streams.get_mut(ROOT) {
            root.end_headers = end_headers;
        }

        let start = if self.parse.flags & flags::PADDED != 0 {
            HeaderBlockStart::Padding
        } else if self.parse.flags & flags::PRIORITY != 0 {
            HeaderBlockStart::PriorityDependency
        } else {
            HeaderBlockStart::Fields
        };
        sink.begin_block(self.parse.stream_id, start);
    }

    fn payload_byte<S: HeaderSink, A: Application>(
        &mut self,
        c: u8,
        sink: &mut S,
        app: &mut A,
    ) -> Result<(), ConnectionError> {
        self.parse.count += 1;
        let count = self.parse.count;

        match &mut self.parse.payload {
            Payload::Settings { entry } => {
                entry[((count - 1) as usize) % SETTINGS_ENTRY_LEN] = c;
                if count as usize % SETTINGS_ENTRY_LEN == 0 {
                    let group = *entry;
                    self.peer_settings.apply_payload(&group)?;
                }
            }
            Payload::HeaderBlock => {
                let target = self.parse.target;
                let stream_id = self.parse.stream_id;
                let store = match self.streams.get(target).and_then(|s| s.header_store) {
                    Some(h) => h,
                    None => {
                        let h = sink.attach(stream_id).map_err(|e| {
                            error!("failed to attach header store: {}", e);
                            e
                        })?;
                        if let Some(s) = self.streams.get_mut(target) {
                            s.header_store = Some(h);
                        }
                        h
                    }
                };
                sink.consume(store, c)?;
            }
            Payload::GoAway {
                last_stream_id,
                error_code,
                debug,
            } => match count {
                1..=4 => {
                    *last_stream_id = (*last_stream_id << 8) | c as u32;
                    debug.clear();
                }
                5..=8 => {
                    *error_code = (*error_code << 8) | c as u32;
                }
                _ => {
                    if debug.len() < GOAWAY_DEBUG_MAX {
                        debug.push(c);
                    }
                }
            },
            Payload::Ping { payload } => {
                if self.parse.flags & flags::ACK != 0 {
                    // our own echo coming back; discard
                } else {
                    if count > 8 {
                        return Err(ConnectionError::Malformed("PING payload exceeds 8 bytes"));
                    }
                    payload[(count - 1) as usize] = c;
                }
            }
            Payload::WindowUpdate { accum } => {
                *accum = (*accum << 8) | c as u32;
            }
            Payload::Skip => {}
        }

        if self.parse.count == self.parse.length {
            self.finish_frame(app)?;
        }
        Ok(())
    }

    /// End of frame just happened.
    fn finish_frame<A: Application>(&mut self, app: &mut A) -> Result<(), ConnectionError> {
        self.parse.frame_state = 0;
        self.parse.count = 0;

        let target = self.parse.target;
        let stream_id = self.parse.stream_id;

        // one-time adoption of the peer's initial window on the control
        // context, after the first complete frame
        let initial = self.peer_settings.get(settings_id::INITIAL_WINDOW_SIZE);
        if let Some(root) = self.streams.get_mut(ROOT) {
            if !root.initialized {
                root.tx_credit = initial as i32;
                root.initialized = true;
                debug!("initial tx credit on control context: {}", initial);
            }
        }

        match self.parse.frame_type {
            frame_type::HEADERS => {
                if let Some(s) = self.streams.get_mut(target) {
                    s.headers_complete = true;
                }
                let n = app.run_request(stream_id);
                debug!("request dispatch on stream {} returned {}", stream_id, n);
            }
            frame_type::PING => {
                if self.parse.flags & flags::ACK == 0 {
                    if let Payload::Ping { payload } = &self.parse.payload {
                        let payload = *payload;
                        self.schedule(PendingAction::Pong(payload));
                    }
                }
            }
            frame_type::WINDOW_UPDATE => {
                let delta = match &self.parse.payload {
                    Payload::WindowUpdate { accum } => *accum & 0x7FFF_FFFF,
                    _ => 0,
                };
                let stream = self
                    .streams
                    .get_mut(target)
                    .ok_or(StreamError::NotFound)?;
                if stream.tx_credit as i64 + delta as i64 > i32::MAX as i64 {
                    return Err(ConnectionError::FlowControlOverflow { stream_id });
                }
                stream.tx_credit += delta as i32;
                debug!(
                    "window update on stream {}: +{} -> {}",
                    stream_id, delta, stream.tx_credit
                );
                if stream.waiting_for_credit && stream.tx_credit > 0 {
                    stream.waiting_for_credit = false;
                    app.signal_writable(stream_id);
                }
            }
            frame_type::GOAWAY => {
                if let Payload::GoAway {
                    last_stream_id,
                    error_code,
                    debug: dbg,
                } = &self.parse.payload
                {
                    let (last_stream_id, error_code) = (*last_stream_id, *error_code);
                    debug!(
                        "GOAWAY: last sid {}, error code 0x{:08x}, '{}'",
                        last_stream_id,
                        error_code,
                        String::from_utf8_lossy(dbg)
                    );
                    if let Some(s) = self.streams.get_mut(target) {
                        s.going_away = true;
                    }
                    return Err(ConnectionError::RemoteGoaway {
                        last_stream_id,
                        error_code,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn schedule(&mut self, action: PendingAction) {
        if let Some(prev) = &self.pending {
            if *prev != action {
                warn!("pending action {:?} replaced by {:?} before dispatch", prev, action);
            }
        }
        self.pending = Some(action);
    }

    /// Drain the pending deferred action, emitting its frame on the
    /// transport. Must be called after parsing returns, never re-entrantly
    /// from inside it. A no-op when nothing is scheduled.
    pub fn dispatch_pending<T: Transport, A: Application>(
        &mut self,
        transport: &mut T,
        app: &mut A,
    ) -> Result<(), ConnectionError> {
        let action = match self.pending.take() {
            Some(a) => a,
            None => return Ok(()),
        };
        debug!("dispatching {:?}", action);

        match action {
            PendingAction::AnnounceSettings => {
                let payload = self.my_settings.encode_nondefaults();
                let n = self.write_frame(transport, 0, frame_type::SETTINGS, 0, &payload)?;
                if n != payload.len() {
                    return Err(ConnectionError::ShortWrite {
                        written: n,
                        expected: payload.len(),
                    });
                }
            }
            PendingAction::AckSettings => {
                let n = self.write_frame(transport, 0, frame_type::SETTINGS, flags::ACK, &[])?;
                if n != 0 {
                    return Err(ConnectionError::ShortWrite {
                        written: n,
                        expected: 0,
                    });
                }
                // end of the preface dance?
                if self.state == ConnectionState::EstablishedPreSettings {
                    self.state = ConnectionState::Established;
                    if transport.is_encrypted() {
                        debug!("encrypted session, no upgrade headers to promote");
                    } else {
                        self.promote_upgrade_request(app)?;
                    }
                }
            }
            PendingAction::Pong(payload) => {
                let n =
                    self.write_frame(transport, 0, frame_type::PING, flags::ACK, &payload)?;
                if n != payload.len() {
                    return Err(ConnectionError::ShortWrite {
                        written: n,
                        expected: payload.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The headers from an h2c upgrade are the first job: shift them onto
    /// stream id 1 and service that request.
    fn promote_upgrade_request<A: Application>(
        &mut self,
        app: &mut A,
    ) -> Result<(), ConnectionError> {
        let max = self.peer_settings.get(settings_id::MAX_CONCURRENT_STREAMS);
        let node = self.streams.create_child(ROOT, 1, max, app)?;

        let initial = self.peer_settings.get(settings_id::INITIAL_WINDOW_SIZE) as i32;
        let store = self.upgrade_store.take();
        if let Some(s) = self.streams.get_mut(node) {
            s.header_store = store;
            s.tx_credit = initial;
            s.initialized = true;
            // demanded by HTTP2
            s.end_stream = true;
            debug!("initial tx credit on stream 1: {}", initial);
        }

        let n = app.run_request(1);
        debug!("initial request dispatch returned {}", n);
        Ok(())
    }

    /// Write one frame on the transport: 9-byte header then the payload.
    ///
    /// DATA spends the target stream's transmit credit before the bytes go
    /// out; an overdraft is diagnosed, not blocked — callers check credit
    /// first. Returns the number of payload bytes written (header
    /// excluded), or the short raw count if not even the header went out.
    pub fn write_frame<T: Transport>(
        &mut self,
        transport: &mut T,
        stream_id: u32,
        frame_type: u8,
        frame_flags: u8,
        payload: &[u8],
    ) -> Result<usize, ConnectionError> {
        let target = if stream_id == 0 {
            ROOT
        } else {
            self.streams
                .find(ROOT, stream_id)
                .ok_or(StreamError::NotFound)?
        };
        let root = self.streams.root_of(target);

        debug!(
            "frame write (root node {}): type 0x{:x}, flags 0x{:x}, sid {}, len {}, tx_credit {:?}",
            root,
            frame_type,
            frame_flags,
            stream_id,
            payload.len(),
            self.streams.get(target).map(|s| s.tx_credit)
        );

        if frame_type == crate::frame::frame_type::DATA {
            if let Some(s) = self.streams.get_mut(target) {
                let len = payload.len() as i32;
                if s.tx_credit < len {
                    error!(
                        "sending DATA payload len {} but tx_credit only {}",
                        len, s.tx_credit
                    );
                }
                s.tx_credit -= len;
            }
        }

        let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        buf.extend_from_slice(&encode_frame_header(
            payload.len() as u32,
            frame_type,
            frame_flags,
            stream_id,
        ));
        buf.extend_from_slice(payload);

        let n = transport.write(&buf)?;
        if n >= FRAME_HEADER_LEN {
            Ok(n - FRAME_HEADER_LEN)
        } else {
            Ok(n)
        }
    }
}
