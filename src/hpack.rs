//! HPACK: Header Compression for HTTP/2 (RFC 7541)
//!
//! The connection core treats header decompression as an external byte
//! sink; this module provides the default sink, a thin wrapper around
//! `fluke-hpack`. The sink buffers header-block octets per store, skipping
//! the PADDED / PRIORITY prefixes announced by the parser, and decodes the
//! whole block on demand with a per-connection dynamic table.

use std::collections::HashMap;

use crate::error::HeaderSinkError;
use crate::session::{HeaderBlockStart, HeaderSink, HeaderStoreHandle};

/// A decoded HTTP/2 header
#[derive(Debug, Clone, PartialEq)]
pub struct H2Header {
    pub name: String,
    pub value: String,
}

impl H2Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Per-block prefix position within the current frame payload.
#[derive(Debug, Clone, Copy)]
enum BlockPhase {
    PadLength,
    Dependency(u8),
    Weight,
    Fields,
}

#[derive(Debug, Default)]
struct Store {
    bytes: Vec<u8>,
    /// Trailing pad octets to strip before decoding (PADDED frames).
    trailing_pad: usize,
}

/// Default [`HeaderSink`]: buffers block bytes per store and decodes with
/// `fluke_hpack::Decoder`, which maintains dynamic table state
/// per-connection.
pub struct BufferedHeaderSink {
    decoder: fluke_hpack::Decoder<'static>,
    stores: Vec<Store>,
    by_stream: HashMap<u32, HeaderStoreHandle>,
    phase: BlockPhase,
}

impl std::fmt::Debug for BufferedHeaderSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedHeaderSink")
            .field("stores", &self.stores.len())
            .finish()
    }
}

impl Default for BufferedHeaderSink {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferedHeaderSink {
    pub fn new() -> Self {
        Self {
            decoder: fluke_hpack::Decoder::new(),
            stores: Vec::new(),
            by_stream: HashMap::new(),
            phase: BlockPhase::Fields,
        }
    }

    /// Allocate a store not yet bound to any stream (e.g. to hold
    /// HTTP/1.1 upgrade headers before the handshake promotes them).
    pub fn allocate(&mut self) -> HeaderStoreHandle {
        self.stores.push(Store::default());
        HeaderStoreHandle(self.stores.len() - 1)
    }

    /// Store currently attached to a stream, if any.
    pub fn store_for(&self, stream_id: u32) -> Option<HeaderStoreHandle> {
        self.by_stream.get(&stream_id).copied()
    }

    /// Raw buffered block bytes for a store.
    pub fn block_bytes(&self, store: HeaderStoreHandle) -> &[u8] {
        self.stores
            .get(store.0)
            .map(|s| s.bytes.as_slice())
            .unwrap_or(&[])
    }

    /// Decode and drain a store's accumulated header block.
    pub fn finish(&mut self, store: HeaderStoreHandle) -> Result<Vec<H2Header>, HeaderSinkError> {
        let st = self
            .stores
            .get_mut(store.0)
            .ok_or_else(|| HeaderSinkError("unknown header store".into()))?;
        let mut block = std::mem::take(&mut st.bytes);
        let pad = st.trailing_pad.min(block.len());
        block.truncate(block.len() - pad);
        st.trailing_pad = 0;

        let pairs = self
            .decoder
            .decode(&block)
            .map_err(|e| HeaderSinkError(format!("HPACK decode error: {:?}", e)))?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| {
                H2Header::new(
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }
}

impl HeaderSink for BufferedHeaderSink {
    fn attach(&mut self, stream_id: u32) -> Result<HeaderStoreHandle, HeaderSinkError> {
        let handle = self.allocate();
        self.by_stream.insert(stream_id, handle);
        Ok(handle)
    }

    fn begin_block(&mut self, _stream_id: u32, start: HeaderBlockStart) {
        self.phase = match start {
            HeaderBlockStart::Padding => BlockPhase::PadLength,
            HeaderBlockStart::PriorityDependency => BlockPhase::Dependency(4),
            HeaderBlockStart::Fields => BlockPhase::Fields,
        };
    }

    fn consume(&mut self, store: HeaderStoreHandle, byte: u8) -> Result<(), HeaderSinkError> {
        let st = self
            .stores
            .get_mut(store.0)
            .ok_or_else(|| HeaderSinkError("unknown header store".into()))?;
        match self.phase {
            BlockPhase::PadLength => {
                st.trailing_pad = byte as usize;
                self.phase = BlockPhase::Fields;
            }
            BlockPhase::Dependency(remaining) => {
                self.phase = if remaining > 1 {
                    BlockPhase::Dependency(remaining - 1)
                } else {
                    BlockPhase::Weight
                };
            }
            BlockPhase::Weight => {
                self.phase = BlockPhase::Fields;
            }
            BlockPhase::Fields => {
                st.bytes.push(byte);
            }
        }
        Ok(())
    }
}

/// HPACK encoder for HTTP/2 header blocks.
/// Wraps `fluke_hpack::Encoder` which maintains dynamic table state
/// per-connection; applications use it to build HEADERS payloads for
/// [`write_frame`](crate::Connection::write_frame).
pub struct HpackEncoder {
    inner: fluke_hpack::Encoder<'static>,
}

impl std::fmt::Debug for HpackEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackEncoder").finish()
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Encoder::new(),
        }
    }

    /// Encode headers into an HPACK header block.
    pub fn encode(&mut self, headers: &[H2Header]) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|h| (h.name.as_bytes(), h.value.as_bytes()))
            .collect();
        self.inner.encode(pairs)
    }
}
