//! Negotiable connection parameters (RFC 7540 Section 6.5).
//!
//! A fixed-size table indexed by setting identifier. Slot 0 is a sentinel
//! and never negotiated. A connection keeps two tables: its own ("my")
//! settings and the peer's, the latter mutated only by decoded SETTINGS
//! payloads.

use log::debug;

use crate::error::SettingsError;

/// HTTP/2 SETTINGS identifiers (RFC 7540 Section 6.5.2)
#[allow(dead_code)]
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// Number of table slots, including the unused slot 0.
pub const SETTINGS_COUNT: usize = 7;

/// Wire size of one settings entry: 2-byte identifier + 4-byte value.
pub const SETTINGS_ENTRY_LEN: usize = 6;

/// Indexed registry of the six negotiable parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    values: [u32; SETTINGS_COUNT],
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            values: [
                1, // sentinel, unused
                128,       // HEADER_TABLE_SIZE
                1,         // ENABLE_PUSH
                100,       // MAX_CONCURRENT_STREAMS
                65535,     // INITIAL_WINDOW_SIZE
                16384,     // MAX_FRAME_SIZE
                u32::MAX,  // MAX_HEADER_LIST_SIZE (unbounded)
            ],
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for a known identifier; 0 for the sentinel or out-of-range ids.
    pub fn get(&self, id: u16) -> u32 {
        if (1..SETTINGS_COUNT as u16).contains(&id) {
            self.values[id as usize]
        } else {
            0
        }
    }

    /// Overwrite a known identifier (local configuration before negotiation).
    /// Unknown identifiers are ignored.
    pub fn set(&mut self, id: u16, value: u32) {
        if (1..SETTINGS_COUNT as u16).contains(&id) {
            self.values[id as usize] = value;
        }
    }

    /// Apply a decoded SETTINGS frame payload from the peer.
    ///
    /// The payload must be a whole number of 6-byte entries; any remainder
    /// is malformed. Unknown identifiers are skipped for forward
    /// compatibility. Returns the number of entries applied. An empty
    /// payload is valid and applies nothing.
    pub fn apply_payload(&mut self, buf: &[u8]) -> Result<usize, SettingsError> {
        if buf.len() % SETTINGS_ENTRY_LEN != 0 {
            return Err(SettingsError::BadLength(buf.len()));
        }

        let mut applied = 0;
        for entry in buf.chunks_exact(SETTINGS_ENTRY_LEN) {
            let id = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            if (1..SETTINGS_COUNT as u16).contains(&id) {
                self.values[id as usize] = value;
                applied += 1;
                debug!("settings {} <- 0x{:x}", id, value);
            } else {
                debug!("ignoring unknown setting {}", id);
            }
        }

        Ok(applied)
    }

    /// Encode every entry whose value differs from the default, in
    /// identifier order. This is the body of the outbound SETTINGS frame;
    /// an all-default table encodes to an empty payload.
    pub fn encode_nondefaults(&self) -> Vec<u8> {
        let defaults = Settings::default();
        let mut out = Vec::new();
        for id in 1..SETTINGS_COUNT as u16 {
            if self.values[id as usize] != defaults.values[id as usize] {
                out.extend_from_slice(&encode_settings_entry(id, self.values[id as usize]));
            }
        }
        out
    }
}

/// Encode one 6-byte settings entry: big-endian identifier, big-endian value.
pub fn encode_settings_entry(id: u16, value: u32) -> [u8; SETTINGS_ENTRY_LEN] {
    let id = id.to_be_bytes();
    let value = value.to_be_bytes();
    [id[0], id[1], value[0], value[1], value[2], value[3]]
}
