// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Wire layout for the three message kinds the core understands. Fixed,
// byte-exact, little-endian; both peers must agree on this layout, it is
// not negotiated on the wire.
//
//   header:          kind: u8, _pad: u8, size: u16   (4 bytes)
//   CHANNEL_DATA:     header + channel: u32 + payload
//   CHANNEL_WINDOW:   header + channel: u32 + window_delta: u32
//   CHANNEL_CLOSE:    header + channel: u32

/// Size of the fixed message header, in bytes.
pub const HEADER_SIZE: usize = 4;

/// Size of the `channel: u32` field that follows the header in every
/// message kind the core understands.
const CHANNEL_FIELD_SIZE: usize = 4;

/// `header + channel` — the fixed prefix of a CHANNEL_DATA message, before
/// the variable-length payload.
pub const DATA_HDR_SIZE: usize = HEADER_SIZE + CHANNEL_FIELD_SIZE;

/// Total fixed size of a CHANNEL_WINDOW message.
pub const WINDOW_MSG_SIZE: usize = HEADER_SIZE + CHANNEL_FIELD_SIZE + 4;

/// Total fixed size of a CHANNEL_CLOSE message.
pub const CLOSE_MSG_SIZE: usize = HEADER_SIZE + CHANNEL_FIELD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgKind(pub u8);

impl MsgKind {
    pub const CHANNEL_DATA: MsgKind = MsgKind(1);
    pub const CHANNEL_WINDOW: MsgKind = MsgKind(2);
    pub const CHANNEL_CLOSE: MsgKind = MsgKind(3);
}

/// A decoded (or about-to-be-encoded) message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    pub kind: u8,
    pub size: u16,
}

impl MsgHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = self.kind;
        out[1] = 0;
        out[2..4].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    /// Decode a header from the first `HEADER_SIZE` bytes of `buf`.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than `HEADER_SIZE`; callers are expected
    /// to have checked occupancy first (see `framer::detect_msg`).
    pub fn decode(buf: &[u8]) -> Self {
        let size = u16::from_le_bytes([buf[2], buf[3]]);
        Self { kind: buf[0], size }
    }
}

/// Build the fixed `header + channel` prefix for a CHANNEL_DATA message of
/// total size `header_struct_size + channel_field + payload_len`.
pub fn encode_data_header(channel: u32, payload_len: usize) -> [u8; DATA_HDR_SIZE] {
    let mut out = [0u8; DATA_HDR_SIZE];
    let hdr = MsgHeader {
        kind: MsgKind::CHANNEL_DATA.0,
        size: (DATA_HDR_SIZE + payload_len) as u16,
    };
    out[..HEADER_SIZE].copy_from_slice(&hdr.encode());
    out[HEADER_SIZE..].copy_from_slice(&channel.to_le_bytes());
    out
}

pub fn encode_channel_window(channel: u32, window_delta: u32) -> [u8; WINDOW_MSG_SIZE] {
    let mut out = [0u8; WINDOW_MSG_SIZE];
    let hdr = MsgHeader {
        kind: MsgKind::CHANNEL_WINDOW.0,
        size: WINDOW_MSG_SIZE as u16,
    };
    out[..HEADER_SIZE].copy_from_slice(&hdr.encode());
    out[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&channel.to_le_bytes());
    out[HEADER_SIZE + 4..].copy_from_slice(&window_delta.to_le_bytes());
    out
}

pub fn encode_channel_close(channel: u32) -> [u8; CLOSE_MSG_SIZE] {
    let mut out = [0u8; CLOSE_MSG_SIZE];
    let hdr = MsgHeader {
        kind: MsgKind::CHANNEL_CLOSE.0,
        size: CLOSE_MSG_SIZE as u16,
    };
    out[..HEADER_SIZE].copy_from_slice(&hdr.encode());
    out[HEADER_SIZE..].copy_from_slice(&channel.to_le_bytes());
    out
}

/// Decode the `channel: u32` field immediately following the header in
/// `buf` (which must hold at least `HEADER_SIZE + 4` bytes).
pub fn decode_channel(buf: &[u8]) -> u32 {
    u32::from_le_bytes([
        buf[HEADER_SIZE],
        buf[HEADER_SIZE + 1],
        buf[HEADER_SIZE + 2],
        buf[HEADER_SIZE + 3],
    ])
}

/// Decode the `window_delta: u32` field of a CHANNEL_WINDOW message.
pub fn decode_window_delta(buf: &[u8]) -> u32 {
    let o = HEADER_SIZE + 4;
    u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let hdr = MsgHeader { kind: 2, size: 300 };
        let bytes = hdr.encode();
        assert_eq!(MsgHeader::decode(&bytes), hdr);
    }

    #[test]
    fn data_header_carries_channel_and_size() {
        let bytes = encode_data_header(7, 5);
        let hdr = MsgHeader::decode(&bytes);
        assert_eq!(hdr.kind, MsgKind::CHANNEL_DATA.0);
        assert_eq!(hdr.size as usize, DATA_HDR_SIZE + 5);
        assert_eq!(decode_channel(&bytes), 7);
    }

    #[test]
    fn window_message_fields() {
        let bytes = encode_channel_window(9, 1024);
        assert_eq!(decode_channel(&bytes), 9);
        assert_eq!(decode_window_delta(&bytes), 1024);
    }
}
