// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Pure functions over the peer-inbound ring that detect a complete message
// boundary without consuming anything. Never blocks, never allocates.

use crate::error::EngineError;
use crate::ring::RingBuf;
use crate::wire::{MsgHeader, HEADER_SIZE};

/// Look for a complete message at the front of `rb`.
///
/// Returns `Ok(None)` if not enough bytes have arrived yet. Returns
/// `Err` if the declared size could never fit in this ring even once
/// fully drained — that peer is unrecoverable.
pub fn detect_msg(rb: &RingBuf) -> Result<Option<MsgHeader>, EngineError> {
    if rb.size() < HEADER_SIZE {
        return Ok(None);
    }
    let mut hdr_bytes = [0u8; HEADER_SIZE];
    rb.copy_out(&mut hdr_bytes)?;
    let header = MsgHeader::decode(&hdr_bytes);

    if header.size as usize > rb.capacity() {
        log::error!(
            "impossibly large message: declared size {} exceeds ring capacity {}",
            header.size,
            rb.capacity()
        );
        return Err(EngineError::protocol("impossibly large message"));
    }
    if rb.size() < header.size as usize {
        return Ok(None);
    }
    Ok(Some(header))
}
