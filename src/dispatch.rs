// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Inbound message dispatch. `MessageHandler` is the extension seam: a
// caller-supplied handler can intercept message kinds it cares about and
// delegate anything else to `CoreDispatcher`, which implements the three
// kinds this crate understands natively.

use crate::channel::Dir;
use crate::engine::{Engine, FROM_PEER, NR_SPECIAL_CH};
use crate::error::EngineError;
use crate::ring::copy_ring_to_ring;
use crate::wire::{self, MsgHeader, MsgKind};

/// Handles one fully-arrived message at the front of the peer-inbound ring.
///
/// Implementations are responsible for consuming exactly `header.size`
/// bytes from `engine.peer_in_mut().rb_mut()` before returning `Ok`,
/// whether or not they acted on the message — the framer has already
/// confirmed that many bytes are present.
pub trait MessageHandler {
    fn process(&mut self, engine: &mut Engine, header: MsgHeader) -> Result<(), EngineError>;
}

/// The dispatcher installed by default: CHANNEL_DATA, CHANNEL_WINDOW and
/// CHANNEL_CLOSE, per the wire layout in `wire`.
pub struct CoreDispatcher;

impl MessageHandler for CoreDispatcher {
    fn process(&mut self, engine: &mut Engine, header: MsgHeader) -> Result<(), EngineError> {
        match header.kind {
            k if k == MsgKind::CHANNEL_DATA.0 => handle_data(engine, header),
            k if k == MsgKind::CHANNEL_WINDOW.0 => handle_window(engine, header),
            k if k == MsgKind::CHANNEL_CLOSE.0 => handle_close(engine, header),
            k => {
                log::warn!("unknown message kind {k}");
                Err(EngineError::protocol(format!("unknown message kind {k}")))
            }
        }
    }
}

fn handle_data(engine: &mut Engine, header: MsgHeader) -> Result<(), EngineError> {
    if (header.size as usize) < wire::DATA_HDR_SIZE {
        log::warn!("malformed CHANNEL_DATA header: size {} below minimum", header.size);
        return Err(EngineError::protocol("malformed CHANNEL_DATA header"));
    }
    let mut prefix = [0u8; wire::DATA_HDR_SIZE];
    engine.peer_in().rb().copy_out(&mut prefix)?;
    engine.peer_in_mut().rb_mut().note_removed(wire::DATA_HDR_SIZE);

    let channel = wire::decode_channel(&prefix) as usize;
    let payload_len = header.size as usize - wire::DATA_HDR_SIZE;

    if channel <= NR_SPECIAL_CH || channel >= engine.nrch() {
        engine.peer_in_mut().rb_mut().note_removed(payload_len);
        log::warn!("CHANNEL_DATA for out-of-range channel {channel}");
        return Err(EngineError::protocol(format!(
            "CHANNEL_DATA for out-of-range channel {channel}"
        )));
    }

    if engine.channel(channel).dir() != Dir::ToFd {
        engine.peer_in_mut().rb_mut().note_removed(payload_len);
        log::warn!("CHANNEL_DATA targets non-ToFd channel {channel}");
        return Err(EngineError::protocol(format!(
            "CHANNEL_DATA targets non-ToFd channel {channel}"
        )));
    }

    if !engine.channel(channel).is_open() {
        // Peer doesn't yet know we've stopped reading this channel's fd.
        // Drop the payload on the floor but stay in sync with the stream.
        engine.peer_in_mut().rb_mut().note_removed(payload_len);
        return Ok(());
    }

    if engine.channel(channel).rb().room() < payload_len {
        log::error!("window desync on channel {channel}: {payload_len} bytes declared, room exhausted");
        return Err(EngineError::protocol("window desync"));
    }

    let (left, right) = engine.ch.split_at_mut(channel);
    copy_ring_to_ring(left[FROM_PEER].rb_mut(), right[0].rb_mut(), payload_len)
}

fn handle_window(engine: &mut Engine, header: MsgHeader) -> Result<(), EngineError> {
    if header.size as usize != wire::WINDOW_MSG_SIZE {
        log::warn!("malformed CHANNEL_WINDOW size {}", header.size);
        return Err(EngineError::protocol("malformed CHANNEL_WINDOW size"));
    }
    let mut buf = [0u8; wire::WINDOW_MSG_SIZE];
    engine.peer_in().rb().copy_out(&mut buf)?;
    engine.peer_in_mut().rb_mut().note_removed(wire::WINDOW_MSG_SIZE);

    let channel = wire::decode_channel(&buf) as usize;
    if channel <= NR_SPECIAL_CH || channel >= engine.nrch() {
        log::warn!("CHANNEL_WINDOW for out-of-range channel {channel}");
        return Err(EngineError::protocol(format!(
            "CHANNEL_WINDOW for out-of-range channel {channel}"
        )));
    }
    let delta = wire::decode_window_delta(&buf);
    let ch = engine.channel_mut(channel);
    if ch.dir() != Dir::FromFd || !ch.is_open() {
        return Ok(());
    }
    ch.credit_window(delta)
}

fn handle_close(engine: &mut Engine, header: MsgHeader) -> Result<(), EngineError> {
    if header.size as usize != wire::CLOSE_MSG_SIZE {
        log::warn!("malformed CHANNEL_CLOSE size {}", header.size);
        return Err(EngineError::protocol("malformed CHANNEL_CLOSE size"));
    }
    let mut buf = [0u8; wire::CLOSE_MSG_SIZE];
    engine.peer_in().rb().copy_out(&mut buf)?;
    engine.peer_in_mut().rb_mut().note_removed(wire::CLOSE_MSG_SIZE);

    let channel = wire::decode_channel(&buf) as usize;
    if channel <= NR_SPECIAL_CH || channel >= engine.nrch() {
        return Ok(());
    }
    let ch = engine.channel_mut(channel);
    ch.sent_eof = true;
    log::debug!("channel {channel} received CHANNEL_CLOSE, marking sent_eof");
    ch.channel_close();
    Ok(())
}
