// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Outbound scheduler: decides what goes into the peer-outbound ring this
// turn. Runs as four ordered steps over the user channels (the transport
// channels FROM_PEER/TO_PEER never participate — there is no sense in
// acking or flow-controlling the wire channel to itself).
//
//   1. xmit_acks  — grant the peer more window for bytes we've drained
//   2. xmit_data  — spend our own window sending buffered channel data
//   3. do_pending_close — close fds the caller asked to close, once drained
//   4. xmit_eof   — tell the peer about channels whose fd is now gone

use crate::channel::Dir;
use crate::engine::{Engine, NR_SPECIAL_CH, TO_PEER};
use crate::error::EngineError;
use crate::ring::copy_ring_to_ring;
use crate::wire;

pub(crate) fn run(engine: &mut Engine) -> Result<(), EngineError> {
    xmit_acks(engine)?;
    xmit_data(engine)?;
    do_pending_close(engine);
    xmit_eof(engine)?;
    Ok(())
}

fn xmit_acks(engine: &mut Engine) -> Result<(), EngineError> {
    let max_outgoing_msg = engine.max_outgoing_msg() as usize;
    for i in NR_SPECIAL_CH + 1..engine.nrch() {
        let ack = engine.ch[i].bytes_written;
        if ack == 0 {
            continue;
        }
        let room = engine.ch[TO_PEER].rb().room().min(max_outgoing_msg);
        if room < wire::WINDOW_MSG_SIZE {
            continue;
        }
        let msg = wire::encode_channel_window(i as u32, ack);
        engine.ch[TO_PEER].rb_mut().push_segments(&[&msg])?;
        engine.ch[i].bytes_written = 0;
    }
    Ok(())
}

fn xmit_data(engine: &mut Engine) -> Result<(), EngineError> {
    let max_outgoing_msg = engine.max_outgoing_msg();
    for i in NR_SPECIAL_CH + 1..engine.nrch() {
        if engine.ch[i].dir() != Dir::FromFd {
            continue;
        }
        loop {
            let size = engine.ch[i].rb().size();
            let window = engine.ch[i].window();
            if size == 0 || window == 0 {
                break;
            }
            let peer_room = engine.ch[TO_PEER].rb().room();
            let payloadsz = max_emit(size, window, max_outgoing_msg, peer_room);
            if payloadsz == 0 {
                break;
            }

            let header = wire::encode_data_header(i as u32, payloadsz);
            engine.ch[TO_PEER].rb_mut().push_segments(&[&header])?;

            let (left, right) = engine.ch.split_at_mut(i);
            copy_ring_to_ring(right[0].rb_mut(), left[TO_PEER].rb_mut(), payloadsz)?;
            engine.ch[i].window -= payloadsz as u32;
        }
    }
    Ok(())
}

fn do_pending_close(engine: &mut Engine) {
    for i in NR_SPECIAL_CH + 1..engine.nrch() {
        let ch = &mut engine.ch[i];
        if ch.pending_close && ch.fdh.is_some() && ch.rb.is_empty() {
            ch.channel_close();
        }
    }
}

fn xmit_eof(engine: &mut Engine) -> Result<(), EngineError> {
    let max_outgoing_msg = engine.max_outgoing_msg() as usize;
    for i in NR_SPECIAL_CH + 1..engine.nrch() {
        let ready = {
            let ch = &engine.ch[i];
            ch.fdh.is_none() && !ch.sent_eof && ch.rb.is_empty()
        };
        if !ready {
            continue;
        }
        let room = engine.ch[TO_PEER].rb().room().min(max_outgoing_msg);
        if room < wire::CLOSE_MSG_SIZE {
            continue;
        }
        let msg = wire::encode_channel_close(i as u32);
        engine.ch[TO_PEER].rb_mut().push_segments(&[&msg])?;
        engine.ch[i].sent_eof = true;
        log::debug!("channel {i} sent_eof");
    }
    Ok(())
}

/// How many bytes of CHANNEL_DATA payload can be emitted this turn, given
/// what's buffered, the sender's remaining window, the largest message the
/// peer will accept, and the room left in the outbound ring for the fixed
/// header plus payload.
fn max_emit(channel_size: usize, window: u32, max_outgoing_msg: u32, peer_out_room: usize) -> usize {
    let header_budget = (max_outgoing_msg as usize).saturating_sub(wire::DATA_HDR_SIZE);
    let ring_budget = peer_out_room.saturating_sub(wire::DATA_HDR_SIZE);
    channel_size.min(window as usize).min(header_budget).min(ring_budget)
}
