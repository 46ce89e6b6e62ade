// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The cooperative I/O pump. Everything here runs on one thread with
// exactly one suspension point: the `poll`/`ppoll` call inside
// `io_loop_do_io`. Nothing in this module blocks anywhere else.

use std::io;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::fd::{self, PollRequest};
use crate::framer;
use crate::ring::RingBuf;
use crate::scheduler;

/// Put every channel's fd in non-blocking mode. Call once before the first
/// turn of the pump.
pub fn io_loop_init(engine: &mut Engine) -> Result<(), EngineError> {
    for i in 0..engine.nrch() {
        if let Some(fd) = engine.channel(i).raw_fd() {
            fd::set_nonblocking(fd).map_err(EngineError::System)?;
        }
    }
    Ok(())
}

fn collect_poll_requests(engine: &mut Engine) {
    engine.poll_requests.clear();
    for (i, ch) in engine.ch.iter().enumerate() {
        if let Some(interest) = ch.poll_interest() {
            let fd = ch.raw_fd().expect("poll_interest implies an open fd");
            engine.poll_requests.push(PollRequest {
                chno: i,
                fd,
                interest,
            });
        }
    }
}

/// Block in `poll` until some fd is ready, then service every ready
/// channel's fd exactly once. A no-op (no poll call at all) if nothing has
/// any interest left — e.g. every channel is closed and drained.
pub fn io_loop_do_io(engine: &mut Engine) -> Result<(), EngineError> {
    collect_poll_requests(engine);
    if engine.poll_requests.is_empty() {
        return Ok(());
    }
    let ready = fd::poll_with_mask(
        &engine.poll_requests,
        engine.poll_mask.as_ref(),
        &mut engine.poll_scratch,
    )
    .map_err(EngineError::System)?;
    for (chno, revents) in ready {
        engine.channel_mut(chno).service_io(revents)?;
    }
    Ok(())
}

/// Drain every complete message now sitting in the peer-inbound ring, then
/// run the outbound scheduler once. Call after `io_loop_do_io` on every
/// turn.
pub fn io_loop_pump(engine: &mut Engine) -> Result<(), EngineError> {
    loop {
        let header = match framer::detect_msg(engine.peer_in().rb())? {
            Some(h) => h,
            None => break,
        };
        engine.dispatch_one(header)?;
    }
    scheduler::run(engine)
}

/// Run the pump to completion: every user channel has announced EOF to the
/// peer and nothing remains queued for the transport. Suitable as the
/// top-level driver for a caller with no other work to interleave; a
/// caller embedding the pump in a larger event loop instead calls
/// `io_loop_init` once and `io_loop_do_io`/`io_loop_pump` per turn itself.
pub fn run_until_drained(engine: &mut Engine) -> Result<(), EngineError> {
    io_loop_init(engine)?;
    while !engine.all_user_channels_drained() {
        io_loop_do_io(engine)?;
        io_loop_pump(engine)?;
    }
    Ok(())
}

/// A blocking byte source, used only by `read_msg` to pull a message off
/// the wire before the non-blocking pump has started — e.g. during a
/// handshake that happens synchronously ahead of the main loop.
pub trait BlockingReader {
    fn read_blocking(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Block on `reader` until a complete message has accumulated in `rb`,
/// returning its header without consuming it (consumption is the
/// dispatcher's job, same as in the non-blocking path).
pub fn read_msg<R: BlockingReader>(
    reader: &mut R,
    rb: &mut RingBuf,
) -> Result<crate::wire::MsgHeader, EngineError> {
    loop {
        if let Some(header) = framer::detect_msg(rb)? {
            return Ok(header);
        }
        let mut tmp = [0u8; 4096];
        let room = rb.room();
        if room == 0 {
            return Err(EngineError::protocol("message too large for the ring"));
        }
        let want = room.min(tmp.len());
        let n = reader
            .read_blocking(&mut tmp[..want])
            .map_err(EngineError::System)?;
        if n == 0 {
            return Err(EngineError::protocol(
                "peer closed before a complete message arrived",
            ));
        }
        rb.push_segments(&[&tmp[..n]])?;
    }
}

/// Inject a fully pre-framed message (header plus body, any kind) straight
/// into the peer-outbound ring, ahead of whatever the ordinary scheduler
/// would have queued next. Used for control messages that must not be split
/// across turns and must not race with ordinary `CHANNEL_DATA` ordering,
/// such as a locally synthesized `CHANNEL_CLOSE` sent out of band.
///
/// Pumps the ordinary I/O loop until there's room for the whole message,
/// then appends it with one `push_segments` call so it lands intact.
pub fn queue_message_synch(engine: &mut Engine, msg: &[u8]) -> Result<(), EngineError> {
    while engine.max_outgoing_msg().min(engine.peer_out_mut().rb().room() as u32) < msg.len() as u32
    {
        io_loop_do_io(engine)?;
        io_loop_pump(engine)?;
    }
    engine.peer_out_mut().rb_mut().push_segments(&[msg])
}
