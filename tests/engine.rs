// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// End-to-end exercises of the engine's public surface: real pipe fds for
// channel I/O, and a manual ring-to-ring copy standing in for the peer
// transport fd (so these tests never block in `poll` waiting on a
// transport byte that nothing will ever produce).

use std::os::unix::io::RawFd;

use chanmux_core::{
    copy_ring_to_ring, encode_data_header, io_loop_do_io, io_loop_pump, ChannelConfig, Dir,
    Engine, EngineConfig, EngineError, CLOSE_MSG_SIZE, DATA_HDR_SIZE, FROM_PEER, TO_PEER,
    WINDOW_MSG_SIZE,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn make_pipe() -> (RawFd, RawFd) {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(ret, 0, "pipe(2) failed: {:?}", std::io::Error::last_os_error());
    (fds[0], fds[1])
}

fn write_all(fd: RawFd, data: &[u8]) {
    let n = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
    assert_eq!(n as usize, data.len());
}

fn close_fd(fd: RawFd) {
    unsafe { libc::close(fd) };
}

fn read_up_to(fd: RawFd, want: usize) -> Vec<u8> {
    let mut buf = vec![0u8; want];
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    assert!(n >= 0, "read(2) failed: {:?}", std::io::Error::last_os_error());
    buf.truncate(n as usize);
    buf
}

/// Both engines below use fd `-1` for the peer transport. `poll(2)`
/// ignores negative fds entirely (revents always zero), so these never
/// actually go over a wire; tests move bytes between the two engines'
/// transport rings directly with `copy_ring_to_ring`.
fn config_with_user_channel(ch: ChannelConfig) -> EngineConfig {
    EngineConfig {
        transport_read_fd: -1,
        transport_write_fd: -1,
        transport_ring_capacity: 4096,
        max_outgoing_msg: 256,
        poll_mask: None,
        user_channels: vec![ch],
    }
}

#[test]
fn happy_echo_roundtrip() {
    init_logging();
    let (src_r, src_w) = make_pipe();
    let (dst_r, dst_w) = make_pipe();

    let mut a = Engine::new(config_with_user_channel(ChannelConfig {
        dir: Dir::FromFd,
        fd: Some(src_r),
        capacity: 4096,
        initial_window: 4096,
    }))
    .unwrap();
    let mut b = Engine::new(config_with_user_channel(ChannelConfig {
        dir: Dir::ToFd,
        fd: Some(dst_w),
        capacity: 4096,
        initial_window: 0,
    }))
    .unwrap();

    write_all(src_w, b"hello, world!");

    io_loop_do_io(&mut a).unwrap();
    io_loop_pump(&mut a).unwrap();

    let n = a.channel(TO_PEER).rb().size();
    assert!(n > 0, "channel 2's bytes should have been framed onto the wire");
    copy_ring_to_ring(a.channel_mut(TO_PEER).rb_mut(), b.channel_mut(FROM_PEER).rb_mut(), n).unwrap();

    io_loop_pump(&mut b).unwrap();
    assert_eq!(b.channel(2).rb().size(), 13, "payload should have landed in channel 2's ring");

    io_loop_do_io(&mut b).unwrap();
    let echoed = read_up_to(dst_r, 32);
    assert_eq!(echoed, b"hello, world!");

    close_fd(src_w);
    close_fd(dst_r);
}

#[test]
fn acks_batch_multiple_arrivals_into_one_window_message() {
    init_logging();
    let (dst_r, dst_w) = make_pipe();
    let mut b = Engine::new(config_with_user_channel(ChannelConfig {
        dir: Dir::ToFd,
        fd: Some(dst_w),
        capacity: 4096,
        initial_window: 0,
    }))
    .unwrap();

    for payload in [&b"aa"[..], &b"bbb"[..], &b"cccc"[..]] {
        let hdr = encode_data_header(2, payload.len());
        b.channel_mut(FROM_PEER)
            .rb_mut()
            .push_segments(&[&hdr, payload])
            .unwrap();
    }

    // All three CHANNEL_DATA messages are already queued before the first
    // turn, so one pump drains all three into channel 2's ring in a single
    // pass, and one fd service call flushes them in one write.
    io_loop_pump(&mut b).unwrap();
    assert_eq!(b.channel(2).rb().size(), 2 + 3 + 4);

    io_loop_do_io(&mut b).unwrap();
    io_loop_pump(&mut b).unwrap();

    assert_eq!(
        b.channel(TO_PEER).rb().size(),
        WINDOW_MSG_SIZE,
        "three arrivals should collapse into a single CHANNEL_WINDOW message"
    );
    let _ = read_up_to(dst_r, 16);
}

#[test]
fn graceful_close_drains_then_emits_channel_close() {
    init_logging();
    let (src_r, src_w) = make_pipe();
    let mut a = Engine::new(config_with_user_channel(ChannelConfig {
        dir: Dir::FromFd,
        fd: Some(src_r),
        capacity: 4096,
        initial_window: 4096,
    }))
    .unwrap();

    write_all(src_w, b"last words");
    close_fd(src_w);

    // The first service call drains the payload (a short read, so it
    // returns without trying again this turn); the second observes EOF
    // and releases the fd.
    io_loop_do_io(&mut a).unwrap();
    io_loop_do_io(&mut a).unwrap();
    assert!(!a.channel(2).is_open());

    // The scheduler must flush the already-buffered payload before it is
    // allowed to announce EOF for the channel.
    io_loop_pump(&mut a).unwrap();

    assert!(a.channel(2).sent_eof());
    let expected = DATA_HDR_SIZE + "last words".len() + CLOSE_MSG_SIZE;
    assert_eq!(a.channel(TO_PEER).rb().size(), expected);
}

#[test]
fn channel_data_for_out_of_range_channel_is_protocol_error() {
    init_logging();
    let mut engine = Engine::new(EngineConfig {
        transport_read_fd: -1,
        transport_write_fd: -1,
        transport_ring_capacity: 4096,
        max_outgoing_msg: 256,
        poll_mask: None,
        user_channels: vec![ChannelConfig {
            dir: Dir::ToFd,
            fd: None,
            capacity: 64,
            initial_window: 0,
        }],
    })
    .unwrap();

    let hdr = encode_data_header(9, 3);
    engine
        .channel_mut(FROM_PEER)
        .rb_mut()
        .push_segments(&[&hdr, b"abc"])
        .unwrap();

    let err = io_loop_pump(&mut engine).unwrap_err();
    assert!(matches!(err, EngineError::Protocol(_)));
    assert!(format!("{err}").contains("out of range") || format!("{err}").contains("out-of-range"));
}

#[test]
fn impossibly_large_declared_size_is_rejected() {
    init_logging();
    let mut engine = Engine::new(config_with_user_channel(ChannelConfig {
        dir: Dir::ToFd,
        fd: None,
        capacity: 64,
        initial_window: 0,
    }))
    .unwrap();

    // A header whose declared size exceeds the ring's total capacity can
    // never be satisfied no matter how long we wait for more bytes.
    let bogus = chanmux_core::MsgHeader { kind: chanmux_core::MsgKind::CHANNEL_DATA.0, size: 60000 };
    engine
        .channel_mut(FROM_PEER)
        .rb_mut()
        .push_segments(&[&bogus.encode()])
        .unwrap();

    let err = io_loop_pump(&mut engine).unwrap_err();
    assert!(format!("{err}").contains("impossibly large message"));
}

#[test]
fn channel_data_exceeding_room_is_window_desync() {
    init_logging();
    let (dst_r, dst_w) = make_pipe();
    let mut engine = Engine::new(config_with_user_channel(ChannelConfig {
        dir: Dir::ToFd,
        fd: Some(dst_w),
        capacity: 8,
        initial_window: 0,
    }))
    .unwrap();

    // A payload bigger than the channel's whole ring can never be
    // delivered no matter what; the peer has desynced its view of our
    // window.
    let payload = vec![0xabu8; 64];
    let hdr = encode_data_header(2, payload.len());
    engine
        .channel_mut(FROM_PEER)
        .rb_mut()
        .push_segments(&[&hdr, &payload])
        .unwrap();

    let err = io_loop_pump(&mut engine).unwrap_err();
    assert!(format!("{err}").contains("window desync"));
    close_fd(dst_r);
}

#[test]
fn channel_data_for_already_closed_channel_is_silently_discarded() {
    init_logging();
    let mut engine = Engine::new(config_with_user_channel(ChannelConfig {
        dir: Dir::ToFd,
        fd: None,
        capacity: 64,
        initial_window: 0,
    }))
    .unwrap();
    assert!(!engine.channel(2).is_open());

    let hdr = encode_data_header(2, 3);
    engine
        .channel_mut(FROM_PEER)
        .rb_mut()
        .push_segments(&[&hdr, b"abc"])
        .unwrap();

    // No fd means the channel was already closed locally before the peer
    // learned about it; the payload is dropped, not treated as an error.
    io_loop_pump(&mut engine).unwrap();
    assert_eq!(engine.channel(2).rb().size(), 0);
}

#[test]
fn receiving_channel_close_twice_is_benign() {
    init_logging();
    let (src_r, src_w) = make_pipe();
    let mut engine = Engine::new(config_with_user_channel(ChannelConfig {
        dir: Dir::FromFd,
        fd: Some(src_r),
        capacity: 64,
        initial_window: 64,
    }))
    .unwrap();

    let close1 = chanmux_core::encode_channel_close(2);
    let close2 = chanmux_core::encode_channel_close(2);
    engine
        .channel_mut(FROM_PEER)
        .rb_mut()
        .push_segments(&[&close1])
        .unwrap();
    io_loop_pump(&mut engine).unwrap();
    assert!(!engine.channel(2).is_open());
    assert!(engine.channel(2).sent_eof());

    engine
        .channel_mut(FROM_PEER)
        .rb_mut()
        .push_segments(&[&close2])
        .unwrap();
    io_loop_pump(&mut engine).unwrap();
    assert!(!engine.channel(2).is_open());
    assert!(engine.channel(2).sent_eof());
    close_fd(src_w);
}
