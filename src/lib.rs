// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A windowed, multi-channel I/O pump for a framed shell-transport
// protocol. One non-blocking fd carries the wire; an arbitrary number of
// local fds (a shell's stdin/stdout/stderr, a forwarded socket, ...) are
// multiplexed over it as numbered channels with credit-based flow control,
// each backed by a fixed-capacity ring buffer allocated once at
// construction.
//
// The whole engine runs on one thread with a single suspension point: the
// `poll`/`ppoll` call inside [`pump::io_loop_do_io`].

mod channel;
mod dispatch;
mod engine;
mod error;
mod fd;
mod framer;
mod pump;
mod ring;
mod scheduler;
mod wire;

pub use channel::{Channel, Dir};
pub use dispatch::{CoreDispatcher, MessageHandler};
pub use engine::{ChannelConfig, Engine, EngineConfig, FROM_PEER, NR_SPECIAL_CH, TO_PEER};
pub use error::EngineError;
pub use fd::{FdHandle, PollInterest, Revents, SigMask};
pub use pump::{
    io_loop_do_io, io_loop_init, io_loop_pump, queue_message_synch, read_msg, run_until_drained,
    BlockingReader,
};
pub use ring::{copy_ring_to_ring, RingBuf, Segments, SegmentsMut};
pub use wire::{
    decode_channel, decode_window_delta, encode_channel_close, encode_channel_window,
    encode_data_header, MsgHeader, MsgKind, CLOSE_MSG_SIZE, DATA_HDR_SIZE, HEADER_SIZE,
    WINDOW_MSG_SIZE,
};
