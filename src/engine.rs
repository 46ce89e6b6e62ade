// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The engine: a fixed array of channels plus the configuration and
// polymorphic dispatcher hook the pump and scheduler operate against.

use std::os::unix::io::RawFd;

use crate::channel::{Channel, Dir};
use crate::dispatch::{CoreDispatcher, MessageHandler};
use crate::error::EngineError;
use crate::fd::{FdHandle, SigMask};
use crate::wire;

/// Index of the channel whose ring holds bytes read from the peer transport.
pub const FROM_PEER: usize = 0;
/// Index of the channel whose ring holds bytes waiting to be written to the peer transport.
pub const TO_PEER: usize = 1;
/// Highest channel index reserved for transport bookkeeping. User channels are `> NR_SPECIAL_CH`.
pub const NR_SPECIAL_CH: usize = TO_PEER;

/// Per-user-channel construction parameters.
pub struct ChannelConfig {
    pub dir: Dir,
    pub fd: Option<RawFd>,
    pub capacity: usize,
    pub initial_window: u32,
}

/// Everything needed to construct an `Engine`.
pub struct EngineConfig {
    pub transport_read_fd: RawFd,
    pub transport_write_fd: RawFd,
    /// Capacity of both the peer-inbound and peer-outbound rings. Must be
    /// `>= max_outgoing_msg`, or framing could deadlock on a message that
    /// can never fully arrive.
    pub transport_ring_capacity: usize,
    pub max_outgoing_msg: u32,
    pub poll_mask: Option<SigMask>,
    pub user_channels: Vec<ChannelConfig>,
}

pub struct Engine {
    pub(crate) ch: Vec<Channel>,
    max_outgoing_msg: u32,
    pub(crate) poll_mask: Option<SigMask>,
    process_msg: Option<Box<dyn MessageHandler>>,
    pub(crate) poll_scratch: Vec<libc::pollfd>,
    pub(crate) poll_requests: Vec<crate::fd::PollRequest>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        if config.max_outgoing_msg as usize > u16::MAX as usize {
            return Err(EngineError::protocol(format!(
                "max_outgoing_msg {} exceeds the wire's u16 size field",
                config.max_outgoing_msg
            )));
        }
        if config.transport_ring_capacity < config.max_outgoing_msg as usize {
            return Err(EngineError::protocol(
                "transport ring capacity must be >= max_outgoing_msg, or framing can deadlock",
            ));
        }
        if (config.max_outgoing_msg as usize) < wire::WINDOW_MSG_SIZE {
            return Err(EngineError::protocol(format!(
                "max_outgoing_msg {} is too small to carry a CHANNEL_WINDOW message ({} bytes)",
                config.max_outgoing_msg,
                wire::WINDOW_MSG_SIZE
            )));
        }

        let read_fdh = FdHandle::new(config.transport_read_fd);
        let write_fdh = if config.transport_write_fd == config.transport_read_fd {
            read_fdh.clone()
        } else {
            FdHandle::new(config.transport_write_fd)
        };

        let mut ch = Vec::with_capacity(NR_SPECIAL_CH + 1 + config.user_channels.len());
        ch.push(Channel::new(
            Dir::FromFd,
            Some(read_fdh),
            config.transport_ring_capacity,
            0,
        ));
        ch.push(Channel::new(
            Dir::ToFd,
            Some(write_fdh),
            config.transport_ring_capacity,
            0,
        ));
        for cfg in config.user_channels {
            let fdh = cfg.fd.map(FdHandle::new);
            ch.push(Channel::new(cfg.dir, fdh, cfg.capacity, cfg.initial_window));
        }

        Ok(Self {
            ch,
            max_outgoing_msg: config.max_outgoing_msg,
            poll_mask: config.poll_mask,
            process_msg: Some(Box::new(CoreDispatcher)),
            poll_scratch: Vec::new(),
            poll_requests: Vec::new(),
        })
    }

    pub fn nrch(&self) -> usize {
        self.ch.len()
    }

    pub fn max_outgoing_msg(&self) -> u32 {
        self.max_outgoing_msg
    }

    pub fn channel(&self, chno: usize) -> &Channel {
        &self.ch[chno]
    }

    pub fn channel_mut(&mut self, chno: usize) -> &mut Channel {
        &mut self.ch[chno]
    }

    pub fn peer_in(&self) -> &Channel {
        &self.ch[FROM_PEER]
    }

    pub fn peer_in_mut(&mut self) -> &mut Channel {
        &mut self.ch[FROM_PEER]
    }

    pub fn peer_out_mut(&mut self) -> &mut Channel {
        &mut self.ch[TO_PEER]
    }

    /// Install a side-specific dispatcher. It should delegate any message
    /// kind it doesn't itself recognize to a `CoreDispatcher`.
    pub fn set_message_handler(&mut self, handler: Box<dyn MessageHandler>) {
        self.process_msg = Some(handler);
    }

    /// Swap the dispatcher out so it can be called with `&mut self`
    /// without aliasing, then swap it back in.
    pub(crate) fn dispatch_one(&mut self, header: crate::wire::MsgHeader) -> Result<(), EngineError> {
        let mut handler = self
            .process_msg
            .take()
            .expect("process_msg handler missing");
        let result = handler.process(self, header);
        self.process_msg = Some(handler);
        result
    }

    pub fn validate_user_channel(&self, chno: usize) -> Result<(), EngineError> {
        if chno <= NR_SPECIAL_CH || chno >= self.nrch() {
            return Err(EngineError::protocol(format!(
                "channel {chno} out of range"
            )));
        }
        Ok(())
    }

    pub fn request_channel_close(&mut self, chno: usize) -> Result<(), EngineError> {
        self.validate_user_channel(chno)?;
        self.ch[chno].request_close();
        Ok(())
    }

    /// Convenience termination check for the surrounding driver: every
    /// user channel has emitted CHANNEL_CLOSE, and the peer-outbound ring
    /// has nothing left to send.
    pub fn all_user_channels_drained(&self) -> bool {
        self.ch[NR_SPECIAL_CH + 1..].iter().all(|c| c.sent_eof())
            && self.ch[TO_PEER].rb().is_empty()
    }
}
