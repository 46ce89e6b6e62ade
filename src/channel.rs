// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A channel binds one ring buffer to an optional non-blocking fd. Direction
// is fixed at construction: TO_FD channels drain their ring into the fd,
// FROM_FD channels fill their ring from the fd. The two transport channels
// (FROM_PEER, TO_PEER) are ordinary channels of this same type, bound to
// the peer transport's read/write fd.

use std::io;
use std::io::{IoSlice, Read, Write};

use crate::error::EngineError;
use crate::fd::{FdHandle, PollInterest, Revents};
use crate::ring::RingBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    /// Sinks bytes from its ring into the fd.
    ToFd,
    /// Sources bytes from the fd into its ring.
    FromFd,
}

pub struct Channel {
    pub(crate) dir: Dir,
    pub(crate) fdh: Option<FdHandle>,
    pub(crate) rb: RingBuf,
    /// FROM_FD only: credit granted by the peer, in bytes we may still send.
    pub(crate) window: u32,
    /// TO_FD only: bytes delivered to the fd since the last window-credit emission.
    pub(crate) bytes_written: u32,
    pub(crate) sent_eof: bool,
    pub(crate) pending_close: bool,
}

impl Channel {
    pub fn new(dir: Dir, fdh: Option<FdHandle>, capacity: usize, initial_window: u32) -> Self {
        Self {
            dir,
            fdh,
            rb: RingBuf::with_capacity(capacity),
            window: initial_window,
            bytes_written: 0,
            sent_eof: false,
            pending_close: false,
        }
    }

    pub fn dir(&self) -> Dir {
        self.dir
    }

    pub fn is_open(&self) -> bool {
        self.fdh.is_some()
    }

    pub fn sent_eof(&self) -> bool {
        self.sent_eof
    }

    pub fn rb(&self) -> &RingBuf {
        &self.rb
    }

    pub fn rb_mut(&mut self) -> &mut RingBuf {
        &mut self.rb
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Saturating-credit the window; overflow is a protocol error.
    pub(crate) fn credit_window(&mut self, delta: u32) -> Result<(), EngineError> {
        match self.window.checked_add(delta) {
            Some(w) => {
                self.window = w;
                Ok(())
            }
            None => Err(EngineError::protocol("window overflow")),
        }
    }

    pub fn request_close(&mut self) {
        self.pending_close = true;
    }

    /// Release the fd, marking the channel locally closed. Idempotent.
    pub(crate) fn channel_close(&mut self) {
        if self.fdh.take().is_some() {
            log::debug!("channel fd released");
        }
    }

    /// What this channel wants from the next poll, or `None` if it has
    /// nothing to wait on (fd already closed, or nothing pending).
    pub(crate) fn poll_interest(&self) -> Option<PollInterest> {
        self.fdh.as_ref()?;
        match self.dir {
            Dir::FromFd => Some(PollInterest {
                readable: true,
                writable: false,
            }),
            Dir::ToFd => {
                if self.rb.is_empty() {
                    None
                } else {
                    Some(PollInterest {
                        readable: false,
                        writable: true,
                    })
                }
            }
        }
    }

    pub(crate) fn raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        self.fdh.as_ref().map(|h| h.raw())
    }

    /// Service one fd readiness notification: read as much as fits for a
    /// FROM_FD channel, or write as much as is queued for a TO_FD channel.
    /// Non-blocking; loops until `EAGAIN`/`EWOULDBLOCK`, EOF, or the ring
    /// is exhausted in the relevant direction.
    pub(crate) fn service_io(&mut self, revents: Revents) -> Result<(), EngineError> {
        match self.dir {
            Dir::FromFd => self.service_read(revents),
            Dir::ToFd => self.service_write(revents),
        }
    }

    fn service_read(&mut self, _revents: Revents) -> Result<(), EngineError> {
        loop {
            let room = self.rb.room();
            if room == 0 {
                return Ok(());
            }
            let Some(fd) = self.raw_fd() else { return Ok(()) };
            let mut fd_src = BorrowedFd(fd);
            let result = match self.rb.writable_iov_mut(room) {
                crate::ring::SegmentsMut::One(s) => fd_src.read(s),
                crate::ring::SegmentsMut::Two(a, b) => fd_src.readv(a, b),
            };
            match result {
                Ok(0) => {
                    log::debug!("channel fd read EOF");
                    self.channel_close();
                    return Ok(());
                }
                Ok(n) => {
                    self.rb.note_added(n);
                    if n < room {
                        // Short read: the fd has no more data queued right
                        // now. Stop for this turn.
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EngineError::System(e)),
            }
        }
    }

    fn service_write(&mut self, _revents: Revents) -> Result<(), EngineError> {
        loop {
            let size = self.rb.size();
            if size == 0 {
                return Ok(());
            }
            let Some(fd) = self.raw_fd() else { return Ok(()) };
            let mut fd_dst = BorrowedFd(fd);
            let written = match self.rb.readable_iov(size) {
                crate::ring::Segments::One(a) => fd_dst.write(a),
                crate::ring::Segments::Two(a, b) => {
                    let iov = [IoSlice::new(a), IoSlice::new(b)];
                    fd_dst.write_vectored(&iov)
                }
            };
            match written {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    self.rb.note_removed(n);
                    self.bytes_written = self.bytes_written.saturating_add(n as u32);
                    if n < size {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EngineError::System(e)),
            }
        }
    }
}

/// A raw fd wrapped just long enough to use the `Read`/`Write` impls from
/// `std::io` without taking ownership (the fd is owned by `FdHandle`).
struct BorrowedFd(std::os::unix::io::RawFd);

impl Read for BorrowedFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.0, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}

impl BorrowedFd {
    /// Vectored read into two non-contiguous segments (a ring's wraparound
    /// write view), via a single `readv(2)` call.
    fn readv(&mut self, a: &mut [u8], b: &mut [u8]) -> io::Result<usize> {
        let iov = [
            libc::iovec {
                iov_base: a.as_mut_ptr() as *mut libc::c_void,
                iov_len: a.len(),
            },
            libc::iovec {
                iov_base: b.as_mut_ptr() as *mut libc::c_void,
                iov_len: b.len(),
            },
        ];
        let n = unsafe { libc::readv(self.0, iov.as_ptr(), iov.len() as libc::c_int) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}

impl Write for BorrowedFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(self.0, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let n = unsafe {
            libc::writev(
                self.0,
                bufs.as_ptr() as *const libc::iovec,
                bufs.len() as libc::c_int,
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
