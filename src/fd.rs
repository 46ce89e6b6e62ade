// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Non-blocking file descriptor ownership and the poll/signal-mask
// plumbing behind the engine's single suspension point.

use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;

/// A reference-counted, close-on-last-drop file descriptor.
///
/// Reference-counted (not exclusively owned) so the two transport
/// channels (`FROM_PEER`, `TO_PEER`) can share a single duplex fd — e.g.
/// a Unix socket used for both halves — without a double-close race. A
/// user channel with its own dedicated fd (e.g. a shell's stdout pipe)
/// simply has a single clone.
#[derive(Clone)]
pub struct FdHandle(Rc<RawFdGuard>);

struct RawFdGuard(RawFd);

impl Drop for RawFdGuard {
    fn drop(&mut self) {
        if self.0 >= 0 {
            unsafe { libc::close(self.0) };
        }
    }
}

impl FdHandle {
    /// Take ownership of a raw fd. The fd is closed when the last
    /// `FdHandle` referencing it is dropped.
    pub fn new(fd: RawFd) -> Self {
        Self(Rc::new(RawFdGuard(fd)))
    }

    pub fn raw(&self) -> RawFd {
        self.0 .0
    }

    pub fn set_nonblocking(&self) -> io::Result<()> {
        set_nonblocking(self.raw())
    }
}

pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// A POSIX signal mask applied atomically around the engine's blocking
/// poll, so a signal handler can set a flag without the syscall racing
/// the window between "check the flag" and "call poll".
#[derive(Clone)]
pub struct SigMask(libc::sigset_t);

impl SigMask {
    /// A mask that blocks nothing — equivalent to not supplying one.
    pub fn empty() -> Self {
        let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
        unsafe { libc::sigemptyset(&mut set) };
        Self(set)
    }

    /// A mask with exactly the given signals blocked during poll.
    pub fn blocking(signals: &[libc::c_int]) -> Self {
        let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
        unsafe { libc::sigemptyset(&mut set) };
        for &sig in signals {
            unsafe { libc::sigaddset(&mut set, sig) };
        }
        Self(set)
    }

    fn as_ptr(&self) -> *const libc::sigset_t {
        &self.0
    }
}

/// One readiness bit set, as requested by `Channel::poll_interest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterest {
    pub readable: bool,
    pub writable: bool,
}

impl PollInterest {
    fn events(&self) -> libc::c_short {
        let mut e = 0;
        if self.readable {
            e |= libc::POLLIN;
        }
        if self.writable {
            e |= libc::POLLOUT;
        }
        e as libc::c_short
    }
}

/// One fd's readiness request, paired with the channel index it belongs to
/// so `io_loop_do_io` can route the result back after `poll` returns.
pub(crate) struct PollRequest {
    pub chno: usize,
    pub fd: RawFd,
    pub interest: PollInterest,
}

/// Readiness bits observed for one fd after a poll call returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Revents {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

/// Block in `poll(2)` (or `ppoll(2)` where available) until at least one
/// of `requests` is ready, with `mask` applied for the duration of the
/// call. Swallows `EINTR`; any other failure is returned to the caller
/// (the engine treats it as a fatal system error).
///
/// `scratch` is reused across calls so the pump never allocates per turn.
pub(crate) fn poll_with_mask(
    requests: &[PollRequest],
    mask: Option<&SigMask>,
    scratch: &mut Vec<libc::pollfd>,
) -> io::Result<Vec<(usize, Revents)>> {
    scratch.clear();
    scratch.reserve(requests.len());
    for req in requests {
        scratch.push(libc::pollfd {
            fd: req.fd,
            events: req.interest.events(),
            revents: 0,
        });
    }

    loop {
        let ret = ppoll_or_poll(scratch, mask);
        if ret >= 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(err);
    }

    let mut out = Vec::with_capacity(requests.len());
    for (req, pfd) in requests.iter().zip(scratch.iter()) {
        if pfd.revents != 0 {
            out.push((
                req.chno,
                Revents {
                    readable: pfd.revents & libc::POLLIN != 0,
                    writable: pfd.revents & libc::POLLOUT != 0,
                    error: pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0,
                },
            ));
        }
    }
    Ok(out)
}

#[cfg(target_os = "linux")]
fn ppoll_or_poll(fds: &mut [libc::pollfd], mask: Option<&SigMask>) -> libc::c_int {
    let mask_ptr = mask.map(|m| m.as_ptr()).unwrap_or(std::ptr::null());
    unsafe { libc::ppoll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, std::ptr::null(), mask_ptr) }
}

/// Non-Linux Unix fallback: `ppoll` isn't universally available, so the
/// signal mask is swapped in with `pthread_sigmask`, `poll` is called, and
/// the previous mask is restored. This leaves a small window between the
/// mask swap and entering the syscall where a signal could still be
/// blocked one instruction too long; real `ppoll` closes it atomically.
#[cfg(not(target_os = "linux"))]
fn ppoll_or_poll(fds: &mut [libc::pollfd], mask: Option<&SigMask>) -> libc::c_int {
    let Some(mask) = mask else {
        return unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
    };
    unsafe {
        let mut old: libc::sigset_t = std::mem::zeroed();
        libc::pthread_sigmask(libc::SIG_SETMASK, mask.as_ptr(), &mut old);
        let ret = libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1);
        libc::pthread_sigmask(libc::SIG_SETMASK, &old, std::ptr::null_mut());
        ret
    }
}
