// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-capacity byte FIFO backing every channel and the two peer-facing
// transport channels. A single contiguous heap allocation sized once at
// construction and never reallocated; reads and writes wrap around the
// end, so scatter/gather views need at most two segments.

use crate::error::EngineError;

/// A read-only scatter/gather view into a ring's readable bytes.
pub enum Segments<'a> {
    One(&'a [u8]),
    Two(&'a [u8], &'a [u8]),
}

/// A write-only scatter/gather view into a ring's writable bytes.
pub enum SegmentsMut<'a> {
    One(&'a mut [u8]),
    Two(&'a mut [u8], &'a mut [u8]),
}

/// A fixed-capacity circular byte buffer.
pub struct RingBuf {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

impl RingBuf {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: vec![0u8; cap].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently readable.
    pub fn size(&self) -> usize {
        self.len
    }

    /// Bytes currently writable.
    pub fn room(&self) -> usize {
        self.buf.len() - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    fn tail(&self) -> usize {
        let cap = self.buf.len();
        if cap == 0 {
            0
        } else {
            (self.head + self.len) % cap
        }
    }

    /// Copy the first `n` readable bytes into `dst` without consuming them.
    pub fn copy_out(&self, dst: &mut [u8]) -> Result<(), EngineError> {
        let n = dst.len();
        if n > self.len {
            log::error!("copy_out: requested {n} bytes but only {} available", self.len);
            return Err(EngineError::protocol(format!(
                "copy_out: requested {n} bytes but only {} available",
                self.len
            )));
        }
        match self.readable_iov(n) {
            Segments::One(a) => dst.copy_from_slice(a),
            Segments::Two(a, b) => {
                dst[..a.len()].copy_from_slice(a);
                dst[a.len()..].copy_from_slice(b);
            }
        }
        Ok(())
    }

    /// Scatter/gather view over the first `n` readable bytes, without consuming.
    pub fn readable_iov(&self, n: usize) -> Segments<'_> {
        debug_assert!(n <= self.len);
        let cap = self.buf.len();
        if cap == 0 || n == 0 {
            return Segments::One(&[]);
        }
        let first = (cap - self.head).min(n);
        if first >= n {
            Segments::One(&self.buf[self.head..self.head + n])
        } else {
            Segments::Two(&self.buf[self.head..cap], &self.buf[..n - first])
        }
    }

    /// Advance the read cursor past `n` bytes (they must already have been
    /// observed via `copy_out`/`readable_iov`).
    pub fn note_removed(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        let cap = self.buf.len();
        self.head = if cap == 0 { 0 } else { (self.head + n) % cap };
        self.len -= n;
    }

    /// Scatter/gather view over the next `n` writable bytes.
    pub fn writable_iov_mut(&mut self, n: usize) -> SegmentsMut<'_> {
        debug_assert!(n <= self.room());
        let cap = self.buf.len();
        if cap == 0 || n == 0 {
            return SegmentsMut::One(&mut []);
        }
        let tail = self.tail();
        let first = (cap - tail).min(n);
        if first >= n {
            SegmentsMut::One(&mut self.buf[tail..tail + n])
        } else {
            let (back, front) = self.buf.split_at_mut(tail);
            SegmentsMut::Two(&mut front[..], &mut back[..n - first])
        }
    }

    /// Commit `n` bytes previously filled via `writable_iov_mut`.
    pub fn note_added(&mut self, n: usize) {
        debug_assert!(n <= self.room());
        self.len += n;
    }

    /// Append several slices back-to-back. Fails (leaving the ring
    /// unmodified) if they don't all fit.
    pub fn push_segments(&mut self, segments: &[&[u8]]) -> Result<(), EngineError> {
        let total: usize = segments.iter().map(|s| s.len()).sum();
        if total > self.room() {
            log::error!(
                "push_segments: {total} bytes do not fit in {} bytes of room",
                self.room()
            );
            return Err(EngineError::protocol(format!(
                "push_segments: {total} bytes do not fit in {} bytes of room",
                self.room()
            )));
        }
        for seg in segments {
            let mut remaining = *seg;
            while !remaining.is_empty() {
                match self.writable_iov_mut(remaining.len().min(self.room())) {
                    SegmentsMut::One(dst) => {
                        let n = dst.len();
                        dst.copy_from_slice(&remaining[..n]);
                        self.note_added(n);
                        remaining = &remaining[n..];
                    }
                    SegmentsMut::Two(a, b) => {
                        a.copy_from_slice(&remaining[..a.len()]);
                        let n_a = a.len();
                        let n_b = b.len().min(remaining.len() - n_a);
                        b[..n_b].copy_from_slice(&remaining[n_a..n_a + n_b]);
                        self.note_added(n_a + n_b);
                        remaining = &remaining[n_a + n_b..];
                    }
                }
            }
        }
        Ok(())
    }
}

/// Copy exactly `n` bytes from `src`'s front into `dst`, consuming from
/// `src` and committing into `dst`, without ever materialising an
/// intermediate buffer on the heap or the stack.
pub fn copy_ring_to_ring(src: &mut RingBuf, dst: &mut RingBuf, n: usize) -> Result<(), EngineError> {
    if n > src.size() {
        log::error!(
            "copy_ring_to_ring: source only has {} of {n} requested bytes",
            src.size()
        );
        return Err(EngineError::protocol(format!(
            "copy_ring_to_ring: source only has {} of {n} requested bytes",
            src.size()
        )));
    }
    if n > dst.room() {
        log::error!("window desync: copy_ring_to_ring needs {n} bytes of room but dst has {}", dst.room());
        return Err(EngineError::protocol("window desync"));
    }
    let src_segs = src.readable_iov(n);
    match src_segs {
        Segments::One(s) => copy_into(dst, s),
        Segments::Two(a, b) => {
            copy_into(dst, a);
            copy_into(dst, b);
        }
    }
    src.note_removed(n);
    Ok(())
}

fn copy_into(dst: &mut RingBuf, mut src: &[u8]) {
    while !src.is_empty() {
        match dst.writable_iov_mut(src.len()) {
            SegmentsMut::One(d) => {
                let n = d.len();
                d.copy_from_slice(&src[..n]);
                dst.note_added(n);
                src = &src[n..];
            }
            SegmentsMut::Two(a, b) => {
                a.copy_from_slice(&src[..a.len()]);
                let n_a = a.len();
                let n_b = b.len().min(src.len() - n_a);
                b[..n_b].copy_from_slice(&src[n_a..n_a + n_b]);
                dst.note_added(n_a + n_b);
                src = &src[n_a + n_b..];
            }
        }
    }
}
