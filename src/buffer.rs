//! Per-connection byte buffer with scatter/gather fill and prependable
//! space reclamation. Mirrors the shape of `examples/original_source` Buffer
//! (read_pos/write_pos over a contiguous `Vec<u8>`), generalized to Rust:
//! the original declares its cursors atomic, but one-shot dispatch already
//! excludes concurrent access, so plain `usize` is enough here.

use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::os::fd::AsRawFd;

const INIT_CAP: usize = 1024;
const SCRATCH_SIZE: usize = 65536;

/// Growable byte window with independent read and write cursors.
///
/// Invariant: `0 <= read_pos <= write_pos <= buf.len()` always holds.
#[derive(Debug)]
pub struct Buffer {
    buf: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self::with_capacity(INIT_CAP)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn writable_bytes(&self) -> usize {
        self.buf.len() - self.write_pos
    }

    pub fn prependable_bytes(&self) -> usize {
        self.read_pos
    }

    /// Start of the readable region.
    pub fn peek(&self) -> &[u8] {
        &self.buf[self.read_pos..self.write_pos]
    }

    /// Start of the writable region.
    pub fn write_ptr(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_pos..]
    }

    pub fn has_written(&mut self, n: usize) {
        self.write_pos += n;
        debug_assert!(self.write_pos <= self.buf.len());
    }

    pub fn retrieve(&mut self, n: usize) {
        assert!(n <= self.readable_bytes(), "retrieve past readable region");
        self.read_pos += n;
        if self.read_pos == self.write_pos {
            // No readers waiting on an absolute index; recycle eagerly so a
            // long-lived idle connection doesn't keep the prependable region pinned.
            self.read_pos = 0;
            self.write_pos = 0;
        }
    }

    /// Advance the read cursor so that `peek()` starts at `offset` bytes
    /// past the current read cursor (i.e. retrieve up through an absolute
    /// offset found within the readable region, such as a located CRLF).
    pub fn retrieve_until(&mut self, offset: usize) {
        self.retrieve(offset);
    }

    pub fn retrieve_all(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    pub fn retrieve_all_to_string(&mut self) -> String {
        let s = String::from_utf8_lossy(self.peek()).into_owned();
        self.retrieve_all();
        s
    }

    /// Ensures at least `n` writable bytes without moving readable content
    /// unless the prependable region must be reclaimed.
    pub fn ensure_writable(&mut self, n: usize) {
        if self.writable_bytes() >= n {
            return;
        }
        if self.writable_bytes() + self.prependable_bytes() >= n {
            self.slide();
        } else {
            self.buf.resize(self.write_pos + n + 1, 0);
        }
        debug_assert!(self.writable_bytes() >= n);
    }

    fn slide(&mut self) {
        let readable = self.readable_bytes();
        self.buf.copy_within(self.read_pos..self.write_pos, 0);
        self.read_pos = 0;
        self.write_pos = readable;
    }

    pub fn append(&mut self, data: &[u8]) {
        self.ensure_writable(data.len());
        self.write_ptr()[..data.len()].copy_from_slice(data);
        self.has_written(data.len());
    }

    pub fn append_str(&mut self, s: &str) {
        self.append(s.as_bytes());
    }

    pub fn append_buffer(&mut self, other: &Buffer) {
        self.append(other.peek());
    }

    /// Single vectored read: the in-place writable region, then a stack
    /// scratch area, so one syscall pulls as much as the kernel has
    /// buffered without a speculative grow.
    pub fn read_from_fd(&mut self, fd: &impl AsRawFd) -> io::Result<usize> {
        let writable = self.writable_bytes();
        let mut scratch = [0u8; SCRATCH_SIZE];

        let n = {
            let mut file = unsafe { std::mem::ManuallyDrop::new(fd_as_file(fd)) };
            let mut slices = [
                IoSliceMut::new(self.write_ptr()),
                IoSliceMut::new(&mut scratch),
            ];
            file.read_vectored(&mut slices)?
        };

        if n <= writable {
            self.has_written(n);
        } else {
            self.write_pos = self.buf.len();
            self.append(&scratch[..n - writable]);
        }
        Ok(n)
    }

    /// Single write of the readable region; advances `read_pos` by however
    /// much the kernel accepted.
    pub fn write_to_fd(&mut self, fd: &impl AsRawFd) -> io::Result<usize> {
        let n = {
            let mut file = unsafe { std::mem::ManuallyDrop::new(fd_as_file(fd)) };
            file.write(self.peek())?
        };
        self.retrieve(n);
        Ok(n)
    }
}

/// Wrap a borrowed fd as a `File` without taking ownership (the caller's
/// `AsRawFd` impl still owns the descriptor; `ManuallyDrop` above suppresses
/// the close on drop).
unsafe fn fd_as_file(fd: &impl AsRawFd) -> std::fs::File {
    use std::os::fd::FromRawFd;
    unsafe { std::fs::File::from_raw_fd(fd.as_raw_fd()) }
}

/// Locate the next CRLF within `haystack`, returning its start offset.
pub fn find_crlf(haystack: &[u8]) -> Option<usize> {
    if haystack.len() < 2 {
        return None;
    }
    haystack
        .windows(2)
        .position(|w| w == b"\r\n")
}

pub fn write_vectored_to_fd(fd: &impl AsRawFd, slices: &[IoSlice<'_>]) -> io::Result<usize> {
    let mut file = unsafe { std::mem::ManuallyDrop::new(fd_as_file(fd)) };
    file.write_vectored(slices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_stay_ordered_across_appends_and_retrieves() {
        let mut buf = Buffer::new();
        buf.append(b"hello ");
        buf.append(b"world");
        assert_eq!(buf.readable_bytes(), 11);
        buf.retrieve(6);
        assert_eq!(buf.peek(), b"world");
        assert_eq!(buf.readable_bytes(), 5);
    }

    #[test]
    fn ensure_writable_slides_instead_of_growing_when_room_exists() {
        let mut buf = Buffer::with_capacity(16);
        buf.append(b"0123456789"); // 10 bytes, 6 writable left
        buf.retrieve(8); // read_pos=8, write_pos=10, prependable=8
        assert_eq!(buf.peek(), b"89");

        // writable(6) + prependable(8) = 14 >= 12, so this must slide, not grow.
        let cap_before = buf.buf.len();
        buf.ensure_writable(12);
        assert_eq!(buf.buf.len(), cap_before, "capacity must not change on slide");
        assert_eq!(buf.read_pos, 0);
        assert_eq!(buf.peek(), b"89");
    }

    #[test]
    fn ensure_writable_grows_when_sliding_is_not_enough() {
        let mut buf = Buffer::with_capacity(16);
        buf.append(b"0123456789");
        buf.ensure_writable(64);
        assert!(buf.writable_bytes() >= 64);
        assert_eq!(buf.peek(), b"0123456789");
    }

    #[test]
    fn retrieve_all_to_string_drains_buffer() {
        let mut buf = Buffer::new();
        buf.append(b"abc");
        let s = buf.retrieve_all_to_string();
        assert_eq!(s, "abc");
        assert_eq!(buf.readable_bytes(), 0);
    }

    #[test]
    fn find_crlf_locates_terminator() {
        assert_eq!(find_crlf(b"GET / HTTP/1.1\r\nHost: x"), Some(14));
        assert_eq!(find_crlf(b"no terminator here"), None);
    }
}
