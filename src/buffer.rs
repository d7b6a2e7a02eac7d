// src/buffer.rs

//! Growable byte buffer
//!
//! `VarBuf` is the append-only scratch buffer the rest of the crate builds
//! paths and status lines with. Capacity grows to `(capacity + needed) * 2`
//! whenever an append does not fit, so appends are amortized O(1), and
//! `reset` keeps the storage around for the next use.
//!
//! Allocation failure aborts the process (the standard allocator's
//! behaviour); there is nothing sensible to recover to.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct VarBuf {
    buf: Vec<u8>,
}

impl VarBuf {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(size),
        }
    }

    /// Logical length back to zero, storage kept
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Make room for `needed` more bytes
    pub fn grow(&mut self, needed: usize) {
        let used = self.buf.len();
        let size = self.buf.capacity();
        if size - used >= needed {
            return;
        }
        let target = (size + needed) * 2;
        self.buf.reserve_exact(target - used);
    }

    pub fn add_char(&mut self, c: u8) {
        self.grow(1);
        self.buf.push(c);
    }

    /// Append `c` repeated `n` times
    pub fn dup_char(&mut self, c: u8, n: usize) {
        self.grow(n);
        self.buf.resize(self.buf.len() + n, c);
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.grow(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    pub fn add_str(&mut self, s: &str) {
        self.add_bytes(s.as_bytes());
    }

    pub fn add_path(&mut self, path: &Path) {
        self.add_bytes(path.as_os_str().as_bytes());
    }

    /// Append formatted text, e.g. `buf.add_fmt(format_args!("{}:", epoch))`
    pub fn add_fmt(&mut self, args: fmt::Arguments<'_>) {
        // Writing into a Vec cannot fail
        let _ = fmt::Write::write_fmt(self, args);
    }

    /// Replace every occurrence of `from` with `to`
    pub fn subst_char(&mut self, from: u8, to: u8) {
        for b in self.buf.iter_mut().filter(|b| **b == from) {
            *b = to;
        }
    }

    /// Drop everything after the first `len` bytes
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.buf))
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }

    /// Release the storage
    pub fn free(&mut self) {
        self.buf = Vec::new();
    }
}

impl fmt::Write for VarBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.add_str(s);
        Ok(())
    }
}

impl io::Write for VarBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.add_bytes(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_reset() {
        let mut vb = VarBuf::new();
        vb.add_str("/etc");
        vb.add_char(b'/');
        vb.add_bytes(b"foo.conf");
        assert_eq!(vb.as_bytes(), b"/etc/foo.conf");

        let cap = vb.capacity();
        vb.reset();
        assert!(vb.is_empty());
        assert_eq!(vb.capacity(), cap);
    }

    #[test]
    fn test_growth_doubles() {
        let mut vb = VarBuf::new();
        vb.add_char(b'x');
        // (0 + 1) * 2
        assert!(vb.capacity() >= 2);

        let mut vb = VarBuf::with_capacity(4);
        vb.add_str("abcd");
        let room = vb.capacity() - vb.len();
        vb.dup_char(b'a', room);
        let before = vb.capacity();
        assert_eq!(vb.len(), before);
        vb.add_str("e");
        assert!(vb.capacity() >= (before + 1) * 2);
    }

    #[test]
    fn test_formatted_and_subst() {
        let mut vb = VarBuf::new();
        vb.add_fmt(format_args!("{}:{}", 1, "2.0"));
        assert_eq!(vb.to_string_lossy(), "1:2.0");

        vb.reset();
        vb.add_str("line one\nline two\n");
        vb.subst_char(b'\n', b' ');
        assert_eq!(vb.to_string_lossy(), "line one line two ");
    }

    #[test]
    fn test_dup_truncate_free() {
        let mut vb = VarBuf::new();
        vb.dup_char(b'-', 3);
        vb.add_str("x");
        assert_eq!(vb.as_bytes(), b"---x");
        vb.truncate(2);
        assert_eq!(vb.as_bytes(), b"--");
        vb.free();
        assert_eq!(vb.capacity(), 0);
    }

    #[test]
    fn test_as_path() {
        let mut vb = VarBuf::new();
        vb.add_path(Path::new("/srv/root"));
        vb.add_str("/etc/x");
        assert_eq!(vb.as_path(), Path::new("/srv/root/etc/x"));
    }
}
