use std::io::{self, Read, Write};

use crate::endian::swap_words;
use crate::error::{Result, SnapError};

/// Bulk transfer of fixed-size words over a byte stream, with optional byte
/// swapping.
///
/// The in-memory buffer is always in host order. When `swap` is set, the
/// on-stream representation is the foreign order:
/// - reads swap every word after the transfer;
/// - writes swap before the transfer and swap back afterwards, so the
///   caller's buffer is byte-identical once the call returns.
///
/// A short transfer is reported as [`SnapError::Truncated`]. There is no
/// retry: after that the stream must be considered unusable.
pub struct WordIo<S> {
    inner: S,
    swap: bool,
}

impl<S> WordIo<S> {
    pub fn new(inner: S, swap: bool) -> Self {
        Self { inner, swap }
    }

    #[inline]
    pub fn swapping(&self) -> bool {
        self.swap
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn words_in(buf: &[u8], size: usize) -> Result<usize> {
        if size == 0 || buf.len() % size != 0 {
            return Err(SnapError::Format(format!(
                "buffer of {} bytes is not a whole number of {}-byte words",
                buf.len(),
                size
            )));
        }
        Ok(buf.len() / size)
    }
}

impl<S: Read> WordIo<S> {
    /// Read `buf.len() / size` words in one transfer, then fix their byte order.
    pub fn read_words(&mut self, buf: &mut [u8], size: usize) -> Result<usize> {
        let count = Self::words_in(buf, size)?;
        self.inner
            .read_exact(buf)
            .map_err(|e| SnapError::from_transfer(e, &format!("reading {count} x {size}-byte words")))?;
        if self.swap && size > 1 {
            swap_words(buf, size);
        }
        Ok(count)
    }

    /// Like [`read_words`](Self::read_words), but `Ok(None)` when the stream
    /// has no bytes left at all. A partially available buffer is still a
    /// truncation.
    pub fn try_read_words(&mut self, buf: &mut [u8], size: usize) -> Result<Option<usize>> {
        let count = Self::words_in(buf, size)?;
        if buf.is_empty() {
            return Ok(Some(0));
        }
        let first = loop {
            match self.inner.read(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if first == 0 {
            return Ok(None);
        }
        self.inner
            .read_exact(&mut buf[first..])
            .map_err(|e| SnapError::from_transfer(e, &format!("reading {count} x {size}-byte words")))?;
        if self.swap && size > 1 {
            swap_words(buf, size);
        }
        Ok(Some(count))
    }
}

impl<S: Write> WordIo<S> {
    /// Write `buf.len() / size` words in one transfer.
    ///
    /// With swapping enabled the buffer is swapped, written, then swapped
    /// back. The swap is self-inverse so the caller sees its original bytes
    /// even when the transfer fails.
    pub fn write_words(&mut self, buf: &mut [u8], size: usize) -> Result<usize> {
        let count = Self::words_in(buf, size)?;
        let swapped = self.swap && size > 1;
        if swapped {
            swap_words(buf, size);
        }
        let written = self.inner.write_all(buf);
        if swapped {
            swap_words(buf, size);
        }
        written.map_err(|e| {
            SnapError::from_transfer(e, &format!("writing {count} x {size}-byte words"))
        })?;
        Ok(count)
    }

    /// Write words that need no byte-order fix. Only valid when not swapping
    /// or for 1-byte words; callers holding a shared borrow use this path.
    pub fn write_unswapped(&mut self, buf: &[u8], size: usize) -> Result<usize> {
        let count = Self::words_in(buf, size)?;
        debug_assert!(!self.swap || size == 1);
        self.inner
            .write_all(buf)
            .map_err(|e| SnapError::from_transfer(e, &format!("writing {count} x {size}-byte words")))?;
        Ok(count)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use std::io::Cursor;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 37 + 11) as u8).collect()
    }

    #[test]
    fn test_write_leaves_buffer_untouched_when_swapping() {
        for words in [0usize, 1, 97] {
            for size in [1usize, 4, 8] {
                let original = pattern(words * size);
                let mut buf = original.clone();
                let mut io = WordIo::new(Vec::new(), true);
                io.write_words(&mut buf, size).unwrap();
                assert_eq!(buf, original, "caller buffer changed ({words} x {size})");

                let mut on_disk = original.clone();
                swap_words(&mut on_disk, size);
                assert_eq!(io.into_inner(), on_disk, "stream bytes should be foreign order");
            }
        }
    }

    #[test]
    fn test_read_swaps_back_to_host_order() {
        let values = [1.5f64, -2.25, 1e300];
        let mut foreign: Vec<u8> = bytemuck::cast_slice(&values).to_vec();
        swap_words(&mut foreign, 8);

        let mut out = [0f64; 3];
        let mut io = WordIo::new(Cursor::new(foreign), true);
        let n = io.read_words(bytemuck::cast_slice_mut(&mut out), 8).unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, values);
    }

    #[test]
    fn test_short_read_is_truncation() {
        let mut io = WordIo::new(Cursor::new(vec![0u8; 6]), false);
        let mut buf = [0u8; 8];
        let err = io.read_words(&mut buf, 4).unwrap_err();
        assert_eq!(err.status(), Status::Truncated);
    }

    #[test]
    fn test_short_write_is_truncation_and_buffer_restored() {
        let mut backing = [0u8; 4];
        let original = pattern(8);
        let mut buf = original.clone();
        let mut io = WordIo::new(&mut backing[..], true);
        let err = io.write_words(&mut buf, 4).unwrap_err();
        assert!(matches!(err, SnapError::Truncated(_)), "got {err:?}");
        assert_eq!(buf, original);
    }

    #[test]
    fn test_ragged_buffer_rejected() {
        let mut io = WordIo::new(Vec::new(), false);
        let mut buf = [0u8; 7];
        assert!(matches!(io.write_words(&mut buf, 4), Err(SnapError::Format(_))));
    }
}
