// SPDX-License-Identifier: MPL-2.0
//! Byte stream port consumed by the container parser.
//!
//! A [`ByteSource`] is what the demuxer (and muxer) reads from and writes to
//! when the media does not come from a plain file path. Implementations report
//! failures as `io::Error`; the FFmpeg glue translates them into the sentinel
//! codes the parser understands, so nothing unwinds across the native boundary.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// A readable, optionally writable and seekable byte stream.
///
/// # Example
///
/// ```
/// use seekframe::application::port::ByteSource;
/// use std::io::{Cursor, SeekFrom};
///
/// let mut source = Cursor::new(vec![1u8, 2, 3, 4]);
/// let mut buf = [0u8; 2];
/// assert_eq!(source.read(&mut buf).unwrap(), 2);
/// assert_eq!(ByteSource::seek(&mut source, SeekFrom::End(-1)).unwrap(), 3);
/// assert_eq!(source.len(), Some(4));
/// ```
pub trait ByteSource: Send {
    /// Reads up to `buf.len()` bytes. `Ok(0)` means end of stream.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes bytes from `buf`, returning how many were accepted.
    ///
    /// # Errors
    ///
    /// Read-only sources return [`io::ErrorKind::Unsupported`].
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    /// Moves the cursor and returns the new absolute position.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, or [`io::ErrorKind::Unsupported`]
    /// for forward-only sources.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Total length in bytes, when known.
    fn len(&mut self) -> Option<u64> {
        None
    }

    /// Returns true if the source has no bytes at all.
    fn is_empty(&mut self) -> bool {
        self.len() == Some(0)
    }

    /// Whether [`ByteSource::seek`] can move backwards and forwards freely.
    fn is_seekable(&self) -> bool {
        true
    }

    /// Flushes pending writes and releases the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Length of a seekable stream, restoring the cursor afterwards.
fn stream_len<S: Seek>(stream: &mut S) -> Option<u64> {
    let current = stream.stream_position().ok()?;
    let end = stream.seek(SeekFrom::End(0)).ok()?;
    stream.seek(SeekFrom::Start(current)).ok()?;
    Some(end)
}

impl ByteSource for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }

    fn len(&mut self) -> Option<u64> {
        self.metadata().ok().map(|meta| meta.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<T> ByteSource for Cursor<T>
where
    T: AsRef<[u8]> + Send,
    Cursor<T>: Write,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }

    fn len(&mut self) -> Option<u64> {
        stream_len(self)
    }
}

/// Read-only adapter over any `Read + Seek` stream.
#[derive(Debug)]
pub struct ReadSeekSource<R> {
    inner: R,
}

impl<R: Read + Seek + Send> ReadSeekSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek + Send> ByteSource for ReadSeekSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }

    fn len(&mut self) -> Option<u64> {
        stream_len(&mut self.inner)
    }
}

/// Forward-only adapter: reads pass through, every seek fails.
///
/// Models pipes and other streams that cannot rewind.
#[derive(Debug)]
pub struct ForwardOnlySource<R> {
    inner: R,
}

impl<R: Read + Send> ForwardOnlySource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read + Send> ByteSource for ForwardOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_reads_until_eof() {
        let mut source = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(ByteSource::read(&mut source, &mut buf).unwrap(), 3);
        assert_eq!(ByteSource::read(&mut source, &mut buf).unwrap(), 0);
    }

    #[test]
    fn cursor_len_preserves_position() {
        let mut source = Cursor::new(vec![0u8; 10]);
        ByteSource::seek(&mut source, SeekFrom::Start(4)).unwrap();
        assert_eq!(ByteSource::len(&mut source), Some(10));
        assert_eq!(source.position(), 4);
    }

    #[test]
    fn cursor_over_vec_accepts_writes() {
        let mut sink = Cursor::new(Vec::new());
        assert_eq!(ByteSource::write(&mut sink, b"abc").unwrap(), 3);
        ByteSource::seek(&mut sink, SeekFrom::Start(1)).unwrap();
        ByteSource::write(&mut sink, b"Z").unwrap();
        assert_eq!(sink.into_inner(), b"aZc");
    }

    #[test]
    fn read_seek_source_rejects_writes() {
        let mut source = ReadSeekSource::new(Cursor::new(vec![9u8; 4]));
        let err = source.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert_eq!(source.len(), Some(4));
    }

    #[test]
    fn forward_only_source_cannot_seek() {
        let mut source = ForwardOnlySource::new(&b"data"[..]);
        assert!(!source.is_seekable());
        assert!(source.seek(SeekFrom::Start(0)).is_err());
        assert_eq!(source.len(), None);

        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"data");
    }

    #[test]
    fn file_source_reports_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bytes.bin");
        std::fs::write(&path, [0u8; 32]).unwrap();

        let mut file = File::open(&path).unwrap();
        assert_eq!(ByteSource::len(&mut file), Some(32));
        assert!(file.is_seekable());
    }
}
