//! One logical byte stream spliced from two segments.
//!
//! A request body is usually split in two: the bytes that arrived together
//! with the header section (already in memory) and the bytes still waiting in
//! the socket. [`ComposedStream`] presents both as a single stream without
//! copying the socket tail into memory first.
//!
//! ```text
//!  logical position:  0             first.len()                  len
//!                     |---- first ----|------------ second -----------|
//!  physical head:     first @ pos      second @ (pos - first.len())
//! ```
//!
//! A position equal to `first.len()` is still "in `first`" (at its end, with
//! `second` at offset 0); only positions strictly greater address `second`.

use std::{
    fs,
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
};

#[inline]
fn unsupported(what: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, what)
}

/// A stream segment with explicit capabilities.
///
/// Unlike [`Read`]/[`Write`]/[`Seek`], a segment can report at runtime which
/// operations it supports, which lets a [`ComposedStream`] derive its own
/// capabilities from both of its halves.
pub trait Segment {
    fn readable(&self) -> bool;
    fn writable(&self) -> bool;
    fn seekable(&self) -> bool;

    /// Length in bytes, `None` if the segment is not seekable.
    fn len(&self) -> Option<u64>;

    fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Reads at the current head, like [`Read::read`].
    fn pull(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(unsupported("segment is not readable"))
    }

    /// Writes all of `buf` at the current head.
    fn push(&mut self, _buf: &[u8]) -> io::Result<()> {
        Err(unsupported("segment is not writable"))
    }

    /// Moves the head to an absolute offset.
    fn seek_to(&mut self, _offset: u64) -> io::Result<()> {
        Err(unsupported("segment is not seekable"))
    }

    fn flush_segment(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Segment for Cursor<Vec<u8>> {
    fn readable(&self) -> bool {
        true
    }
    fn writable(&self) -> bool {
        true
    }
    fn seekable(&self) -> bool {
        true
    }
    fn len(&self) -> Option<u64> {
        Some(self.get_ref().len() as u64)
    }
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }
    fn push(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(self, buf)
    }
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.set_position(offset);
        Ok(())
    }
}

impl Segment for Cursor<&[u8]> {
    fn readable(&self) -> bool {
        true
    }
    fn writable(&self) -> bool {
        false
    }
    fn seekable(&self) -> bool {
        true
    }
    fn len(&self) -> Option<u64> {
        Some(self.get_ref().len() as u64)
    }
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.set_position(offset);
        Ok(())
    }
}

/// Files are assumed opened for reading and writing; the OS reports misuse.
impl Segment for fs::File {
    fn readable(&self) -> bool {
        true
    }
    fn writable(&self) -> bool {
        true
    }
    fn seekable(&self) -> bool {
        true
    }
    fn len(&self) -> Option<u64> {
        self.metadata().ok().map(|meta| meta.len())
    }
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }
    fn push(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(self, buf)
    }
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        Seek::seek(self, SeekFrom::Start(offset)).map(drop)
    }
    fn flush_segment(&mut self) -> io::Result<()> {
        Write::flush(self)
    }
}

macro_rules! forward_segment {
    ($($target:ty),*) => { $(
        impl<S: Segment + ?Sized> Segment for $target {
            fn readable(&self) -> bool {
                (**self).readable()
            }
            fn writable(&self) -> bool {
                (**self).writable()
            }
            fn seekable(&self) -> bool {
                (**self).seekable()
            }
            fn len(&self) -> Option<u64> {
                (**self).len()
            }
            fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                (**self).pull(buf)
            }
            fn push(&mut self, buf: &[u8]) -> io::Result<()> {
                (**self).push(buf)
            }
            fn seek_to(&mut self, offset: u64) -> io::Result<()> {
                (**self).seek_to(offset)
            }
            fn flush_segment(&mut self) -> io::Result<()> {
                (**self).flush_segment()
            }
        }
    )* };
}

forward_segment!(Box<S>, &mut S);

/// Forward-only segment over any [`Read`] + [`Write`], such as `&TcpStream`.
///
/// It has no length and cannot seek.
#[derive(Debug)]
pub struct Sequential<S>(pub S);

impl<S: Read + Write> Segment for Sequential<S> {
    fn readable(&self) -> bool {
        true
    }
    fn writable(&self) -> bool {
        true
    }
    fn seekable(&self) -> bool {
        false
    }
    fn len(&self) -> Option<u64> {
        None
    }
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
    fn push(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.write_all(buf)
    }
    fn flush_segment(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Two segments addressed as one stream.
///
/// # Length
///
/// - [`ComposedStream::new`]: the sum of both lengths when both segments are
///   seekable, otherwise unknown (`None`). An unknown-length stream can still
///   be read sequentially until `second` is exhausted.
/// - [`ComposedStream::with_length`]: the given value, whatever the segments
///   hold. Reads stop there; writes past it extend it.
///
/// # Capabilities
///
/// Reading, writing and seeking are each available only if **both**
/// segments support them.
///
/// # Examples
/// ```
/// use std::io::{Cursor, Read, Seek, SeekFrom};
/// use threadweb::ComposedStream;
///
/// let mut stream = ComposedStream::with_length(
///     Cursor::new(b"Hello".to_vec()),
///     Cursor::new(b"World".to_vec()),
///     10,
/// ).unwrap();
///
/// let mut all = String::new();
/// stream.read_to_string(&mut all).unwrap();
/// assert_eq!(all, "HelloWorld");
///
/// stream.seek(SeekFrom::Start(7)).unwrap();
/// let mut tail = [0; 3];
/// stream.read_exact(&mut tail).unwrap();
/// assert_eq!(&tail, b"rld");
/// ```
#[derive(Debug)]
pub struct ComposedStream<A, B> {
    first: A,
    second: B,

    length: Option<u64>,
    position: u64,
    // Physical head inside `second`; tracked because a sequential
    // `second` cannot be asked where it is.
    second_head: u64,
}

impl<A: Segment, B: Segment> ComposedStream<A, B> {
    /// Composes two segments, deriving the length from them.
    ///
    /// # Errors
    /// `InvalidInput` if `first` is not seekable.
    pub fn new(first: A, second: B) -> io::Result<Self> {
        let length = match (first.len(), second.seekable()) {
            (Some(a), true) => second.len().map(|b| a + b),
            _ => None,
        };

        Self::build(first, second, length)
    }

    /// Composes two segments with a fixed logical length.
    ///
    /// # Errors
    /// `InvalidInput` if `first` is not seekable.
    pub fn with_length(first: A, second: B, length: u64) -> io::Result<Self> {
        Self::build(first, second, Some(length))
    }

    fn build(mut first: A, mut second: B, length: Option<u64>) -> io::Result<Self> {
        if !first.seekable() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "the first segment must be seekable",
            ));
        }

        first.seek_to(0)?;
        if second.seekable() {
            second.seek_to(0)?;
        }

        Ok(Self {
            first,
            second,
            length,
            position: 0,
            second_head: 0,
        })
    }

    #[inline]
    pub fn can_read(&self) -> bool {
        self.first.readable() && self.second.readable()
    }

    #[inline]
    pub fn can_write(&self) -> bool {
        self.first.writable() && self.second.writable()
    }

    #[inline]
    pub fn can_seek(&self) -> bool {
        self.first.seekable() && self.second.seekable()
    }

    /// Logical length, `None` if unknown.
    #[inline]
    pub fn len(&self) -> Option<u64> {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == Some(0)
    }

    /// Overrides the logical length. Ignored unless the stream can seek.
    pub fn set_len(&mut self, length: u64) {
        if self.can_seek() {
            self.length = Some(length);
        }
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Moves to `target`, clamping negative values to 0.
    ///
    /// # Errors
    /// `Unsupported` if the stream cannot seek.
    pub fn set_position(&mut self, target: i64) -> io::Result<()> {
        if !self.can_seek() {
            return Err(unsupported("composed stream is not seekable"));
        }

        self.place(target.max(0) as u64)
    }

    pub fn into_inner(self) -> (A, B) {
        (self.first, self.second)
    }

    pub fn first_mut(&mut self) -> &mut A {
        &mut self.first
    }

    pub fn second_mut(&mut self) -> &mut B {
        &mut self.second
    }

    #[inline]
    fn boundary(&self) -> io::Result<u64> {
        self.first
            .len()
            .ok_or_else(|| unsupported("first segment lost its length"))
    }

    fn place(&mut self, target: u64) -> io::Result<()> {
        let boundary = self.boundary()?;

        if target > boundary {
            self.first.seek_to(boundary)?;
            self.second.seek_to(target - boundary)?;
            self.second_head = target - boundary;
        } else {
            self.first.seek_to(target)?;
            self.second.seek_to(0)?;
            self.second_head = 0;
        }

        self.position = target;
        Ok(())
    }

    fn read_second(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.second.pull(buf)?;
        self.second_head += n as u64;
        Ok(n)
    }

    fn write_second(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        if self.second.seekable() {
            self.second.seek_to(offset)?;
        } else if self.second_head != offset {
            return Err(unsupported(
                "sequential segment only accepts writes at its next unwritten byte",
            ));
        }

        self.second.push(buf)?;
        self.second_head = offset + buf.len() as u64;
        Ok(())
    }
}

impl<A: Segment, B: Segment> Read for ComposedStream<A, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.can_read() {
            return Err(unsupported("composed stream is not readable"));
        }

        let mut count = buf.len() as u64;
        if let Some(length) = self.length {
            count = count.min(length.saturating_sub(self.position));
        }
        if count == 0 {
            return Ok(0);
        }

        let count = count as usize;
        let boundary = self.boundary()?;

        let total = if self.position > boundary {
            self.read_second(&mut buf[..count])?
        } else if self.position + (count as u64) < boundary {
            self.first.seek_to(self.position)?;
            self.first.pull(&mut buf[..count])?
        } else {
            let from_first = (boundary - self.position) as usize;

            self.first.seek_to(self.position)?;
            let mut total = 0;
            while total < from_first {
                match self.first.pull(&mut buf[total..from_first])? {
                    0 => break,
                    n => total += n,
                }
            }

            if total == from_first && count > total {
                // Bytes already taken from `first` are reported; the error
                // resurfaces on the next read.
                match self.read_second(&mut buf[total..count]) {
                    Ok(n) => total += n,
                    Err(err) if total == 0 => return Err(err),
                    Err(err) => {
                        tracing::trace!(error = %err, bytes = total, "short composed read");
                    }
                }
            }
            total
        };

        self.position += total as u64;
        Ok(total)
    }
}

impl<A: Segment, B: Segment> Write for ComposedStream<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.can_write() {
            return Err(unsupported("composed stream is not writable"));
        }

        let boundary = self.boundary()?;

        if self.position > boundary {
            self.write_second(self.position - boundary, buf)?;
        } else if (buf.len() as u64) < boundary - self.position {
            self.first.seek_to(self.position)?;
            self.first.push(buf)?;
        } else {
            let (head, tail) = buf.split_at((boundary - self.position) as usize);

            self.first.seek_to(self.position)?;
            self.first.push(head)?;
            if !tail.is_empty() {
                self.write_second(0, tail)?;
            }
        }

        self.position += buf.len() as u64;
        if let Some(length) = self.length {
            if self.position > length {
                self.length = Some(self.position);
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush_segment()?;
        self.second.flush_segment()
    }
}

impl<A: Segment, B: Segment> Seek for ComposedStream<A, B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if !self.can_seek() {
            return Err(unsupported("composed stream is not seekable"));
        }

        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(offset) => self.position.saturating_add_signed(offset),
            SeekFrom::End(offset) => {
                let length = self
                    .length
                    .ok_or_else(|| unsupported("composed stream has no length"))?;

                if offset.unsigned_abs() > length && offset < 0 {
                    0
                } else {
                    length.saturating_add_signed(offset)
                }
            }
        };

        self.place(target)?;
        Ok(self.position)
    }
}

impl<A: Segment, B: Segment> Segment for ComposedStream<A, B> {
    fn readable(&self) -> bool {
        self.can_read()
    }
    fn writable(&self) -> bool {
        self.can_write()
    }
    fn seekable(&self) -> bool {
        self.can_seek()
    }
    fn len(&self) -> Option<u64> {
        self.length
    }
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }
    fn push(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(self, buf)
    }
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        Seek::seek(self, SeekFrom::Start(offset)).map(drop)
    }
    fn flush_segment(&mut self) -> io::Result<()> {
        Write::flush(self)
    }
}

/// Moves at most `limit` bytes from `pull` to `push`, stopping early once
/// `pull` reports the end of its data. Returns the number of bytes moved.
pub(crate) fn copy_bounded(
    limit: u64,
    mut pull: impl FnMut(&mut [u8]) -> io::Result<usize>,
    mut push: impl FnMut(&[u8]) -> io::Result<()>,
) -> io::Result<u64> {
    let mut buffer = [0; 8 * 1024];
    let mut total = 0;

    while total < limit {
        let want = (limit - total).min(buffer.len() as u64) as usize;
        let n = match pull(&mut buffer[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };

        push(&buffer[..n])?;
        total += n as u64;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn mem(data: &[u8]) -> Cursor<Vec<u8>> {
        Cursor::new(data.to_vec())
    }

    /// Sequential peer: reads drain `incoming`, writes append to `outgoing`.
    #[derive(Default, Debug)]
    struct Pipe {
        incoming: VecDeque<u8>,
        outgoing: Vec<u8>,
    }

    impl Pipe {
        fn with(data: &[u8]) -> Self {
            Self {
                incoming: data.iter().copied().collect(),
                outgoing: Vec::new(),
            }
        }
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.incoming.read(buf)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outgoing.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn read_n<R: Read>(stream: &mut R, n: usize) -> Vec<u8> {
        let mut buf = vec![0; n];
        let got = stream.read(&mut buf).unwrap();
        buf.truncate(got);
        buf
    }

    #[test]
    fn hello_world() {
        let mut s = ComposedStream::with_length(mem(b"Hello"), mem(b"World"), 10).unwrap();

        assert_eq!(read_n(&mut s, 10), b"HelloWorld");
        assert_eq!(s.seek(SeekFrom::Start(7)).unwrap(), 7);
        assert_eq!(read_n(&mut s, 3), b"rld");
        assert_eq!(s.seek(SeekFrom::Start(6)).unwrap(), 6);
        assert_eq!(read_n(&mut s, 3), b"orl");
        assert_eq!(s.position(), 10);
        assert_eq!(read_n(&mut s, 3), b"");
    }

    /// Sequential peer whose reads always time out.
    #[derive(Debug)]
    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    impl Write for Stalled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failing_second_keeps_first_bytes() {
        let mut s = ComposedStream::with_length(mem(b"abc"), Sequential(Stalled), 10).unwrap();
        let mut buf = [0; 10];

        assert_eq!(s.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(s.position(), 3);

        let err = s.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(s.position(), 3);
    }

    #[test]
    fn bounded_copy() {
        #[rustfmt::skip]
        let cases: [(&[u8], u64, &[u8]); 4] = [
            (b"abcdef", 3,        b"abc"),
            (b"abcdef", 0,        b""),
            (b"abc",    10,       b"abc"),
            (b"",       u64::MAX, b""),
        ];

        for (source, limit, expected) in cases {
            let mut source = mem(source);
            let mut target = Vec::new();
            let moved = copy_bounded(
                limit,
                |buf| source.read(buf),
                |bytes| {
                    target.extend_from_slice(bytes);
                    Ok(())
                },
            )
            .unwrap();

            assert_eq!(moved, expected.len() as u64);
            assert_eq!(target, expected);
        }
    }

    #[test]
    fn derived_length() {
        let s = ComposedStream::new(mem(b"abc"), mem(b"defg")).unwrap();
        assert_eq!(s.len(), Some(7));
        assert!(s.can_read() && s.can_write() && s.can_seek());

        let s = ComposedStream::new(mem(b"abc"), Sequential(Pipe::with(b"def"))).unwrap();
        assert_eq!(s.len(), None);
        assert!(!s.can_seek());
    }

    #[test]
    fn first_must_seek() {
        let err = ComposedStream::new(Sequential(Pipe::default()), mem(b"x")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn read_every_split() {
        let data = b"0123456789";

        for boundary in 0..=data.len() {
            for start in 0..=data.len() {
                for count in 0..=data.len() + 2 {
                    let (a, b) = data.split_at(boundary);
                    let mut s = ComposedStream::new(mem(a), mem(b)).unwrap();
                    s.seek(SeekFrom::Start(start as u64)).unwrap();

                    let expected = &data[start..(start + count).min(data.len())];
                    assert_eq!(read_n(&mut s, count), expected, "{boundary}/{start}/{count}");
                    assert_eq!(s.position(), (start + expected.len()) as u64);
                }
            }
        }
    }

    #[test]
    fn fixed_length_clamps_reads() {
        let mut s = ComposedStream::with_length(mem(b"head"), mem(b"tail-and-more"), 6).unwrap();

        assert_eq!(read_n(&mut s, 100), b"headta");
        assert_eq!(read_n(&mut s, 100), b"");
    }

    #[test]
    fn sequential_second_reads_through() {
        let mut s =
            ComposedStream::with_length(mem(b"GET-body:"), Sequential(Pipe::with(b"rest")), 13)
                .unwrap();

        let mut all = Vec::new();
        s.read_to_end(&mut all).unwrap();
        assert_eq!(all, b"GET-body:rest");
    }

    #[test]
    fn unknown_length_reads_until_exhausted() {
        let mut s = ComposedStream::new(mem(b"ab"), Sequential(Pipe::with(b"cd"))).unwrap();

        let mut all = Vec::new();
        s.read_to_end(&mut all).unwrap();
        assert_eq!(all, b"abcd");
        assert_eq!(s.position(), 4);
    }

    #[test]
    fn position_setter() {
        let mut s = ComposedStream::new(mem(b"abc"), mem(b"def")).unwrap();

        s.set_position(-5).unwrap();
        assert_eq!(s.position(), 0);
        assert_eq!(read_n(&mut s, 1), b"a");

        s.set_position(3).unwrap();
        assert_eq!(read_n(&mut s, 2), b"de");

        s.set_position(5).unwrap();
        assert_eq!(read_n(&mut s, 5), b"f");

        let mut seq = ComposedStream::new(mem(b"abc"), Sequential(Pipe::default())).unwrap();
        assert_eq!(
            seq.set_position(1).unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
    }

    #[test]
    fn seek_origins() {
        #[rustfmt::skip]
        let cases = [
            (SeekFrom::Start(0),    0, b"ab".as_slice()),
            (SeekFrom::Start(4),    4, b"ef"),
            (SeekFrom::Current(2),  3, b"de"),
            (SeekFrom::Current(-1), 0, b"ab"),
            (SeekFrom::End(-2),     4, b"ef"),
            (SeekFrom::End(-6),     0, b"ab"),
            (SeekFrom::End(-60),    0, b"ab"),
            (SeekFrom::End(0),      6, b""),
        ];

        for (pos, expected_pos, expected) in cases {
            let mut s = ComposedStream::new(mem(b"abc"), mem(b"def")).unwrap();
            s.seek(SeekFrom::Start(1)).unwrap();

            assert_eq!(s.seek(pos).unwrap(), expected_pos, "{pos:?}");
            assert_eq!(read_n(&mut s, 2), expected, "{pos:?}");
        }
    }

    #[test]
    fn write_within_and_across_boundary() {
        let mut s = ComposedStream::new(mem(b"____"), mem(b"____")).unwrap();

        s.write_all(b"ab").unwrap();
        s.seek(SeekFrom::Start(3)).unwrap();
        s.write_all(b"XYZ").unwrap();
        assert_eq!(s.position(), 6);
        s.seek(SeekFrom::Start(6)).unwrap();
        s.write_all(b"!").unwrap();

        let (a, b) = s.into_inner();
        assert_eq!(a.into_inner(), b"ab_X");
        assert_eq!(b.into_inner(), b"YZ!_");
    }

    #[test]
    fn write_extends_fixed_length() {
        let mut s = ComposedStream::with_length(mem(b"ab"), mem(b""), 2).unwrap();

        s.seek(SeekFrom::End(0)).unwrap();
        s.write_all(b"cdef").unwrap();
        assert_eq!(s.len(), Some(6));

        s.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(read_n(&mut s, 10), b"abcdef");
    }

    #[test]
    fn sequential_write_needs_next_byte() {
        let mut s =
            ComposedStream::with_length(mem(b"ab"), Sequential(Pipe::default()), 2).unwrap();

        s.write_all(b"xy").unwrap();
        s.write_all(b"12").unwrap();
        s.write_all(b"34").unwrap();
        assert_eq!(s.len(), Some(6));

        let (a, b) = s.into_inner();
        assert_eq!(a.into_inner(), b"xy");
        assert_eq!(b.0.outgoing, b"1234");
    }

    #[test]
    fn sequential_write_follows_reads() {
        let mut s = ComposedStream::with_length(mem(b"ab"), Sequential(Pipe::with(b"cd")), 4)
            .unwrap();
        assert_eq!(read_n(&mut s, 3), b"abc");

        // Position 3 is tail offset 1 and the tail head already sits there.
        s.write_all(b"Q").unwrap();
        assert_eq!(s.second_mut().0.outgoing, b"Q");
        assert_eq!(s.position(), 4);

        let mut at_boundary =
            ComposedStream::with_length(mem(b"ab"), Sequential(Pipe::with(b"cd")), 4).unwrap();
        assert_eq!(read_n(&mut at_boundary, 2), b"ab");
        at_boundary.write_all(b"Z").unwrap();
        assert_eq!(at_boundary.second_mut().0.outgoing, b"Z");
    }

    #[test]
    fn read_only_first_disables_writes() {
        let data = b"abc".as_slice();
        let mut s = ComposedStream::new(Cursor::new(data), mem(b"def")).unwrap();

        assert!(s.can_read());
        assert!(!s.can_write());
        assert_eq!(
            s.write(b"x").unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
        assert_eq!(read_n(&mut s, 6), b"abcdef");
    }

    #[test]
    fn nested() {
        let inner = ComposedStream::new(mem(b"ab"), mem(b"cd")).unwrap();
        let mut outer = ComposedStream::new(inner, mem(b"ef")).unwrap();

        assert_eq!(outer.len(), Some(6));
        outer.seek(SeekFrom::Start(1)).unwrap();
        assert_eq!(read_n(&mut outer, 4), b"bcde");
    }

    #[test]
    fn set_len_only_when_seekable() {
        let mut s = ComposedStream::new(mem(b"abc"), mem(b"def")).unwrap();
        s.set_len(2);
        assert_eq!(read_n(&mut s, 10), b"ab");

        let mut seq = ComposedStream::with_length(mem(b"abc"), Sequential(Pipe::default()), 3)
            .unwrap();
        seq.set_len(1);
        assert_eq!(seq.len(), Some(3));
    }
}
