//! What a service sees of one validated request.

use crate::http::{
    response,
    stream::{copy_bounded, ComposedStream, Segment, Sequential},
    types::{parse_decimal, Method, StatusCode, Version},
    validator::{Headers, RequestHead},
};
use memchr::memchr;
use std::{
    io::{self, Cursor, Read, Write},
    net::{SocketAddr, TcpStream},
};

type Spliced<'a> = ComposedStream<Cursor<Vec<u8>>, Sequential<&'a TcpStream>>;

/// Request body source.
///
/// | Request                               | Variant   | Length                  |
/// |---------------------------------------|-----------|-------------------------|
/// | `content-length` present              | `Bounded` | the header value        |
/// | no length, body bytes already read    | `Open`    | unknown                 |
/// | no length, nothing read past headers  | `Raw`     | unknown                 |
///
/// `Bounded` and `Open` splice the bytes read together with the headers in
/// front of the unread socket tail.
#[derive(Debug)]
pub enum Body<'a> {
    Bounded(Spliced<'a>),
    Open(Spliced<'a>),
    Raw(&'a TcpStream),
}

impl<'a> Body<'a> {
    pub(crate) fn new(
        prefix: Vec<u8>,
        content_length: Option<u64>,
        stream: &'a TcpStream,
    ) -> io::Result<Self> {
        let body = match content_length {
            Some(length) => Body::Bounded(ComposedStream::with_length(
                Cursor::new(prefix),
                Sequential(stream),
                length,
            )?),
            None if !prefix.is_empty() => {
                Body::Open(ComposedStream::new(Cursor::new(prefix), Sequential(stream))?)
            }
            None => Body::Raw(stream),
        };

        Ok(body)
    }

    /// Body length, if known.
    pub fn len(&self) -> Option<u64> {
        match self {
            Body::Bounded(stream) | Body::Open(stream) => stream.len(),
            Body::Raw(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl Read for Body<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::Bounded(stream) | Body::Open(stream) => stream.read(buf),
            Body::Raw(stream) => stream.read(buf),
        }
    }
}

/// Write side of the connection. Counts what has been written.
#[derive(Debug)]
pub struct ResponseSink<'a> {
    stream: &'a TcpStream,
    written: u64,
}

impl<'a> ResponseSink<'a> {
    pub(crate) fn new(stream: &'a TcpStream) -> Self {
        Self { stream, written: 0 }
    }

    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Write for ResponseSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// One validated request plus the means to answer it.
///
/// Created by the server for every request that passed validation and handed
/// to the matching [`Service`](crate::Service). The service writes a complete
/// response, head included, before returning.
#[derive(Debug)]
pub struct RequestContext<'a> {
    head: RequestHead,
    body: Body<'a>,
    sink: ResponseSink<'a>,
    peer_addr: SocketAddr,
}

impl<'a> RequestContext<'a> {
    pub(crate) fn new(
        head: RequestHead,
        prefix: Vec<u8>,
        stream: &'a TcpStream,
        peer_addr: SocketAddr,
    ) -> io::Result<Self> {
        let body = Body::new(prefix, head.content_length, stream)?;

        Ok(Self {
            head,
            body,
            sink: ResponseSink::new(stream),
            peer_addr,
        })
    }
}

impl<'a> RequestContext<'a> {
    #[inline]
    pub fn method(&self) -> Method {
        self.head.method
    }

    /// Raw request target, not percent-decoded.
    #[inline]
    pub fn uri(&self) -> &str {
        &self.head.uri
    }

    /// Request target without its query.
    #[inline]
    pub fn path(&self) -> &str {
        let uri = self.uri();
        match memchr(b'?', uri.as_bytes()) {
            Some(i) => &uri[..i],
            None => uri,
        }
    }

    #[inline]
    pub fn query(&self) -> Option<&str> {
        let uri = self.uri();
        memchr(b'?', uri.as_bytes()).map(|i| &uri[i + 1..])
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.head.version
    }

    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    /// Looks a header up, ignoring the case of `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        match self.head.headers.get(name) {
            Some(value) => Some(value),
            None => self
                .head
                .headers
                .get(&name.to_ascii_lowercase())
                .map(String::as_str),
        }
    }

    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        self.head.content_length
    }

    #[inline]
    pub fn body(&self) -> &Body<'a> {
        &self.body
    }

    #[inline]
    pub fn body_mut(&mut self) -> &mut Body<'a> {
        &mut self.body
    }

    #[inline]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// `true` once any response byte reached the socket.
    #[inline]
    pub fn response_started(&self) -> bool {
        self.sink.written() > 0
    }

    #[inline]
    pub fn sink(&mut self) -> &mut ResponseSink<'a> {
        &mut self.sink
    }

    #[inline]
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sink.write_all(bytes)
    }

    /// Writes `200 OK` with `body`.
    pub fn write_ok(&mut self, content_type: &str, body: &[u8]) -> io::Result<()> {
        self.write_status(StatusCode::Ok, content_type, body)
    }

    /// Writes only a `200 OK` head; the caller streams `len` body bytes.
    pub fn write_ok_head(&mut self, content_type: &str, len: u64) -> io::Result<()> {
        let head = response::ok_head(self.version(), content_type, len);
        self.write_all(&head)
    }

    /// Writes only a `206 Partial Content` head; the caller streams
    /// `range.len()` body bytes.
    pub fn write_partial_head(
        &mut self,
        content_type: &str,
        range: ResolvedRange,
        total: u64,
    ) -> io::Result<()> {
        let head = response::partial_head(self.version(), content_type, range, total);
        self.write_all(&head)
    }

    /// Writes `416 Range Not Satisfiable` for a `total`-byte resource.
    pub fn write_unsatisfiable(&mut self, total: u64) -> io::Result<()> {
        let head = response::unsatisfiable_head(self.version(), total);
        self.write_all(&head)
    }

    /// Writes `404 Not Found` with an HTML body.
    pub fn write_not_found(&mut self, html: &str) -> io::Result<()> {
        let head = response::not_found_head(self.version(), html.len() as u64);
        self.write_all(&head)?;
        self.write_all(html.as_bytes())
    }

    /// Writes a complete response with any status.
    pub fn write_status(
        &mut self,
        status: StatusCode,
        content_type: &str,
        body: &[u8],
    ) -> io::Result<()> {
        let head = response::status_head(self.version(), status, content_type, body.len() as u64);
        self.write_all(&head)?;
        self.write_all(body)
    }

    /// Copies the body into `target`, at most `limit` bytes.
    pub fn copy_body_to<W: Write + ?Sized>(&mut self, target: &mut W, limit: u64) -> io::Result<u64> {
        io::copy(&mut (&mut self.body).take(limit), target)
    }

    /// Copies the body into a segment, at most `limit` bytes.
    ///
    /// A body that stops arriving before `limit` ends the copy early. The
    /// short count tells the caller; only errors from `target` are returned.
    pub fn copy_body_to_segment(
        &mut self,
        target: &mut dyn Segment,
        limit: u64,
    ) -> io::Result<u64> {
        let body = &mut self.body;
        let total = copy_bounded(
            limit,
            |buf| match body.read(buf) {
                Err(err) if body_ended(&err) => {
                    tracing::debug!(error = %err, "request body ended early");
                    Ok(0)
                }
                read => read,
            },
            |bytes| target.push(bytes),
        )?;

        target.flush_segment()?;
        Ok(total)
    }
}

/// Read errors meaning no more body bytes will come.
fn body_ended(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

// RANGES

/// A `Range: bytes=<start>-<end>` request header.
///
/// # Examples
/// ```
/// use threadweb::{ByteRange, ResolvedRange};
///
/// let range = ByteRange::parse("bytes=0-99").unwrap();
/// assert_eq!(range.resolve(200), Some(ResolvedRange { start: 0, end: 99 }));
///
/// let open = ByteRange::parse("bytes=150-").unwrap();
/// assert_eq!(open.resolve(200), Some(ResolvedRange { start: 150, end: 199 }));
/// assert_eq!(open.resolve(100), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive end, `None` for "to the end of the resource".
    pub end: Option<u64>,
}

/// A range clamped to an actual resource. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
}

impl ResolvedRange {
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl ByteRange {
    /// Parses `bytes=<start>-<end>`. Suffix and multi-range forms are not
    /// supported.
    pub fn parse(value: &str) -> Option<Self> {
        let bounds = value.trim().strip_prefix("bytes=")?;
        let dash = memchr(b'-', bounds.as_bytes())?;

        let start = parse_decimal(bounds[..dash].trim().as_bytes())?;
        let end = match bounds[dash + 1..].trim() {
            "" => None,
            digits => Some(parse_decimal(digits.as_bytes())?),
        };

        Some(Self { start, end })
    }

    /// Clamps the range to a `total`-byte resource, `None` if unsatisfiable.
    pub fn resolve(&self, total: u64) -> Option<ResolvedRange> {
        let last = total.checked_sub(1)?;
        let end = self.end.map_or(last, |end| end.min(last));

        (self.start <= end).then_some(ResolvedRange {
            start: self.start,
            end,
        })
    }
}
