//! Incremental request-line and header validation.
//!
//! The validator is a byte-level state machine. Every byte is classified as
//! soon as it arrives, so the outcome never depends on how the transport
//! chunked the request: `"GE"` followed by `"T / HTTP/1.1\r\n..."` validates
//! exactly like the same bytes delivered at once.
//!
//! ```text
//!  Method --SP--> Uri --SP--> Version --"HTTP/1.1\r\n"--> LineStart <-----------+
//!                                                           |  |                |
//!                                             blank line ---+  +-- Name -:- Value --CRLF
//!                                                 |
//!                                    crlf_run == 2 --> Done
//! ```

use crate::{
    errors::ErrorKind,
    http::types::{parse_decimal, Method, Version},
    limits::ReqLimits,
};
use std::{
    collections::HashMap,
    io::{self, Read},
    net::TcpStream,
    time::{Duration, Instant},
};

/// Lower-cased header name to value. A repeated name keeps the last value.
pub type Headers = HashMap<String, String>;

/// Progress counters of one parse attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserState {
    /// Request line plus accepted header lines. Never decreases.
    pub lines_validated: usize,
    /// Bytes of the current literal (method or version) matched so far.
    pub valid_up_to_index: usize,
    /// Consecutive line terminators; the request line's own counts as one.
    pub crlf_run: u8,
    pub total_bytes_read: usize,
    /// A header name ended with `:` and its value is still being read.
    pub pending_field_open: bool,
    pub end_of_headers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Method,
    Uri,
    Version,
    LineStart,
    BlankCr,
    Name,
    Value,
    ValueCr,
    Done,
    Failed,
}

impl Phase {
    #[inline(always)]
    const fn in_request_line(self) -> bool {
        matches!(self, Phase::Method | Phase::Uri | Phase::Version)
    }
}

/// Outcome of a [`RequestValidator::feed`] call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More bytes are needed.
    Partial,
    /// The blank line ended inside this chunk; bytes from `consumed` on
    /// belong to the body.
    Complete { consumed: usize },
}

/// A validated request line and header section.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    pub method: Method,
    pub uri: String,
    pub version: Version,
    pub headers: Headers,
    /// Parsed `content-length`, if the header was present.
    pub content_length: Option<u64>,
}

/// Incremental validator for one connection.
///
/// # Examples
/// ```
/// use threadweb::{Method, Progress, RequestValidator};
///
/// let mut validator = RequestValidator::default();
///
/// assert_eq!(validator.feed(b"GE").unwrap(), Progress::Partial);
/// assert_eq!(
///     validator.feed(b"T /path HTTP/1.1\r\nHost: h\r\n\r\nbody").unwrap(),
///     Progress::Complete { consumed: 29 },
/// );
///
/// let head = validator.finish().unwrap();
/// assert_eq!(head.method, Method::Get);
/// assert_eq!(head.uri, "/path");
/// assert_eq!(head.headers["host"], "h");
/// ```
#[derive(Debug)]
pub struct RequestValidator {
    state: ParserState,
    phase: Phase,
    error: Option<ErrorKind>,

    first_line_size: usize,
    header_size: usize,

    method: Option<Method>,
    uri: Vec<u8>,
    token: Vec<u8>,
    value: Vec<u8>,
    headers: Headers,
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new(&ReqLimits::default())
    }
}

impl RequestValidator {
    pub fn new(limits: &ReqLimits) -> Self {
        Self {
            state: ParserState::default(),
            phase: Phase::Method,
            error: None,

            first_line_size: limits.first_line_size,
            header_size: limits.header_size,

            method: None,
            uri: Vec::new(),
            token: Vec::with_capacity(16),
            value: Vec::with_capacity(64),
            headers: HashMap::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state.end_of_headers
    }

    /// Consumes the next chunk of the connection.
    ///
    /// Once an error is returned, every later call returns it again. Bytes fed
    /// after completion are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Progress, ErrorKind> {
        if let Some(err) = &self.error {
            return Err(clone_error(err));
        }
        if self.phase == Phase::Done {
            return Ok(Progress::Complete { consumed: 0 });
        }

        for (i, &byte) in chunk.iter().enumerate() {
            if let Err(err) = self.step(byte) {
                self.phase = Phase::Failed;
                self.error = Some(clone_error(&err));
                return Err(err);
            }

            if self.phase == Phase::Done {
                return Ok(Progress::Complete { consumed: i + 1 });
            }
        }

        Ok(Progress::Partial)
    }

    /// Returns the validated head, or why the connection is invalid.
    pub fn finish(self) -> Result<RequestHead, ErrorKind> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if !self.state.end_of_headers {
            return Err(ErrorKind::UnexpectedEof);
        }

        let content_length = match self.headers.get("content-length") {
            Some(value) => {
                Some(parse_decimal(value.as_bytes()).ok_or(ErrorKind::InvalidContentLength)?)
            }
            None => None,
        };

        let uri = String::from_utf8(self.uri).map_err(|_| ErrorKind::InvalidEncoding)?;

        Ok(RequestHead {
            method: self.method.ok_or(ErrorKind::InvalidMethod)?,
            uri,
            version: Version::Http11,
            headers: self.headers,
            content_length,
        })
    }

    fn step(&mut self, byte: u8) -> Result<(), ErrorKind> {
        let offset = self.state.total_bytes_read;

        if self.phase.in_request_line() && offset >= self.first_line_size && !self.at_line_feed() {
            return Err(ErrorKind::FirstLineTooLong {
                limit: self.first_line_size,
            });
        }
        if offset >= self.header_size {
            return Err(ErrorKind::HeadersTooLarge {
                limit: self.header_size,
            });
        }
        self.state.total_bytes_read += 1;

        match self.phase {
            Phase::Method => self.method_byte(byte),
            Phase::Uri => self.uri_byte(byte),
            Phase::Version => self.version_byte(byte),

            Phase::LineStart => match byte {
                b'\r' => {
                    self.phase = Phase::BlankCr;
                    Ok(())
                }
                _ => {
                    self.state.crlf_run = 0;
                    self.phase = Phase::Name;
                    self.name_byte(byte)
                }
            },
            Phase::BlankCr => match byte {
                b'\n' => {
                    self.state.crlf_run += 1;
                    if self.state.crlf_run >= 2 {
                        self.state.end_of_headers = true;
                        self.phase = Phase::Done;
                    } else {
                        self.phase = Phase::LineStart;
                    }
                    Ok(())
                }
                _ => Err(ErrorKind::InvalidHeader),
            },

            Phase::Name => self.name_byte(byte),
            Phase::Value => match byte {
                b'\r' => {
                    self.phase = Phase::ValueCr;
                    Ok(())
                }
                b'\n' => Err(ErrorKind::InvalidHeader),
                _ => {
                    self.value.push(byte);
                    Ok(())
                }
            },
            Phase::ValueCr => match byte {
                b'\n' => self.commit_header(),
                _ => Err(ErrorKind::InvalidHeader),
            },

            Phase::Done | Phase::Failed => Ok(()),
        }
    }

    /// The next byte would be the LF closing the request line.
    #[inline]
    fn at_line_feed(&self) -> bool {
        let suffix = Version::Http11.line_suffix();
        self.phase == Phase::Version && self.state.valid_up_to_index == suffix.len() - 1
    }

    fn method_byte(&mut self, byte: u8) -> Result<(), ErrorKind> {
        if byte == b' ' {
            let method = Method::from_bytes(&self.token).ok_or(ErrorKind::InvalidMethod)?;

            self.method = Some(method);
            self.token.clear();
            self.state.valid_up_to_index = 0;
            self.phase = Phase::Uri;
            return Ok(());
        }

        let index = self.state.valid_up_to_index;
        let matches = Method::ALL.iter().any(|method| {
            let literal = method.as_str().as_bytes();
            literal.get(index) == Some(&byte) && literal.starts_with(&self.token)
        });

        if !matches {
            return Err(ErrorKind::InvalidMethod);
        }

        self.token.push(byte);
        self.state.valid_up_to_index += 1;
        Ok(())
    }

    fn uri_byte(&mut self, byte: u8) -> Result<(), ErrorKind> {
        match byte {
            b' ' if self.uri.is_empty() => Err(ErrorKind::InvalidUri),
            b' ' => {
                if simdutf8::basic::from_utf8(&self.uri).is_err() {
                    return Err(ErrorKind::InvalidEncoding);
                }

                self.state.valid_up_to_index = 0;
                self.phase = Phase::Version;
                Ok(())
            }
            b'\r' | b'\n' => Err(ErrorKind::InvalidUri),
            _ => {
                self.uri.push(byte);
                Ok(())
            }
        }
    }

    fn version_byte(&mut self, byte: u8) -> Result<(), ErrorKind> {
        let suffix = Version::Http11.line_suffix();
        let index = self.state.valid_up_to_index;

        if suffix.get(index) != Some(&byte) {
            return Err(ErrorKind::InvalidVersion);
        }

        self.state.valid_up_to_index += 1;
        if self.state.valid_up_to_index == suffix.len() {
            self.state.valid_up_to_index = 0;
            self.state.lines_validated += 1;
            self.state.crlf_run = 1;
            self.phase = Phase::LineStart;
        }

        Ok(())
    }

    fn name_byte(&mut self, byte: u8) -> Result<(), ErrorKind> {
        match byte {
            b':' if self.token.is_empty() => Err(ErrorKind::InvalidHeader),
            b':' => {
                self.state.pending_field_open = true;
                self.phase = Phase::Value;
                Ok(())
            }
            _ if byte.is_ascii_whitespace() || byte.is_ascii_control() => {
                Err(ErrorKind::InvalidHeader)
            }
            _ => {
                self.token.push(byte.to_ascii_lowercase());
                Ok(())
            }
        }
    }

    fn commit_header(&mut self) -> Result<(), ErrorKind> {
        let name = simdutf8::basic::from_utf8(&self.token).map_err(|_| ErrorKind::InvalidEncoding)?;
        let value = simdutf8::basic::from_utf8(&self.value).map_err(|_| ErrorKind::InvalidEncoding)?;

        let value = value.trim_matches(|c| c == ' ' || c == '\t');
        self.headers.insert(name.to_owned(), value.to_owned());

        self.token.clear();
        self.value.clear();

        self.state.pending_field_open = false;
        self.state.lines_validated += 1;
        self.state.crlf_run = 1;
        self.phase = Phase::LineStart;
        Ok(())
    }
}

// `io::Error` is not `Clone`; a sticky error keeps only its kind.
fn clone_error(err: &ErrorKind) -> ErrorKind {
    match err {
        ErrorKind::InvalidMethod => ErrorKind::InvalidMethod,
        ErrorKind::InvalidUri => ErrorKind::InvalidUri,
        ErrorKind::InvalidVersion => ErrorKind::InvalidVersion,
        ErrorKind::InvalidHeader => ErrorKind::InvalidHeader,
        ErrorKind::InvalidEncoding => ErrorKind::InvalidEncoding,
        ErrorKind::InvalidContentLength => ErrorKind::InvalidContentLength,
        ErrorKind::FirstLineTooLong { limit } => ErrorKind::FirstLineTooLong { limit: *limit },
        ErrorKind::HeadersTooLarge { limit } => ErrorKind::HeadersTooLarge { limit: *limit },
        ErrorKind::Timeout => ErrorKind::Timeout,
        ErrorKind::UnexpectedEof => ErrorKind::UnexpectedEof,
        ErrorKind::Io(io) => ErrorKind::from(io::Error::from(io.0.kind())),
    }
}

/// A validated head plus the body bytes that arrived with it.
#[derive(Debug)]
pub(crate) struct Parsed {
    pub(crate) head: RequestHead,
    pub(crate) prefix: Vec<u8>,
}

/// Reads from `stream` until the header section is complete.
///
/// Each read waits at most `read_timeout`, and never past `deadline`.
pub(crate) fn read_head(
    stream: &TcpStream,
    limits: &ReqLimits,
    read_timeout: Duration,
    deadline: Instant,
) -> Result<Parsed, ErrorKind> {
    let mut validator = RequestValidator::new(limits);
    let mut buffer = vec![0; limits.read_chunk_size.max(1)];
    let mut reader = stream;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ErrorKind::Timeout);
        }
        stream.set_read_timeout(Some(read_timeout.min(remaining)))?;

        let n = match reader.read(&mut buffer) {
            Ok(0) => return Err(ErrorKind::UnexpectedEof),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };

        let progress = validator.feed(&buffer[..n])?;
        tracing::trace!(
            read = n,
            total = validator.state().total_bytes_read,
            lines = validator.state().lines_validated,
            "request chunk"
        );

        if let Progress::Complete { consumed } = progress {
            let prefix = buffer[consumed..n].to_vec();
            return Ok(Parsed {
                head: validator.finish()?,
                prefix,
            });
        }
    }
}
