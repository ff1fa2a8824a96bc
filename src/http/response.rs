//! Response head construction.
//!
//! The server never frames a response on a service's behalf: a service writes
//! the head built here, then streams its own body bytes to the sink.

use crate::http::{
    request::ResolvedRange,
    types::{StatusCode, Version, CRLF},
};
use std::{fmt::Display, io::Write};

#[derive(Debug, Clone, Copy, PartialEq)]
enum HeadState {
    Clean,
    Headers,
    Complete,
}

/// Builder for a status line plus header section.
///
/// Build heads in strict order: [`status()`](Self::status) -> headers ->
/// [`finish()`](Self::finish).
///
/// # Examples
/// ```
/// use threadweb::{ResponseHead, StatusCode, Version};
///
/// let mut head = ResponseHead::new(Version::Http11);
/// head.status(StatusCode::Ok)
///     .header("Content-Type", "text/plain")
///     .header("Content-Length", 5);
///
/// assert_eq!(
///     head.finish(),
///     b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\n"
/// );
/// ```
///
/// # Panics
/// Order violations panic in `debug` mode.
#[derive(Debug)]
pub struct ResponseHead {
    buffer: Vec<u8>,
    version: Version,
    state: HeadState,
}

impl ResponseHead {
    #[inline]
    pub fn new(version: Version) -> Self {
        Self {
            buffer: Vec::with_capacity(128),
            version,
            state: HeadState::Clean,
        }
    }

    /// Writes the status line.
    ///
    /// # Panics
    /// Error message: `Must be first and called only once`
    #[inline]
    #[track_caller]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        debug_assert!(
            self.state == HeadState::Clean,
            "Must be first and called only once"
        );

        // Writing into a `Vec` cannot fail.
        let _ = write!(self.buffer, "{} {}\r\n", self.version, status);
        self.state = HeadState::Headers;
        self
    }

    /// Adds one header line.
    ///
    /// # Panics
    /// Error message: `Must be called after status() and before finish()`
    #[inline]
    #[track_caller]
    pub fn header<V: Display>(&mut self, name: &str, value: V) -> &mut Self {
        debug_assert!(
            self.state == HeadState::Headers,
            "Must be called after status() and before finish()"
        );

        let _ = write!(self.buffer, "{name}: {value}\r\n");
        self
    }

    /// Terminates the header section and returns the encoded head.
    #[inline]
    #[track_caller]
    pub fn finish(&mut self) -> &[u8] {
        debug_assert!(
            self.state != HeadState::Clean,
            "Must be called after status()"
        );

        if self.state == HeadState::Headers {
            self.buffer.extend_from_slice(CRLF);
            self.state = HeadState::Complete;
        }
        &self.buffer
    }

    #[inline]
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.finish();
        self.buffer
    }
}

// TEMPLATES

/// Head of a response with a body of `len` bytes.
pub(crate) fn status_head(
    version: Version,
    status: StatusCode,
    content_type: &str,
    len: u64,
) -> Vec<u8> {
    let mut head = ResponseHead::new(version);
    head.status(status)
        .header("Content-Type", content_type)
        .header("Content-Length", len);
    head.into_bytes()
}

/// `200 OK` head.
#[inline]
pub(crate) fn ok_head(version: Version, content_type: &str, len: u64) -> Vec<u8> {
    status_head(version, StatusCode::Ok, content_type, len)
}

/// `206 Partial Content` head for `range` of a `total`-byte resource.
pub(crate) fn partial_head(
    version: Version,
    content_type: &str,
    range: ResolvedRange,
    total: u64,
) -> Vec<u8> {
    let mut head = ResponseHead::new(version);
    head.status(StatusCode::PartialContent)
        .header("Content-Type", content_type)
        .header(
            "Content-Range",
            format_args!("bytes {}-{}/{total}", range.start, range.end),
        )
        .header("Content-Length", range.len());
    head.into_bytes()
}

/// `416 Range Not Satisfiable` head, without a body.
pub(crate) fn unsatisfiable_head(version: Version, total: u64) -> Vec<u8> {
    let mut head = ResponseHead::new(version);
    head.status(StatusCode::RangeNotSatisfiable)
        .header("Content-Range", format_args!("bytes */{total}"))
        .header("Content-Length", 0);
    head.into_bytes()
}

/// `404 Not Found` head for an HTML body of `len` bytes.
#[inline]
pub(crate) fn not_found_head(version: Version, len: u64) -> Vec<u8> {
    status_head(version, StatusCode::NotFound, "text/html", len)
}

pub(crate) const NOT_FOUND_PAGE: &str =
    "<html><head><title>404 Not Found</title></head><body><h1>404 Not Found</h1></body></html>";

pub(crate) const INTERNAL_ERROR_PAGE: &str = "<html><head><title>500 Internal Server Error</title>\
    </head><body><h1>500 Internal Server Error</h1></body></html>";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn status_lines() {
        #[rustfmt::skip]
        let cases = [
            (StatusCode::Ok,                  "HTTP/1.1 200 OK\r\n"),
            (StatusCode::NotFound,            "HTTP/1.1 404 Not Found\r\n"),
            (StatusCode::Conflict,            "HTTP/1.1 409 Conflict\r\n"),
            (StatusCode::RangeNotSatisfiable, "HTTP/1.1 416 Range Not Satisfiable\r\n"),
        ];

        for (status, line) in cases {
            let mut head = ResponseHead::new(Version::Http11);
            head.status(status);
            assert_eq!(str_op(head.finish()), format!("{line}\r\n"));
        }
    }

    #[test]
    fn finish_twice() {
        let mut head = ResponseHead::new(Version::Http11);
        head.status(StatusCode::Ok).header("A", 1);

        let first = head.finish().to_vec();
        assert_eq!(head.finish(), first.as_slice());
    }

    #[test]
    #[should_panic(expected = "Must be first and called only once")]
    fn double_status() {
        ResponseHead::new(Version::Http11)
            .status(StatusCode::Ok)
            .status(StatusCode::NotFound);
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before finish()")]
    fn header_before_status() {
        ResponseHead::new(Version::Http11).header("A", "b");
    }

    #[test]
    fn templates() {
        #[rustfmt::skip]
        let cases = [
            (
                ok_head(Version::Http11, "text/html", 12),
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 12\r\n\r\n",
            ),
            (
                partial_head(Version::Http11, "text/plain", ResolvedRange { start: 0, end: 99 }, 200),
                "HTTP/1.1 206 Partial Content\r\nContent-Type: text/plain\r\n\
                 Content-Range: bytes 0-99/200\r\nContent-Length: 100\r\n\r\n",
            ),
            (
                unsatisfiable_head(Version::Http11, 200),
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */200\r\nContent-Length: 0\r\n\r\n",
            ),
            (
                not_found_head(Version::Http11, 3),
                "HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\nContent-Length: 3\r\n\r\n",
            ),
        ];

        for (head, expected) in cases {
            assert_eq!(str_op(&head), expected);
        }
    }
}
