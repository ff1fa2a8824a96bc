//! Core HTTP protocol types and utilities

use std::fmt;

pub(crate) const CRLF: &[u8] = b"\r\n";

// DIGITS

/// Parses a non-empty run of ASCII digits, rejecting signs, spaces and overflow.
#[inline]
pub(crate) fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: u64 = 0;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }

        result = result.checked_mul(10)?.checked_add((byte - b'0') as u64)?;
    }

    Some(result)
}

// PERCENT DECODING

#[inline(always)]
const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decodes `%XX` escapes in a URI path segment.
///
/// Malformed escapes are kept literally; invalid UTF-8 after decoding is
/// replaced lossily.
///
/// # Examples
/// ```
/// use threadweb::percent_decode;
///
/// assert_eq!(percent_decode("my%20file.txt"), "my file.txt");
/// assert_eq!(percent_decode("100%"), "100%");
/// ```
pub fn percent_decode(segment: &str) -> String {
    let src = segment.as_bytes();
    let mut out = Vec::with_capacity(src.len());

    let mut i = 0;
    while i < src.len() {
        if src[i] == b'%' && i + 2 < src.len() {
            if let (Some(hi), Some(lo)) = (hex_value(src[i + 1]), hex_value(src[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }

        out.push(src[i]);
        i += 1;
    }

    match String::from_utf8(out) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

// METHOD

/// HTTP request methods accepted by the validator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method - transfer a current representation of the target resource
    /// [[RFC7231, Section 4.3.1](https://tools.ietf.org/html/rfc7231#section-4.3.1)]
    Get,
    /// PUT method - replace all current representations of the target resource with the request payload
    /// [[RFC7231, Section 4.3.4](https://tools.ietf.org/html/rfc7231#section-4.3.4)]
    Put,
}

impl Method {
    pub(crate) const ALL: [Method; 2] = [Method::Get, Method::Put];

    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
        }
    }

    #[inline(always)]
    pub(crate) fn from_bytes(src: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str().as_bytes() == src)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// VERSION

/// HTTP protocol version. Only `HTTP/1.1` is accepted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/1.1 - [RFC 7230](https://tools.ietf.org/html/rfc7230) and related
    Http11,
}

impl Version {
    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Version::Http11 => "HTTP/1.1",
        }
    }

    /// Literal the request line must end with, terminator included.
    #[inline(always)]
    pub(crate) const fn line_suffix(&self) -> &'static [u8] {
        match self {
            Version::Http11 => b"HTTP/1.1\r\n",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($(
        $(#[$docs:meta])+
        $name:ident = ($num:expr, $str:expr);
    )+) => {
        /// HTTP status codes used by the server and its services.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $(#[$docs])+
            $name = $num,
        )+ }

        impl StatusCode {
            #[inline]
            pub const fn as_u16(&self) -> u16 {
                *self as u16
            }

            #[inline]
            pub const fn reason(&self) -> &'static str {
                match self { $(
                    StatusCode::$name => $str,
                )+ }
            }
        }
    }
}

set_status_codes! {
    /// [[RFC9110, Section 15.3.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.1)]
    Ok = (200, "OK");
    /// [[RFC9110, Section 15.3.7](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.7)]
    PartialContent = (206, "Partial Content");

    /// [[RFC9110, Section 15.5.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.1)]
    BadRequest = (400, "Bad Request");
    /// [[RFC9110, Section 15.5.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.5)]
    NotFound = (404, "Not Found");
    /// [[RFC9110, Section 15.5.10](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.10)]
    Conflict = (409, "Conflict");
    /// [[RFC9110, Section 15.5.12](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.12)]
    LengthRequired = (411, "Length Required");
    /// [[RFC9110, Section 15.5.17](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.17)]
    RangeNotSatisfiable = (416, "Range Not Satisfiable");

    /// [[RFC9110, Section 15.6.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.1)]
    InternalServerError = (500, "Internal Server Error");
    /// [[RFC9110, Section 15.6.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.4)]
    ServiceUnavailable = (503, "Service Unavailable");
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal() {
        #[rustfmt::skip]
        let cases: [(&[u8], Option<u64>); 7] = [
            (b"0",                    Some(0)),
            (b"182",                  Some(182)),
            (b"18446744073709551615", Some(u64::MAX)),
            (b"18446744073709551616", None),
            (b"",                     None),
            (b"-1",                   None),
            (b"1 ",                   None),
        ];

        for (src, expected) in cases {
            assert_eq!(parse_decimal(src), expected, "{:?}", std::str::from_utf8(src));
        }
    }

    #[test]
    fn percent() {
        #[rustfmt::skip]
        let cases = [
            ("plain",         "plain"),
            ("a%20b",         "a b"),
            ("%23hash",       "#hash"),
            ("%e2%82%ac",     "€"),
            ("bad%zzescape",  "bad%zzescape"),
            ("tail%2",        "tail%2"),
            ("tail%",         "tail%"),
        ];

        for (src, expected) in cases {
            assert_eq!(percent_decode(src), expected);
        }
    }

    #[test]
    fn method_literals() {
        assert_eq!(Method::from_bytes(b"GET"), Some(Method::Get));
        assert_eq!(Method::from_bytes(b"PUT"), Some(Method::Put));
        assert_eq!(Method::from_bytes(b"get"), None);
        assert_eq!(Method::from_bytes(b"POST"), None);
    }

    #[test]
    fn status_display() {
        assert_eq!(StatusCode::PartialContent.to_string(), "206 Partial Content");
        assert_eq!(StatusCode::NotFound.as_u16(), 404);
    }
}
