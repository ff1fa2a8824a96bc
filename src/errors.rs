use std::io;
use thiserror::Error;

/// Reason a connection's request was rejected by the validator.
#[derive(Debug, Error, PartialEq)]
pub enum ErrorKind {
    #[error("invalid http method")]
    InvalidMethod,
    #[error("invalid request uri")]
    InvalidUri,
    #[error("invalid or unsupported http version")]
    InvalidVersion,
    #[error("invalid header line")]
    InvalidHeader,
    #[error("header section is not valid utf-8")]
    InvalidEncoding,
    #[error("invalid content-length header")]
    InvalidContentLength,

    #[error("request line exceeds {limit} bytes")]
    FirstLineTooLong { limit: usize },
    #[error("header section exceeds {limit} bytes")]
    HeadersTooLarge { limit: usize },
    #[error("request was not received in time")]
    Timeout,
    #[error("connection closed before the end of headers")]
    UnexpectedEof,

    #[error("io error: {0}")]
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status_code:expr;)*) => {
        /// Canned response written when invalid requests are answered
        /// instead of dropped.
        pub(crate) const fn as_http(&self) -> &'static [u8] {
            match self { $(
                Self::$name { .. } => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
            )* }.as_bytes()
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidMethod: "400 Bad Request";
        InvalidUri: "400 Bad Request";
        InvalidVersion: "400 Bad Request";
        InvalidHeader: "400 Bad Request";
        InvalidEncoding: "400 Bad Request";
        InvalidContentLength: "400 Bad Request";

        FirstLineTooLong: "414 URI Too Long";
        HeadersTooLarge: "431 Request Header Fields Too Large";
        Timeout: "408 Request Timeout";
        UnexpectedEof: "400 Bad Request";

        Io: "400 Bad Request";
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Io(IoError(err)),
        }
    }
}

/// `io::Error` compared by kind, so [`ErrorKind`] can be asserted on in tests.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct IoError(pub io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

/// Failure reported by a [`Service`](crate::Service).
///
/// The dispatcher logs it and, if the service has not written anything yet,
/// answers with `500 Internal Server Error`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn bad_request<S: ToString>(reason: S) -> Self {
        Self::BadRequest(reason.to_string())
    }

    pub fn internal<S: ToString>(reason: S) -> Self {
        Self::Internal(reason.to_string())
    }
}
