//! Server configuration limits and timeouts
//!
//! # Budget enforcement
//!
//! Every connection is parsed under three independent budgets:
//! - a byte budget for the request line ([`ReqLimits::first_line_size`])
//! - a byte budget for the whole header section ([`ReqLimits::header_size`])
//! - a wall-clock budget for the whole parse ([`ConnLimits::parse_deadline`])
//!
//! Each individual socket read is additionally bounded by
//! [`ConnLimits::socket_read_timeout`]. Exceeding any of them invalidates the
//! request (see [`ServerLimits::reject_invalid_requests`] for what the client sees).
//!
//! # Examples
//!
//! ```no_run
//! use threadweb::{Server, limits::{ConnLimits, ReqLimits, ServerLimits}};
//! use std::time::Duration;
//!
//! let mut server = Server::builder()
//!     .bind("127.0.0.1:8080".parse().unwrap())
//!     .server_limits(ServerLimits {
//!         worker_threads: 16,
//!         ..ServerLimits::default()
//!     })
//!     .connection_limits(ConnLimits {
//!         socket_read_timeout: Duration::from_millis(500),
//!         ..ConnLimits::default()
//!     })
//!     .request_limits(ReqLimits {
//!         header_size: 16 * 1024,
//!         ..ReqLimits::default()
//!     })
//!     .build();
//!
//! server.start().unwrap();
//! ```

use std::time::Duration;

/// Worker count used when the requested count is zero or negative.
pub const DEFAULT_WORKER_THREADS: usize = 64;

/// Controls the worker pool and listener.
///
/// # Connection management
/// ```text
///   [ accept thread ] --TcpStream--> [ unbounded queue ] --take--> [ worker 1..N ]
///                                                                       |
///                                               validate -> dispatch -> close
/// ```
///
/// The queue has no capacity limit: every accepted connection waits until a
/// worker becomes free. A worker handles exactly one connection at a time and
/// closes it before taking the next one.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker threads started by [`Server::start`](crate::Server::start)
    /// (default: `64`). A value of `0` is treated as the default.
    pub worker_threads: usize,

    /// Backlog passed to `listen(2)` (default: `1024`).
    pub listen_backlog: i32,

    /// What the client sees when its request is invalid (default: `false`).
    ///
    /// If `false`, the connection is closed without any response, which is
    /// the historical behaviour of this server. If `true`, a short canned
    /// response is written first:
    /// ```text
    /// HTTP/1.1 400 Bad Request\r
    /// connection: close\r
    /// content-length: 0\r
    /// \r
    /// ```
    pub reject_invalid_requests: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            listen_backlog: 1024,
            reject_invalid_requests: false,

            _priv: (),
        }
    }
}

impl ServerLimits {
    /// Builds limits from a signed thread count, as read from a command line.
    ///
    /// # Examples
    /// ```
    /// use threadweb::limits::ServerLimits;
    ///
    /// assert_eq!(ServerLimits::with_requested_threads(8).worker_threads, 8);
    /// assert_eq!(ServerLimits::with_requested_threads(0).worker_threads, 64);
    /// assert_eq!(ServerLimits::with_requested_threads(-3).worker_threads, 64);
    /// ```
    pub fn with_requested_threads(threads: i64) -> Self {
        let worker_threads = match usize::try_from(threads) {
            Ok(0) | Err(_) => DEFAULT_WORKER_THREADS,
            Ok(n) => n,
        };

        Self {
            worker_threads,
            ..Self::default()
        }
    }

    #[inline]
    pub(crate) fn workers(&self) -> usize {
        match self.worker_threads {
            0 => DEFAULT_WORKER_THREADS,
            n => n,
        }
    }
}

/// Connection-level timeouts.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum idle time of a single socket read (default: `1 second`).
    ///
    /// A read that times out is treated as the end of input: if the headers
    /// are not complete at that point, the request is invalid.
    pub socket_read_timeout: Duration,

    /// Maximum duration of a single socket write (default: `None`).
    ///
    /// With `None` writes block for as long as the peer needs, so a client
    /// that stops reading holds its worker until it goes away.
    pub socket_write_timeout: Option<Duration>,

    /// Wall-clock budget for reading and validating the request line and
    /// headers, measured from the first read attempt (default: `10 seconds`).
    pub parse_deadline: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_millis(1_000),
            socket_write_timeout: None,
            parse_deadline: Duration::from_millis(10_000),

            _priv: (),
        }
    }
}

/// Request parsing budgets.
///
/// | Limit             | Default   | Applies to                                      |
/// |-------------------|-----------|-------------------------------------------------|
/// | `first_line_size` | 2,048 B   | bytes before the request line terminator starts |
/// | `header_size`     | 102,400 B | bytes up to and including the blank line        |
/// | `read_chunk_size` | 4,096 B   | size of the buffer handed to each socket read   |
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// The request line terminator must begin within this many bytes
    /// (default: `2048`).
    ///
    /// `GET /<2039 bytes> HTTP/1.1\r\n` (2,047 bytes before `\r\n`) is
    /// accepted, one byte more is rejected.
    pub first_line_size: usize,

    /// The blank line ending the header section must be complete within this
    /// many bytes from the start of the connection (default: `102400`).
    pub header_size: usize,

    /// Size of the fixed read buffer (default: `4096`).
    pub read_chunk_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            first_line_size: 2 * 1024,
            header_size: 100 * 1024,
            read_chunk_size: 4 * 1024,

            _priv: (),
        }
    }
}
