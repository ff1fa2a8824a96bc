//! threadweb - Synchronous thread-pool HTTP/1.1 server
//!
//! A small blocking HTTP server: one accept thread, a fixed pool of worker
//! threads, and services mounted under URI prefixes. Every connection carries
//! exactly one request and is closed once the service returns.
//!
//! # Request pipeline
//!
//! ```text
//!   accept thread --TcpStream--> [ queue ] --> worker
//!                                                |
//!         RequestValidator (incremental, budgeted, deadline-bound)
//!                                                |
//!         RequestContext { head, Body = prefix ++ socket tail }
//!                                                |
//!         ServiceRegistry::dispatch (first matching prefix) --> close
//! ```
//!
//! - **Incremental validation** - [`RequestValidator`] accepts the header
//!   section in chunks of any size and rejects it at the first bad byte.
//! - **Spliced bodies** - bytes read past the header section are not lost:
//!   [`ComposedStream`] presents them followed by the unread socket tail as
//!   one stream.
//! - **Silent rejection** - invalid requests are dropped without a response
//!   unless [`limits::ServerLimits::reject_invalid_requests`] is set.
//!
//! # Examples
//!
//! ```no_run
//! use threadweb::{RequestContext, Server, Service, ServiceError};
//!
//! struct Hello;
//!
//! impl Service for Hello {
//!     fn prefix(&self) -> &str {
//!         "/"
//!     }
//!
//!     fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<(), ServiceError> {
//!         ctx.write_ok("text/plain", b"Hello World!")?;
//!         Ok(())
//!     }
//! }
//!
//! let mut server = Server::builder()
//!     .bind("127.0.0.1:8080".parse().unwrap())
//!     .service(Hello)
//!     .build();
//!
//! server.start().unwrap();
//! // ...
//! server.stop();
//! ```
//!
//! Serving files:
//! ```no_run
//! use threadweb::{
//!     services::{EchoService, FilesService},
//!     vfs::DiskFileSystem,
//!     Server,
//! };
//!
//! let mut server = Server::builder()
//!     .service(FilesService::new(DiskFileSystem::open("/srv/www").unwrap()))
//!     .service(EchoService)
//!     .build();
//!
//! server.start().unwrap();
//! ```

pub(crate) mod http {
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod stream;
    pub(crate) mod types;
    pub(crate) mod validator;
}
pub(crate) mod server {
    pub(crate) mod acceptor;
    pub(crate) mod connection;
    pub(crate) mod pool;
    pub(crate) mod registry;
    pub(crate) mod server_impl;
}
pub(crate) mod errors;
pub mod limits;
pub mod services;
pub mod vfs;

pub use crate::{
    errors::{ErrorKind, IoError, ServiceError},
    http::{
        request::{Body, ByteRange, RequestContext, ResolvedRange, ResponseSink},
        response::ResponseHead,
        stream::{ComposedStream, Segment, Sequential},
        types::{percent_decode, Method, StatusCode, Version},
        validator::{Headers, ParserState, Progress, RequestHead, RequestValidator},
    },
    server::{
        registry::{Service, ServiceRegistry},
        server_impl::{Server, ServerBuilder},
    },
};
