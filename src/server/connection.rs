use crate::{
    errors::ErrorKind,
    http::{
        request::{Body, RequestContext},
        validator::{self, Parsed},
    },
    limits::{ConnLimits, ReqLimits},
    server::registry::ServiceRegistry,
};
use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::Arc,
    time::{Duration, Instant},
};

/// Unread body bytes discarded before closing, so the peer is not reset
/// while it still reads the response.
const DRAIN_LIMIT: u64 = 256 * 1024;

/// Everything a worker needs to serve one connection.
pub(crate) struct HttpConnection {
    registry: Arc<ServiceRegistry>,
    conn_limits: ConnLimits,
    req_limits: ReqLimits,
    reject_invalid: bool,
}

impl HttpConnection {
    pub(crate) fn new(
        registry: Arc<ServiceRegistry>,
        conn_limits: ConnLimits,
        req_limits: ReqLimits,
        reject_invalid: bool,
    ) -> Self {
        Self {
            registry,
            conn_limits,
            req_limits,
            reject_invalid,
        }
    }

    /// Validate, dispatch, close. The stream is closed on every path.
    pub(crate) fn run(&self, stream: TcpStream, peer: SocketAddr) {
        match self.impl_run(&stream, peer) {
            Ok(()) => {}
            Err(ErrorKind::Io(err)) => {
                tracing::debug!(peer = %peer, error = %err, "connection io error");
            }
            Err(err) => {
                tracing::debug!(peer = %peer, reason = %err, "dropping invalid request");

                if self.reject_invalid {
                    let _ = (&stream).write_all(err.as_http());
                }
            }
        }

        let _ = stream.shutdown(Shutdown::Write);
    }

    fn impl_run(&self, stream: &TcpStream, peer: SocketAddr) -> Result<(), ErrorKind> {
        let read_timeout = self.conn_limits.socket_read_timeout.max(Duration::from_millis(1));
        let write_timeout = self.conn_limits.socket_write_timeout.filter(|t| !t.is_zero());
        stream.set_write_timeout(write_timeout)?;

        let deadline = Instant::now() + self.conn_limits.parse_deadline;
        let Parsed { head, prefix } =
            validator::read_head(stream, &self.req_limits, read_timeout, deadline)?;
        stream.set_read_timeout(Some(read_timeout))?;

        tracing::debug!(peer = %peer, method = %head.method, uri = %head.uri, "request");

        let mut ctx = RequestContext::new(head, prefix, stream, peer)?;
        self.registry.dispatch(&mut ctx);

        if let Body::Bounded(body) = ctx.body_mut() {
            let _ = io::copy(&mut body.take(DRAIN_LIMIT), &mut io::sink());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::ServiceError, tools::*, Service};
    use std::thread;

    struct Echo;

    impl Service for Echo {
        fn prefix(&self) -> &str {
            "/"
        }

        fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<(), ServiceError> {
            let mut body = Vec::new();
            ctx.copy_body_to(&mut body, u64::MAX)?;
            ctx.write_ok("text/plain", &body)?;
            Ok(())
        }
    }

    fn roundtrip(reject_invalid: bool, request: &'static [u8]) -> Vec<u8> {
        let registry = Arc::new(ServiceRegistry::new());
        registry.register(Echo);

        let conn = HttpConnection::new(
            registry,
            ConnLimits {
                socket_read_timeout: Duration::from_millis(200),
                ..ConnLimits::default()
            },
            ReqLimits::default(),
            reject_invalid,
        );

        let (mut client, server) = socket_pair();
        let peer = client.local_addr().unwrap();
        let worker = thread::spawn(move || conn.run(server, peer));

        client.write_all(request).unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).unwrap();
        worker.join().unwrap();
        response
    }

    #[test]
    fn serves_and_closes() {
        let response = roundtrip(false, b"PUT / HTTP/1.1\r\nContent-Length: 4\r\n\r\nping");
        assert_eq!(
            str_op(&response),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4\r\n\r\nping"
        );
    }

    #[test]
    fn invalid_requests() {
        #[rustfmt::skip]
        let cases: [(&'static [u8], bool, &str); 4] = [
            (b"POST / HTTP/1.1\r\n\r\n", false, ""),
            (b"POST / HTTP/1.1\r\n\r\n", true,  "HTTP/1.1 400 Bad Request\r\n"),
            (b"GET / HTTP/1.1\r\n",      false, ""),
            (b"GET / HTTP/1.1\r\n",      true,  "HTTP/1.1 408 Request Timeout\r\n"),
        ];

        for (request, reject, expected) in cases {
            let response = roundtrip(reject, request);
            assert!(str_op(&response).starts_with(expected), "{:?}", str_op(&response));
            if !reject {
                assert!(response.is_empty());
            }
        }
    }
}
