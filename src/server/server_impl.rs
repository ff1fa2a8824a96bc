use crate::{
    limits::{ConnLimits, ReqLimits, ServerLimits},
    server::{
        acceptor::{self, Acceptor},
        connection::HttpConnection,
        pool::{Job, WorkerPool},
        registry::{Service, ServiceRegistry},
    },
};
use std::{
    io,
    net::{Ipv4Addr, SocketAddr, TcpStream},
    sync::Arc,
};

type Accepted = (TcpStream, SocketAddr);

/// An HTTP/1.1 server with an explicit start/stop lifecycle.
///
/// One accept thread hands connections to a fixed pool of worker threads
/// through an unbounded queue. A worker serves exactly one request per
/// connection and closes it.
///
/// # Examples
///
/// ```no_run
/// use threadweb::{services::EchoService, Server};
///
/// let mut server = Server::builder()
///     .bind("127.0.0.1:8080".parse().unwrap())
///     .build();
///
/// server.add_service(EchoService);
/// let addr = server.start().unwrap();
/// println!("listening on {addr}");
///
/// server.stop();
/// ```
pub struct Server {
    addr: SocketAddr,
    registry: Arc<ServiceRegistry>,

    server_limits: ServerLimits,
    conn_limits: ConnLimits,
    req_limits: ReqLimits,

    running: Option<Running>,
}

struct Running {
    acceptor: Acceptor,
    pool: WorkerPool<Accepted>,
}

impl Server {
    /// Creates a builder. Without [`bind`](ServerBuilder::bind) the server
    /// listens on `0.0.0.0:3000`.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            addr: None,
            services: Vec::new(),

            server_limits: None,
            connection_limits: None,
            request_limits: None,
        }
    }

    /// Mounts a service. Legal before and after [`start`](Self::start);
    /// matching follows registration order (see [`ServiceRegistry`]).
    #[inline]
    pub fn add_service<S: Service>(&self, service: S) {
        self.registry.register(service);
    }

    #[inline]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bound address while running.
    #[inline]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.acceptor.local_addr())
    }

    /// Binds the listener, then starts the workers and the accept thread.
    ///
    /// Returns the bound address, which resolves port `0`. Calling it on a
    /// running server returns the current address.
    pub fn start(&mut self) -> io::Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let listener = acceptor::bind(self.addr, self.server_limits.listen_backlog)?;

        let connection = HttpConnection::new(
            self.registry.clone(),
            self.conn_limits.clone(),
            self.req_limits.clone(),
            self.server_limits.reject_invalid_requests,
        );
        let mut pool = WorkerPool::start(
            self.server_limits.workers(),
            "threadweb-worker",
            move |(stream, peer): Accepted| connection.run(stream, peer),
        )?;

        let sender = pool.sender();
        let acceptor = match Acceptor::start(listener, move |stream, peer| {
            sender.send(Job::Run((stream, peer))).is_ok()
        }) {
            Ok(acceptor) => acceptor,
            Err(err) => {
                pool.shutdown();
                return Err(err);
            }
        };

        let addr = acceptor.local_addr();
        tracing::info!(addr = %addr, workers = pool.len(), "server started");

        self.running = Some(Running { acceptor, pool });
        Ok(addr)
    }

    /// Stops accepting, lets every worker finish its current connection and
    /// joins all threads. Idempotent.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        running.acceptor.stop();
        running.pool.shutdown();

        tracing::info!(addr = %running.acceptor.local_addr(), "server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for [`Server`] instances.
pub struct ServerBuilder {
    addr: Option<SocketAddr>,
    services: Vec<Arc<dyn Service>>,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    request_limits: Option<ReqLimits>,
}

impl ServerBuilder {
    /// Sets the address to listen on. Port `0` picks a free port.
    #[inline(always)]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Mounts a service ahead of any added later.
    #[inline]
    pub fn service<S: Service>(mut self, service: S) -> Self {
        self.services.push(Arc::new(service));
        self
    }

    /// Configures the worker pool and listener.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use threadweb::{Server, limits::ServerLimits};
    ///
    /// let server = Server::builder()
    ///     .server_limits(ServerLimits {
    ///         worker_threads: 8,
    ///         reject_invalid_requests: true,
    ///         ..ServerLimits::default()
    ///     })
    ///     .build();
    /// ```
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures connection timeouts.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use threadweb::{Server, limits::ConnLimits};
    /// use std::time::Duration;
    ///
    /// let server = Server::builder()
    ///     .connection_limits(ConnLimits {
    ///         socket_read_timeout: Duration::from_millis(250),
    ///         parse_deadline: Duration::from_secs(2),
    ///         ..ConnLimits::default()
    ///     })
    ///     .build();
    /// ```
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures request parsing budgets.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Finalizes the builder. Nothing is bound until
    /// [`Server::start`].
    pub fn build(self) -> Server {
        let registry = Arc::new(ServiceRegistry::new());
        for service in self.services {
            registry.register_arc(service);
        }

        Server {
            addr: self
                .addr
                .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3000))),
            registry,

            server_limits: self.server_limits.unwrap_or_default(),
            conn_limits: self.connection_limits.unwrap_or_default(),
            req_limits: self.request_limits.unwrap_or_default(),

            running: None,
        }
    }
}
