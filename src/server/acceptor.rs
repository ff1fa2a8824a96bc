use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Binds a listening socket with address reuse and the given backlog.
pub(crate) fn bind(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

/// Dedicated accept thread feeding a callback.
///
/// # Shutdown
/// [`stop`](Self::stop) raises a flag, shuts the listener down and then
/// connects to it once, so a thread blocked in `accept` always wakes up. Errors
/// seen after the flag is raised are expected and ignored.
pub(crate) struct Acceptor {
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Acceptor {
    /// Starts accepting on `listener`. The loop ends when `on_accept`
    /// returns `false` or [`stop`](Self::stop) is called.
    pub(crate) fn start<F>(listener: TcpListener, mut on_accept: F) -> io::Result<Self>
    where
        F: FnMut(TcpStream, SocketAddr) -> bool + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let listener = Arc::new(listener);
        let stopping = Arc::new(AtomicBool::new(false));

        let thread = {
            let listener = listener.clone();
            let stopping = stopping.clone();

            thread::Builder::new()
                .name("threadweb-accept".to_owned())
                .spawn(move || loop {
                    match listener.accept() {
                        Ok(_) if stopping.load(Ordering::Acquire) => break,
                        Ok((stream, peer)) => {
                            tracing::debug!(peer = %peer, "accepted connection");
                            if !on_accept(stream, peer) {
                                break;
                            }
                        }
                        Err(_) if stopping.load(Ordering::Acquire) => break,
                        Err(err) => {
                            tracing::warn!(error = %err, "accept failed");
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                })?
        };

        Ok(Self {
            listener,
            local_addr,
            stopping,
            thread: Some(thread),
        })
    }

    #[inline]
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ends the accept loop and joins its thread. Idempotent.
    pub(crate) fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.stopping.store(true, Ordering::Release);
        let _ = SockRef::from(&*self.listener).shutdown(Shutdown::Both);

        // Some platforms keep `accept` blocked after `shutdown`.
        let _ = TcpStream::connect_timeout(&wake_addr(self.local_addr), Duration::from_millis(200));

        if thread.join().is_err() {
            tracing::error!("accept thread panicked");
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Address a local client can reach the listener on.
fn wake_addr(local: SocketAddr) -> SocketAddr {
    let mut addr = local;
    if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => addr.set_ip(Ipv4Addr::LOCALHOST.into()),
            SocketAddr::V6(_) => addr.set_ip(Ipv6Addr::LOCALHOST.into()),
        }
    }
    addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::io::{Read, Write};

    #[test]
    fn accepts_until_stopped() {
        let listener = bind("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let (tx, rx) = channel::unbounded();

        let mut acceptor = Acceptor::start(listener, move |stream, _| tx.send(stream).is_ok())
            .unwrap();
        let addr = acceptor.local_addr();
        assert_ne!(addr.port(), 0);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"ping").unwrap();

        let mut accepted = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let mut buf = [0; 4];
        accepted.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        acceptor.stop();
        acceptor.stop();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_without_connections() {
        let listener = bind("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let acceptor = Acceptor::start(listener, |_, _| true).unwrap();
        drop(acceptor);
    }

    #[test]
    fn wake_address() {
        #[rustfmt::skip]
        let cases = [
            ("0.0.0.0:3000",    "127.0.0.1:3000"),
            ("[::]:3000",       "[::1]:3000"),
            ("10.1.2.3:3000",   "10.1.2.3:3000"),
        ];

        for (local, expected) in cases {
            assert_eq!(wake_addr(local.parse().unwrap()), expected.parse::<SocketAddr>().unwrap());
        }
    }
}
