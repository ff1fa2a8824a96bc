use crate::{
    errors::ServiceError,
    http::{
        request::RequestContext,
        response::{INTERNAL_ERROR_PAGE, NOT_FOUND_PAGE},
        types::StatusCode,
    },
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, PoisonError, RwLock},
};

/// A request handler mounted under a URI prefix.
///
/// The handler writes a complete response (status line, headers, body)
/// through the [`RequestContext`] before returning; nothing is framed on its
/// behalf.
///
/// # Errors
///
/// An `Err` or a panic is logged. If no response byte was written yet the
/// client receives `500 Internal Server Error`, otherwise the connection is
/// closed as is. The worker keeps running either way.
///
/// # Examples
/// ```
/// use threadweb::{RequestContext, Service, ServiceError};
///
/// struct Hello;
///
/// impl Service for Hello {
///     fn prefix(&self) -> &str {
///         "/hello"
///     }
///
///     fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<(), ServiceError> {
///         ctx.write_ok("text/plain", b"Hello world!")?;
///         Ok(())
///     }
/// }
/// ```
pub trait Service: Send + Sync + 'static {
    /// Case-sensitive prefix of the URIs this service answers.
    fn prefix(&self) -> &str;

    fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<(), ServiceError>;
}

/// Ordered, append-only set of services.
///
/// # Matching
///
/// **First match wins.** Services are tried in registration order and the
/// first whose prefix starts the request URI handles it. A broad prefix
/// registered early shadows more specific ones registered later:
///
/// ```text
/// register("/files"), register("/")   GET /files/a.txt -> "/files"
/// register("/"), register("/files")   GET /files/a.txt -> "/"
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<Vec<Arc<dyn Service>>>,
}

impl ServiceRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a service. Safe to call while requests are being dispatched.
    pub fn register<S: Service>(&self, service: S) {
        self.register_arc(Arc::new(service));
    }

    pub fn register_arc(&self, service: Arc<dyn Service>) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        services.push(service);
    }

    pub fn len(&self) -> usize {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First registered service whose prefix starts `uri`.
    pub fn find(&self, uri: &str) -> Option<Arc<dyn Service>> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);

        services
            .iter()
            .find(|service| uri.starts_with(service.prefix()))
            .cloned()
    }

    /// Routes the request to its service, or answers `404 Not Found`.
    pub fn dispatch(&self, ctx: &mut RequestContext<'_>) {
        // The lock is released before the service runs.
        let Some(service) = self.find(ctx.uri()) else {
            tracing::debug!(uri = %ctx.uri(), "no service matched");

            if let Err(err) = ctx.write_not_found(NOT_FOUND_PAGE) {
                tracing::debug!(error = %err, "failed to send 404");
            }
            return;
        };

        tracing::debug!(uri = %ctx.uri(), service = service.prefix(), "dispatching");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| service.handle(ctx)));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(&*payload),
        };

        tracing::error!(
            uri = %ctx.uri(),
            service = service.prefix(),
            error = %failure,
            "service failed"
        );

        if ctx.response_started() {
            tracing::warn!(uri = %ctx.uri(), "response already started, closing connection");
            return;
        }

        let result = ctx.write_status(
            StatusCode::InternalServerError,
            "text/html",
            INTERNAL_ERROR_PAGE.as_bytes(),
        );
        if let Err(err) = result {
            tracing::debug!(error = %err, "failed to send 500");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http::validator::{Progress, RequestValidator},
        tools::*,
    };
    use std::io::Read;

    struct Named(&'static str);

    impl Service for Named {
        fn prefix(&self) -> &str {
            self.0
        }

        fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<(), ServiceError> {
            ctx.write_ok("text/plain", self.0.as_bytes())?;
            Ok(())
        }
    }

    struct Failing {
        panic: bool,
        write_first: bool,
    }

    impl Service for Failing {
        fn prefix(&self) -> &str {
            "/"
        }

        fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<(), ServiceError> {
            if self.write_first {
                ctx.write_all(b"HTTP/1.1 200 OK\r\n")?;
            }
            if self.panic {
                panic!("boom");
            }
            Err(ServiceError::internal("broken"))
        }
    }

    fn request(registry: &ServiceRegistry, uri: &str) -> String {
        let (mut client, server) = socket_pair();
        let src = format!("GET {uri} HTTP/1.1\r\n\r\n");

        let mut validator = RequestValidator::default();
        assert!(matches!(
            validator.feed(src.as_bytes()),
            Ok(Progress::Complete { .. })
        ));
        let head = validator.finish().unwrap();

        let peer = client.local_addr().unwrap();
        {
            let mut ctx = RequestContext::new(head, Vec::new(), &server, peer).unwrap();
            registry.dispatch(&mut ctx);
        }
        drop(server);

        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn first_match_wins() {
        let specific_first = ServiceRegistry::new();
        specific_first.register(Named("/files"));
        specific_first.register(Named("/"));

        let root_first = ServiceRegistry::new();
        root_first.register(Named("/"));
        root_first.register(Named("/files"));

        #[rustfmt::skip]
        let cases = [
            (&specific_first, "/files/a.txt", "/files"),
            (&specific_first, "/other",       "/"),
            (&root_first,     "/files/a.txt", "/"),
            (&root_first,     "/other",       "/"),
        ];

        for (registry, uri, expected) in cases {
            let found = registry.find(uri).map(|service| service.prefix().to_owned());
            assert_eq!(found.as_deref(), Some(expected));

            let response = request(registry, uri);
            assert!(response.ends_with(&format!("\r\n\r\n{expected}")), "{response}");
        }
    }

    #[test]
    fn prefix_is_case_sensitive_and_bounded() {
        let registry = ServiceRegistry::new();
        registry.register(Named("/files"));

        assert!(registry.find("/Files/a").is_none());
        assert!(registry.find("/fil").is_none());
        assert!(registry.find("/files").is_some());
        assert!(registry.find("/filesystem").is_some());
    }

    #[test]
    fn not_found() {
        let registry = ServiceRegistry::new();
        registry.register(Named("/files"));

        let response = request(&registry, "/nothing");
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\n"));
        assert!(response.ends_with(NOT_FOUND_PAGE));
    }

    #[test]
    fn failures_become_500() {
        for panic in [false, true] {
            let registry = ServiceRegistry::new();
            registry.register(Failing { panic, write_first: false });

            let response = request(&registry, "/x");
            assert!(
                response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"),
                "{response}"
            );
        }
    }

    #[test]
    fn started_response_is_not_replaced() {
        let registry = ServiceRegistry::new();
        registry.register(Failing { panic: true, write_first: true });

        assert_eq!(request(&registry, "/x"), "HTTP/1.1 200 OK\r\n");
    }

    #[test]
    fn register_while_shared() {
        let registry = Arc::new(ServiceRegistry::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        registry.register(Named("/"));
                        let _ = registry.find("/x");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 100);
    }
}
