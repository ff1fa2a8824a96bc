use super::escape_html;
use crate::{errors::ServiceError, http::request::RequestContext, server::registry::Service};

/// Diagnostic service mounted at `/`.
///
/// Answers every request with an HTML page describing it: method, request
/// target, version and body size in bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoService;

impl Service for EchoService {
    fn prefix(&self) -> &str {
        "/"
    }

    fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<(), ServiceError> {
        let body_size = ctx
            .content_length()
            .or_else(|| ctx.body().len())
            .unwrap_or(0);

        let page = format!(
            "<html>This is the response to the request:<br>\
             Method: {}<br>\
             Request-Target/URI: {}<br>\
             Version: {}<br>\
             Request body size, in bytes: {body_size}</html>",
            ctx.method(),
            escape_html(ctx.uri()),
            ctx.version(),
        );

        ctx.write_ok("text/html", page.as_bytes())?;
        Ok(())
    }
}
