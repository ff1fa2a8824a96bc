use super::escape_html;
use crate::{
    errors::ServiceError,
    http::{
        request::{ByteRange, RequestContext},
        stream::{copy_bounded, Segment},
        types::{percent_decode, Method, StatusCode},
    },
    server::registry::Service,
    vfs::{is_valid_name, DirHandle, Directory, File, FileSystem},
};
use std::{
    io::{self, Write},
    sync::Arc,
};

const PREFIX: &str = "/files";

const MISSING_PAGE: &str = "<html>404 File Not Found<br></html>";
const EXISTS_PAGE: &str = "<html>File Already Exists!</html>";
const LENGTH_REQUIRED_PAGE: &str = "<html>Content-Length Required</html>";
const BAD_NAME_PAGE: &str = "<html>Invalid File Name</html>";
const INCOMPLETE_PAGE: &str = "<html>Upload Incomplete</html>";
const BUSY_PAGE: &str = "<html>File Is Being Written</html>";
const UPLOADED_PAGE: &str = "<html>File Uploaded!</html>";

/// Browses, downloads and uploads files of a [`FileSystem`] under `/files`.
///
/// | Request                        | Response                                    |
/// |--------------------------------|---------------------------------------------|
/// | `GET /files/<dir>`             | `200` HTML listing with an upload widget    |
/// | `GET /files/<file>`            | `200` with the content                      |
/// | `GET /files/<file>` + `Range`  | `206`, or `416` if unsatisfiable            |
/// | `PUT /files/<dir>/<new file>`  | `200` once stored                           |
/// | `PUT` onto an existing entry   | `409`                                       |
/// | `PUT` without `Content-Length` | `411`                                       |
/// | `PUT` with a short body        | `400`, and the partial file is removed      |
/// | anything missing               | `404`                                       |
///
/// Path pieces are percent-decoded; empty pieces are ignored, so
/// `/files//a/` addresses the same directory as `/files/a`.
pub struct FilesService {
    fs: Arc<dyn FileSystem>,
}

impl FilesService {
    pub fn new<F: FileSystem + 'static>(fs: F) -> Self {
        Self { fs: Arc::new(fs) }
    }

    pub fn shared(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Walks `dirs` down from the root.
    fn walk(&self, dirs: &[String]) -> Option<DirHandle> {
        dirs.iter()
            .try_fold(self.fs.root(), |dir, name| dir.dir(name))
    }

    fn get(&self, ctx: &mut RequestContext<'_>, pieces: &[String]) -> Result<(), ServiceError> {
        let Some((last, dirs)) = pieces.split_last() else {
            return send_listing(ctx, &*self.fs.root());
        };
        let Some(dir) = self.walk(dirs) else {
            return send_missing(ctx);
        };

        if let Some(file) = dir.file(last) {
            send_file(ctx, &*file)
        } else if let Some(sub) = dir.dir(last) {
            send_listing(ctx, &*sub)
        } else {
            send_missing(ctx)
        }
    }

    fn put(&self, ctx: &mut RequestContext<'_>, pieces: &[String]) -> Result<(), ServiceError> {
        let Some((name, dirs)) = pieces.split_last() else {
            ctx.write_status(StatusCode::BadRequest, "text/html", BAD_NAME_PAGE.as_bytes())?;
            return Ok(());
        };
        let Some(dir) = self.walk(dirs) else {
            return send_missing(ctx);
        };

        if !is_valid_name(name) {
            ctx.write_status(StatusCode::BadRequest, "text/html", BAD_NAME_PAGE.as_bytes())?;
            return Ok(());
        }
        if dir.file(name).is_some() || dir.dir(name).is_some() {
            ctx.write_status(StatusCode::Conflict, "text/html", EXISTS_PAGE.as_bytes())?;
            return Ok(());
        }
        let Some(length) = ctx.content_length() else {
            let page = LENGTH_REQUIRED_PAGE.as_bytes();
            ctx.write_status(StatusCode::LengthRequired, "text/html", page)?;
            return Ok(());
        };

        let file = match dir.create_new_file(name) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                ctx.write_status(StatusCode::Conflict, "text/html", EXISTS_PAGE.as_bytes())?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let stored = match store_body(ctx, &*file, length) {
            Ok(stored) => stored,
            Err(err) => {
                discard(&*dir, &*file);
                return Err(err.into());
            }
        };

        if stored < length {
            tracing::warn!(path = %file.path(), stored, expected = length, "upload cut short");
            discard(&*dir, &*file);
            let page = INCOMPLETE_PAGE.as_bytes();
            ctx.write_status(StatusCode::BadRequest, "text/html", page)?;
            return Ok(());
        }

        tracing::info!(path = %file.path(), bytes = stored, "file uploaded");
        ctx.write_ok("text/html", UPLOADED_PAGE.as_bytes())?;
        Ok(())
    }
}

impl Service for FilesService {
    fn prefix(&self) -> &str {
        PREFIX
    }

    fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<(), ServiceError> {
        let Some(pieces) = split_path(ctx.path()) else {
            return send_missing(ctx);
        };

        match ctx.method() {
            Method::Get => self.get(ctx, &pieces),
            Method::Put => self.put(ctx, &pieces),
        }
    }
}

/// Decoded, non-empty pieces of the path below the service prefix.
///
/// `None` if the path only shares a leading string with the prefix, as
/// `/filesystem` does.
fn split_path(path: &str) -> Option<Vec<String>> {
    let rest = path.strip_prefix(PREFIX).unwrap_or(path);
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }

    let pieces = rest
        .split('/')
        .filter(|piece| !piece.is_empty())
        .map(percent_decode)
        .collect();
    Some(pieces)
}

/// Copies up to `length` body bytes into `file`. The writer is released
/// before returning.
fn store_body(ctx: &mut RequestContext<'_>, file: &dyn File, length: u64) -> io::Result<u64> {
    let mut stream = file.open_read_write()?;
    ctx.copy_body_to_segment(&mut *stream, length)
}

/// Removes a failed upload so the name can be used again.
fn discard(dir: &dyn Directory, file: &dyn File) {
    if let Err(err) = dir.remove_file(file.name()) {
        tracing::warn!(path = %file.path(), error = %err, "could not remove partial upload");
    }
}

fn send_missing(ctx: &mut RequestContext<'_>) -> Result<(), ServiceError> {
    tracing::debug!(uri = %ctx.uri(), "no such file or directory");
    ctx.write_not_found(MISSING_PAGE)?;
    Ok(())
}

fn send_file(ctx: &mut RequestContext<'_>, file: &dyn File) -> Result<(), ServiceError> {
    let mut stream = match file.open_read() {
        Ok(stream) => stream,
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
            let page = BUSY_PAGE.as_bytes();
            ctx.write_status(StatusCode::ServiceUnavailable, "text/html", page)?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let total = match stream.len() {
        Some(total) => total,
        None => file.len()?,
    };
    let content_type = content_type(file.name());
    let range = ctx.header("range").and_then(ByteRange::parse);

    let (start, length) = match range.map(|range| range.resolve(total)) {
        None => {
            ctx.write_ok_head(content_type, total)?;
            (0, total)
        }
        Some(Some(resolved)) => {
            ctx.write_partial_head(content_type, resolved, total)?;
            (resolved.start, resolved.len())
        }
        Some(None) => {
            ctx.write_unsatisfiable(total)?;
            return Ok(());
        }
    };

    stream.seek_to(start)?;
    let sink = ctx.sink();
    let sent = copy_bounded(length, |buf| stream.pull(buf), |bytes| sink.write_all(bytes))?;
    if sent < length {
        return Err(ServiceError::internal(format!(
            "{} ended after {sent} of {length} bytes",
            file.path()
        )));
    }

    Ok(())
}

fn send_listing(ctx: &mut RequestContext<'_>, dir: &dyn Directory) -> Result<(), ServiceError> {
    let page = listing(dir)?;
    ctx.write_ok("text/html", page.as_bytes())?;
    Ok(())
}

/// Content type by file extension.
fn content_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("html") => "text/html",
        Some("xml") => "text/xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("mp4") => "video/mp4",
        _ => "text/plain",
    }
}

/// Percent-encodes everything but unreserved URI characters.
fn encode_piece(piece: &str) -> String {
    let mut out = String::with_capacity(piece.len());
    for byte in piece.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// URL of a directory, with a trailing `/`.
fn dir_url(dir: &dyn Directory) -> String {
    let mut url = format!("{PREFIX}/");
    for piece in dir.path().split('/').filter(|piece| !piece.is_empty()) {
        url.push_str(&encode_piece(piece));
        url.push('/');
    }
    url
}

const UPLOAD_SCRIPT: &str = r#"<script>
function upload(input, base) {
    var file = input.files[0];
    if (!file) {
        return;
    }
    var status = document.getElementById('upload-status');
    status.innerText = 'Uploading ' + file.name + '...';
    input.style.visibility = 'hidden';

    var req = new XMLHttpRequest();
    req.open('PUT', base + encodeURIComponent(file.name));
    req.onloadend = function () {
        status.innerText = 'Upload (request status == ' + req.status + ')';
        document.getElementById('upload-response').innerHTML = req.responseText;
        location.reload();
    };
    req.send(file);
}
</script>"#;

/// HTML page listing the files, then the directories of `dir`.
fn listing(dir: &dyn Directory) -> io::Result<String> {
    let base = dir_url(dir);
    let mut page = String::from("<html><head><meta charset=\"utf-8\">");
    page.push_str(&format!(
        "<title>Index of {}</title></head><body>",
        escape_html(&dir.path())
    ));
    page.push_str(UPLOAD_SCRIPT);

    page.push_str("<h1>Files</h1>");
    for file in dir.files()? {
        page.push_str(&format!(
            "<a href=\"{base}{}\">{}</a><br>",
            encode_piece(file.name()),
            escape_html(file.name()),
        ));
    }

    page.push_str("<br><h1>Directories</h1>");
    for sub in dir.dirs()? {
        page.push_str(&format!(
            "<a href=\"{base}{}/\">{}</a><br>",
            encode_piece(sub.name()),
            escape_html(sub.name()),
        ));
    }

    page.push_str(&format!(
        "<hr><h3 id=\"upload-status\">Upload</h3><br>\
         <input id=\"uploader\" type=\"file\" onchange=\"upload(this, '{base}')\">\
         <h2 id=\"upload-response\"></h2><hr></body></html>"
    ));

    Ok(page)
}
