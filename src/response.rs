//! The mutable, single-flush response accumulator threaded through the pipeline.
//!
//! Unlike the teacher's functional `Responder` model (each middleware returns a
//! brand-new `hyper::Response`), this `Response` is one object mutated in place by
//! the whole chain — including an isolated container sharing its host's instance —
//! and flushed exactly once via [`Response::finalize`].

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use cookie::{Cookie, CookieBuilder, SameSite};
use futures_util::Stream;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};

use crate::body::Body;
use crate::error::AppError;
use crate::sse::{self, SseSink};

#[derive(Default)]
enum BodyRepr {
    #[default]
    Absent,
    Fixed(Bytes),
    Streaming(Body),
}

/// Accumulated HTTP response state for one request.
pub struct Response {
    pub status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
    body: BodyRepr,
    sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: BodyRepr::Absent,
            sent: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    fn ensure_unset(&self) -> Result<(), AppError> {
        match self.body {
            BodyRepr::Absent => Ok(()),
            _ => Err(AppError::Conflict("response already configured".into())),
        }
    }

    // -- body setters --------------------------------------------------

    pub fn json<T: serde::Serialize>(&mut self, value: &T) -> Result<(), AppError> {
        self.ensure_unset()?;
        let bytes = serde_json::to_vec(value)
            .map_err(|e| AppError::Unexpected(anyhow::anyhow!(e)))?;
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        self.body = BodyRepr::Fixed(Bytes::from(bytes));
        Ok(())
    }

    pub fn text(&mut self, body: impl Into<String>) -> Result<(), AppError> {
        self.set_mime_body(body.into().into_bytes(), "text/plain; charset=utf-8")
    }

    pub fn html(&mut self, body: impl Into<String>) -> Result<(), AppError> {
        self.set_mime_body(body.into().into_bytes(), "text/html; charset=utf-8")
    }

    pub fn xml(&mut self, body: impl Into<String>) -> Result<(), AppError> {
        self.set_mime_body(body.into().into_bytes(), "application/xml; charset=utf-8")
    }

    pub fn bytes(&mut self, buffer: impl Into<Bytes>, mime: &str) -> Result<(), AppError> {
        self.set_mime_body(buffer.into(), mime)
    }

    fn set_mime_body(&mut self, buffer: impl Into<Bytes>, mime: &str) -> Result<(), AppError> {
        self.ensure_unset()?;
        let bytes = buffer.into();
        if let Ok(value) = HeaderValue::from_str(mime) {
            self.headers.insert(header::CONTENT_TYPE, value);
        }
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        self.body = BodyRepr::Fixed(bytes);
        Ok(())
    }

    /// Reads `path` and serves it with a MIME type inferred from the extension.
    /// A missing file rewrites the response to a 404 with text "File not found"
    /// rather than failing — matching the framework's response-level recovery.
    pub async fn file(&mut self, path: impl AsRef<Path>) -> Result<(), AppError> {
        self.ensure_unset()?;
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(contents) => {
                let mime = mime_guess::from_path(path).first_or_octet_stream();
                self.status = StatusCode::OK;
                self.set_mime_body(contents, mime.as_ref())
            }
            Err(_) => {
                self.status = StatusCode::NOT_FOUND;
                self.set_mime_body(b"File not found".to_vec(), "text/plain; charset=utf-8")
            }
        }
    }

    pub fn redirect(&mut self, url: impl AsRef<str>, status: Option<StatusCode>) -> Result<(), AppError> {
        self.ensure_unset()?;
        self.status = status.unwrap_or(StatusCode::MOVED_PERMANENTLY);
        if let Ok(value) = HeaderValue::from_str(url.as_ref()) {
            self.headers.insert(header::LOCATION, value);
        }
        self.body = BodyRepr::Fixed(Bytes::new());
        Ok(())
    }

    /// Writes chunks progressively from `source`. Mutually exclusive with other
    /// body forms; sets chunked transfer encoding implicitly (no `Content-Length`).
    pub fn stream<S, E>(&mut self, source: S, mime: &str) -> Result<(), AppError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + std::fmt::Debug + 'static,
    {
        self.ensure_unset()?;
        if let Ok(value) = HeaderValue::from_str(mime) {
            self.headers.insert(header::CONTENT_TYPE, value);
        }
        self.body = BodyRepr::Streaming(Body::from_stream(source));
        Ok(())
    }

    /// Sets up an SSE body and returns a sink handlers push events into. Installs
    /// the required headers immediately; the body is already "in flight" once this
    /// is called, so no other body-setting method may be used afterwards.
    pub fn sse(&mut self, keep_alive: Option<Duration>) -> Result<SseSink, AppError> {
        self.ensure_unset()?;
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        self.headers
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        self.headers
            .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let (body, sink, _keep_alive_handle) = sse::channel(keep_alive);
        self.body = BodyRepr::Streaming(body);
        Ok(sink)
    }

    // -- cookies --------------------------------------------------------

    /// Queues a cookie, replacing any existing queued cookie with the same
    /// `(name, path)`.
    pub fn set_cookie(&mut self, cookie: Cookie<'static>) {
        let path = cookie.path().unwrap_or("/").to_string();
        self.cookies
            .retain(|c| !(c.name() == cookie.name() && c.path().unwrap_or("/") == path));
        self.cookies.push(cookie);
    }

    /// Appends a cookie with empty value, `Max-Age=0`, and an expiry in the past.
    pub fn clear_cookie(&mut self, name: impl Into<String>, path: Option<&str>) {
        let path = path.unwrap_or("/").to_string();
        let cookie = CookieBuilder::new(name.into(), "")
            .path(path)
            .max_age(cookie::time::Duration::ZERO)
            .expires(cookie::Expiration::DateTime(
                cookie::time::OffsetDateTime::UNIX_EPOCH,
            ))
            .build();
        self.set_cookie(cookie);
    }

    pub fn has_cookie(&self, name: &str, path: Option<&str>) -> bool {
        self.cookies.iter().any(|c| {
            c.name() == name && path.is_none_or(|p| c.path().unwrap_or("/") == p)
        })
    }

    /// Queues the signed (or raw) session-id cookie per the framework's fixed
    /// attribute set: `HttpOnly`, `Path=/`, `SameSite=Lax`, `Secure` iff configured.
    pub fn set_session_cookie(&mut self, name: &str, value: String, secure: bool) {
        let cookie = CookieBuilder::new(name.to_string(), value)
            .http_only(true)
            .path("/")
            .same_site(SameSite::Lax)
            .secure(secure)
            .build();
        self.set_cookie(cookie);
    }

    // -- flush ------------------------------------------------------------

    /// Idempotent flush: the first call builds the final `hyper::Response` and
    /// marks `isSent`; subsequent calls return `None`.
    pub fn finalize(&mut self) -> Option<hyper::Response<Body>> {
        if self.sent {
            return None;
        }
        self.sent = true;

        let mut builder = hyper::Response::builder().status(self.status);
        {
            let headers = builder.headers_mut().expect("builder always has headers");
            headers.extend(self.headers.drain());
        }
        for cookie in self.cookies.drain(..) {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                builder = builder.header(header::SET_COOKIE, value);
            }
        }

        let body = match std::mem::take(&mut self.body) {
            BodyRepr::Absent => Body::empty(),
            BodyRepr::Fixed(bytes) => Body::from(bytes),
            BodyRepr::Streaming(body) => body,
        };

        Some(builder.body(body).expect("response parts are always valid"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_sets_content_type() {
        let mut res = Response::new();
        res.text("hi").unwrap();
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn double_body_configuration_conflicts() {
        let mut res = Response::new();
        res.text("hi").unwrap();
        assert!(matches!(res.text("again"), Err(AppError::Conflict(_))));
    }

    #[test]
    fn set_cookie_dedups_by_name_and_path() {
        let mut res = Response::new();
        res.set_cookie(Cookie::build(("a", "1")).path("/").build().into_owned());
        res.set_cookie(Cookie::build(("a", "2")).path("/").build().into_owned());
        assert_eq!(res.cookies.len(), 1);
        assert_eq!(res.cookies[0].value(), "2");
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut res = Response::new();
        res.text("hi").unwrap();
        assert!(res.finalize().is_some());
        assert!(res.finalize().is_none());
    }
}
