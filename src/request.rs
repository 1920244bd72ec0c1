//! Request construction, lazy body parsing, and the pieces a handler reads from.
//!
//! Grounded on the teacher's `extractors/params.rs` (`PathParams`) and `types.rs`
//! (`Request` alias), generalized to own a mutable [`Session`] and carry the
//! per-request caps and signer the pipeline needs.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use cookie::Cookie;
use http::{HeaderMap, Method, Uri, Version};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::di::DiContainer;
use crate::error::AppError;
use crate::multipart::MultipartForm;
use crate::session::{Session, SessionSigner};

/// Path parameters bound during route matching.
#[derive(Debug, Clone, Default)]
pub struct PathParams(pub HashMap<String, String>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }
}

/// Per-request size caps, copied from [`crate::config::ServerConfig`] at construction.
#[derive(Debug, Clone, Copy)]
pub struct BodyCaps {
    pub max_body_bytes: usize,
    pub max_file_bytes: usize,
}

enum BodySource {
    Taken,
    Pending(Incoming),
}

/// The content-type-driven materialization of a request body; see [`Request::body`].
#[derive(Debug, Clone, PartialEq)]
pub enum BodyValue {
    Json(serde_json::Value),
    Form(HashMap<String, String>),
    Text(String),
    Bytes(Bytes),
    None,
}

/// An inbound HTTP request plus everything the pipeline attaches to it.
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub params: PathParams,
    pub session: Session,
    pub is_new_session: bool,
    pub request_id: String,
    pub di: Arc<DiContainer>,
    pub caps: BodyCaps,
    pub signer: Option<Arc<SessionSigner>>,
    pub remote_addr: Option<SocketAddr>,

    body_source: AsyncMutex<BodySource>,
    body_cache: AsyncMutex<Option<Bytes>>,
}

impl Request {
    /// Builds a `Request` from the raw hyper request: resolves the session id from
    /// the session cookie (verifying the signature if a signer is configured) and
    /// assigns a request-id from `X-Request-Id`/`X-Correlation-Id` or a fresh UUID.
    pub fn from_hyper(
        req: hyper::Request<Incoming>,
        di: Arc<DiContainer>,
        signer: Option<Arc<SessionSigner>>,
        caps: BodyCaps,
        session_cookie_name: &str,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let (parts, body) = req.into_parts();

        let (session, is_new_session) =
            resolve_session(&parts.headers, session_cookie_name, signer.as_deref());

        let request_id = parts
            .headers
            .get("x-request-id")
            .or_else(|| parts.headers.get("x-correlation-id"))
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            params: PathParams::default(),
            session,
            is_new_session,
            request_id,
            di,
            caps,
            signer,
            remote_addr,
            body_source: AsyncMutex::new(BodySource::Pending(body)),
            body_cache: AsyncMutex::new(None),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn query(&self) -> HashMap<String, String> {
        self.uri
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        raw_cookies(&self.headers)
            .into_iter()
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(http::header::CONTENT_TYPE)?.to_str().ok()
    }

    /// Reads and memoizes the raw body, enforcing `maxBodyBytes`. On overflow the
    /// remaining stream is drained (to keep the connection healthy) before the
    /// `PayloadTooLarge` error is returned.
    pub async fn body_bytes(&self) -> Result<Bytes, AppError> {
        if let Some(cached) = self.body_cache.lock().await.clone() {
            return Ok(cached);
        }

        let mut source = self.body_source.lock().await;
        let incoming = match std::mem::replace(&mut *source, BodySource::Taken) {
            BodySource::Pending(incoming) => incoming,
            BodySource::Taken => {
                return Ok(self.body_cache.lock().await.clone().unwrap_or_default());
            }
        };

        let limit = self.caps.max_body_bytes;
        let mut buf = BytesMut::new();
        let mut body = incoming;
        let mut overflowed = false;

        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        if !overflowed {
                            if buf.len() + data.len() > limit {
                                overflowed = true;
                            } else {
                                buf.extend_from_slice(&data);
                            }
                        }
                        // once overflowed, keep draining frames without growing buf
                    }
                }
                Some(Err(_)) => break,
                None => break,
            }
        }

        if overflowed {
            return Err(AppError::PayloadTooLarge(
                "Payload Too Large".to_string(),
            ));
        }

        let bytes = buf.freeze();
        *self.body_cache.lock().await = Some(bytes.clone());
        Ok(bytes)
    }

    /// Takes ownership of the raw incoming body stream for multipart parsing.
    /// Returns `None` if the body was already consumed by `body_bytes`/`multipart`.
    pub(crate) async fn take_incoming(&self) -> Option<Incoming> {
        let mut source = self.body_source.lock().await;
        match std::mem::replace(&mut *source, BodySource::Taken) {
            BodySource::Pending(incoming) => Some(incoming),
            BodySource::Taken => None,
        }
    }

    pub async fn text(&self) -> Result<Option<String>, AppError> {
        let bytes = self.body_bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8(bytes.to_vec())
                .map_err(|e| AppError::Validation(format!("invalid UTF-8 body: {e}")))?,
        ))
    }

    pub async fn json<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        let bytes = self.body_bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| AppError::Validation(format!("invalid JSON body: {e}")))
    }

    pub async fn form(&self) -> Result<Option<HashMap<String, String>>, AppError> {
        let bytes = self.body_bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        serde_urlencoded::from_bytes(&bytes)
            .map(Some)
            .map_err(|e| AppError::Validation(format!("invalid form body: {e}")))
    }

    /// Materializes the body according to its `Content-Type`: `application/json`
    /// (or any `+json` suffix) parses to JSON, `application/x-www-form-urlencoded`
    /// parses to a string map, `text/*` decodes as UTF-8, anything else yields raw
    /// bytes, and an empty body yields [`BodyValue::None`].
    pub async fn body(&self) -> Result<BodyValue, AppError> {
        let bytes = self.body_bytes().await?;
        interpret_body(self.content_type().unwrap_or_default(), bytes)
    }

    /// Parses a `multipart/form-data` body. Only valid when the content-type
    /// declares a boundary; see [`crate::multipart`].
    pub async fn multipart(&self) -> Result<MultipartForm, AppError> {
        crate::multipart::parse(self).await
    }
}

/// Dispatches a materialized body by content-type essence, per spec §4.4's
/// "Body interpretation" table.
fn interpret_body(content_type: &str, bytes: Bytes) -> Result<BodyValue, AppError> {
    if bytes.is_empty() {
        return Ok(BodyValue::None);
    }

    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();

    if essence == "application/json" || essence.ends_with("+json") {
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Validation(format!("invalid JSON body: {e}")))?;
        return Ok(BodyValue::Json(value));
    }

    if essence == "application/x-www-form-urlencoded" {
        let map = serde_urlencoded::from_bytes(&bytes)
            .map_err(|e| AppError::Validation(format!("invalid form body: {e}")))?;
        return Ok(BodyValue::Form(map));
    }

    if essence.starts_with("text/") {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| AppError::Validation(format!("invalid UTF-8 body: {e}")))?;
        return Ok(BodyValue::Text(text));
    }

    Ok(BodyValue::Bytes(bytes))
}

fn raw_cookies(headers: &HeaderMap) -> Vec<Cookie<'static>> {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|part| Cookie::parse(part.trim().to_string()).ok())
        .collect()
}

fn resolve_session(
    headers: &HeaderMap,
    cookie_name: &str,
    signer: Option<&SessionSigner>,
) -> (Session, bool) {
    let raw = raw_cookies(headers)
        .into_iter()
        .find(|c| c.name() == cookie_name)
        .map(|c| c.value().to_string());

    match raw {
        None => (Session::fresh(Uuid::new_v4().to_string()), true),
        Some(value) => match signer {
            Some(signer) => match signer.verify(&value) {
                Some(id) => (Session::fresh(id), false),
                None => (Session::fresh(Uuid::new_v4().to_string()), true),
            },
            None => (Session::fresh(value), false),
        },
    }
}
