//! Cross-Origin Resource Sharing middleware.
//!
//! Grounded on the teacher's `plugins/cors.rs` (`Config`/`CorsBuilder`/`CorsPlugin`):
//! kept the origin/method/header/credentials/max-age policy shape and the
//! preflight-short-circuit behavior, adapted from a `TakoPlugin` that installs
//! itself via `router.middleware(...)` to a plain [`MiddlewareFn`] built by
//! [`Cors::into_middleware`]. The construction-time wildcard/credentials check
//! follows the same fallible-builder shape as `SessionSigner::new`.

use http::{
    HeaderName, HeaderValue, Method, StatusCode,
    header::{
        ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
        ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
        ACCESS_CONTROL_REQUEST_HEADERS, ORIGIN, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS,
        X_FRAME_OPTIONS,
    },
};

use crate::error::AppError;
use crate::middleware::MiddlewareFn;
use crate::response::Response;

#[derive(Clone)]
pub struct Config {
    pub origins: Vec<String>,
    pub methods: Vec<Method>,
    pub headers: Vec<HeaderName>,
    pub allow_credentials: bool,
    pub max_age_secs: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origins: Vec::new(),
            methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ],
            headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: Some(3600),
        }
    }
}

pub struct CorsBuilder(Config);

impl Default for CorsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsBuilder {
    pub fn new() -> Self {
        Self(Config::default())
    }

    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.0.origins.push(origin.into());
        self
    }

    pub fn allow_methods(mut self, methods: &[Method]) -> Self {
        self.0.methods = methods.to_vec();
        self
    }

    pub fn allow_headers(mut self, headers: &[HeaderName]) -> Self {
        self.0.headers = headers.to_vec();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.0.allow_credentials = allow;
        self
    }

    pub fn max_age_secs(mut self, secs: u32) -> Self {
        self.0.max_age_secs = Some(secs);
        self
    }

    /// Builds the middleware, failing with `AppError::Configuration` if the
    /// policy allows a wildcard origin together with credentials — a
    /// combination no browser honors and the framework rejects up front.
    pub fn build(self) -> Result<MiddlewareFn, AppError> {
        let cfg = self.0;
        if cfg.origins.is_empty() && cfg.allow_credentials {
            return Err(AppError::Configuration(
                "CORS: wildcard origin cannot be combined with allow_credentials".to_string(),
            ));
        }

        Ok(crate::middleware::IntoMiddleware::into_middleware(
            move |req, mut res: Response, next| {
                let cfg = cfg.clone();
                async move {
                    let origin = req.headers.get(ORIGIN).cloned();

                    if req.method == Method::OPTIONS {
                        let requested_headers = req.headers.get(ACCESS_CONTROL_REQUEST_HEADERS).cloned();
                        res.status = StatusCode::NO_CONTENT;
                        add_cors_headers(&cfg, origin, requested_headers, &mut res);
                        return (req, res, Ok(()));
                    }

                    let (req, mut res, result) = next.run(req, res).await;
                    add_cors_headers(&cfg, origin, None, &mut res);
                    add_security_headers(&mut res);
                    (req, res, result)
                }
            },
        ))
    }
}

fn add_cors_headers(
    cfg: &Config,
    origin: Option<HeaderValue>,
    requested_headers: Option<HeaderValue>,
    res: &mut Response,
) {
    let allow_origin = if cfg.origins.is_empty() {
        "*".to_string()
    } else if let Some(o) = &origin {
        let s = o.to_str().unwrap_or_default();
        if cfg.origins.iter().any(|p| p == s) {
            s.to_string()
        } else {
            return;
        }
    } else {
        return;
    };

    res.headers_mut().insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_str(&allow_origin).unwrap(),
    );

    if !cfg.methods.is_empty() {
        let v = cfg
            .methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");
        res.headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_str(&v).unwrap());
    }

    if let Some(requested) = requested_headers {
        res.headers_mut().insert(ACCESS_CONTROL_ALLOW_HEADERS, requested);
    } else if !cfg.headers.is_empty() {
        let v = cfg
            .headers
            .iter()
            .map(|h| h.as_str())
            .collect::<Vec<_>>()
            .join(",");
        res.headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_str(&v).unwrap());
    }

    if cfg.allow_credentials {
        res.headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }

    if let Some(secs) = cfg.max_age_secs {
        res.headers_mut()
            .insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_str(&secs.to_string()).unwrap());
    }
}

/// Fixed hardening headers the framework applies to non-preflight responses
/// once CORS middleware is installed.
fn add_security_headers(res: &mut Response) {
    res.headers_mut().insert(
        STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    res.headers_mut()
        .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    res.headers_mut()
        .insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_origins_and_headers() {
        let builder = CorsBuilder::new()
            .allow_origin("https://example.com")
            .allow_origin("https://other.example.com")
            .allow_headers(&[HeaderName::from_static("x-api-key")])
            .allow_credentials(true)
            .max_age_secs(60);

        assert_eq!(builder.0.origins, vec!["https://example.com", "https://other.example.com"]);
        assert_eq!(builder.0.headers, vec![HeaderName::from_static("x-api-key")]);
        assert!(builder.0.allow_credentials);
        assert_eq!(builder.0.max_age_secs, Some(60));
    }

    #[test]
    fn wildcard_origin_is_used_when_no_allowlist_is_configured() {
        let cfg = Config::default();
        let mut res = Response::new();
        add_cors_headers(&cfg, None, None, &mut res);
        assert_eq!(
            res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[test]
    fn allowlisted_origin_is_echoed_back() {
        let cfg = Config { origins: vec!["https://example.com".to_string()], ..Config::default() };
        let mut res = Response::new();
        let origin = HeaderValue::from_static("https://example.com");
        add_cors_headers(&cfg, Some(origin), None, &mut res);
        assert_eq!(
            res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn non_allowlisted_origin_gets_no_cors_headers() {
        let cfg = Config { origins: vec!["https://example.com".to_string()], ..Config::default() };
        let mut res = Response::new();
        let origin = HeaderValue::from_static("https://evil.example.com");
        add_cors_headers(&cfg, Some(origin), None, &mut res);
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn credentials_header_is_only_set_when_enabled() {
        let cfg = Config { allow_credentials: true, ..Config::default() };
        let mut res = Response::new();
        add_cors_headers(&cfg, None, None, &mut res);
        assert_eq!(res.headers().get(ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    }

    #[test]
    fn wildcard_origin_with_credentials_is_rejected_at_construction() {
        let err = CorsBuilder::new().allow_credentials(true).build().unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn allowlisted_origin_with_credentials_builds_successfully() {
        assert!(
            CorsBuilder::new()
                .allow_origin("https://example.com")
                .allow_credentials(true)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn preflight_echoes_requested_headers_over_the_configured_list() {
        let cfg = Config { headers: vec![HeaderName::from_static("x-configured")], ..Config::default() };
        let mut res = Response::new();
        let requested = HeaderValue::from_static("x-custom-header,x-another");
        add_cors_headers(&cfg, None, Some(requested.clone()), &mut res);
        assert_eq!(res.headers().get(ACCESS_CONTROL_ALLOW_HEADERS).unwrap(), &requested);
    }

    #[test]
    fn preflight_falls_back_to_configured_headers_when_none_requested() {
        let cfg = Config { headers: vec![HeaderName::from_static("x-configured")], ..Config::default() };
        let mut res = Response::new();
        add_cors_headers(&cfg, None, None, &mut res);
        assert_eq!(res.headers().get(ACCESS_CONTROL_ALLOW_HEADERS).unwrap(), "x-configured");
    }

    #[test]
    fn security_headers_are_applied_to_non_preflight_responses() {
        let mut res = Response::new();
        add_security_headers(&mut res);
        assert_eq!(
            res.headers().get(STRICT_TRANSPORT_SECURITY).unwrap(),
            "max-age=31536000; includeSubDomains"
        );
        assert_eq!(res.headers().get(X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(res.headers().get(X_FRAME_OPTIONS).unwrap(), "DENY");
    }
}
