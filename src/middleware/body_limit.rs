//! Request body size limiting middleware.
//!
//! Grounded on the teacher's `middleware/body_limit.rs` `BodyLimit`: kept the
//! static-or-dynamic limit shape and the fast `Content-Length` pre-check,
//! adapted to the ownership-passing `(Request, Response, Next)` signature.
//! The real enforcement (draining past the cap and returning 413 without a
//! body-less `Content-Length` mismatch) lives in [`crate::request::Request::body_bytes`];
//! this middleware is the fast path that rejects declared-oversized requests
//! before a handler ever touches the body.

use std::sync::Arc;

use http::header::CONTENT_LENGTH;

use crate::middleware::{IntoMiddleware, MiddlewareFn};
use crate::request::Request;

pub struct BodyLimit<F = fn(&Request) -> usize>
where
    F: Fn(&Request) -> usize + Send + Sync + 'static,
{
    limit: Option<usize>,
    dynamic_limit: Option<F>,
}

impl BodyLimit<fn(&Request) -> usize> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            dynamic_limit: None,
        }
    }
}

impl<F> BodyLimit<F>
where
    F: Fn(&Request) -> usize + Send + Sync + 'static,
{
    pub fn with_dynamic_limit(f: F) -> Self {
        Self {
            limit: None,
            dynamic_limit: Some(f),
        }
    }

    pub fn new_with_dynamic(limit: usize, f: F) -> Self {
        Self {
            limit: Some(limit),
            dynamic_limit: Some(f),
        }
    }

    pub fn build(self) -> MiddlewareFn {
        let static_limit = self.limit;
        let dynamic_limit = self.dynamic_limit.map(Arc::new);

        (move |req: Request, res, next: crate::middleware::Next| {
            let dynamic_limit = dynamic_limit.clone();
            async move {
                let limit = dynamic_limit
                    .as_ref()
                    .map(|f| f(&req))
                    .or(static_limit)
                    .unwrap_or(10 * 1024 * 1024);

                if let Some(len) = req
                    .headers
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<usize>().ok())
                    && len > limit
                {
                    let mut res = res;
                    res.status = http::StatusCode::PAYLOAD_TOO_LARGE;
                    let _ = res.text("Payload Too Large");
                    return (req, res, Ok(()));
                }

                next.run(req, res).await
            }
        })
        .into_middleware()
    }
}
