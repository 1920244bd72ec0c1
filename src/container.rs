//! Pipeline orchestrator: wires the router, session store, and DI container
//! into one `dispatch` entry point the server calls per request.
//!
//! Grounded on the teacher's `Router::dispatch` (`router.rs`) for the
//! match-then-run-chain shape, generalized with the session load/save and
//! error-handler steps the original didn't need.

use std::net::SocketAddr;
use std::sync::Arc;

use http::{HeaderValue, Method, StatusCode, header::HeaderName};
use hyper::body::Incoming;

use crate::config::SessionConfig;
use crate::di::DiContainer;
use crate::error::AppError;
use crate::middleware::{HandlerFn, MiddlewareFn, Next};
use crate::request::{BodyCaps, Request};
use crate::response::Response;
use crate::router::Router;
use crate::session::{SessionSigner, SessionStore};

pub type ErrorHandlerFn = Arc<dyn Fn(&AppError, &mut Response) + Send + Sync>;

fn not_found_handler() -> HandlerFn {
    Arc::new(|req, mut res| {
        Box::pin(async move {
            res.status = StatusCode::NOT_FOUND;
            let _ = res.text("Not Found");
            (req, res, Ok(()))
        })
    })
}

/// Assembles routing, session persistence, and DI into a single dispatchable unit.
pub struct Container {
    pub router: Arc<Router>,
    pub di: Arc<DiContainer>,
    pub session_store: Arc<dyn SessionStore>,
    pub signer: Option<Arc<SessionSigner>>,
    pub session_config: SessionConfig,
    pub caps: BodyCaps,
    pub error_handler: Option<ErrorHandlerFn>,
}

impl Container {
    /// Handles one request end to end: builds the `Request`, loads session
    /// state, matches and runs the route (or a 404 handler), applies error
    /// handling, persists session changes, and finalizes the response.
    pub async fn dispatch(
        &self,
        raw: hyper::Request<Incoming>,
        remote_addr: Option<SocketAddr>,
    ) -> hyper::Response<crate::body::Body> {
        let mut req = Request::from_hyper(
            raw,
            self.di.clone(),
            self.signer.clone(),
            self.caps,
            &self.session_config.cookie_name,
            remote_addr,
        );

        if !req.is_new_session {
            match self.session_store.load(req.session.id()).await {
                Some(data) => req.session.hydrate(data),
                None => req.is_new_session = true,
            }
        }

        let method = req.method.clone();
        let path = req.uri.path().to_string();
        let request_id = req.request_id.clone();
        tracing::debug!(%request_id, %method, %path, "request start");

        let mut res = Response::new();
        self.queue_session_cookie(&req, &mut res);

        let matched = self.router.find(&method, &path);

        let (mut req, mut res, result) = match matched {
            Some(m) => {
                req.params = m.params;
                let chain: Arc<[MiddlewareFn]> = m.middlewares.into();
                Next::new(chain, m.handler).run(req, res).await
            }
            None => {
                res.status = StatusCode::NOT_FOUND;
                Next::new(Arc::from([]), not_found_handler())
                    .run(req, res)
                    .await
            }
        };

        if let Err(err) = &result {
            tracing::warn!(%request_id, error = %err, "pipeline error");
            match &self.error_handler {
                Some(handler) => handler(err, &mut res),
                None => err.write_default(&mut res),
            }
        }

        self.persist_session(&mut req, &mut res).await;

        res.set_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_str(&req.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        tracing::debug!(%request_id, status = res.status.as_u16(), "request end");

        res.finalize()
            .unwrap_or_else(|| hyper::Response::new(crate::body::Body::empty()))
    }

    /// Queues the session-id cookie before the chain runs, so downstream
    /// middleware can observe the newly-minted id on the response (spec
    /// §4.6 step 2). A no-op for an already-established session.
    fn queue_session_cookie(&self, req: &Request, res: &mut Response) {
        if !req.is_new_session || res.has_cookie(&self.session_config.cookie_name, Some("/")) {
            return;
        }
        let cookie_value = match &req.signer {
            Some(signer) => signer.sign(req.session.id()),
            None => req.session.id().to_string(),
        };
        res.set_session_cookie(&self.session_config.cookie_name, cookie_value, self.session_config.secure);
    }

    /// Persists session data after the chain runs; the cookie itself was
    /// already queued by `queue_session_cookie` before the chain started.
    async fn persist_session(&self, req: &mut Request, res: &mut Response) {
        let id = req.session.id().to_string();

        if req.session.is_destroyed() {
            self.session_store.destroy(&id).await;
            res.clear_cookie(&self.session_config.cookie_name, Some("/"));
            return;
        }

        if req.session.is_dirty() || req.is_new_session {
            self.session_store
                .save(&id, req.session.data().clone(), Some(self.session_config.default_ttl))
                .await;
        } else {
            self.session_store.touch(&id, Some(self.session_config.default_ttl)).await;
        }
    }
}

/// Mounts a handler at `method`/`path` on `router`, returning the router error
/// (route conflict, bad pattern) as a `String` per [`Router::insert`].
pub fn route<H>(router: &Router, method: Method, path: &str, handler: H) -> Result<(), String>
where
    H: crate::middleware::IntoHandler,
{
    router.insert(method, path, handler.into_handler())
}

/// Exercises [`Container::dispatch`] end to end over an in-memory duplex pair —
/// the same `http1::Builder::serve_connection`/`service_fn` shape `server.rs`
/// uses against a real `TcpStream`, substituting `tokio::io::duplex` for the
/// socket so these tests need no open port.
#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use bytes::Bytes;
    use cookie::Cookie;
    use http_body_util::{BodyExt, Full};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;

    use super::*;
    use crate::di::DiContainer;
    use crate::isolated::IsolatedContainer;
    use crate::middleware::IntoMiddleware;
    use crate::session::InMemorySessionStore;

    fn default_caps() -> BodyCaps {
        BodyCaps { max_body_bytes: 1024 * 1024, max_file_bytes: 1024 * 1024 }
    }

    fn build_container(router: Router, caps: BodyCaps, signer: Option<Arc<SessionSigner>>) -> Arc<Container> {
        Arc::new(Container {
            router: Arc::new(router),
            di: Arc::new(DiContainer::new()),
            session_store: InMemorySessionStore::new(Duration::from_secs(60)),
            signer,
            session_config: SessionConfig::default(),
            caps,
            error_handler: None,
        })
    }

    fn get_request(path: &str) -> hyper::Request<Full<Bytes>> {
        hyper::Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn tracking_middleware(name: &'static str, log: Arc<std::sync::Mutex<Vec<String>>>) -> MiddlewareFn {
        (move |req: Request, res: Response, next: Next| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{name}-in"));
                let (req, res, result) = next.run(req, res).await;
                log.lock().unwrap().push(format!("{name}-out"));
                (req, res, result)
            }
        })
        .into_middleware()
    }

    /// Drives one request through `container.dispatch` over a `tokio::io::duplex`
    /// pair: a server task runs `serve_connection` against `container`, a client
    /// handshake sends `req`, and the response body is collected into `Bytes` so
    /// assertions can inspect it without holding onto `Incoming`.
    async fn send(container: Arc<Container>, req: hyper::Request<Full<Bytes>>) -> hyper::Response<Bytes> {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);

        tokio::spawn(async move {
            let svc = service_fn(move |r: hyper::Request<Incoming>| {
                let container = container.clone();
                async move { Ok::<_, Infallible>(container.dispatch(r, None).await) }
            });
            let _ = http1::Builder::new()
                .serve_connection(TokioIo::new(server_io), svc)
                .await;
        });

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(client_io))
            .await
            .expect("handshake");
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let res = sender.send_request(req).await.expect("send_request");
        let (parts, body) = res.into_parts();
        let bytes = body.collect().await.expect("collect response body").to_bytes();
        hyper::Response::from_parts(parts, bytes)
    }

    #[tokio::test]
    async fn middleware_chain_runs_in_order_and_unwinds_in_reverse() {
        let router = Router::new();
        let log: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

        router.middleware(tracking_middleware("A", log.clone()));
        router.middleware(tracking_middleware("B", log.clone()));
        router.middleware(tracking_middleware("C", log.clone()));

        let handler_log = log.clone();
        route(&router, Method::GET, "/", move |req: Request, mut res: Response| {
            let handler_log = handler_log.clone();
            async move {
                handler_log.lock().unwrap().push("H".to_string());
                res.text("ok").unwrap();
                (req, res, Ok(()))
            }
        })
        .unwrap();

        let container = build_container(router, default_caps(), None);
        let res = send(container, get_request("/")).await;

        assert_eq!(res.status(), StatusCode::OK);
        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec!["A-in", "B-in", "C-in", "H", "C-out", "B-out", "A-out"]
        );
    }

    #[tokio::test]
    async fn session_data_round_trips_and_the_cookie_is_queued_only_once() {
        let router = Router::new();
        route(&router, Method::GET, "/visit", |mut req: Request, mut res: Response| async move {
            let count = req.session.get_as::<i64>("visits").unwrap_or(0) + 1;
            req.session.set("visits", count);
            res.text(count.to_string()).unwrap();
            (req, res, Ok(()))
        })
        .unwrap();

        let container = build_container(router, default_caps(), None);

        let res1 = send(container.clone(), get_request("/visit")).await;
        assert_eq!(res1.body().as_ref(), b"1");
        let set_cookie = res1
            .headers()
            .get(http::header::SET_COOKIE)
            .expect("first response mints a session cookie")
            .to_str()
            .unwrap()
            .to_string();
        let parsed = Cookie::parse(set_cookie).unwrap();
        assert_eq!(parsed.name(), "sessionId");

        let mut req2 = get_request("/visit");
        req2.headers_mut().insert(
            http::header::COOKIE,
            HeaderValue::from_str(&format!("{}={}", parsed.name(), parsed.value())).unwrap(),
        );
        let res2 = send(container, req2).await;
        assert_eq!(res2.body().as_ref(), b"2");
        assert!(
            res2.headers().get(http::header::SET_COOKIE).is_none(),
            "an already-established session should not re-queue its cookie"
        );
    }

    #[tokio::test]
    async fn default_error_handler_applies_and_the_container_keeps_serving() {
        let router = Router::new();
        route(&router, Method::GET, "/boom", |req: Request, res: Response| async move {
            (req, res, Err(AppError::Validation("bad input".to_string())))
        })
        .unwrap();
        route(&router, Method::GET, "/ok", |req: Request, mut res: Response| async move {
            res.text("fine").unwrap();
            (req, res, Ok(()))
        })
        .unwrap();

        let container = build_container(router, default_caps(), None);

        let res1 = send(container.clone(), get_request("/boom")).await;
        assert_eq!(res1.status(), StatusCode::BAD_REQUEST);
        let body1 = String::from_utf8(res1.body().to_vec()).unwrap();
        assert!(body1.contains("bad input"));

        let res2 = send(container, get_request("/ok")).await;
        assert_eq!(res2.status(), StatusCode::OK);
        assert_eq!(res2.body().as_ref(), b"fine");
    }

    #[tokio::test]
    async fn isolated_container_boundaries_hold_through_dispatch() {
        let host = Router::new();
        let admin = IsolatedContainer::new();
        admin
            .route(Method::GET, "/", |req: Request, mut res: Response| async move {
                res.text("dashboard").unwrap();
                (req, res, Ok(()))
            })
            .unwrap();
        admin.mount_onto(&host, "/admin").unwrap();

        let container = build_container(host, default_caps(), None);

        let ok = send(container.clone(), get_request("/admin")).await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.body().as_ref(), b"dashboard");

        let missing = send(container.clone(), get_request("/admin/missing")).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let root = send(container, get_request("/")).await;
        assert_eq!(root.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_then_a_follow_up_request_succeeds() {
        let router = Router::new();
        route(&router, Method::POST, "/echo", |req: Request, mut res: Response| async move {
            match req.text().await {
                Ok(body) => {
                    res.text(body.unwrap_or_default()).unwrap();
                    (req, res, Ok(()))
                }
                Err(e) => (req, res, Err(e)),
            }
        })
        .unwrap();
        route(&router, Method::GET, "/health", |req: Request, mut res: Response| async move {
            res.text("ok").unwrap();
            (req, res, Ok(()))
        })
        .unwrap();

        let caps = BodyCaps { max_body_bytes: 8, max_file_bytes: 8 };
        let container = build_container(router, caps, None);

        let big_body = hyper::Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .body(Full::new(Bytes::from_static(b"this body is far too big")))
            .unwrap();
        let res1 = send(container.clone(), big_body).await;
        assert_eq!(res1.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let res2 = send(container, get_request("/health")).await;
        assert_eq!(res2.status(), StatusCode::OK);
        assert_eq!(res2.body().as_ref(), b"ok");
    }

    #[tokio::test]
    async fn tampered_session_cookie_is_replaced_with_a_freshly_signed_one() {
        let router = Router::new();
        route(&router, Method::GET, "/", |req: Request, mut res: Response| async move {
            res.text("ok").unwrap();
            (req, res, Ok(()))
        })
        .unwrap();

        let signer = Arc::new(SessionSigner::new("0123456789abcdef0123456789abcdef").unwrap());
        let container = build_container(router, default_caps(), Some(signer.clone()));

        let mut req = get_request("/");
        req.headers_mut().insert(
            http::header::COOKIE,
            HeaderValue::from_static("sessionId=forged-id.deadbeef"),
        );

        let res = send(container, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let set_cookie = res
            .headers()
            .get(http::header::SET_COOKIE)
            .expect("a tampered cookie mints a fresh, freshly-signed session")
            .to_str()
            .unwrap()
            .to_string();
        let parsed = Cookie::parse(set_cookie).unwrap();
        assert_eq!(parsed.name(), "sessionId");
        assert!(signer.verify(parsed.value()).is_some());
    }
}
