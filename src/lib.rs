//! An embeddable HTTP application framework: a radix-tree router, an
//! ownership-passing middleware pipeline, HMAC-signed sessions, and isolated
//! sub-application containers, built on `hyper` 1.x and `tokio`.
//!
//! # Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use palisade::config::{ServerConfig, SessionConfig};
//! use palisade::container::Container;
//! use palisade::di::DiContainer;
//! use palisade::middleware::IntoHandler;
//! use palisade::request::BodyCaps;
//! use palisade::router::Router;
//! use palisade::server::Server;
//! use palisade::session::InMemorySessionStore;
//!
//! # async fn example() -> std::io::Result<()> {
//! let router = Router::new();
//! router
//!     .insert(http::Method::GET, "/", (|req, mut res: palisade::response::Response| async move {
//!         res.text("Hello, World!").unwrap();
//!         (req, res, Ok(()))
//!     }).into_handler())
//!     .unwrap();
//!
//! let config = ServerConfig::default();
//! let container = Container {
//!     router: Arc::new(router),
//!     di: Arc::new(DiContainer::new()),
//!     session_store: InMemorySessionStore::new(std::time::Duration::from_secs(1800)),
//!     signer: None,
//!     session_config: SessionConfig::default(),
//!     caps: BodyCaps { max_body_bytes: config.max_body_bytes, max_file_bytes: config.max_file_bytes },
//!     error_handler: None,
//! };
//!
//! let server = Server::new(container, config);
//! let listener = server.bind().await?;
//! server.serve(listener).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Key concepts
//! - [router::Router] matches `(method, path)` to a handler and binds path
//!   parameters, including isolated sub-router mounts.
//! - [middleware] composes cross-cutting concerns as an ownership-passing
//!   `(Request, Response, Next)` chain.
//! - [container::Container] wires routing, session persistence, and error
//!   handling into one `dispatch` call per request.
//! - [session] provides HMAC-signed session identifiers and pluggable
//!   persistence ([session::SessionStore]).
//! - [isolated::IsolatedContainer] is a self-contained sub-application with
//!   its own router and DI scope, nestable under a host or served standalone.
//! - [server::Server] owns the accept loop, per-request timeout, and
//!   graceful drain-then-shutdown.

/// Unified streaming body type bridging `hyper`/`http-body`.
pub mod body;

/// Server and session configuration, loadable from the environment.
pub mod config;

/// Pipeline orchestrator: routing, session persistence, and error handling.
pub mod container;

/// Type-keyed dependency injection container.
pub mod di;

/// The typed error taxonomy surfaced by the pipeline.
pub mod error;

/// Isolated sub-application containers.
pub mod isolated;

/// Middleware pipeline types and bundled middleware (CORS, rate limiting,
/// body-size limiting).
pub mod middleware;

/// `multipart/form-data` parsing.
pub mod multipart;

/// Request construction and lazy body parsing.
pub mod request;

/// The mutable, single-flush response accumulator.
pub mod response;

/// A single registered route: compiled path pattern, handler, middleware.
pub mod route;

/// The radix-tree router.
pub mod router;

/// HTTP server lifecycle: accept loop, timeouts, graceful shutdown.
pub mod server;

/// Server-managed session state keyed by a signed cookie identifier.
pub mod session;

/// Server-Sent Events framing and keep-alive.
pub mod sse;

/// Static directory and single-file serving.
pub mod static_file;

/// Structured tracing subscriber setup.
pub mod tracing_init;

pub use body::Body;
pub use container::Container;
pub use error::AppError;
pub use request::Request;
pub use response::Response;
pub use router::Router;
pub use server::Server;

pub use http::{Method, StatusCode, header};
