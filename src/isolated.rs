//! Isolated sub-application container: its own router, middleware, and DI
//! scope, mounted under a path prefix of a host router while sharing the
//! host's session and response for the duration of a request.
//!
//! Grounded on the teacher's `router.rs` `Router::nest`, generalized per
//! spec §4.8/§3: the nested router here owns its own [`DiContainer`], so the
//! in-scope lookups resolve against the sub-app, not the host. The DI swap is
//! implemented as the isolated router's own first-registered middleware,
//! which runs inside the merged chain [`crate::router::Router::find`]
//! produces for a mount point, and is restored once `next.run` returns.

use std::sync::Arc;

use http::Method;

use crate::config::{ServerConfig, SessionConfig};
use crate::container::Container;
use crate::di::DiContainer;
use crate::middleware::{IntoHandler, IntoMiddleware, MiddlewareFn, Next};
use crate::request::{BodyCaps, Request};
use crate::response::Response;
use crate::router::Router;
use crate::session::{SessionSigner, SessionStore};

/// A self-contained sub-application: its own router and DI scope, nestable
/// under a host router or servable standalone (spec §4.8 "standalone mode").
pub struct IsolatedContainer {
    pub router: Arc<Router>,
    pub di: Arc<DiContainer>,
}

impl Default for IsolatedContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl IsolatedContainer {
    pub fn new() -> Self {
        let di = Arc::new(DiContainer::new());
        let router = Arc::new(Router::new());
        router.middleware(di_swap_middleware(di.clone()));
        Self { router, di }
    }

    /// Registers a handler relative to this container's own prefix-free tree.
    pub fn route<H: IntoHandler>(&self, method: Method, path: &str, handler: H) -> Result<(), String> {
        self.router.insert(method, path, handler.into_handler())
    }

    /// Adds container-wide middleware, run (after the DI swap) for every
    /// request that falls under this container's mount point.
    pub fn middleware(&self, mw: MiddlewareFn) {
        self.router.middleware(mw);
    }

    /// Mounts this container onto `host` at `prefix`. Fails with "route
    /// conflict" if something is already mounted at that exact prefix.
    pub fn mount_onto(&self, host: &Router, prefix: &str) -> Result<(), String> {
        host.mount_sub(prefix, self.router.clone())
    }

    /// Builds a standalone [`Container`] serving only this sub-app's routes,
    /// for the "standalone mode" described in spec §4.8: the container binds
    /// its own listener and behaves like the main server for its own routes.
    pub fn into_standalone(
        self,
        session_store: Arc<dyn SessionStore>,
        signer: Option<Arc<SessionSigner>>,
        session_config: SessionConfig,
        server_config: &ServerConfig,
    ) -> Container {
        Container {
            router: self.router,
            di: self.di,
            session_store,
            signer,
            session_config,
            caps: BodyCaps {
                max_body_bytes: server_config.max_body_bytes,
                max_file_bytes: server_config.max_file_bytes,
            },
            error_handler: None,
        }
    }
}

/// Swaps `req.di` to the isolated container's own scope for the duration of
/// the downstream chain, then restores the host's DI container so sibling
/// host-level middleware sees its original scope again.
fn di_swap_middleware(sub_di: Arc<DiContainer>) -> MiddlewareFn {
    (move |mut req: Request, res: Response, next: Next| {
        let sub_di = sub_di.clone();
        async move {
            let host_di = std::mem::replace(&mut req.di, sub_di);
            let (mut req, res, result) = next.run(req, res).await;
            req.di = host_di;
            (req, res, result)
        }
    })
    .into_middleware()
}
