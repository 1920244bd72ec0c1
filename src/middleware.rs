//! Middleware pipeline: ownership-passing request/response chain.
//!
//! The teacher's `Next` borrows the request and returns a brand-new response built
//! by whichever layer terminates the chain. This framework mutates one `Response`
//! object in place across the whole chain (`container` reuses it for an isolated
//! sub-app too), so `Next` instead moves `Request`/`Response` down the chain and
//! hands them back up, rather than threading `&mut` references through boxed
//! futures — the chain is linear per request (only one task ever touches a pair),
//! so ownership-passing gives the same effective semantics without needing
//! higher-ranked trait bounds on the closure signature.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::AppError;
use crate::request::Request;
use crate::response::Response;

pub mod body_limit;
pub mod cors;
pub mod rate_limiter;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A handler's output: the request and response are handed back so a wrapping
/// middleware can inspect or adjust them after `next.run(...)` returns.
pub type PipelineOutput = (Request, Response, Result<(), AppError>);

pub type HandlerFn = Arc<dyn Fn(Request, Response) -> BoxFuture<PipelineOutput> + Send + Sync>;

pub type MiddlewareFn =
    Arc<dyn Fn(Request, Response, Next) -> BoxFuture<PipelineOutput> + Send + Sync>;

/// Converts an async function into a boxed [`MiddlewareFn`].
pub trait IntoMiddleware {
    fn into_middleware(self) -> MiddlewareFn;
}

impl<F, Fut> IntoMiddleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PipelineOutput> + Send + 'static,
{
    fn into_middleware(self) -> MiddlewareFn {
        Arc::new(move |req, res, next| Box::pin(self(req, res, next)))
    }
}

/// Converts an async function into a boxed [`HandlerFn`].
pub trait IntoHandler {
    fn into_handler(self) -> HandlerFn;
}

impl<F, Fut> IntoHandler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PipelineOutput> + Send + 'static,
{
    fn into_handler(self) -> HandlerFn {
        Arc::new(move |req, res| Box::pin(self(req, res)))
    }
}

/// Remaining middleware chain plus the route's final handler.
#[derive(Clone)]
pub struct Next {
    middlewares: Arc<[MiddlewareFn]>,
    index: usize,
    handler: HandlerFn,
}

impl Next {
    pub(crate) fn new(middlewares: Arc<[MiddlewareFn]>, handler: HandlerFn) -> Self {
        Self {
            middlewares,
            index: 0,
            handler,
        }
    }

    /// Runs the next middleware in the chain, or the handler if none remain.
    pub fn run(mut self, req: Request, res: Response) -> BoxFuture<PipelineOutput> {
        Box::pin(async move {
            match self.middlewares.get(self.index).cloned() {
                Some(mw) => {
                    self.index += 1;
                    mw(req, res, self).await
                }
                None => (self.handler)(req, res).await,
            }
        })
    }
}
