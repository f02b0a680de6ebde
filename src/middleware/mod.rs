mod cors;
mod parser;

pub use cors::{Cors, CorsConfig};
pub use parser::BodyParser;

use crate::handler::{Handler, HttpResponse, IntoResponse};
use crate::http::Request;
use futures::future::BoxFuture;
use std::sync::Arc;

pub type MiddlewareResult = BoxFuture<'static, HttpResponse>;

/// An interceptor in the request pipeline. Receives the request and a
/// [`Next`] continuation; calling `next.proceed(req)` hands control to
/// the rest of the chain, returning without it short-circuits.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> MiddlewareResult;
}

impl<F, R> Middleware for F
where
    F: Fn(Request, Next) -> R + Send + Sync + 'static,
    R: IntoResponse,
{
    fn call(&self, req: Request, next: Next) -> MiddlewareResult {
        (self)(req, next).into_response_future()
    }
}

/// Where a middleware lands in its node's local list when registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Position {
    /// Tail of the list (default).
    Append,
    /// Head of the list, ahead of everything registered so far.
    First,
    /// Immediately before the named entry on the same node. Registration
    /// fails if no such entry exists yet.
    Before(String),
}

/// One registered interceptor: a unique name within its node, whether it
/// bubbles into descendant routes, and the handler itself. Built once at
/// startup, immutable afterwards.
#[derive(Clone)]
pub struct MiddlewareEntry {
    name: String,
    bubble: bool,
    handler: Arc<dyn Middleware>,
}

impl MiddlewareEntry {
    pub fn new(name: &str, bubble: bool, handler: impl Middleware) -> MiddlewareEntry {
        MiddlewareEntry {
            name: name.to_string(),
            bubble,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bubble(&self) -> bool {
        self.bubble
    }

    pub(crate) fn handler(&self) -> Arc<dyn Middleware> {
        Arc::clone(&self.handler)
    }
}

impl std::fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("name", &self.name)
            .field("bubble", &self.bubble)
            .finish()
    }
}

/// The chain executor's continuation. Holds the remaining middleware
/// list and the terminal handler; `proceed` consumes `self`, so a
/// middleware can hand control onward at most once. Dropping a `Next`
/// without calling it halts the chain: later middleware and the
/// terminal controller never run.
pub struct Next {
    chain: Vec<Arc<dyn Middleware>>,
    index: usize,
    terminal: Box<dyn Handler>,
}

impl Next {
    pub fn new(chain: Vec<Arc<dyn Middleware>>, terminal: Box<dyn Handler>) -> Next {
        Next {
            chain,
            index: 0,
            terminal,
        }
    }

    /// Invokes the middleware at the current index, or the terminal
    /// handler once the chain is exhausted.
    pub async fn proceed(mut self, req: Request) -> HttpResponse {
        match self.chain.get(self.index).map(Arc::clone) {
            Some(middleware) => {
                self.index += 1;
                middleware.call(req, self).await
            }
            None => self.terminal.handle(req).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, Response};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spy_terminal(hits: Arc<AtomicUsize>) -> Box<dyn Handler> {
        Box::new(move |_req: Request| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(Response::text("done"))
            }
        })
    }

    fn tagging(tag: &'static str, log: Arc<std::sync::Mutex<Vec<&'static str>>>) -> Arc<dyn Middleware> {
        Arc::new(move |req: Request, next: Next| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push(tag);
                next.proceed(req).await
            }) as MiddlewareResult
        })
    }

    #[tokio::test]
    async fn chain_runs_in_order_then_terminal() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = vec![
            tagging("outer", Arc::clone(&log)),
            tagging("inner", Arc::clone(&log)),
        ];

        let res = Next::new(chain, spy_terminal(Arc::clone(&hits)))
            .proceed(Request::new(Method::GET, "/x"))
            .await
            .unwrap();

        assert_eq!(res.status, 200);
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_chain_goes_straight_to_terminal() {
        let hits = Arc::new(AtomicUsize::new(0));
        let res = Next::new(Vec::new(), spy_terminal(Arc::clone(&hits)))
            .proceed(Request::new(Method::GET, "/x"))
            .await
            .unwrap();

        assert_eq!(res.status, 200);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_circuit_halts_chain_and_terminal() {
        let hits = Arc::new(AtomicUsize::new(0));
        let reached = Arc::new(AtomicUsize::new(0));

        let gate: Arc<dyn Middleware> = Arc::new(|_req: Request, _next: Next| {
            Box::pin(async move { Ok(Response::new(401)) }) as MiddlewareResult
        });
        let after = Arc::clone(&reached);
        let later: Arc<dyn Middleware> = Arc::new(move |req: Request, next: Next| {
            let after = Arc::clone(&after);
            Box::pin(async move {
                after.fetch_add(1, Ordering::SeqCst);
                next.proceed(req).await
            }) as MiddlewareResult
        });

        let res = Next::new(vec![gate, later], spy_terminal(Arc::clone(&hits)))
            .proceed(Request::new(Method::GET, "/x"))
            .await
            .unwrap();

        assert_eq!(res.status, 401);
        assert_eq!(reached.load(Ordering::SeqCst), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn middleware_can_stash_data_for_the_controller() {
        let stamp: Arc<dyn Middleware> = Arc::new(|mut req: Request, next: Next| {
            Box::pin(async move {
                req.set_data("user", "alice");
                next.proceed(req).await
            }) as MiddlewareResult
        });

        let terminal: Box<dyn Handler> = Box::new(|req: Request| async move {
            let user: String = req.get_typed_data("user").unwrap_or_default();
            Ok(Response::text(user))
        });

        let res = Next::new(vec![stamp], terminal)
            .proceed(Request::new(Method::GET, "/x"))
            .await
            .unwrap();

        assert_eq!(res.body, "alice");
    }
}
