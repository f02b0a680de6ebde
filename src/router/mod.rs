mod trie;

pub use trie::{Resolved, SegmentKind, TrieNode};

use crate::error::ServerResult;
use crate::handler::{Handler, IntoResponse};
use crate::http::{Method, Request};
use crate::middleware::{MiddlewareEntry, Position};

/// Splits a request or definition path into segments, dropping the
/// empties produced by leading, trailing or duplicate slashes.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// One route entry handed over by an external loading phase (filesystem
/// convention scanning, config, codegen). The engine consumes these as
/// plain data; it never performs I/O or code loading itself.
pub struct RouteDescriptor {
    pub path: String,
    pub endpoint: Endpoint,
}

pub enum Endpoint {
    /// A method-specific terminal handler.
    Controller {
        method: Method,
        handler: Box<dyn Handler>,
    },
    /// A connection-upgrade handler (e.g. WebSocket handshake).
    Upgrade { handler: Box<dyn Handler> },
    /// The route exists but carries no controllers. Requests resolving
    /// here get 405, not 404.
    Declare,
}

/// One middleware registration handed over by the external loader.
pub struct MiddlewareDescriptor {
    pub path: String,
    pub entry: MiddlewareEntry,
    pub position: Position,
}

pub struct Router {
    root: TrieNode,
}

impl Router {
    pub fn new() -> Self {
        Self {
            root: TrieNode::root(),
        }
    }

    pub fn root(&self) -> &TrieNode {
        &self.root
    }

    pub fn get<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::GET, path, Box::new(handler))
    }

    pub fn post<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::POST, path, Box::new(handler))
    }

    pub fn put<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::PUT, path, Box::new(handler))
    }

    pub fn patch<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::PATCH, path, Box::new(handler))
    }

    pub fn delete<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::DELETE, path, Box::new(handler))
    }

    pub fn head<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::HEAD, path, Box::new(handler))
    }

    pub fn connect<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::CONNECT, path, Box::new(handler))
    }

    pub fn options<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::OPTIONS, path, Box::new(handler))
    }

    pub fn trace<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::TRACE, path, Box::new(handler))
    }

    fn add(
        &mut self,
        method: Method,
        path: &str,
        handler: Box<dyn Handler>,
    ) -> ServerResult<&mut Self> {
        let segments = split_path(path);
        let node = self.root.insert(&segments, true)?;
        node.register_controller(method, handler);
        Ok(self)
    }

    /// Registers a route node without any controller. Requests that
    /// resolve to it are answered with 405 rather than 404.
    pub fn declare(&mut self, path: &str) -> ServerResult<&mut Self> {
        let segments = split_path(path);
        self.root.insert(&segments, false)?;
        Ok(self)
    }

    /// Registers a connection-upgrade handler on a route node. Upgrade
    /// requests resolve through the same tree as plain requests.
    pub fn upgrade<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        let segments = split_path(path);
        let node = self.root.insert(&segments, false)?;
        node.register_upgrade(Box::new(handler));
        Ok(self)
    }

    /// Registers a middleware on the node named by `path` (creating the
    /// node if needed), honoring the position directive.
    pub fn middleware(
        &mut self,
        path: &str,
        entry: MiddlewareEntry,
        position: Position,
    ) -> ServerResult<&mut Self> {
        let segments = split_path(path);
        let node = self.root.insert(&segments, false)?;
        node.add_middleware(entry, position)?;
        Ok(self)
    }

    /// Builds the tree from an externally produced route descriptor
    /// list, in list order. Any conflict aborts the build.
    pub fn apply_routes(&mut self, descriptors: Vec<RouteDescriptor>) -> ServerResult<()> {
        for descriptor in descriptors {
            let segments = split_path(&descriptor.path);
            match descriptor.endpoint {
                Endpoint::Controller { method, handler } => {
                    let node = self.root.insert(&segments, true)?;
                    node.register_controller(method, handler);
                }
                Endpoint::Upgrade { handler } => {
                    let node = self.root.insert(&segments, false)?;
                    node.register_upgrade(handler);
                }
                Endpoint::Declare => {
                    self.root.insert(&segments, false)?;
                }
            }
        }
        Ok(())
    }

    /// Applies middleware registrations in arrival order. A `Before`
    /// directive naming a middleware that is not yet on its target node
    /// aborts the build.
    pub fn apply_middlewares(&mut self, descriptors: Vec<MiddlewareDescriptor>) -> ServerResult<()> {
        for descriptor in descriptors {
            let segments = split_path(&descriptor.path);
            let node = self.root.insert(&segments, false)?;
            node.add_middleware(descriptor.entry, descriptor.position)?;
        }
        Ok(())
    }

    /// Resolves a raw request path. Shared by the plain and upgrade
    /// dispatch paths.
    pub fn resolve<'a>(&'a self, path: &str) -> Option<Resolved<'a>> {
        let segments = split_path(path);
        self.root.resolve(&segments)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
