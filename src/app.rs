//! Application is the main entry point for the Trellis engine.
//!
//! This module provides the core Application struct: registration
//! facade over the route tree, the per-request dispatcher, and a
//! minimal tokio server loop.
//!
//! # Examples
//!
//! ```rust
//! use trellis::app::Application;
//! use trellis::ok_json;
//!
//! let mut app = Application::new();
//! app.get("/", |_req| async {
//!     ok_json!({ "message": "Hello!" })
//! }).unwrap();
//! ```

use crate::error::{ServerError, ServerResult};
use crate::handler::{Handler, HttpResponse, IntoResponse};
use crate::http::{Body, Method, Request};
use crate::http::Response;
use crate::middleware::{MiddlewareEntry, Next, Position};
use crate::router::{MiddlewareDescriptor, Resolved, RouteDescriptor, Router};
use futures::FutureExt;
use std::collections::HashMap;
use std::io::{Error, ErrorKind};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

type ErrorHandler = Arc<dyn Fn(ServerError) -> Response + Send + Sync>;

/// The main application struct that represents your web server.
///
/// All routes and middleware are registered before serving begins; the
/// route tree is immutable afterwards, so concurrent requests read it
/// without locking.
///
/// # Example
///
/// ```rust
/// use trellis::app::Application;
/// use trellis::ok_json;
///
/// let mut app = Application::new();
///
/// app.get("/", |_req| async {
///     ok_json!({ "message": "Hello" })
/// }).unwrap();
///
/// // Start the server
/// // app.listen("127.0.0.1:3000").unwrap();
/// ```
pub struct Application {
    pub max_connections: usize,
    router: Router,
    on_error: Option<ErrorHandler>,
}

impl Application {
    /// Creates a new Application instance
    pub fn new() -> Self {
        Self {
            max_connections: 256,
            router: Router::new(),
            on_error: None,
        }
    }

    pub fn max_connections(&mut self, max_connections: usize) -> &mut Self {
        self.max_connections = max_connections;
        self
    }

    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ServerError) -> Response + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Registers a GET route handler
    ///
    /// # Arguments
    /// * `path` - The URL path to match
    /// * `handler` - The async handler function
    pub fn get<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.get(path, handler)?;
        Ok(self)
    }

    /// Registers a POST route handler
    pub fn post<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.post(path, handler)?;
        Ok(self)
    }

    /// Registers a PUT route handler
    pub fn put<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.put(path, handler)?;
        Ok(self)
    }

    /// Registers a PATCH route handler
    pub fn patch<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.patch(path, handler)?;
        Ok(self)
    }

    /// Registers a DELETE route handler
    pub fn delete<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.delete(path, handler)?;
        Ok(self)
    }

    /// Registers a HEAD route handler
    pub fn head<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.head(path, handler)?;
        Ok(self)
    }

    /// Registers an OPTIONS route handler
    pub fn options<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.options(path, handler)?;
        Ok(self)
    }

    /// Registers a CONNECT route handler
    pub fn connect<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.connect(path, handler)?;
        Ok(self)
    }

    /// Registers a TRACE route handler
    pub fn trace<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.trace(path, handler)?;
        Ok(self)
    }

    /// Registers a route node without controllers. Requests resolving
    /// to it are answered with 405 rather than 404.
    pub fn declare(&mut self, path: &str) -> ServerResult<&mut Self> {
        self.router.declare(path)?;
        Ok(self)
    }

    /// Registers a connection-upgrade handler (e.g. WebSocket
    /// handshake) on a route node.
    pub fn upgrade<F, R>(&mut self, path: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.upgrade(path, handler)?;
        Ok(self)
    }

    /// Registers a middleware on the node named by `path`.
    ///
    /// # Arguments
    /// * `path` - Route whose node owns the entry (`"/"` for global)
    /// * `entry` - Name, bubble flag and handler
    /// * `position` - Where the entry lands in the node's local list
    pub fn middleware(
        &mut self,
        path: &str,
        entry: MiddlewareEntry,
        position: Position,
    ) -> ServerResult<&mut Self> {
        self.router.middleware(path, entry, position)?;
        Ok(self)
    }

    /// Builds the route tree from externally produced descriptor lists.
    pub fn apply_routes(&mut self, descriptors: Vec<RouteDescriptor>) -> ServerResult<&mut Self> {
        self.router.apply_routes(descriptors)?;
        Ok(self)
    }

    pub fn apply_middlewares(
        &mut self,
        descriptors: Vec<MiddlewareDescriptor>,
    ) -> ServerResult<&mut Self> {
        self.router.apply_middlewares(descriptors)?;
        Ok(self)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Starts the HTTP server
    ///
    /// # Arguments
    /// * `addr` - Address to listen on (e.g. "127.0.0.1:3000")
    pub fn listen(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let runtime = Runtime::new()?;
        runtime.block_on(async {
            let listener = TcpListener::bind(addr).await?;
            let connection_counter = Arc::new(AtomicUsize::new(0));
            // the tree is finished: share it, never mutate it again
            let app = Arc::new(self);

            println!("Server running on http://{}", addr);

            loop {
                let counter = Arc::clone(&connection_counter);
                if counter.load(Ordering::Relaxed) >= app.max_connections {
                    eprintln!("Max connections reached");
                    // back off instead of spinning until a slot frees up
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    continue;
                }

                match listener.accept().await {
                    Ok((stream, _)) => {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let app = Arc::clone(&app);

                        tokio::spawn(async move {
                            if let Err(e) = app.handle_connection(stream).await {
                                eprintln!("Connection error: {}", e);
                            }
                            counter.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => eprintln!("Connection failed: {}", e),
                }
            }
        })
    }

    async fn handle_connection<S>(&self, mut stream: S) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf_reader = BufReader::new(&mut stream);
        let mut request_line = String::new();
        buf_reader.read_line(&mut request_line).await?;

        if request_line.is_empty() {
            return Ok(());
        }

        // Parse the request line
        let mut parts = request_line.trim().split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Invalid request line"))?
            .to_string();

        let full_path = parts
            .next()
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Invalid request line"))?;

        // Split path and query
        let mut path_parts = full_path.split('?');
        let path = path_parts.next().unwrap_or("/").to_string();
        let query = path_parts
            .next()
            .map(Self::parse_query)
            .unwrap_or_default();

        // Parse headers
        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            buf_reader.read_line(&mut line).await?;

            if line.trim().is_empty() {
                break;
            }

            if let Some((key, value)) = line.trim().split_once(':') {
                headers.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        // Read body if Content-Length is present
        let mut body = Vec::new();
        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "none".to_owned());
        if let Some(content_length) = headers.get("content-length") {
            if let Ok(length) = content_length.parse::<usize>() {
                body.reserve(length);
                let mut take = buf_reader.take(length as u64);
                take.read_to_end(&mut body).await?;
            }
        }

        let request = Request {
            method: Method::from_string(&method),
            path,
            query,
            headers,
            body: Body {
                content_type,
                data: body,
            },
            params: HashMap::new(),
            data: HashMap::new(),
        };

        let response = self.dispatch(request).await;

        let mut response_line = format!("HTTP/1.1 {}\r\n", response.status);
        response.headers.iter().for_each(|(name, value)| {
            response_line += &format!("{}: {}\r\n", name, value);
        });
        response_line += &format!("Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now()));

        let contents = &response.body;
        let length = contents.len();
        response_line += &format!("Content-Length: {}\r\n\r\n{}", length, contents);
        stream.write_all(response_line.as_bytes()).await?;
        Ok(())
    }

    /// Dispatches one request: resolve the path, pick the controller
    /// for the method, collect the middleware along the resolution
    /// path, run the chain with the controller as terminal.
    ///
    /// An unresolved path gets a fixed 404; a resolved node without the
    /// requested method (including nodes with no controllers at all)
    /// gets a fixed 405. Panics inside the chain or the controller are
    /// converted to 500 instead of tearing the task down.
    ///
    /// OPTIONS requests without an OPTIONS controller still run the
    /// middleware chain, with the fixed 405 as the terminal, so
    /// preflight interceptors like [`Cors`](crate::middleware::Cors)
    /// can answer before it is reached.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let path = req.path.clone();
        let Some(resolved) = self.router.resolve(&path) else {
            return Self::not_found();
        };

        if req.is_upgrade() {
            return self.dispatch_upgrade(req, resolved).await;
        }

        let controller: Box<dyn Handler> = match resolved.node.controller(req.method) {
            Some(controller) => controller,
            None if req.method == Method::OPTIONS => {
                Box::new(|_req: Request| async { Ok(Self::no_controller()) })
            }
            None => return Self::no_controller(),
        };

        let chain = resolved.middlewares().iter().map(|m| m.handler()).collect();
        req.params = resolved.into_params();

        let outcome = AssertUnwindSafe(Next::new(chain, controller).proceed(req))
            .catch_unwind()
            .await;
        let outcome = outcome.unwrap_or_else(|panic| Err(Self::describe_panic(panic)));

        self.finish(outcome)
    }

    // Upgrade handshakes resolve through the same tree but branch to
    // the node's upgrade handler instead of a method controller.
    async fn dispatch_upgrade(&self, mut req: Request, resolved: Resolved<'_>) -> Response {
        let Some(handler) = resolved.node.upgrade_handler() else {
            return Self::not_found();
        };

        req.params = resolved.into_params();

        let outcome = AssertUnwindSafe(handler.handle(req)).catch_unwind().await;
        let outcome = outcome.unwrap_or_else(|panic| Err(Self::describe_panic(panic)));

        self.finish(outcome)
    }

    fn finish(&self, outcome: HttpResponse) -> Response {
        match outcome {
            Ok(response) => response,
            Err(err) => match &self.on_error {
                Some(handler) => handler(err),
                None => Response::error(err),
            },
        }
    }

    fn not_found() -> Response {
        let mut response = Response::new(404);
        response.header("Content-Type", "text/plain").body("Not Found");
        response
    }

    fn no_controller() -> Response {
        let mut response = Response::new(405);
        response
            .header("Content-Type", "text/plain")
            .body("No controller associated.");
        response
    }

    fn describe_panic(panic: Box<dyn std::any::Any + Send>) -> ServerError {
        let message = if let Some(msg) = panic.downcast_ref::<&str>() {
            msg.to_string()
        } else if let Some(msg) = panic.downcast_ref::<String>() {
            msg.clone()
        } else {
            "Unknown panic".to_string()
        };
        ServerError::PanicError(message)
    }

    fn parse_query(query: &str) -> HashMap<String, String> {
        query
            .split('&')
            .filter(|s| !s.is_empty())
            .filter_map(|pair| {
                let mut parts = pair.split('=');
                Some((
                    parts.next()?.to_string(),
                    parts.next().unwrap_or("").to_string(),
                ))
            })
            .collect()
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}
