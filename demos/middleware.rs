//! Middleware example: bubbling scopes, ordering directives and
//! short-circuiting.

use std::time::Instant;
use trellis::app::Application;
use trellis::error::ServerError;
use trellis::http::Request;
use trellis::middleware::{
    BodyParser, Cors, CorsConfig, Middleware, MiddlewareEntry, MiddlewareResult, Next, Position,
};
use trellis::ok_json;

// Logger middleware that tracks request duration
struct Logger;

impl Middleware for Logger {
    fn call(&self, req: Request, next: Next) -> MiddlewareResult {
        Box::pin(async move {
            let start = Instant::now();
            let url = req.path.clone();
            let method = req.method;
            let res = next.proceed(req).await;
            let status = match &res {
                Ok(res) => res.status,
                Err(err) => err.status_code(),
            };
            let duration = start.elapsed().as_millis();
            println!("[{}] {} {} - {}ms", status, method.as_str(), url, duration);
            res
        })
    }
}

// Auth middleware that never proceeds on missing credentials
struct Auth;

impl Middleware for Auth {
    fn call(&self, req: Request, next: Next) -> MiddlewareResult {
        Box::pin(async move {
            match req.get_header("authorization") {
                Some(token) if token.starts_with("Bearer ") => next.proceed(req).await,
                _ => Err(ServerError::Unauthorized("Authentication required".to_string())),
            }
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = Application::new();

    // global middleware on the root node, bubbling into every route
    app.middleware(
        "/",
        MiddlewareEntry::new("cors", true, Cors::new(CorsConfig::default())),
        Position::Append,
    )?;
    app.middleware(
        "/",
        MiddlewareEntry::new("parser", true, BodyParser::new()),
        Position::Append,
    )?;
    // the logger wants to wrap everything, including CORS
    app.middleware(
        "/",
        MiddlewareEntry::new("logger", true, Logger),
        Position::First,
    )?;

    // auth guards /admin and everything below it
    app.middleware(
        "/admin",
        MiddlewareEntry::new("auth", true, Auth),
        Position::Append,
    )?;

    app.get("/admin/panel", |_req| async {
        ok_json!({ "panel": "secret" })
    })?;

    app.get("/public", |_req| async {
        ok_json!({ "public": true })
    })?;

    app.listen("127.0.0.1:3000")
}
