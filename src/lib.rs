//! # Trellis
//!
//! A trie-based HTTP routing and middleware engine for Rust.
//!
//! ## Features
//!
//! - Segment trie routing with static, dynamic (`:id`) and
//!   catch-all (`...rest`) segments, with backtracking resolution
//! - Scoped middleware that bubbles from ancestor routes into
//!   descendants, with deterministic ordering directives
//! - Short-circuiting middleware chains (auth, CORS preflight, ...)
//! - JSON request/response handling
//! - Connection-upgrade routing sharing the same trie
//! - Async/await support
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis::app::Application;
//! use trellis::ok_json;
//!
//! fn main() {
//!     let mut app = Application::new();
//!
//!     app.get("/home", |_req| async {
//!         ok_json!({
//!             "message": "Hello, World!"
//!         })
//!     }).unwrap();
//!
//!     app.get("/getId/:id", |req| async move {
//!         ok_json!({ "id": req.param("id") })
//!     }).unwrap();
//!
//!     // Start server
//!     // app.listen("127.0.0.1:3000").unwrap();
//! }
//! ```
//!
//! ## Middleware Usage
//!
//! ```rust
//! use trellis::app::Application;
//! use trellis::middleware::{Cors, CorsConfig, MiddlewareEntry, Position};
//!
//! let mut app = Application::new();
//! app.middleware(
//!     "/",
//!     MiddlewareEntry::new("cors", true, Cors::new(CorsConfig::default())),
//!     Position::Append,
//! ).unwrap();
//! ```

pub mod app;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod router;
pub mod error;
pub extern crate serde_json;

// Reexport serde_json
pub use serde_json::{json, Value};
