//! Minimal Trellis server.

use trellis::app::Application;
use trellis::ok_json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = Application::new();

    app.get("/", |_req| async {
        ok_json!({
            "message": "Hello, World!"
        })
    })?;

    app.listen("127.0.0.1:3000")
}
