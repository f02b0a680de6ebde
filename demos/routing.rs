//! Routing example: static, dynamic and catch-all segments.

use trellis::app::Application;
use trellis::ok_json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = Application::new();

    app.get("/home", |_req| async {
        ok_json!({ "page": "home" })
    })?;

    // dynamic segment: /getId/123 binds id = "123"
    app.get("/getId/:id", |req| async move {
        ok_json!({ "id": req.param("id") })
    })?;

    // catch-all with a static tail: /getId/1/2/3/details works at any
    // depth and binds ids = ["1", "2", "3"]
    app.get("/getId/...ids/details", |req| async move {
        ok_json!({ "ids": req.param_all("ids") })
    })?;

    // the /user node exists but has no GET controller, so
    // GET /user answers 405 instead of 404
    app.post("/user", |req| async move {
        let body = req.body.json::<serde_json::Value>().unwrap_or_default();
        ok_json!({ "created": body })
    })?;

    app.listen("127.0.0.1:3000")
}
