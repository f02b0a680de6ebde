use crate::error::ServerError;
use crate::http::Request;
use crate::middleware::{Middleware, MiddlewareResult, Next};

/// Body-parsing middleware. An ordinary root-level middleware, not a
/// special case in the dispatcher: it decodes the raw request body for
/// the enabled content types and stashes the result under
/// `request.data["body"]` before the rest of the chain runs.
///
/// Requests carrying a body with a content type that is not enabled are
/// answered with 415.
pub struct BodyParser {
    enabled: Vec<String>,
}

impl BodyParser {
    /// Enables the JSON, urlencoded and multipart decoders.
    pub fn new() -> Self {
        Self::only(&[
            "application/json",
            "application/x-www-form-urlencoded",
            "multipart/form-data",
        ])
    }

    pub fn only(types: &[&str]) -> Self {
        Self {
            enabled: types.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Default for BodyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for BodyParser {
    fn call(&self, mut req: Request, next: Next) -> MiddlewareResult {
        let enabled = self.enabled.clone();
        Box::pin(async move {
            if req.body.as_bytes().is_empty() {
                return next.proceed(req).await;
            }

            let base_type = req
                .body
                .content_type()
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_string();

            if !enabled.iter().any(|t| t == &base_type) {
                return Err(ServerError::UnsupportedMediaType(base_type));
            }

            match req.body.to_value() {
                Some(value) => {
                    req.data.insert("body".to_string(), value);
                    next.proceed(req).await
                }
                None => Err(ServerError::BadRequest("malformed request body".to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::http::{Body, Method, Response};
    use serde_json::json;

    fn echo_body() -> Box<dyn Handler> {
        Box::new(|req: Request| async move {
            let body = req.get_data("body").cloned().unwrap_or_default();
            Response::ok(&body)
        })
    }

    fn chain() -> Next {
        Next::new(vec![std::sync::Arc::new(BodyParser::new())], echo_body())
    }

    #[tokio::test]
    async fn parses_json_body_into_request_data() {
        let mut req = Request::new(Method::POST, "/user");
        req.body = Body::with_content_type("application/json", b"{\"name\":\"ana\"}".to_vec());

        let res = chain().proceed(req).await.unwrap();

        assert_eq!(res.status, 200);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&res.body).unwrap(),
            json!({ "name": "ana" })
        );
    }

    #[tokio::test]
    async fn parses_urlencoded_body() {
        let mut req = Request::new(Method::POST, "/user");
        req.body = Body::with_content_type(
            "application/x-www-form-urlencoded",
            b"name=ana&city=Quer%C3%A9taro".to_vec(),
        );

        let res = chain().proceed(req).await.unwrap();

        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&res.body).unwrap(),
            json!({ "name": "ana", "city": "Querétaro" })
        );
    }

    #[tokio::test]
    async fn rejects_disabled_content_type_with_415() {
        let mut req = Request::new(Method::POST, "/user");
        req.body = Body::with_content_type("application/xml", b"<name>ana</name>".to_vec());

        let err = chain().proceed(req).await.unwrap_err();

        assert_eq!(err.status_code(), 415);
    }

    #[tokio::test]
    async fn bodyless_requests_pass_through() {
        let req = Request::new(Method::GET, "/user");
        let res = chain().proceed(req).await.unwrap();
        assert_eq!(res.status, 200);
    }
}
