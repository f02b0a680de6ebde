use crate::http::{Method, Request, Response};
use crate::middleware::{Middleware, MiddlewareResult, Next};

#[derive(Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Option<u32>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allow_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            allow_credentials: false,
            max_age: Some(86400),
        }
    }
}

/// CORS middleware. Registered at the root with `bubble = true` it
/// covers every route; preflight OPTIONS requests are answered directly
/// without proceeding down the chain.
pub struct Cors {
    config: CorsConfig,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.config.allow_origins.iter().any(|o| o == "*" || o == origin)
    }
}

impl Middleware for Cors {
    fn call(&self, req: Request, next: Next) -> MiddlewareResult {
        let config = self.config.clone();
        let origin = req
            .get_header("origin")
            .filter(|o| self.origin_allowed(o))
            .map(|o| o.to_string());

        Box::pin(async move {
            if req.method == Method::OPTIONS {
                let mut response = Response::new(204);

                if let Some(origin) = origin {
                    response.header("Access-Control-Allow-Origin", origin);
                }
                response.header("Access-Control-Allow-Methods", config.allow_methods.join(", "));
                response.header("Access-Control-Allow-Headers", config.allow_headers.join(", "));
                if config.allow_credentials {
                    response.header("Access-Control-Allow-Credentials", "true");
                }
                if let Some(max_age) = config.max_age {
                    response.header("Access-Control-Max-Age", max_age.to_string());
                }

                return Ok(response);
            }

            let mut response = next.proceed(req).await?;

            if let Some(origin) = origin {
                response.header("Access-Control-Allow-Origin", origin);
            }
            if config.allow_credentials {
                response.header("Access-Control-Allow-Credentials", "true");
            }

            Ok(response)
        })
    }
}
