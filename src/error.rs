use std::io;
use std::fmt;

#[derive(Debug)]
pub enum ServerError {
    IoError(io::Error),
    ParseError(String),
    /// A route registration would create a second dynamic or catch-all
    /// child under the same parent. Fatal at startup.
    RouteConflict(String),
    /// A middleware ordering directive cannot be honored (unknown
    /// `Before` target, duplicate name on one node). Fatal at startup.
    MiddlewareConflict(String),
    NotFound,
    MethodNotAllowed,
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    UnsupportedMediaType(String),
    InternalError(String),
    PanicError(String),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::NotFound => 404,
            ServerError::MethodNotAllowed => 405,
            ServerError::UnsupportedMediaType(_) => 415,
            ServerError::ParseError(_) => 422,
            ServerError::IoError(_)
            | ServerError::RouteConflict(_)
            | ServerError::MiddlewareConflict(_)
            | ServerError::InternalError(_)
            | ServerError::PanicError(_) => 500,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::IoError(err) => write!(f, "IO error: {}", err),
            ServerError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ServerError::RouteConflict(msg) => write!(f, "Route conflict: {}", msg),
            ServerError::MiddlewareConflict(msg) => write!(f, "Middleware conflict: {}", msg),
            ServerError::NotFound => write!(f, "Not found"),
            ServerError::MethodNotAllowed => write!(f, "Method not allowed"),
            ServerError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ServerError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ServerError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ServerError::UnsupportedMediaType(msg) => {
                write!(f, "Unsupported media type: {}", msg)
            }
            ServerError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ServerError::PanicError(msg) => write!(f, "Panic: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::IoError(err)
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
