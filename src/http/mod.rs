pub mod request;
pub mod response;

pub use request::{Body, Method, ParamValue, Params, Request};
pub use response::Response;
