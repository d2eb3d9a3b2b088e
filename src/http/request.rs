//! Requests as the router sees them
//!
//! hyper has already framed the request by the time one of these is built;
//! only the method, the path and the buffered body matter to routing.

use axum::http::Method;
use bytes::Bytes;

/// A fully read request
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    /// Request target without the query string
    path: String,
    body: Bytes,
}

impl Request {
    /// `target` may carry a query string; routing ignores it
    pub fn new(method: Method, target: &str, body: impl Into<Bytes>) -> Self {
        let path = target.split('?').next().unwrap_or(target);
        Self {
            method,
            path: path.to_string(),
            body: body.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
