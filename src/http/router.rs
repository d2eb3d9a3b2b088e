//! Request Router
//!
//! An ordered list of `(method, pattern, handler)` rules. The first rule
//! whose method and pattern both match handles the request; if none does the
//! answer is 404.
//!
//! Patterns are `/`-separated literal segments and `{name}` captures. A
//! capture matches one non-empty segment made of `[A-Za-z0-9_-]`. Literal
//! segments compare case-insensitively and one trailing slash is optional.

use axum::http::Method;

use crate::validation::is_key_byte;

use super::request::Request;
use super::response::Response;

/// Handler invoked with the request and its positional captures
pub type Handler = Box<dyn Fn(&Request, &Params) -> Response + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Stored lowercased
    Literal(String),
    Capture(String),
}

/// A compiled path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile `source`, e.g. `/v1/kv/{key}`
    ///
    /// Panics on a malformed pattern. Patterns are fixed at startup.
    pub fn compile(source: &str) -> Self {
        assert!(source.starts_with('/'), "pattern must start with '/': {source}");

        let segments = split_path(source)
            .into_iter()
            .map(|seg| match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => {
                    assert!(!name.is_empty(), "empty capture name in {source}");
                    Segment::Capture(name.to_string())
                }
                None => Segment::Literal(seg.to_ascii_lowercase()),
            })
            .collect();

        Self {
            source: source.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a request path, returning the captured segments in order
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut captures = Vec::new();
        let mut parts = split_path(path).into_iter();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) => {
                    if !part.eq_ignore_ascii_case(lit) {
                        return None;
                    }
                }
                Segment::Capture(name) => {
                    if part.is_empty() || !part.bytes().all(is_key_byte) {
                        return None;
                    }
                    captures.push((name.clone(), part.to_string()));
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(Params { captures })
    }
}

/// Split a path into segments, ignoring the leading slash and at most one
/// trailing slash. `/` yields no segments.
fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').collect()
}

/// Captured path segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    captures: Vec<(String, String)>,
}

impl Params {
    /// Capture by position
    pub fn get(&self, index: usize) -> Option<&str> {
        self.captures.get(index).map(|(_, v)| v.as_str())
    }

    /// Capture by name
    pub fn named(&self, name: &str) -> Option<&str> {
        self.captures
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// First-match-wins router
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Earlier rules take precedence.
    pub fn add<H>(&mut self, method: Method, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(&Request, &Params) -> Response + Send + Sync + 'static,
    {
        self.routes.push(Route {
            method,
            pattern: Pattern::compile(pattern),
            handler: Box::new(handler),
        });
        self
    }

    /// Index of the first matching rule and its captures
    ///
    /// Methods compare case-insensitively, like literal segments.
    pub fn find(&self, method: &Method, path: &str) -> Option<(usize, Params)> {
        self.routes.iter().enumerate().find_map(|(i, route)| {
            if !route.method.as_str().eq_ignore_ascii_case(method.as_str()) {
                return None;
            }
            route.pattern.matches(path).map(|params| (i, params))
        })
    }

    /// Dispatch to the first matching handler, or 404
    pub fn route(&self, request: &Request) -> Response {
        match self.find(request.method(), request.path()) {
            Some((i, params)) => {
                let route = &self.routes[i];
                tracing::trace!(
                    "{} {} matched {}",
                    request.method(),
                    request.path(),
                    route.pattern.as_str()
                );
                (route.handler)(request, &params)
            }
            None => {
                tracing::trace!("{} {} matched no route", request.method(), request.path());
                Response::not_found()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.routes
                    .iter()
                    .map(|r| format!("{} {}", r.method, r.pattern.as_str())),
            )
            .finish()
    }
}
