//! Router behaviour through the public API
//!
//! These tests verify:
//! - The API's rules are registered in the documented order
//! - First match wins when a literal and a capture overlap
//! - Literal segments are case-insensitive, captures keep their case
//! - One trailing slash is optional
//! - Captures reject empty segments and bytes outside the key alphabet

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use hurmadb::http::{build_router, AppState, Request, Response, Router};
use hurmadb::{Engine, TerminationLatch};
use tempfile::TempDir;

fn request(method: &str, path: &str) -> Request {
    let method = Method::from_bytes(method.as_bytes()).unwrap();
    Request::new(method, path, Vec::new())
}

fn body(response: Response) -> String {
    assert_eq!(response.status, StatusCode::OK);
    String::from_utf8(response.body).unwrap()
}

fn sample_router() -> Router {
    let mut router = Router::new();
    router
        .add(Method::GET, "/v1/kv/_special", |_, _| Response::ok("special"))
        .add(Method::GET, "/v1/kv/{key}", |_, p| {
            Response::ok(format!("key={}", p.named("key").unwrap_or("")))
        })
        .add(Method::GET, "/v1/kv/{from}/{to}", |_, p| {
            Response::ok(format!("{}..{}", p.get(0).unwrap_or(""), p.get(1).unwrap_or("")))
        })
        .add(Method::PUT, "/v1/kv/{key}", |_, _| Response::ok("put"));
    router
}

// =============================================================================
// API Rules
// =============================================================================

fn api_router(latch: &TerminationLatch) -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(Engine::open_path(dir.path()).unwrap());
    (dir, build_router(AppState::new(engine, latch.clone())))
}

#[test]
fn test_api_rules_are_registered_in_order() {
    let (_dir, router) = api_router(&TerminationLatch::new());

    assert_eq!(
        format!("{:?}", router),
        r#"["GET /", "PUT /v1/_stop", "GET /v1/kv/{key}", "GET /v1/kv/{from}/{to}", "PUT /v1/kv/{key}", "DELETE /v1/kv/{key}"]"#
    );

    let expected = [
        (Method::GET, "/", 0),
        (Method::PUT, "/v1/_stop", 1),
        (Method::GET, "/v1/kv/foo", 2),
        (Method::GET, "/v1/kv/a/z", 3),
        (Method::PUT, "/v1/kv/foo", 4),
        (Method::DELETE, "/v1/kv/foo", 5),
    ];
    for (method, path, index) in expected {
        assert_eq!(router.find(&method, path).unwrap().0, index, "{} {}", method, path);
    }

    // Only PUT stops; other methods on the stop path fall through to 404
    assert!(router.find(&Method::GET, "/v1/_stop").is_none());
    assert!(router.find(&Method::DELETE, "/").is_none());
}

#[test]
fn test_index_reports_latch_state() {
    let latch = TerminationLatch::new();
    let (_dir, router) = api_router(&latch);

    assert_eq!(body(router.route(&request("GET", "/"))), "HurmaDB is running!\n\n");
    latch.terminate();
    assert_eq!(body(router.route(&request("GET", "/"))), "HurmaDB is terminating!\n\n");
}

#[test]
fn test_stop_rule_trips_the_latch() {
    let latch = TerminationLatch::new();
    let (_dir, router) = api_router(&latch);

    assert_eq!(router.route(&request("PUT", "/v1/_stop")).status, StatusCode::OK);
    assert!(latch.is_terminated());
}

// =============================================================================
// Matching
// =============================================================================

#[test]
fn test_first_match_wins() {
    let router = sample_router();
    assert_eq!(router.len(), 4);

    assert_eq!(body(router.route(&request("GET", "/v1/kv/_special"))), "special");
    assert_eq!(body(router.route(&request("GET", "/v1/kv/other"))), "key=other");
    assert_eq!(router.find(&Method::GET, "/v1/kv/_special").unwrap().0, 0);
}

#[test]
fn test_method_selects_rule() {
    let router = sample_router();
    assert_eq!(body(router.route(&request("PUT", "/v1/kv/x"))), "put");
    assert_eq!(
        router.route(&request("DELETE", "/v1/kv/x")).status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        router.route(&request("PATCH", "/v1/kv/x")).status,
        StatusCode::NOT_FOUND
    );
}

#[test]
fn test_literals_ignore_case_captures_do_not() {
    let router = sample_router();
    assert_eq!(body(router.route(&request("GET", "/V1/KV/MixedCase"))), "key=MixedCase");
    assert_eq!(body(router.route(&request("get", "/v1/kv/a/b"))), "a..b");
}

#[test]
fn test_trailing_slash_is_optional() {
    let router = sample_router();
    assert_eq!(body(router.route(&request("GET", "/v1/kv/foo/"))), "key=foo");
    assert_eq!(body(router.route(&request("GET", "/v1/kv/a/b/"))), "a..b");
    assert_eq!(
        router.route(&request("GET", "/v1/kv/foo//")).status,
        StatusCode::NOT_FOUND
    );
}

#[test]
fn test_bad_captures_do_not_match() {
    let router = sample_router();
    for path in ["/v1/kv/", "/v1/kv/a.b", "/v1/kv/a%20b", "/v1/kv//b", "/v1/kv/a/b/c"] {
        assert_eq!(
            router.route(&request("GET", path)).status,
            StatusCode::NOT_FOUND,
            "{}",
            path
        );
    }
}

#[test]
fn test_query_string_is_ignored() {
    let router = sample_router();
    assert_eq!(body(router.route(&request("GET", "/v1/kv/foo?x=1"))), "key=foo");
}
