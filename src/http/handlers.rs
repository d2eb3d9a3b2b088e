//! REST handlers over the shared engine

use std::sync::Arc;

use axum::http::Method;

use crate::engine::Engine;
use crate::error::HurmaError;
use crate::network::TerminationLatch;

use super::request::Request;
use super::response::Response;
use super::router::{Params, Router};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub latch: TerminationLatch,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, latch: TerminationLatch) -> Self {
        Self { engine, latch }
    }
}

/// Build the API router
///
/// Rule order matters: the router takes the first match. The order here is
/// the documented endpoint order and is asserted by the router tests.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new();

    let s = state.clone();
    router.add(Method::GET, "/", move |req, params| index(&s, req, params));

    let s = state.clone();
    router.add(Method::PUT, "/v1/_stop", move |req, params| stop(&s, req, params));

    let s = state.clone();
    router.add(Method::GET, "/v1/kv/{key}", move |req, params| kv_get(&s, req, params));

    let s = state.clone();
    router.add(Method::GET, "/v1/kv/{from}/{to}", move |req, params| {
        kv_get_range(&s, req, params)
    });

    let s = state.clone();
    router.add(Method::PUT, "/v1/kv/{key}", move |req, params| kv_put(&s, req, params));

    let s = state;
    router.add(Method::DELETE, "/v1/kv/{key}", move |req, params| {
        kv_delete(&s, req, params)
    });

    router
}

fn index(state: &AppState, _req: &Request, _params: &Params) -> Response {
    let status = if state.latch.is_terminated() {
        "terminating"
    } else {
        "running"
    };
    Response::ok(format!("HurmaDB is {}!\n\n", status))
}

fn stop(state: &AppState, _req: &Request, _params: &Params) -> Response {
    if state.latch.terminate() {
        tracing::info!("Termination requested over HTTP");
    }
    Response::ok(Vec::new())
}

fn kv_get(state: &AppState, _req: &Request, params: &Params) -> Response {
    let Some(key) = params.get(0) else {
        return Response::not_found();
    };
    match state.engine.get(key.as_bytes()) {
        Ok(Some(value)) => Response::ok(value),
        Ok(None) => Response::not_found(),
        Err(e) => engine_failure("get", e),
    }
}

fn kv_get_range(state: &AppState, _req: &Request, params: &Params) -> Response {
    let (Some(from), Some(to)) = (params.get(0), params.get(1)) else {
        return Response::not_found();
    };
    match state
        .engine
        .get_range_serialized(from.as_bytes(), to.as_bytes())
    {
        Ok(body) => Response::ok(body),
        Err(e) => engine_failure("get_range", e),
    }
}

fn kv_put(state: &AppState, req: &Request, params: &Params) -> Response {
    let Some(key) = params.get(0) else {
        return Response::not_found();
    };
    match state.engine.set(key.as_bytes(), req.body()) {
        Ok(()) => Response::ok(Vec::new()),
        Err(e) if e.is_validation() => {
            tracing::debug!("Rejected PUT {}: {}", key, e);
            Response::bad_request(&e.to_string())
        }
        Err(e) => engine_failure("set", e),
    }
}

fn kv_delete(state: &AppState, _req: &Request, params: &Params) -> Response {
    let Some(key) = params.get(0) else {
        return Response::not_found();
    };
    match state.engine.del(key.as_bytes()) {
        Ok(true) => Response::ok(Vec::new()),
        Ok(false) => Response::not_found(),
        Err(e) => engine_failure("del", e),
    }
}

fn engine_failure(op: &str, err: HurmaError) -> Response {
    tracing::error!("{} failed: {}", op, err);
    Response::internal_error(&err.to_string())
}
