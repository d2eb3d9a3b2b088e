//! HTTP server
//!
//! hyper does the HTTP/1.1 framing (keep-alive, `Expect: 100-continue`,
//! chunked bodies, malformed requests). Every request lands in one axum
//! fallback handler that buffers the body and hands it to [`Router`], so
//! the ordered first-match rules stay the only dispatch layer.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, State};
use axum::http::{header, HeaderMap, HeaderValue, Version};
use axum::response::IntoResponse;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{HurmaError, Result};
use crate::network::TerminationLatch;

use super::handlers::{build_router, AppState};
use super::request::Request;
use super::response::Response;
use super::router::Router;

/// Shared by every request
struct Dispatch {
    router: Router,
    latch: TerminationLatch,
    max_body_size: usize,
}

/// The REST API on its own tokio runtime
pub struct HttpServer {
    config: Config,
    listener: TcpListener,
    app: axum::Router,
    latch: TerminationLatch,
}

impl HttpServer {
    /// Bind `config.listen_addr` and build the routes
    pub fn bind(config: Config, engine: Arc<Engine>, latch: TerminationLatch) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            HurmaError::Config(format!("cannot listen on {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;
        tracing::info!("HTTP front end listening on {}", listener.local_addr()?);

        let max_body_size = engine.config().max_value_size;
        let dispatch = Arc::new(Dispatch {
            router: build_router(AppState::new(engine, latch.clone())),
            latch: latch.clone(),
            max_body_size,
        });

        let app = axum::Router::new()
            .fallback(dispatch_request)
            .layer(DefaultBodyLimit::max(max_body_size))
            .with_state(dispatch);

        Ok(Self {
            config,
            listener,
            app,
            latch,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the latch trips, then drain open connections
    ///
    /// Requests already being handled complete; idle keep-alive
    /// connections are closed.
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("hurmadb-http")
            .build()?;
        runtime.block_on(self.serve())
    }

    async fn serve(self) -> Result<()> {
        let HttpServer {
            config,
            listener,
            app,
            latch,
        } = self;
        let poll = Duration::from_millis(config.accept_poll_interval_ms.max(1));
        let listener = tokio::net::TcpListener::from_std(listener)?;

        axum::serve(listener, app)
            .with_graceful_shutdown(latched(latch, poll))
            .await?;

        tracing::info!("All HTTP connections finished");
        Ok(())
    }
}

/// Resolves once the latch trips
async fn latched(latch: TerminationLatch, poll: Duration) {
    while !latch.is_terminated() {
        tokio::time::sleep(poll).await;
    }
    tracing::info!("Termination requested, draining HTTP connections");
}

async fn dispatch_request(
    State(dispatch): State<Arc<Dispatch>>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let keep_alive = wants_keep_alive(request.headers(), request.version());

    // Refuse a declared oversize body before any of it is read
    if let Some(len) = content_length(request.headers()) {
        if len > dispatch.max_body_size {
            let message = format!(
                "body of {} bytes exceeds limit of {}",
                len, dispatch.max_body_size
            );
            tracing::debug!("Rejecting {} {}: {}", request.method(), request.uri(), message);
            return with_connection(Response::payload_too_large(&message), false);
        }
    }

    let method = request.method().clone();
    let target = request.uri().to_string();
    let body = match Bytes::from_request(request, &dispatch).await {
        Ok(body) => body,
        Err(rejection) => {
            let response = Response::with_message(rejection.status(), &rejection.body_text());
            return with_connection(response, false);
        }
    };

    let request = Request::new(method, &target, body);
    let routed = {
        let dispatch = Arc::clone(&dispatch);
        tokio::task::spawn_blocking(move || {
            let response = dispatch.router.route(&request);
            tracing::trace!(
                "{} {} -> {}",
                request.method(),
                request.path(),
                response.status.as_u16()
            );
            response
        })
        .await
    };

    let response = match routed {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Request handler panicked: {}", e);
            Response::internal_error("handler failed")
        }
    };

    with_connection(response, keep_alive && !dispatch.latch.is_terminated())
}

fn with_connection(response: Response, keep_alive: bool) -> axum::response::Response {
    let mut response = response.into_response();
    let value = if keep_alive { "keep-alive" } else { "close" };
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static(value));
    response
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// HTTP/1.1 stays open unless told otherwise, HTTP/1.0 only when asked
fn wants_keep_alive(headers: &HeaderMap, version: Version) -> bool {
    let has = |token: &str| {
        headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };
    if version == Version::HTTP_10 {
        has("keep-alive")
    } else {
        !has("close")
    }
}
