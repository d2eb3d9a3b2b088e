//! HTTP Front End
//!
//! REST API over the storage engine, served by axum on a tokio runtime.
//!
//! ## Endpoints
//! ```text
//! GET    /                   status text
//! PUT    /v1/_stop           latch termination
//! GET    /v1/kv/{key}        value or 404
//! GET    /v1/kv/{from}/{to}  inclusive range, `<key>:<len>:<value>\n` records
//! PUT    /v1/kv/{key}        store the request body
//! DELETE /v1/kv/{key}        200 if it existed, else 404
//! ```
//!
//! axum only frames requests; matching happens in [`Router`], whose rules
//! are tried in the order above.

mod handlers;
mod request;
mod response;
mod router;
mod server;

pub use handlers::{build_router, AppState};
pub use request::Request;
pub use response::Response;
pub use router::{Handler, Params, Pattern, Router};
pub use server::HttpServer;
