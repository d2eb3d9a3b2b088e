//! # HurmaDB
//!
//! A key-value store served over two interchangeable wire protocols:
//! - An HTTP REST API (axum on tokio)
//! - The PostgreSQL wire protocol, exposing a single `kv` table
//!
//! Both front ends share one storage engine:
//! - Write-Ahead Logging (WAL) for durability
//! - Crash recovery with partial write handling
//! - Striped per-key locks for atomic single-key mutation
//! - Ordered MemTable flushed to SSTables, merged by size-tiered compaction
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │     HTTP front end        │   │   Postgres front end      │
//! │  (router + handlers)      │   │  (port 5432 only)         │
//! └─────────────┬─────────────┘   └─────────────┬─────────────┘
//!               └───────────────┬───────────────┘
//!                               │  TCP server, termination latch
//! ┌─────────────────────────────▼───────────────────────────────┐
//! │                        Engine                               │
//! │        (validation, striped key locks, flush gate)          │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//!          ┌────────────────────┴────────────────────┐
//!          │                                         │
//!          ▼                                         ▼
//!   ┌─────────────┐                          ┌─────────────┐
//!   │     WAL     │                          │  MemTable   │
//!   │  (Append)   │                          │  (RwLock)   │
//!   └─────────────┘                          └──────┬──────┘
//!                                                   │ flush
//!                                                   ▼
//!                                           ┌─────────────┐
//!                                           │   Storage   │
//!                                           │  (SSTables) │
//!                                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod validation;
pub mod command;
pub mod codec;
pub mod engine;

pub mod network;
pub mod http;
pub mod pgwire;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{HurmaError, Result, ValidationError};
pub use config::Config;
pub use engine::Engine;
pub use http::HttpServer;
pub use network::{Server, TerminationLatch};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of HurmaDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
