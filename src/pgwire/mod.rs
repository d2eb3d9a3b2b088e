//! Postgres Wire Front End
//!
//! Speaks enough of the v3 protocol for `psql` and standard drivers using the
//! simple query flow. The store appears as a single two-column `text` table
//! named `kv`.
//!
//! ## Module Structure
//!
//! - `protocol` - message framing and encoding
//! - `query` - parser for the supported SQL statements

pub mod protocol;
pub mod query;

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bytes::BytesMut;

use crate::command::Outcome;
use crate::engine::Engine;
use crate::error::{HurmaError, Result};
use crate::network::{Connection, FrontEnd};

use protocol::{
    read_message, read_startup, sqlstate, BackendMessage, FrontendMessage, StartupRequest,
    PROTOCOL_VERSION_3,
};
use query::{Projection, Statement};

/// Values reported in `ParameterStatus` after authentication
const SERVER_PARAMETERS: &[(&str, &str)] = &[
    ("server_version", "14.0 (HurmaDB)"),
    ("server_encoding", "UTF8"),
    ("client_encoding", "UTF8"),
    ("DateStyle", "ISO, MDY"),
    ("integer_datetimes", "on"),
    ("standard_conforming_strings", "on"),
];

/// SSL/GSS refusals accepted before the real startup packet
const MAX_NEGOTIATIONS: usize = 4;

/// Serves the `kv` table over the Postgres protocol
pub struct PgFrontEnd {
    engine: Arc<Engine>,
    max_message_size: usize,
    next_process_id: AtomicI32,
}

impl PgFrontEnd {
    pub fn new(engine: Arc<Engine>) -> Self {
        // A quoted value may double in size, plus room for the statement
        let max_message_size = engine
            .config()
            .max_value_size
            .saturating_mul(2)
            .saturating_add(64 * 1024);
        Self {
            engine,
            max_message_size,
            next_process_id: AtomicI32::new(1),
        }
    }

    /// Run the startup exchange; `false` means close without serving
    fn handshake(&self, conn: &mut Connection) -> Result<bool> {
        for _ in 0..=MAX_NEGOTIATIONS {
            let request = match read_startup(conn.reader())? {
                Some(request) => request,
                None => return Ok(false),
            };

            match request {
                StartupRequest::Ssl | StartupRequest::GssEnc => {
                    conn.send(b"N")?;
                }
                StartupRequest::Cancel => {
                    tracing::debug!("Ignoring cancel request from {}", conn.peer_addr());
                    return Ok(false);
                }
                StartupRequest::Startup { version, .. } if version != PROTOCOL_VERSION_3 => {
                    let message = format!(
                        "unsupported frontend protocol {}.{}",
                        version >> 16,
                        version & 0xffff
                    );
                    let mut out = BytesMut::new();
                    BackendMessage::ErrorResponse {
                        code: sqlstate::FEATURE_NOT_SUPPORTED,
                        message: &message,
                    }
                    .encode(&mut out);
                    conn.send(&out)?;
                    return Ok(false);
                }
                startup @ StartupRequest::Startup { .. } => {
                    tracing::debug!(
                        "Postgres session for user {:?} database {:?} from {}",
                        startup.param("user").unwrap_or(""),
                        startup.param("database").unwrap_or(""),
                        conn.peer_addr()
                    );
                    conn.send(&self.session_greeting())?;
                    return Ok(true);
                }
            }
        }

        Err(HurmaError::Protocol(
            "too many SSL/GSS negotiation attempts".into(),
        ))
    }

    fn session_greeting(&self) -> BytesMut {
        let mut out = BytesMut::new();
        BackendMessage::AuthenticationOk.encode(&mut out);
        for &(name, value) in SERVER_PARAMETERS {
            BackendMessage::ParameterStatus { name, value }.encode(&mut out);
        }
        BackendMessage::BackendKeyData {
            process_id: self.next_process_id.fetch_add(1, Ordering::Relaxed),
            secret_key: 0,
        }
        .encode(&mut out);
        BackendMessage::ReadyForQuery.encode(&mut out);
        out
    }

    /// Parse and run a simple query, appending the replies to `out`
    ///
    /// Nothing runs unless every statement parses. Execution stops at the
    /// first failing statement.
    pub fn simple_query(&self, text: &[u8], out: &mut BytesMut) {
        let statements = match query::parse(text) {
            Ok(statements) => statements,
            Err(e) => {
                tracing::debug!("Rejected query: {}", e);
                error_response(out, sqlstate::SYNTAX_ERROR, &e.to_string());
                return;
            }
        };

        if statements.is_empty() {
            BackendMessage::EmptyQueryResponse.encode(out);
            return;
        }

        for statement in &statements {
            if let Err(e) = self.execute(statement, out) {
                let code = if e.is_validation() {
                    sqlstate::INVALID_PARAMETER_VALUE
                } else {
                    tracing::error!("Query failed: {}", e);
                    sqlstate::INTERNAL_ERROR
                };
                error_response(out, code, &e.to_string());
                return;
            }
        }
    }

    fn execute(&self, statement: &Statement, out: &mut BytesMut) -> Result<()> {
        let outcome = self.engine.execute(statement.to_command())?;

        match (statement, outcome) {
            (Statement::Select { projection, key }, Outcome::Value(value)) => {
                write_rows(
                    out,
                    *projection,
                    value.iter().map(|v| (key.as_slice(), v.as_slice())),
                );
            }
            (Statement::SelectRange { projection, .. }, Outcome::Records(records)) => {
                write_rows(
                    out,
                    *projection,
                    records.iter().map(|(k, v)| (k.as_slice(), v.as_slice())),
                );
            }
            (Statement::Insert { .. }, Outcome::Stored) => {
                BackendMessage::CommandComplete { tag: "INSERT 0 1" }.encode(out)
            }
            (Statement::Update { .. }, Outcome::Stored) => {
                BackendMessage::CommandComplete { tag: "UPDATE 1" }.encode(out)
            }
            (Statement::Delete { .. }, Outcome::Deleted(found)) => BackendMessage::CommandComplete {
                tag: if found { "DELETE 1" } else { "DELETE 0" },
            }
            .encode(out),
            (statement, outcome) => {
                return Err(HurmaError::Protocol(format!(
                    "unexpected outcome {:?} for {:?}",
                    outcome, statement
                )))
            }
        }
        Ok(())
    }
}

impl FrontEnd for PgFrontEnd {
    fn name(&self) -> &'static str {
        "Postgres"
    }

    fn serve(&self, conn: &mut Connection) -> Result<()> {
        if !self.handshake(conn)? {
            return Ok(());
        }

        // Set after an extended-protocol message until the next Sync
        let mut skipping = false;

        loop {
            let message = match read_message(conn.reader(), self.max_message_size)? {
                Some(message) => message,
                None => return Ok(()),
            };

            let mut out = BytesMut::new();
            match message {
                FrontendMessage::Query(text) => {
                    tracing::trace!("{} query: {}", conn.peer_addr(), String::from_utf8_lossy(&text));
                    skipping = false;
                    self.simple_query(&text, &mut out);
                    BackendMessage::ReadyForQuery.encode(&mut out);
                }
                FrontendMessage::Terminate => return Ok(()),
                FrontendMessage::Sync => {
                    skipping = false;
                    BackendMessage::ReadyForQuery.encode(&mut out);
                }
                FrontendMessage::Flush => {}
                FrontendMessage::Extended(_) if skipping => {}
                FrontendMessage::Extended(tag) => {
                    skipping = true;
                    error_response(
                        &mut out,
                        sqlstate::FEATURE_NOT_SUPPORTED,
                        &format!(
                            "extended query protocol is not supported (message '{}')",
                            tag as char
                        ),
                    );
                }
                FrontendMessage::Other(tag) => {
                    error_response(
                        &mut out,
                        sqlstate::PROTOCOL_VIOLATION,
                        &format!("unexpected message type '{}'", tag as char),
                    );
                    conn.send(&out)?;
                    return Ok(());
                }
            }

            if !out.is_empty() {
                conn.send(&out)?;
            }
        }
    }
}

fn error_response(out: &mut BytesMut, code: &str, message: &str) {
    BackendMessage::ErrorResponse { code, message }.encode(out);
}

/// RowDescription, one DataRow per record, then `SELECT n`
fn write_rows<'a>(
    out: &mut BytesMut,
    projection: Projection,
    rows: impl Iterator<Item = (&'a [u8], &'a [u8])>,
) {
    BackendMessage::RowDescription {
        columns: projection.columns(),
    }
    .encode(out);

    let mut count = 0usize;
    for (key, value) in rows {
        match projection {
            Projection::Value => BackendMessage::DataRow { values: &[value] }.encode(out),
            Projection::KeyValue => BackendMessage::DataRow {
                values: &[key, value],
            }
            .encode(out),
        }
        count += 1;
    }

    let tag = format!("SELECT {}", count);
    BackendMessage::CommandComplete { tag: &tag }.encode(out);
}
