//! Postgres v3 wire messages
//!
//! Frontend framing: the startup packet is `Len(4) | Code(4) | Body`, every
//! later message is `Type(1) | Len(4) | Body`. `Len` counts itself but not
//! the type byte. All integers are big-endian.

use std::io::{self, BufRead, Read};

use bytes::{BufMut, BytesMut};

use crate::error::{HurmaError, Result};

/// Protocol 3.0
pub const PROTOCOL_VERSION_3: i32 = 196_608;
pub const SSL_REQUEST_CODE: i32 = 80_877_103;
pub const GSSENC_REQUEST_CODE: i32 = 80_877_104;
pub const CANCEL_REQUEST_CODE: i32 = 80_877_102;

/// OID of the `text` type
pub const TEXT_OID: i32 = 25;

/// Upper bound on the startup packet
pub const MAX_STARTUP_SIZE: usize = 10_000;

/// SQLSTATE codes used in error responses
pub mod sqlstate {
    pub const SYNTAX_ERROR: &str = "42601";
    pub const INVALID_PARAMETER_VALUE: &str = "22023";
    pub const FEATURE_NOT_SUPPORTED: &str = "0A000";
    pub const PROTOCOL_VIOLATION: &str = "08P01";
    pub const INTERNAL_ERROR: &str = "XX000";
}

/// First packet of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupRequest {
    Ssl,
    GssEnc,
    Cancel,
    Startup {
        version: i32,
        params: Vec<(String, String)>,
    },
}

impl StartupRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        match self {
            StartupRequest::Startup { params, .. } => params
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

/// Messages a client sends after startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    /// Simple query text, without the trailing NUL
    Query(Vec<u8>),
    Terminate,
    Sync,
    Flush,
    /// Parse, Bind, Describe, Execute or Close
    Extended(u8),
    Other(u8),
}

/// Read the startup packet; `Ok(None)` on a clean close
pub fn read_startup(reader: &mut impl BufRead) -> Result<Option<StartupRequest>> {
    if reader.fill_buf()?.is_empty() {
        return Ok(None);
    }

    let len = read_i32(reader)?;
    if len < 8 || len as usize > MAX_STARTUP_SIZE {
        return Err(HurmaError::Protocol(format!(
            "invalid startup packet length {}",
            len
        )));
    }

    let mut body = vec![0u8; len as usize - 4];
    reader.read_exact(&mut body)?;
    let code = i32::from_be_bytes([body[0], body[1], body[2], body[3]]);

    let request = match code {
        SSL_REQUEST_CODE => StartupRequest::Ssl,
        GSSENC_REQUEST_CODE => StartupRequest::GssEnc,
        CANCEL_REQUEST_CODE => StartupRequest::Cancel,
        version => StartupRequest::Startup {
            version,
            params: parse_params(&body[4..])?,
        },
    };
    Ok(Some(request))
}

/// `name\0value\0 ... \0`
fn parse_params(mut body: &[u8]) -> Result<Vec<(String, String)>> {
    let mut params = Vec::new();
    loop {
        let name = take_cstr(&mut body)?;
        if name.is_empty() {
            return Ok(params);
        }
        let value = take_cstr(&mut body)?;
        params.push((name, value));
    }
}

fn take_cstr(body: &mut &[u8]) -> Result<String> {
    // A missing final terminator is tolerated
    if body.is_empty() {
        return Ok(String::new());
    }
    let end = body
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| HurmaError::Protocol("unterminated string in startup packet".into()))?;
    let s = String::from_utf8_lossy(&body[..end]).into_owned();
    *body = &body[end + 1..];
    Ok(s)
}

/// Read one typed message; `Ok(None)` on a clean close
pub fn read_message(reader: &mut impl BufRead, max_len: usize) -> Result<Option<FrontendMessage>> {
    if reader.fill_buf()?.is_empty() {
        return Ok(None);
    }

    let mut tag = [0u8; 1];
    reader.read_exact(&mut tag)?;
    let tag = tag[0];

    let len = read_i32(reader)?;
    if len < 4 || (len as usize - 4) > max_len {
        return Err(HurmaError::Protocol(format!(
            "invalid length {} for message '{}'",
            len,
            tag as char
        )));
    }

    let mut body = vec![0u8; len as usize - 4];
    reader.read_exact(&mut body)?;

    let message = match tag {
        b'Q' => {
            if body.last() == Some(&0) {
                body.pop();
            }
            FrontendMessage::Query(body)
        }
        b'X' => FrontendMessage::Terminate,
        b'S' => FrontendMessage::Sync,
        b'H' => FrontendMessage::Flush,
        b'P' | b'B' | b'D' | b'E' | b'C' => FrontendMessage::Extended(tag),
        other => FrontendMessage::Other(other),
    };
    Ok(Some(message))
}

fn read_i32(reader: &mut impl Read) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Messages the server sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage<'a> {
    AuthenticationOk,
    ParameterStatus { name: &'a str, value: &'a str },
    BackendKeyData { process_id: i32, secret_key: i32 },
    /// Always reports the idle transaction status
    ReadyForQuery,
    /// Text columns with the given names
    RowDescription { columns: &'a [&'a str] },
    DataRow { values: &'a [&'a [u8]] },
    CommandComplete { tag: &'a str },
    EmptyQueryResponse,
    ErrorResponse { code: &'a str, message: &'a str },
}

impl BackendMessage<'_> {
    /// Append the framed message to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            BackendMessage::AuthenticationOk => frame(buf, b'R', |b| b.put_i32(0)),
            BackendMessage::ParameterStatus { name, value } => frame(buf, b'S', |b| {
                put_cstr(b, name.as_bytes());
                put_cstr(b, value.as_bytes());
            }),
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => frame(buf, b'K', |b| {
                b.put_i32(*process_id);
                b.put_i32(*secret_key);
            }),
            BackendMessage::ReadyForQuery => frame(buf, b'Z', |b| b.put_u8(b'I')),
            BackendMessage::RowDescription { columns } => frame(buf, b'T', |b| {
                b.put_i16(columns.len() as i16);
                for name in columns.iter() {
                    put_cstr(b, name.as_bytes());
                    b.put_i32(0); // table OID
                    b.put_i16(0); // column number
                    b.put_i32(TEXT_OID);
                    b.put_i16(-1); // variable length
                    b.put_i32(-1); // type modifier
                    b.put_i16(0); // text format
                }
            }),
            BackendMessage::DataRow { values } => frame(buf, b'D', |b| {
                b.put_i16(values.len() as i16);
                for value in values.iter() {
                    b.put_i32(value.len() as i32);
                    b.put_slice(value);
                }
            }),
            BackendMessage::CommandComplete { tag } => {
                frame(buf, b'C', |b| put_cstr(b, tag.as_bytes()))
            }
            BackendMessage::EmptyQueryResponse => frame(buf, b'I', |_| {}),
            BackendMessage::ErrorResponse { code, message } => frame(buf, b'E', |b| {
                b.put_u8(b'S');
                put_cstr(b, b"ERROR");
                b.put_u8(b'V');
                put_cstr(b, b"ERROR");
                b.put_u8(b'C');
                put_cstr(b, code.as_bytes());
                b.put_u8(b'M');
                put_cstr(b, message.as_bytes());
                b.put_u8(0);
            }),
        }
    }
}

fn frame(buf: &mut BytesMut, tag: u8, body: impl FnOnce(&mut BytesMut)) {
    buf.put_u8(tag);
    let len_at = buf.len();
    buf.put_i32(0);
    body(buf);
    let len = (buf.len() - len_at) as i32;
    buf[len_at..len_at + 4].copy_from_slice(&len.to_be_bytes());
}

/// NUL-terminated string; interior NULs are dropped
fn put_cstr(buf: &mut BytesMut, s: &[u8]) {
    buf.extend(s.iter().copied().filter(|&b| b != 0));
    buf.put_u8(0);
}
