//! Range codec
//!
//! Serialization of a range result into a single response body.
//!
//! ## Format
//! ```text
//! <key>:<value-length>:<value-bytes>\n
//! ... repeated for each record, ascending by key ...
//! ```
//!
//! Keys never contain `:` (see [`crate::validation`]) and values are
//! length-delimited, so values may hold any bytes, `:` and newlines
//! included, without escaping. An empty range encodes to zero bytes.

use crate::command::Record;
use crate::error::{HurmaError, Result};

/// Encode records into one body
pub fn encode_range(records: &[Record]) -> Vec<u8> {
    let capacity = records
        .iter()
        .map(|(k, v)| k.len() + v.len() + 24)
        .sum();
    let mut out = Vec::with_capacity(capacity);

    for (key, value) in records {
        out.extend_from_slice(key);
        out.push(b':');
        out.extend_from_slice(value.len().to_string().as_bytes());
        out.push(b':');
        out.extend_from_slice(value);
        out.push(b'\n');
    }

    out
}

/// Decode a body produced by [`encode_range`]
pub fn decode_range(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let key_end = find_colon(bytes, pos, "key")?;
        let key = bytes[pos..key_end].to_vec();

        let len_start = key_end + 1;
        let len_end = find_colon(bytes, len_start, "value length")?;
        let len: usize = std::str::from_utf8(&bytes[len_start..len_end])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                HurmaError::Protocol(format!("range body: bad value length at offset {}", len_start))
            })?;

        let value_start = len_end + 1;
        let value_end = match value_start.checked_add(len) {
            Some(end) if end < bytes.len() && bytes[end] == b'\n' => end,
            _ => {
                return Err(HurmaError::Protocol(format!(
                    "range body: record at offset {} is truncated",
                    pos
                )))
            }
        };

        records.push((key, bytes[value_start..value_end].to_vec()));
        pos = value_end + 1;
    }

    Ok(records)
}

fn find_colon(bytes: &[u8], from: usize, what: &str) -> Result<usize> {
    bytes[from..]
        .iter()
        .position(|&b| b == b':')
        .map(|i| from + i)
        .ok_or_else(|| {
            HurmaError::Protocol(format!("range body: missing {} terminator at offset {}", what, from))
        })
}
