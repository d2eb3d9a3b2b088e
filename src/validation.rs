//! Key and value acceptance rules
//!
//! Keys are non-empty runs of ASCII letters, digits, `_` and `-`, the same
//! alphabet the HTTP router accepts in a key segment.

use crate::error::ValidationError;

/// True for bytes allowed in a key
pub fn is_key_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

/// Check a key against the alphabet and length limit
pub fn validate_key(key: &[u8], max_len: usize) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::EmptyKey);
    }
    if key.len() > max_len {
        return Err(ValidationError::KeyTooLong {
            len: key.len(),
            max: max_len,
        });
    }
    if let Some(position) = key.iter().position(|&b| !is_key_byte(b)) {
        return Err(ValidationError::InvalidKeyByte {
            byte: key[position],
            position,
        });
    }
    Ok(())
}

/// Check a value against the size limit
pub fn validate_value(value: &[u8], max_len: usize) -> Result<(), ValidationError> {
    if value.len() > max_len {
        return Err(ValidationError::ValueTooLarge {
            len: value.len(),
            max: max_len,
        });
    }
    Ok(())
}
