//! Engine commands
//!
//! The four storage operations every front end reduces its requests to,
//! and their results.

/// A (key, value) pair
pub type Record = (Vec<u8>, Vec<u8>);

/// A decoded storage command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: Vec<u8> },

    /// Create or overwrite a key
    Set { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Del { key: Vec<u8> },

    /// All records with `from <= key <= to`
    GetRange { from: Vec<u8>, to: Vec<u8> },
}

/// Result of a successfully executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `Get`: the value, or `None` if the key has no record
    Value(Option<Vec<u8>>),

    /// `Set` committed
    Stored,

    /// `Del`: whether a record existed
    Deleted(bool),

    /// `GetRange`: matching records in ascending key order
    Records(Vec<Record>),
}
