//! Error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while normalizing or picking metadata field values.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ValidationError {
    /// A mandatory field is absent or empty
    #[error("metadata field '{field}' is required")]
    Missing { field: String },
    /// A field holds a value of the wrong kind
    #[error("metadata field '{field}' must be {expected}")]
    WrongKind {
        field: String,
        expected: &'static str,
    },
    /// A field holds malformed hex
    #[error("metadata field '{field}' is not valid hex: {reason}")]
    BadHex { field: String, reason: String },
    /// A numeric field could not be converted
    #[error("metadata field '{field}' must be {expected}, got '{value}'")]
    BadNumber {
        field: String,
        expected: &'static str,
        value: String,
    },
    /// A byte field has the wrong length for its schema type
    #[error("metadata field '{field}' must be exactly {expected} bytes, got {actual}")]
    BadLength {
        field: String,
        expected: usize,
        actual: usize,
    },
    /// A raw collection entry is malformed; `location` names the key or index
    #[error("metadata {location}: {reason}")]
    BadEntry { location: String, reason: String },
    /// A metadata collection or schema has the wrong top-level shape
    #[error("{0}")]
    BadShape(String),
}

/// Errors raised while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML
    #[error("failed to parse config file {}: {source}", path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// A required value is absent
    #[error("{field} is required")]
    Missing { field: &'static str },
    /// The token type is not one of the supported variants
    #[error("invalid token_type '{value}': expected 'nft' or 'fungible'")]
    InvalidTokenType { value: String },
    /// A value could not be read as a non-negative integer
    #[error("{field} must be a non-negative integer, got '{value}'")]
    InvalidInteger { field: &'static str, value: String },
    /// A value could not be read as a boolean
    #[error("{field} must be a boolean, got '{value}'")]
    InvalidBool { field: &'static str, value: String },
    /// A value could not be read as a string
    #[error("{field} must be a string")]
    InvalidString { field: &'static str },
    /// An integer is outside the range allowed for the field
    #[error("{field} must be <= {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: String,
        max: u64,
    },
    /// A JSON-bearing value failed to parse
    #[error("failed to parse {field} as JSON: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// A JSON-bearing value parsed but its content is invalid
    #[error("invalid {field}: {source}")]
    Metadata {
        field: &'static str,
        #[source]
        source: ValidationError,
    },
    /// The signing secret could not be decoded
    #[error("wif is not a valid WIF-encoded key: {reason}")]
    InvalidWif { reason: String },
}

/// Errors raised while selecting an action.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DispatchError {
    /// More than one action selector was passed
    #[error("only one action may be requested at a time, got: {}", actions.join(", "))]
    ConflictingActions { actions: Vec<&'static str> },
}

/// Errors raised talking to the ledger node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Transport-level failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-success HTTP status
    #[error("node returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The response did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Top-level error for a single deploy invocation.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("transaction builder failed: {0:#}")]
    Builder(anyhow::Error),
    #[error("broadcast failed: {0}")]
    Node(#[from] NodeError),
}
