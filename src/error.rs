//! Error types for the config accessor
//!
//! Provides layered error handling using thiserror. Every wrapper keeps its
//! cause reachable through `std::error::Error::source`.

use std::fmt;
use std::num::{ParseFloatError, ParseIntError};

use reqwest::StatusCode;
use thiserror::Error;

// == Store Error ==
/// Failure talking to the key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The configured address cannot be turned into a base URL
    #[error("invalid store address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The HTTP client could not be built
    #[error("cannot build http client")]
    Client(#[source] reqwest::Error),

    /// Transport-level failure (connect, timeout, body read)
    #[error("request to store failed")]
    Request(#[from] reqwest::Error),

    /// The store answered with an unexpected status code
    #[error("store returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The response body is not a KV pair listing
    #[error("cannot decode store response")]
    Decode(#[from] serde_json::Error),

    /// The pair value is not valid base64
    #[error("cannot decode value of key `{key}`")]
    Value {
        key: String,
        #[source]
        source: base64::DecodeError,
    },
}

// == Duration Parse Error ==
/// Failure parsing a duration string such as `"1h30m"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration `{0}`")]
    Invalid(String),

    #[error("missing unit in duration `{0}`")]
    MissingUnit(String),

    #[error("unknown unit `{unit}` in duration `{input}`")]
    UnknownUnit { unit: String, input: String },

    #[error("duration `{0}` out of range")]
    Overflow(String),
}

// == Value Type ==
/// Target type of a coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Float,
    Duration,
    Json,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Duration => "duration",
            ValueType::Json => "json",
        };
        f.write_str(name)
    }
}

// == Parse Cause ==
/// Underlying parser failure.
#[derive(Error, Debug)]
pub enum ParseCause {
    #[error(transparent)]
    Int(#[from] ParseIntError),

    #[error(transparent)]
    Float(#[from] ParseFloatError),

    #[error(transparent)]
    Duration(#[from] DurationParseError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// == Parse Value Error ==
/// A raw store value could not be coerced to the requested type.
///
/// Names the key, never the raw value.
#[derive(Error, Debug)]
#[error("parse {target} from consul value of key `{key}`")]
pub struct ParseValueError {
    pub key: String,
    pub target: ValueType,
    #[source]
    pub source: ParseCause,
}

// == Accessor Error ==
/// Unified error type for the accessor facade.
#[derive(Error, Debug)]
pub enum AccessorError {
    /// Communication or lookup failure against the store
    #[error("get value from consul for key `{key}`")]
    Fetch {
        key: String,
        #[source]
        source: StoreError,
    },

    /// The value was fetched but could not be coerced
    #[error("get {} value from consul for key `{key}`", .source.target)]
    Parse {
        key: String,
        #[source]
        source: ParseValueError,
    },

    /// The store client or cleanup task could not be set up
    #[error("cannot create consul accessor: {reason}")]
    Construction {
        reason: String,
        #[source]
        source: Option<StoreError>,
    },
}

impl AccessorError {
    /// Returns true for store communication failures.
    pub fn is_fetch(&self) -> bool {
        matches!(self, AccessorError::Fetch { .. })
    }

    /// Returns true for coercion failures, including absent keys read as numbers.
    pub fn is_parse(&self) -> bool {
        matches!(self, AccessorError::Parse { .. })
    }

    /// Key the failing read was for, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            AccessorError::Fetch { key, .. } | AccessorError::Parse { key, .. } => Some(key),
            AccessorError::Construction { .. } => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the accessor.
pub type Result<T> = std::result::Result<T, AccessorError>;
