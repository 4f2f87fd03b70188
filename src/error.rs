//! Error types for the caching layer

use thiserror::Error;

/// Result type alias for the caching layer
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by dispatch and cache-store operations
#[derive(Error, Debug)]
pub enum Error {
    /// No procedure registered under the requested method name
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Cache store failure. Read failures are handled fail-open by the
    /// interceptor; write failures propagate through this variant.
    #[error("Cache store error: {0}")]
    Store(String),

    /// The cache store does not support tag-based invalidation
    #[error("Cache store does not support tags")]
    TaggingUnsupported,

    /// JSON-RPC error
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        /// Error code
        code: i32,
        /// Error message
        message: String,
        /// Optional data
        data: Option<serde_json::Value>,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a JSON-RPC error
    pub fn json_rpc(code: i32, message: impl Into<String>) -> Self {
        Self::JsonRpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::JsonRpc { code, .. } => *code,
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::MethodNotFound(_) => rpc_codes::METHOD_NOT_FOUND,
            Self::Store(_) | Self::TaggingUnsupported => rpc_codes::SERVER_ERROR_START,
            Self::Internal(_) => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error range start
    pub const SERVER_ERROR_START: i32 = -32000;
    /// Server error range end
    pub const SERVER_ERROR_END: i32 = -32099;
}
