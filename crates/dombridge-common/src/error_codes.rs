//! Semantic error codes for JSON-RPC broker errors.
//!
//! Codes follow the JSON-RPC 2.0 specification:
//! - -32700 to -32600: reserved protocol errors
//! - -32000 to -32099: server errors (we use -32001 to -32020 for broker errors)

// Broker/routing errors
pub const UNAVAILABLE: i32 = -32001;
pub const REQUEST_TIMEOUT: i32 = -32002;
pub const CONNECTION_LOST: i32 = -32003;
pub const EXECUTOR_ERROR: i32 = -32004;
pub const UNSUPPORTED_ACTION: i32 = -32005;
pub const INVALID_PARAMETERS: i32 = -32006;

// Daemon errors
pub const DAEMON_ERROR: i32 = -32010;
pub const STORE_ERROR: i32 = -32011;

// Generic fallback
pub const GENERIC_ERROR: i32 = -32000;

/// Error category for programmatic handling by caller adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input parameters or unknown action
    InvalidInput,
    /// No executor connection available right now
    Unavailable,
    /// Operation timed out or the connection dropped mid-flight
    Transient,
    /// The executor peer reported a failure
    Executor,
    /// Internal broker error
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Executor => "executor",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns whether an error code represents a condition that a caller
/// adapter may reasonably retry. The broker itself never retries.
pub fn is_retryable(code: i32) -> bool {
    matches!(code, UNAVAILABLE | REQUEST_TIMEOUT | CONNECTION_LOST)
}

/// Returns the error category for a given error code.
pub fn category_for_code(code: i32) -> ErrorCategory {
    match code {
        UNSUPPORTED_ACTION | INVALID_PARAMETERS => ErrorCategory::InvalidInput,
        UNAVAILABLE => ErrorCategory::Unavailable,
        REQUEST_TIMEOUT | CONNECTION_LOST => ErrorCategory::Transient,
        EXECUTOR_ERROR => ErrorCategory::Executor,
        _ => ErrorCategory::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_codes() {
        assert!(is_retryable(UNAVAILABLE));
        assert!(is_retryable(REQUEST_TIMEOUT));
        assert!(is_retryable(CONNECTION_LOST));
        assert!(!is_retryable(UNSUPPORTED_ACTION));
        assert!(!is_retryable(EXECUTOR_ERROR));
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            category_for_code(UNSUPPORTED_ACTION),
            ErrorCategory::InvalidInput
        );
        assert_eq!(category_for_code(UNAVAILABLE), ErrorCategory::Unavailable);
        assert_eq!(category_for_code(REQUEST_TIMEOUT), ErrorCategory::Transient);
        assert_eq!(category_for_code(EXECUTOR_ERROR), ErrorCategory::Executor);
        assert_eq!(category_for_code(-32099), ErrorCategory::Internal);
    }

    #[test]
    fn test_category_as_str() {
        assert_eq!(ErrorCategory::Transient.as_str(), "transient");
        assert_eq!(ErrorCategory::Executor.to_string(), "executor");
    }
}
