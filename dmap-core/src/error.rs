use std::fmt;
use thiserror::Error;
use tracing::warn;

/// A fault reported by a request executor.
///
/// This is the only error shape that crosses the executor boundary. Executors
/// reduce whatever their transport raises to a code plus a message, and
/// [`translate`] turns it into an [`Error`] before it reaches a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: String,
    pub message: String,
}

impl Fault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Fault {}

fn condition_suffix(condition: &Option<String>) -> String {
    match condition {
        Some(c) => format!(": {}", c),
        None => String::new(),
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Table '{table}' not found")]
    TableNotFound {
        table: String,
        #[source]
        source: Option<Fault>,
    },

    #[error("Item with key {key} not found")]
    ItemNotFound { key: String },

    #[error("Conditional check failed{}", condition_suffix(.condition))]
    ConditionalCheckFailed {
        condition: Option<String>,
        #[source]
        source: Option<Fault>,
    },

    #[error("{message}")]
    ProvisionedThroughputExceeded {
        message: String,
        #[source]
        source: Option<Fault>,
    },

    #[error("{message}")]
    ItemCollectionSizeLimit {
        message: String,
        #[source]
        source: Option<Fault>,
    },

    #[error("{message}")]
    TransactionConflict {
        message: String,
        #[source]
        source: Option<Fault>,
    },

    #[error("{message}")]
    RequestTimeout {
        message: String,
        #[source]
        source: Option<Fault>,
    },

    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
        value: Option<String>,
        #[source]
        source: Option<Fault>,
    },

    #[error("{message}")]
    Serialization {
        message: String,
        field: Option<String>,
    },

    #[error("DynamoDB error ({code}): {message}")]
    Service {
        code: String,
        message: String,
        #[source]
        source: Fault,
    },

    #[error("No items found for this query")]
    NoResults,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    InvalidCondition(String),

    #[error("{0}")]
    Definition(String),

    #[error("No request executor configured; call set_default_executor or using_executor first")]
    ExecutorNotConfigured,
}

impl Error {
    /// Returns a stable error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            Error::TableNotFound { .. } => "TABLE_NOT_FOUND",
            Error::ItemNotFound { .. } => "ITEM_NOT_FOUND",
            Error::ConditionalCheckFailed { .. } => "CONDITIONAL_CHECK_FAILED",
            Error::ProvisionedThroughputExceeded { .. } => "PROVISIONED_THROUGHPUT_EXCEEDED",
            Error::ItemCollectionSizeLimit { .. } => "ITEM_COLLECTION_SIZE_LIMIT",
            Error::TransactionConflict { .. } => "TRANSACTION_CONFLICT",
            Error::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            Error::Validation { .. } => "VALIDATION",
            Error::Serialization { .. } => "SERIALIZATION",
            Error::Service { .. } => "SERVICE_ERROR",
            Error::NoResults => "NO_RESULTS",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::InvalidCondition(_) => "INVALID_CONDITION",
            Error::Definition(_) => "DEFINITION",
            Error::ExecutorNotConfigured => "EXECUTOR_NOT_CONFIGURED",
        }
    }

    /// Returns true if the same request may succeed when issued again later.
    ///
    /// Nothing in this crate retries; the flag is for callers and executors
    /// that implement their own policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProvisionedThroughputExceeded { .. }
                | Error::TransactionConflict { .. }
                | Error::RequestTimeout { .. }
        )
    }

    /// The human readable message, identical to the `Display` output.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// The executor fault this error was translated from, if any.
    pub fn original_error(&self) -> Option<&Fault> {
        match self {
            Error::TableNotFound { source, .. }
            | Error::ConditionalCheckFailed { source, .. }
            | Error::ProvisionedThroughputExceeded { source, .. }
            | Error::ItemCollectionSizeLimit { source, .. }
            | Error::TransactionConflict { source, .. }
            | Error::RequestTimeout { source, .. }
            | Error::Validation { source, .. } => source.as_ref(),
            Error::Service { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Local validation failure attributed to one field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Error {
        Error::Validation {
            message: message.into(),
            field: Some(field.into()),
            value: None,
            source: None,
        }
    }

    /// Local serialization failure, optionally attributed to one field.
    pub fn serialization(field: Option<&str>, message: impl Into<String>) -> Error {
        Error::Serialization {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps an executor fault onto the error taxonomy.
///
/// Unrecognised codes become [`Error::Service`], which keeps both the code and
/// the message in its text and the fault itself as the source.
pub fn translate(fault: Fault, table: Option<&str>) -> Error {
    let message = fault.message.clone();
    match fault.code.as_str() {
        "ResourceNotFoundException" => Error::TableNotFound {
            table: table.unwrap_or("unknown").to_string(),
            source: Some(fault),
        },
        "ConditionalCheckFailedException" => Error::ConditionalCheckFailed {
            condition: None,
            source: Some(fault),
        },
        "ProvisionedThroughputExceededException" | "ThrottlingException" | "RequestLimitExceeded" => {
            Error::ProvisionedThroughputExceeded {
                message,
                source: Some(fault),
            }
        }
        "ValidationException" | "SerializationException" => Error::Validation {
            message,
            field: None,
            value: None,
            source: Some(fault),
        },
        "ItemCollectionSizeLimitExceededException" => Error::ItemCollectionSizeLimit {
            message,
            source: Some(fault),
        },
        "TransactionConflictException" => Error::TransactionConflict {
            message,
            source: Some(fault),
        },
        "RequestTimeout" | "RequestTimeoutException" => Error::RequestTimeout {
            message,
            source: Some(fault),
        },
        _ => Error::Service {
            code: fault.code.clone(),
            message,
            source: fault,
        },
    }
}

/// Runs one executor call and translates its fault, if any.
///
/// Every request the library issues goes through here.
pub fn run<T>(table: &str, call: impl FnOnce() -> std::result::Result<T, Fault>) -> Result<T> {
    call().map_err(|fault| {
        warn!(table = table, code = %fault.code, "request failed");
        translate(fault, Some(table))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(code: &str) -> Fault {
        Fault::new(code, "boom")
    }

    #[test]
    fn test_translate_table_not_found() {
        let err = translate(fault("ResourceNotFoundException"), Some("users"));
        assert!(matches!(err, Error::TableNotFound { ref table, .. } if table == "users"));
        assert_eq!(err.to_string(), "Table 'users' not found");
        assert_eq!(err.original_error().map(|f| f.code.as_str()), Some("ResourceNotFoundException"));
    }

    #[test]
    fn test_translate_table_not_found_without_table() {
        let err = translate(fault("ResourceNotFoundException"), None);
        assert_eq!(err.to_string(), "Table 'unknown' not found");
    }

    #[test]
    fn test_translate_conditional_check() {
        let err = translate(fault("ConditionalCheckFailedException"), Some("t"));
        assert!(matches!(err, Error::ConditionalCheckFailed { condition: None, .. }));
        assert_eq!(err.to_string(), "Conditional check failed");
    }

    #[test]
    fn test_conditional_check_with_condition_text() {
        let err = Error::ConditionalCheckFailed {
            condition: Some("attribute_not_exists(#n0)".to_string()),
            source: None,
        };
        assert_eq!(err.to_string(), "Conditional check failed: attribute_not_exists(#n0)");
    }

    #[test]
    fn test_translate_throttling_codes() {
        for code in [
            "ProvisionedThroughputExceededException",
            "ThrottlingException",
            "RequestLimitExceeded",
        ] {
            let err = translate(fault(code), Some("t"));
            assert!(matches!(err, Error::ProvisionedThroughputExceeded { .. }), "{}", code);
            assert_eq!(err.message(), "boom");
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_translate_validation_codes() {
        for code in ["ValidationException", "SerializationException"] {
            let err = translate(fault(code), Some("t"));
            assert!(matches!(err, Error::Validation { field: None, .. }), "{}", code);
        }
    }

    #[test]
    fn test_translate_remaining_codes() {
        assert!(matches!(
            translate(fault("ItemCollectionSizeLimitExceededException"), None),
            Error::ItemCollectionSizeLimit { .. }
        ));
        assert!(matches!(
            translate(fault("TransactionConflictException"), None),
            Error::TransactionConflict { .. }
        ));
        assert!(matches!(translate(fault("RequestTimeout"), None), Error::RequestTimeout { .. }));
        assert!(matches!(
            translate(fault("RequestTimeoutException"), None),
            Error::RequestTimeout { .. }
        ));
    }

    #[test]
    fn test_translate_unknown_code() {
        let err = translate(Fault::new("InternalServerError", "it broke"), Some("t"));
        assert_eq!(err.to_string(), "DynamoDB error (InternalServerError): it broke");
        assert_eq!(err.code(), "SERVICE_ERROR");
        assert_eq!(err.original_error(), Some(&Fault::new("InternalServerError", "it broke")));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_run_passes_success_through() {
        let value = run("t", || Ok::<_, Fault>(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_run_translates_fault() {
        let err = run::<()>("orders", || Err(fault("ResourceNotFoundException"))).unwrap_err();
        assert_eq!(err.to_string(), "Table 'orders' not found");
    }

    #[test]
    fn test_local_errors_have_no_original() {
        let err = Error::validation("age", "Validation failed for field 'age': not a number");
        assert!(err.original_error().is_none());
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "VALIDATION");
    }
}
