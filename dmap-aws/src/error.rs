use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use dmap_core::Fault;
use std::error::Error as StdError;
use thiserror::Error;

/// Failures while setting up an executor. Request failures are reported as
/// [`Fault`]s instead.
#[derive(Error, Debug)]
pub enum AwsError {
    #[error("Invalid client configuration: {0}")]
    Config(String),

    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Reduces an SDK error to the store's error code and message.
///
/// Timeouts become `RequestTimeout`. Errors without a service code (bad
/// requests built locally, connection failures) become `ClientError`.
pub fn fault_from_sdk<E, R>(err: SdkError<E, R>) -> Fault
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let timed_out = match &err {
        SdkError::TimeoutError(_) => true,
        SdkError::DispatchFailure(failure) => failure.is_timeout(),
        _ => false,
    };
    if timed_out {
        return Fault::new("RequestTimeout", DisplayErrorContext(&err).to_string());
    }

    match err.code() {
        Some(code) => {
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            Fault::new(code, message)
        }
        None => Fault::new("ClientError", DisplayErrorContext(&err).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::operation::get_item::GetItemError;

    #[test]
    fn test_timeout_maps_to_request_timeout() {
        let err: SdkError<GetItemError, ()> = SdkError::timeout_error("deadline elapsed");
        let fault = fault_from_sdk(err);
        assert_eq!(fault.code, "RequestTimeout");
    }

    #[test]
    fn test_local_failure_has_client_code() {
        let err: SdkError<GetItemError, ()> = SdkError::construction_failure("missing table name");
        let fault = fault_from_sdk(err);
        assert_eq!(fault.code, "ClientError");
        assert!(fault.message.contains("missing table name"));
    }

    #[test]
    fn test_config_error_text() {
        let err = AwsError::Config("region must not be empty".into());
        assert_eq!(err.to_string(), "Invalid client configuration: region must not be empty");
    }
}
