//! DynamoDB request executor backed by the AWS SDK.
//!
//! ```ignore
//! let executor = AwsExecutor::new(ClientConfig::new().with_region("eu-west-1"))?;
//! dmap::set_default_executor(Arc::new(executor));
//! ```

pub mod convert;
pub mod error;
pub mod executor;

pub use error::{AwsError, Result};
pub use executor::AwsExecutor;
