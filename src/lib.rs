//! Rate-limit aware client for the Discord REST API.
//!
//! [`Client`] turns a logical operation into an authenticated, paced and
//! retried HTTP exchange and reports failures as a classified [`Error`].
//! All clones of a client share one [`BucketTable`].

mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod snowflake;
pub mod types;

pub use config::{Config, RetryPolicy};
pub use context::{CancelHandle, Context};
pub use error::{ApiError, Error, ErrorInfo, ErrorKind, Result};
pub use http::{Client, Reply, Request, Route};
pub use ratelimit::{BucketKey, BucketTable, Clock, ManualClock};
pub use snowflake::Snowflake;
