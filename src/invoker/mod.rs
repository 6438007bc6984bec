//! # Resilient Invoker
//!
//! Wraps one [`ExternalApi`](crate::transport::ExternalApi) with a response
//! cache, bounded retries, and cooperative rate limiting.
//!
//! Per call:
//!
//! 1. validate the request and derive its [`CacheKey`](crate::cache::CacheKey);
//! 2. return a cache hit immediately (no attempts, zero usage);
//! 3. otherwise wait out any shared throttle deadline, then attempt the call
//!    under the per-attempt timeout;
//! 4. success is accounted, written to the cache and returned; throttled,
//!    transient and timed-out attempts go to [`RetryPolicy`]; fatal outcomes
//!    fail at once.

mod builder;
mod core;
mod policy;

pub use builder::InvokerBuilder;
pub use self::core::ResilientInvoker;
pub use policy::{Decision, RetryPolicy};
