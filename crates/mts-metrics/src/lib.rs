//! Model Test Service — metric engine facade
//!
//! A uniform, request-batched client over the external analytics engine, a
//! first-class pending-operation model, and a short-TTL cache that absorbs
//! the reference-metric fan-out during threshold evaluation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::redundant_clone))]

pub mod cache;
pub mod client;
pub mod mock;
pub mod pending;

pub use cache::{CachingMetricClient, TtlCache};
pub use client::{BiasRequest, BiasValue, InputSpec, MetricClient, MetricValue, OutputSpec};
pub use mock::MockMetricClient;
pub use pending::Pending;
