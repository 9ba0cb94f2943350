//! Adapters for the application ports, tracing-subscriber integration and
//! the [`resilience::Resilience`] facade that wires the components together.

pub mod clock;
pub mod layer;
pub mod resilience;
pub mod sink;
pub mod storage;
pub(crate) mod visitor;

/// Test doubles: a clock whose sleeps advance time, a layer capturing
/// tracing events, and sinks that record or reject items.
///
/// Compiled for this crate's tests, or downstream with:
/// ```toml
/// [dev-dependencies]
/// crm-resilience = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
