//! Domain layer - pure logic with no threads, clocks or I/O of its own.
//!
//! This layer contains the core concepts and invariants of the resilience core:
//! - Metric records and their classification
//! - Counter identity
//! - Fixed-capacity metric rings
//! - Sliding-window admission decisions
//! - Statistical rollups
//! - Retry policies
//!
//! All types in this layer are pure and easily testable.

pub mod admission;
pub mod counter_key;
pub mod error;
pub mod metric;
pub mod policy;
pub mod stats;
pub mod window;
