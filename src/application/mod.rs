//! Application layer - orchestration of domain logic.
//!
//! This layer owns the shared state and the runtime behavior:
//! - Expiring cache (TTL-bounded lookups)
//! - Rate gate (blocking sliding-window admission)
//! - Retry executor (backoff between attempts)
//! - Metrics aggregator and collector (rings, counters, subscribers)
//! - Dispatch queue (background delivery to a slow sink)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub mod aggregator;
pub mod cache;
pub mod collector;
pub mod counters;
pub mod dispatch;
pub mod log_metrics;
pub mod metrics;
pub mod ports;
pub mod rate_gate;
pub mod registry;
pub mod retry;

// Poisoning is ignored: a panicking caller must not disable the component.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
