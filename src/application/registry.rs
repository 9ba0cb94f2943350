//! Process-wide default collector.
//!
//! Components should receive a `MetricsCollector` explicitly. The default
//! collector exists for call sites at the process boundary that have nothing
//! to pass along; nothing in this crate depends on it.

use crate::application::collector::MetricsCollector;
use crate::application::{read, write};
use std::sync::{OnceLock, RwLock};

static DEFAULT_COLLECTOR: OnceLock<RwLock<MetricsCollector>> = OnceLock::new();

fn slot() -> &'static RwLock<MetricsCollector> {
    DEFAULT_COLLECTOR.get_or_init(|| RwLock::new(MetricsCollector::default()))
}

/// The process default collector, built on first use.
///
/// Returns a handle sharing state with every other handle obtained before the
/// next [`install_default_collector`] call.
pub fn default_collector() -> MetricsCollector {
    read(slot()).clone()
}

/// Replace the process default collector, returning the previous one.
pub fn install_default_collector(collector: MetricsCollector) -> MetricsCollector {
    std::mem::replace(&mut *write(slot()), collector)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_LABELS: [(&str, &str); 0] = [];

    #[test]
    fn test_default_collector_is_shared_and_replaceable() {
        let replacement = MetricsCollector::new(10).unwrap();
        install_default_collector(replacement.clone());

        default_collector().increment_counter("registry_test", 1, NO_LABELS);
        assert_eq!(replacement.counter("registry_test", NO_LABELS).value, 1);

        let previous = install_default_collector(MetricsCollector::new(10).unwrap());
        assert_eq!(previous.counter("registry_test", NO_LABELS).value, 1);
        assert_eq!(
            default_collector()
                .counter("registry_test", NO_LABELS)
                .value,
            0
        );
    }
}
