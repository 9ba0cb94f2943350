//! Counter identity.
//!
//! A counter is identified by its name plus its label set. Labels are kept in
//! a `BTreeMap`, so two label sets with the same pairs resolve to the same key
//! no matter the order they were supplied in.

use crate::domain::metric::Labels;
use ahash::AHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Canonical identity of a counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    name: String,
    labels: Labels,
}

impl CounterKey {
    /// Build a key from a name and any iterable of label pairs.
    ///
    /// ```
    /// use crm_resilience::CounterKey;
    ///
    /// let a = CounterKey::new("x", [("a", "1"), ("b", "2")]);
    /// let b = CounterKey::new("x", [("b", "2"), ("a", "1")]);
    /// assert_eq!(a, b);
    /// assert_eq!(a.to_string(), "x{a=1,b=2}");
    /// ```
    pub fn new<I, K, V>(name: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Key for a counter without labels.
    pub fn unlabeled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Stable 64-bit fingerprint of the key, for compact export.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = AHasher::default();
        self.name.hash(&mut hasher);
        // BTreeMap iterates in sorted order
        for (key, value) in &self.labels {
            key.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.labels.is_empty() {
            return Ok(());
        }
        write!(f, "{{")?;
        for (i, (key, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, "}}")
    }
}
