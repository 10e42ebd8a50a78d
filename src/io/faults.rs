//! Bounded collection of row faults.

use crate::io::validation::RowError;
use std::fmt;

/// Default number of faults kept in detail.
pub const DEFAULT_FAULT_CAPACITY: usize = 50;

/// A rejected row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Line number in the artifact.
    pub line: u64,
    /// Why the row was rejected.
    pub error: RowError,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}

/// Collects errors up to a capacity while counting all of them.
///
/// The first `capacity` errors are kept; later ones only increase the count.
#[derive(Debug, Clone)]
pub struct FaultGroup<E> {
    capacity: usize,
    retained: Vec<E>,
    count: u64,
}

impl<E> FaultGroup<E> {
    /// Creates a group that retains at most `capacity` errors.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            retained: Vec::new(),
            count: 0,
        }
    }

    /// Adds an error. `None` is ignored.
    ///
    /// Returns `true` if an error was given, whether or not it was retained.
    pub fn append(&mut self, error: Option<E>) -> bool {
        let Some(error) = error else {
            return false;
        };
        self.count += 1;
        if self.retained.len() < self.capacity {
            self.retained.push(error);
        }
        true
    }

    /// Total number of errors appended.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Returns whether no error was appended.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the retained errors in append order.
    #[must_use]
    pub fn retained(&self) -> &[E] {
        &self.retained
    }

    /// Takes the retained errors; the count is left unchanged.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.retained)
    }
}

impl<E> Default for FaultGroup<E> {
    fn default() -> Self {
        Self::new(DEFAULT_FAULT_CAPACITY)
    }
}

impl FaultGroup<Fault> {
    /// Records the error of a failed row and passes successful values on.
    pub fn capture<T>(&mut self, line: u64, result: Result<T, RowError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.append(Some(Fault { line, error }));
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_none_is_ignored() {
        let mut group: FaultGroup<String> = FaultGroup::new(2);
        assert!(!group.append(None));
        assert!(group.is_empty());
        assert_eq!(group.count(), 0);
    }

    #[test]
    fn test_capacity_bounds_detail_not_count() {
        let mut group = FaultGroup::new(2);
        for i in 0..5 {
            assert!(group.append(Some(i)));
        }
        assert_eq!(group.count(), 5);
        assert_eq!(group.retained(), &[0, 1]);
        assert_eq!(group.drain(), vec![0, 1]);
        assert_eq!(group.count(), 5);
        assert!(group.retained().is_empty());
    }

    #[test]
    fn test_zero_capacity_still_counts() {
        let mut group = FaultGroup::new(0);
        group.append(Some("x"));
        assert_eq!(group.count(), 1);
        assert!(group.retained().is_empty());
    }

    #[test]
    fn test_capture() {
        let mut group = FaultGroup::default();
        assert_eq!(group.capture(2, Ok::<_, RowError>(7)), Some(7));
        let failed: Result<i32, _> = Err(RowError::Csv("bad quote".to_string()));
        assert_eq!(group.capture(3, failed), None);
        assert_eq!(group.count(), 1);
        assert_eq!(
            group.retained()[0].to_string(),
            "line 3: malformed CSV: bad quote"
        );
    }
}
