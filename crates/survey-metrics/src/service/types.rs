//! Types for the metrics service.

use std::collections::BTreeSet;

/// What a write through the service dropped from the result cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Operation codes whose cached cells were dropped.
    pub codes: BTreeSet<String>,
    /// Number of cached cells removed.
    pub cells_removed: usize,
}

impl InvalidationReport {
    /// Returns true if `code` was invalidated.
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    /// Returns true if no code was invalidated.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl std::fmt::Display for InvalidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalidated {} cell(s) of {} operation(s)",
            self.cells_removed,
            self.codes.len()
        )?;
        if !self.codes.is_empty() {
            let codes: Vec<&str> = self.codes.iter().map(String::as_str).collect();
            write!(f, ": {}", codes.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = InvalidationReport {
            codes: ["DepMoy", "PartDoc"].into_iter().map(String::from).collect(),
            cells_removed: 3,
        };

        assert!(report.contains("PartDoc"));
        assert!(!report.is_empty());
        assert_eq!(
            report.to_string(),
            "invalidated 3 cell(s) of 2 operation(s): DepMoy, PartDoc"
        );
    }

    #[test]
    fn test_empty_report() {
        let report = InvalidationReport::default();
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "invalidated 0 cell(s) of 0 operation(s)");
    }
}
