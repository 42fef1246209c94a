use crate::diagnostics::{sort_and_dedup, Diagnostic};

/// Collects per-unit diagnostics into one run-wide, ordered, duplicate-free sequence.
///
/// Workers never touch the aggregator; their results are merged here sequentially once the
/// pool has finished, so the final order depends only on the diagnostics themselves.
#[derive(Debug, Default)]
pub struct Aggregator {
    diagnostics: Vec<Diagnostic>,
    units: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the diagnostics of one completed unit.
    pub fn add_unit(&mut self, diagnostics: Vec<Diagnostic>) {
        self.units += 1;
        self.diagnostics.extend(diagnostics);
    }

    pub fn units(&self) -> usize {
        self.units
    }

    /// Sorted by (file, rule id, span, message), identical entries collapsed.
    pub fn finish(mut self) -> Vec<Diagnostic> {
        sort_and_dedup(&mut self.diagnostics);
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Severity, Span};

    #[test]
    fn test_merge_order_does_not_matter() {
        let a = Diagnostic::new("no-eval", "a.py", Span::line(2), "m", Severity::Error);
        let b = Diagnostic::new("no-print", "b.py", Span::line(1), "m", Severity::Information);

        let mut first = Aggregator::new();
        first.add_unit(vec![b.clone()]);
        first.add_unit(vec![a.clone()]);

        let mut second = Aggregator::new();
        second.add_unit(vec![a.clone(), a.clone()]);
        second.add_unit(vec![b.clone()]);

        assert_eq!(first.units(), 2);
        assert_eq!(first.finish(), second.finish());
    }
}
