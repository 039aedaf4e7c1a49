//! The per-run diagnostics sink.

use parking_lot::Mutex;

use crate::{Diagnostic, Severity};

/// Ordered, insert-only collection of diagnostics for one compilation run.
///
/// The sink is shared by every pass and every worker thread; recording never
/// fails and never throws, so passes can keep working after an error. Entries
/// are kept in recording order.
#[derive(Default)]
pub struct Diagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic.
    pub fn record(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }

    /// Record every diagnostic from an owned batch, preserving its order.
    pub fn record_all(&self, batch: Vec<Diagnostic>) {
        if batch.is_empty() {
            return;
        }
        self.entries.lock().extend(batch);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether at least one error-severity diagnostic was recorded.
    ///
    /// Drives the nonzero exit status of the overall invocation.
    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|entry| entry.severity == Severity::Error)
    }

    /// Whether a structural (run-fatal) error was recorded.
    pub fn has_structural_errors(&self) -> bool {
        self.entries.lock().iter().any(Diagnostic::is_structural)
    }

    /// Whether an error was recorded against the given file.
    pub fn has_errors_for(&self, file: &std::path::Path) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|entry| entry.is_error() && entry.file == file)
    }

    /// Snapshot of all recorded diagnostics, in recording order.
    pub fn to_vec(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    /// Drain the sink, returning all diagnostics in recording order.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use aven_ir::Location;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Arc;

    fn error_at(file: &str, line: u32) -> Diagnostic {
        Diagnostic::error(ErrorCode::E1001, "undefined", file, Location::new(line, 1))
    }

    #[test]
    fn test_record_preserves_order() {
        let sink = Diagnostics::new();
        sink.record(error_at("a.avn", 1));
        sink.record(Diagnostic::warning(
            ErrorCode::E2001,
            "suspicious",
            "a.avn",
            Location::new(2, 1),
        ));
        sink.record(error_at("b.avn", 3));

        let all = sink.to_vec();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].line(), 1);
        assert_eq!(all[1].severity, Severity::Warning);
        assert_eq!(all[2].file, Path::new("b.avn"));
    }

    #[test]
    fn test_has_errors_ignores_warnings() {
        let sink = Diagnostics::new();
        sink.record(Diagnostic::warning(
            ErrorCode::E2001,
            "only a warning",
            "a.avn",
            Location::DUMMY,
        ));
        assert!(!sink.has_errors());

        sink.record(error_at("a.avn", 5));
        assert!(sink.has_errors());
        assert!(sink.has_errors_for(Path::new("a.avn")));
        assert!(!sink.has_errors_for(Path::new("b.avn")));
    }

    #[test]
    fn test_structural_detection() {
        let sink = Diagnostics::new();
        sink.record(error_at("a.avn", 1));
        assert!(!sink.has_structural_errors());

        sink.record(Diagnostic::error(
            ErrorCode::E3001,
            "cycle",
            "a.avn",
            Location::DUMMY,
        ));
        assert!(sink.has_structural_errors());
    }

    #[test]
    fn test_concurrent_recording() {
        let sink = Arc::new(Diagnostics::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || sink.record(error_at("m.avn", i)))
            })
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
        assert_eq!(sink.len(), 8);
    }

    #[test]
    fn test_take_all_drains() {
        let sink = Diagnostics::new();
        sink.record(error_at("a.avn", 1));
        let drained = sink.take_all();
        assert_eq!(drained.len(), 1);
        assert!(sink.is_empty());
    }
}
