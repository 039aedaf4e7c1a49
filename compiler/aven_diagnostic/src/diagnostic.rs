use std::fmt;
use std::path::{Path, PathBuf};

use aven_ir::Location;

use crate::ErrorCode;

/// Severity level for diagnostics.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single diagnostic record: severity, message, file, line and column.
///
/// Diagnostics are plain data; rendering for humans belongs to the CLI
/// layer, which consumes these records in recorded order.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[must_use = "diagnostics should be recorded into a sink, not silently dropped"]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    pub file: PathBuf,
    pub location: Location,
}

impl Diagnostic {
    fn new_with_severity(
        code: ErrorCode,
        severity: Severity,
        message: impl Into<String>,
        file: impl Into<PathBuf>,
        location: Location,
    ) -> Self {
        Diagnostic {
            code,
            severity,
            message: message.into(),
            file: file.into(),
            location,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(
        code: ErrorCode,
        message: impl Into<String>,
        file: impl Into<PathBuf>,
        location: Location,
    ) -> Self {
        Self::new_with_severity(code, Severity::Error, message, file, location)
    }

    /// Create a new warning diagnostic.
    pub fn warning(
        code: ErrorCode,
        message: impl Into<String>,
        file: impl Into<PathBuf>,
        location: Location,
    ) -> Self {
        Self::new_with_severity(code, Severity::Warning, message, file, location)
    }

    /// Check if this is an error (vs warning).
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    /// Whether this diagnostic is fatal for the whole run.
    pub fn is_structural(&self) -> bool {
        self.is_error() && self.code.is_structural()
    }

    pub fn line(&self) -> u32 {
        self.location.line
    }

    pub fn column(&self) -> u32 {
        self.location.column
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}]: {}",
            self.file.display(),
            self.location,
            self.severity,
            self.code,
            self.message
        )
    }
}

/// Create an "unknown message" diagnostic.
pub fn unknown_message(receiver: &str, name: &str, file: &Path, location: Location) -> Diagnostic {
    Diagnostic::error(
        ErrorCode::E1003,
        format!("the type `{receiver}` does not respond to the message `{name}`"),
        file,
        location,
    )
}

/// Create an "undefined identifier" diagnostic.
pub fn undefined_identifier(name: &str, file: &Path, location: Location) -> Diagnostic {
    Diagnostic::error(
        ErrorCode::E1001,
        format!("the identifier `{name}` is undefined"),
        file,
        location,
    )
}

/// Create a "type mismatch" diagnostic.
pub fn type_mismatch(expected: &str, found: &str, file: &Path, location: Location) -> Diagnostic {
    Diagnostic::error(
        ErrorCode::E2001,
        format!("expected a value of type `{expected}`, found `{found}`"),
        file,
        location,
    )
}

/// Create an "unsatisfied trait bound" diagnostic.
pub fn unsatisfied_bound(
    argument: &str,
    parameter: &str,
    missing: &str,
    file: &Path,
    location: Location,
) -> Diagnostic {
    Diagnostic::error(
        ErrorCode::E2002,
        format!(
            "the type `{argument}` does not implement the trait `{missing}` \
             required by the type parameter `{parameter}`"
        ),
        file,
        location,
    )
}

/// Create a "duplicate attribute" diagnostic.
pub fn duplicate_attribute(owner: &str, name: &str, file: &Path, location: Location) -> Diagnostic {
    Diagnostic::error(
        ErrorCode::E2005,
        format!("the attribute `{name}` is already defined on the type `{owner}`"),
        file,
        location,
    )
}

/// Create an "import cycle" diagnostic.
pub fn import_cycle(cycle: &[String], file: &Path, location: Location) -> Diagnostic {
    Diagnostic::error(
        ErrorCode::E3001,
        format!(
            "the modules {} import each other without a lazy boundary",
            cycle.join(" -> ")
        ),
        file,
        location,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_diagnostic_record_shape() {
        let diag = Diagnostic::error(
            ErrorCode::E1001,
            "the identifier `foo` is undefined",
            "src/main.avn",
            Location::new(3, 7),
        );

        assert!(diag.is_error());
        assert!(!diag.is_structural());
        assert_eq!(diag.line(), 3);
        assert_eq!(diag.column(), 7);
        assert_eq!(diag.file, PathBuf::from("src/main.avn"));
    }

    #[test]
    fn test_warning_is_never_structural() {
        let diag = Diagnostic::warning(
            ErrorCode::E3001,
            "unlikely",
            "a.avn",
            Location::DUMMY,
        );
        assert!(!diag.is_structural());
    }

    #[test]
    fn test_unknown_message_helper() {
        let diag = unknown_message("Person", "fly", Path::new("p.avn"), Location::new(10, 2));
        assert_eq!(diag.code, ErrorCode::E1003);
        assert!(diag.message.contains("Person"));
        assert!(diag.message.contains("fly"));
    }

    #[test]
    fn test_display_format() {
        let diag = type_mismatch("Int", "String", Path::new("m.avn"), Location::new(1, 4));
        let rendered = diag.to_string();
        assert!(rendered.contains("m.avn:1:4"));
        assert!(rendered.contains("error [E2001]"));
    }

    #[test]
    fn test_import_cycle_helper_is_structural() {
        let cycle = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let diag = import_cycle(&cycle, Path::new("a.avn"), Location::new(1, 1));
        assert!(diag.is_structural());
        assert!(diag.message.contains("a -> b -> a"));
    }
}
