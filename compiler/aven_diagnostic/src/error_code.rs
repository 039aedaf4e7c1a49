use std::fmt;

/// Error codes for all compiler diagnostics.
///
/// Format: E#### where the first digit indicates the phase:
/// - E1xxx: Name resolution errors
/// - E2xxx: Type errors
/// - E3xxx: Structural errors (fatal for the whole run)
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Name errors (E1xxx)
    /// Undefined identifier
    E1001,
    /// Undefined constant
    E1002,
    /// Unknown message sent to a receiver
    E1003,
    /// Undefined attribute
    E1004,
    /// Duplicate binding in one scope
    E1005,

    // Type errors (E2xxx)
    /// Type mismatch in assignment or argument position
    E2001,
    /// Trait bound not satisfied by a generic type argument
    E2002,
    /// Wrong number of type arguments
    E2003,
    /// Wrong number of arguments in a message send
    E2004,
    /// Duplicate attribute on the same type
    E2005,
    /// Reassignment of an immutable binding
    E2006,

    // Structural errors (E3xxx)
    /// Import cycle without a lazy boundary
    E3001,
    /// Duplicate type definition
    E3002,
    /// Prototype chain cycle
    E3003,
    /// Duplicate module in one run
    E3004,
    /// Import of a module unknown to the loader
    E3005,
}

impl ErrorCode {
    /// Whether this code marks a structural error, which is fatal for the
    /// whole run rather than recoverable per expression.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            ErrorCode::E3001
                | ErrorCode::E3002
                | ErrorCode::E3003
                | ErrorCode::E3004
                | ErrorCode::E3005
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
