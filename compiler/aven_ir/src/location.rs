//! Source locations.
//!
//! Aven diagnostics and debug info address source positions by line and
//! column, so that is what the tree carries; byte offsets never leave the
//! parser.

use std::fmt;

/// A line/column position in a source file.
///
/// Layout: 8 bytes total. Lines and columns are 1-based; `DUMMY` (0:0) marks
/// compiler-generated nodes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    /// Dummy location for generated code.
    pub const DUMMY: Location = Location { line: 0, column: 0 };

    /// Create a new location.
    #[inline]
    pub const fn new(line: u32, column: u32) -> Self {
        Location { line, column }
    }

    /// Whether this is a real source position.
    #[inline]
    pub const fn is_present(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
