//! Aven Diagnostic - error and warning reporting for the Aven compiler.
//!
//! Passes never abort on user errors: they record a [`Diagnostic`] into the
//! shared [`Diagnostics`] sink and keep going, so one run surfaces as many
//! independent problems as possible. The sink is insert-only and safe to
//! share across compilation worker threads.

mod diagnostic;
mod error_code;
mod sink;

pub use diagnostic::{
    duplicate_attribute, import_cycle, type_mismatch, undefined_identifier, unknown_message,
    unsatisfied_bound, Diagnostic, Severity,
};
pub use error_code::ErrorCode;
pub use sink::Diagnostics;
