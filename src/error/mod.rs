//! Closed error taxonomy (C10) and recovery policy.
//!
//! Every failure that crosses a component boundary gets classified into one
//! of these categories so it can be serialized to clients verbatim and so a
//! recovery manager can track per-code retry budgets.

mod classify;
mod recovery;
mod taxonomy;

pub use classify::classify;
pub use recovery::{RecoveryManager, RecoveryOutcome, RecoveryStrategy};
pub use taxonomy::{ErrorCategory, ErrorContext, ErrorSeverity, SystemError};
