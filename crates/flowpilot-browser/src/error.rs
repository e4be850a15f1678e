//! Browser error helpers - re-exports the unified FlowError from flowpilot-core
//!
//! Every DevTools failure becomes `FlowError::Browser` with the operation that
//! failed in the message. Elements that never show up within a bounded wait
//! become `FlowError::ElementNotFound`.

use std::fmt::Display;

pub use flowpilot_core::{FlowError, Result};

/// Map a DevTools error into `FlowError::Browser`, prefixed with `what`
pub(crate) fn cdp<E: Display>(what: &str) -> impl FnOnce(E) -> FlowError + '_ {
    move |e| FlowError::Browser(format!("{}: {}", what, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdp_error_message() {
        let err = cdp("Failed to reload")("socket closed");
        assert!(matches!(err, FlowError::Browser(_)));
        assert_eq!(err.to_string(), "Browser error: Failed to reload: socket closed");
    }
}
