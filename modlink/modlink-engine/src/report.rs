//! Turning reconciliation failures into operator-facing reports.

use modlink_core::error::{ErrorClass, ModlinkError};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// A failure ready to be shown to an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub class: ErrorClass,
    pub path: Option<PathBuf>,
    pub message: String,
}

impl FailureReport {
    /// Build a report; unexpected errors are prefixed with `uncaught` so they
    /// can be told apart from intentional refusals.
    pub fn from_error(err: &ModlinkError, path: Option<&Path>) -> Self {
        let class = err.class();
        let message = match class {
            ErrorClass::Unexpected => format!("uncaught error: {}", err),
            ErrorClass::Domain | ErrorClass::Fatal => err.to_string(),
        };

        Self {
            class,
            path: path.map(Path::to_path_buf),
            message,
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path.display(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Delivery channel for failure reports.
pub trait Notifier: Send + Sync {
    fn notify(&self, report: &FailureReport);
}

/// Delivers reports as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, report: &FailureReport) {
        match report.class {
            ErrorClass::Domain => warn!(class = %report.class, "{}", report),
            ErrorClass::Fatal | ErrorClass::Unexpected => {
                error!(class = %report.class, "{}", report)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_errors_are_prefixed() {
        let err = ModlinkError::from(std::io::Error::other("boom"));
        let report = FailureReport::from_error(&err, Some(Path::new("/p/a.js")));

        assert_eq!(report.class, ErrorClass::Unexpected);
        assert!(report.message.starts_with("uncaught error: "));
        assert_eq!(report.to_string(), format!("/p/a.js: {}", report.message));
    }

    #[test]
    fn test_domain_errors_are_not_prefixed() {
        let err = ModlinkError::ReservedName("fs".into());
        let report = FailureReport::from_error(&err, None);

        assert_eq!(report.class, ErrorClass::Domain);
        assert!(report.message.starts_with("fs is the name of a builtin module"));
    }
}
