//! Per-prim sync outcome: validation warnings and fatal errors

use std::fmt;

use crate::buffer::{CommitError, RangeError};
use crate::config::ConfigError;
use crate::scene::primvar::Interpolation;

/// What was wrong with a primvar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// The delegate returned no value
    EmptyValue,
    /// Fewer elements than the topology needs; the primvar was skipped
    TooFewElements {
        /// Elements provided
        found: usize,
        /// Elements expected
        expected: usize,
    },
    /// More elements than the topology needs; the primvar was truncated
    Truncated {
        /// Elements provided
        found: usize,
        /// Elements kept
        expected: usize,
    },
    /// The bound instancer does not exist in the delegate
    MissingInstancer,
}

/// A recoverable primvar problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Primvar name
    pub primvar: String,
    /// Interpolation class it was pulled for
    pub interpolation: Interpolation,
    /// What was wrong
    pub kind: WarningKind,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WarningKind::EmptyValue => {
                write!(f, "{:?} primvar '{}' has no value, skipping", self.interpolation, self.primvar)
            }
            WarningKind::TooFewElements { found, expected } => write!(
                f,
                "{:?} primvar '{}' has only {} elements, topology expects {}; skipping",
                self.interpolation, self.primvar, found, expected
            ),
            WarningKind::Truncated { found, expected } => write!(
                f,
                "{:?} primvar '{}' has {} elements, topology references {}; truncating",
                self.interpolation, self.primvar, found, expected
            ),
            WarningKind::MissingInstancer => write!(f, "instancer for primvar '{}' not found", self.primvar),
        }
    }
}

/// Errors surfaced by the sync pipeline
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The points primvar cannot cover the topology; the prim is blanked this pass
    #[error("Prim '{prim}' has {found} points, topology needs {expected}")]
    InsufficientPoints {
        /// Prim path
        prim: String,
        /// Points provided
        found: usize,
        /// Points expected
        expected: usize,
    },

    /// Range access failure
    #[error(transparent)]
    Range(#[from] RangeError),

    /// Commit failure
    #[error(transparent)]
    Commit(#[from] CommitError),

    /// Configuration failure
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Outcome of syncing one prim
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Prim path
    pub prim: String,
    /// Recoverable problems, in the order they were found
    pub warnings: Vec<ValidationWarning>,
    /// The fatal-to-prim error, if any
    pub error: Option<SyncError>,
}

impl SyncReport {
    /// Empty report for `prim`
    pub fn new(prim: impl Into<String>) -> Self {
        Self { prim: prim.into(), warnings: Vec::new(), error: None }
    }

    /// Record and log a warning
    pub fn warn(&mut self, primvar: &str, interpolation: Interpolation, kind: WarningKind) {
        let warning = ValidationWarning { primvar: primvar.to_string(), interpolation, kind };
        log::warn!("{}: {}", self.prim, warning);
        self.warnings.push(warning);
    }

    /// Record and log a fatal error
    pub fn fail(&mut self, error: SyncError) {
        log::warn!("{}: {}", self.prim, error);
        self.error = Some(error);
    }

    /// Whether the prim synced without a fatal error
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Warnings about `primvar`
    pub fn warnings_for<'a>(&'a self, primvar: &'a str) -> impl Iterator<Item = &'a ValidationWarning> + 'a {
        self.warnings.iter().filter(move |warning| warning.primvar == primvar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_records_warnings_and_errors() {
        let mut report = SyncReport::new("/mesh");
        report.warn("displayColor", Interpolation::Vertex, WarningKind::Truncated { found: 10, expected: 8 });
        assert!(report.is_ok());
        assert_eq!(report.warnings_for("displayColor").count(), 1);

        report.fail(SyncError::InsufficientPoints { prim: "/mesh".into(), found: 3, expected: 8 });
        assert!(!report.is_ok());
    }

    #[test]
    fn test_warning_display_mentions_counts() {
        let warning = ValidationWarning {
            primvar: "points".into(),
            interpolation: Interpolation::Vertex,
            kind: WarningKind::TooFewElements { found: 3, expected: 8 },
        };
        let text = warning.to_string();
        assert!(text.contains('3') && text.contains('8') && text.contains("points"));
    }
}
