//! Category-based error reporting
//!
//! Each [`ErrorCategory`] has its own [`LoggingLevel`]. A host can silence
//! noisy environment-specific failures while still treating programmer
//! errors as fatal during development.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, MonitorError};
use crate::settings::LoggingSettings;

/// Severity assigned to an error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingLevel {
    /// Only visible at trace level
    #[default]
    None,
    /// Logged as a warning
    Warning,
    /// Logged as an error and escalated to the caller
    Exception,
}

/// What the logger did with a reported error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Category is silenced
    Suppressed,
    /// Logged as a warning, caller continues
    Logged,
    /// Logged as an error, caller should hard-fail its current operation
    Fatal,
}

impl Disposition {
    /// Whether the caller should abort what it was doing
    pub fn is_fatal(self) -> bool {
        self == Disposition::Fatal
    }
}

/// Logger shared by the reflection cache, the scheduler and the filter engine
///
/// Cloning is cheap; counters are shared between clones so the background
/// scan and the main thread report into the same totals.
#[derive(Debug, Clone)]
pub struct MonitoringLogger {
    levels: [LoggingLevel; 6],
    counts: Arc<[AtomicU64; 6]>,
}

impl Default for MonitoringLogger {
    fn default() -> Self {
        Self::new(&LoggingSettings::default())
    }
}

impl MonitoringLogger {
    /// Create a logger using the per-category levels from settings
    pub fn new(settings: &LoggingSettings) -> Self {
        let mut levels = [LoggingLevel::None; 6];
        for category in ErrorCategory::ALL {
            levels[category.index()] = settings.level(category);
        }
        Self {
            levels,
            counts: Arc::new(std::array::from_fn(|_| AtomicU64::new(0))),
        }
    }

    /// Current level of a category
    pub fn level(&self, category: ErrorCategory) -> LoggingLevel {
        self.levels[category.index()]
    }

    /// Change the level of a category
    pub fn set_level(&mut self, category: ErrorCategory, level: LoggingLevel) {
        self.levels[category.index()] = level;
    }

    /// Number of errors reported for a category so far
    pub fn count(&self, category: ErrorCategory) -> u64 {
        self.counts[category.index()].load(Ordering::Relaxed)
    }

    /// Report an error at the severity configured for its category
    pub fn report(&self, error: &MonitorError) -> Disposition {
        let category = error.category();
        self.counts[category.index()].fetch_add(1, Ordering::Relaxed);

        match self.level(category) {
            LoggingLevel::None => {
                tracing::trace!(%category, "{}", error);
                Disposition::Suppressed
            }
            LoggingLevel::Warning => {
                tracing::warn!(%category, "{}", error);
                Disposition::Logged
            }
            LoggingLevel::Exception => {
                tracing::error!(%category, "{}", error);
                Disposition::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_levels() {
        let logger = MonitoringLogger::default();
        assert_eq!(logger.level(ErrorCategory::BadImage), LoggingLevel::None);
        assert_eq!(
            logger.level(ErrorCategory::OperationCanceled),
            LoggingLevel::None
        );
        assert_eq!(logger.level(ErrorCategory::ThreadAbort), LoggingLevel::Warning);
        assert_eq!(logger.level(ErrorCategory::Unknown), LoggingLevel::Exception);
        assert_eq!(
            logger.level(ErrorCategory::ProcessorNotFound),
            LoggingLevel::Warning
        );
    }

    #[test]
    fn test_report_dispositions() {
        let mut logger = MonitoringLogger::default();

        assert_eq!(
            logger.report(&MonitorError::OperationCanceled),
            Disposition::Suppressed
        );
        assert_eq!(
            logger.report(&MonitorError::ThreadAbort("gone".into())),
            Disposition::Logged
        );
        assert!(logger.report(&MonitorError::Unknown("boom".into())).is_fatal());

        logger.set_level(ErrorCategory::Unknown, LoggingLevel::None);
        assert_eq!(
            logger.report(&MonitorError::Unknown("boom".into())),
            Disposition::Suppressed
        );
    }

    #[test]
    fn test_counts_shared_between_clones() {
        let logger = MonitoringLogger::default();
        let clone = logger.clone();

        clone.report(&MonitorError::OperationCanceled);
        logger.report(&MonitorError::OperationCanceled);

        assert_eq!(logger.count(ErrorCategory::OperationCanceled), 2);
        assert_eq!(clone.count(ErrorCategory::Unknown), 0);
    }
}
