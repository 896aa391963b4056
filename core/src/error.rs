//! Error types shared by the monitoring components
//!
//! Every failure carries an [`ErrorCategory`] so the host can decide per
//! category whether it is silent, a warning, or fatal (see
//! [`MonitoringLogger`](crate::logging::MonitoringLogger)).

use std::fmt;

/// Category of a monitoring error, each with an independently configurable severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// An assembly could not be read during discovery
    BadImage,
    /// The background scan was canceled (normal shutdown path)
    OperationCanceled,
    /// The background scan thread died before handing off its batch
    ThreadAbort,
    /// A member references a value processor that does not exist
    ProcessorNotFound,
    /// A value processor exists but accepts a different value type
    InvalidProcessorSignature,
    /// Anything else, including failing or panicking accessors
    Unknown,
}

impl ErrorCategory {
    /// All categories, in counter order
    pub const ALL: [ErrorCategory; 6] = [
        ErrorCategory::BadImage,
        ErrorCategory::OperationCanceled,
        ErrorCategory::ThreadAbort,
        ErrorCategory::ProcessorNotFound,
        ErrorCategory::InvalidProcessorSignature,
        ErrorCategory::Unknown,
    ];

    /// Stable index used for per-category tables
    pub fn index(self) -> usize {
        match self {
            ErrorCategory::BadImage => 0,
            ErrorCategory::OperationCanceled => 1,
            ErrorCategory::ThreadAbort => 2,
            ErrorCategory::ProcessorNotFound => 3,
            ErrorCategory::InvalidProcessorSignature => 4,
            ErrorCategory::Unknown => 5,
        }
    }

    /// Kebab-case name, matching the settings file keys
    pub fn name(self) -> &'static str {
        match self {
            ErrorCategory::BadImage => "bad-image",
            ErrorCategory::OperationCanceled => "operation-canceled",
            ErrorCategory::ThreadAbort => "thread-abort",
            ErrorCategory::ProcessorNotFound => "processor-not-found",
            ErrorCategory::InvalidProcessorSignature => "invalid-processor-signature",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while discovering members or reading their values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    /// Assembly could not be read
    #[error("assembly '{assembly}' could not be read: {reason}")]
    BadImage { assembly: String, reason: String },

    /// Background scan was canceled
    #[error("profiling was canceled")]
    OperationCanceled,

    /// Background scan thread panicked or disconnected
    #[error("profiling thread aborted: {0}")]
    ThreadAbort(String),

    /// Named value processor is missing on the declaring type
    #[error("value processor '{processor}' used by {member} was not found")]
    ProcessorNotFound { member: String, processor: String },

    /// Value processor input type does not match the member
    #[error(
        "value processor '{processor}' used by {member} accepts {expected} but the member yields {found}"
    )]
    InvalidProcessorSignature {
        member: String,
        processor: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Member signature does not fit any accessor shape (skipped at discovery)
    #[error("{member} is incompatible: {reason}")]
    IncompatibleMember { member: String, reason: String },

    /// The unit's target has been destroyed
    #[error("target of {0} no longer exists")]
    TargetDropped(String),

    /// Host accessor reported a failure
    #[error("{member}: {message}")]
    Access { member: String, message: String },

    /// Value was written to a member without a setter
    #[error("{0} is not settable")]
    NotSettable(String),

    /// Value or target had an unexpected type
    #[error("{member} expects {expected}, got {found}")]
    TypeMismatch {
        member: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Uncategorized failure (e.g. a panic caught during refresh)
    #[error("{0}")]
    Unknown(String),
}

impl MonitorError {
    /// Category deciding how loudly this error is reported
    pub fn category(&self) -> ErrorCategory {
        match self {
            MonitorError::BadImage { .. } => ErrorCategory::BadImage,
            MonitorError::OperationCanceled => ErrorCategory::OperationCanceled,
            MonitorError::ThreadAbort(_) => ErrorCategory::ThreadAbort,
            MonitorError::ProcessorNotFound { .. } => ErrorCategory::ProcessorNotFound,
            MonitorError::InvalidProcessorSignature { .. } => {
                ErrorCategory::InvalidProcessorSignature
            }
            MonitorError::IncompatibleMember { .. }
            | MonitorError::TargetDropped(_)
            | MonitorError::Access { .. }
            | MonitorError::NotSettable(_)
            | MonitorError::TypeMismatch { .. }
            | MonitorError::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Build an error from a caught panic payload
    pub fn from_panic(member: &str, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        MonitorError::Unknown(format!("{} panicked: {}", member, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_indices_are_unique() {
        for (i, category) in ErrorCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            MonitorError::OperationCanceled.category(),
            ErrorCategory::OperationCanceled
        );
        assert_eq!(
            MonitorError::ProcessorNotFound {
                member: "Player.health".into(),
                processor: "fmt".into(),
            }
            .category(),
            ErrorCategory::ProcessorNotFound
        );
        assert_eq!(
            MonitorError::Access {
                member: "Player.health".into(),
                message: "boom".into(),
            }
            .category(),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn test_from_panic_payloads() {
        let err = MonitorError::from_panic("Player.speed", &"exploded");
        assert_eq!(
            err,
            MonitorError::Unknown("Player.speed panicked: exploded".into())
        );

        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let err = MonitorError::from_panic("Player.speed", owned.as_ref());
        assert_eq!(err.to_string(), "Player.speed panicked: owned");
    }
}
