//! Error types for exposcan core

use thiserror::Error;

/// Result type alias for exposcan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for exposcan operations
///
/// Probe failures are deliberately absent here: a probe never returns an
/// `Error` from `scan()`, it reports a [`ScanFailure`] folded into a failed
/// `ProbeResult`. These variants cover everything outside that boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid target specification, raised at probe construction only
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scan job lifecycle errors
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Timeout errors
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid timeout value for {field}: {value}ms")]
    InvalidTimeout { field: String, value: u64 },

    #[error("Invalid deadline configuration: {reason}")]
    InvalidDeadline { reason: String },

    #[error("Invalid worker count: {value}")]
    InvalidWorkers { value: usize },

    #[error("Invalid port list: {reason}")]
    InvalidPorts { reason: String },

    #[error("Configuration file not found: {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },
}

/// Scan job state machine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Job {id} not found")]
    NotFound { id: String },
}

/// The failure vocabulary every probe uses.
///
/// Each variant renders to one of the standard notes carried by a failed
/// `ProbeResult`; callers branch on the result status, never on this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanFailure {
    #[error("Data not obtained; {operation} timed out after {timeout_secs} seconds")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("Scanning not possible; {reason}")]
    NotPossible { reason: String },

    #[error("Data not obtained; {operation} failed: {detail}")]
    Network { operation: String, detail: String },
}

impl ScanFailure {
    /// Operation exceeded its configured budget
    pub fn timeout<S: Into<String>>(operation: S, timeout_secs: u64) -> Self {
        ScanFailure::Timeout {
            operation: operation.into(),
            timeout_secs,
        }
    }

    /// Access denied or blocked
    pub fn access_denied<S: AsRef<str>>(service: S) -> Self {
        ScanFailure::NotPossible {
            reason: format!("{} access denied or blocked", service.as_ref()),
        }
    }

    /// Service not detected or available
    pub fn service_not_found<S: AsRef<str>>(service: S) -> Self {
        ScanFailure::NotPossible {
            reason: format!("{} not detected or available", service.as_ref()),
        }
    }

    /// Generic "not possible" with a caller-supplied reason
    pub fn not_possible<S: Into<String>>(reason: S) -> Self {
        ScanFailure::NotPossible {
            reason: reason.into(),
        }
    }

    /// Any other I/O failure
    pub fn network<S: Into<String>, D: ToString>(operation: S, detail: D) -> Self {
        ScanFailure::Network {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    /// Human-readable note for the failed result
    pub fn note(&self) -> String {
        self.to_string()
    }

    /// Short kind label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ScanFailure::Timeout { .. } => "timeout",
            ScanFailure::NotPossible { .. } => "not_possible",
            ScanFailure::Network { .. } => "network",
        }
    }
}

impl Error {
    /// Create an invalid target error
    pub fn invalid_target<S: Into<String>>(target: S) -> Self {
        Error::InvalidTarget(target.into())
    }

    /// Create a new configuration error
    pub fn config<E: Into<ConfigError>>(error: E) -> Self {
        Error::Config(error.into())
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        Error::Timeout { timeout_ms }
    }

    /// Create an invalid transition error
    pub fn invalid_transition<F: ToString, T: ToString>(from: F, to: T) -> Self {
        Error::Job(JobError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Create a job-not-found error
    pub fn job_not_found<I: ToString>(id: I) -> Self {
        Error::Job(JobError::NotFound { id: id.to_string() })
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is related to configuration
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidTarget(_) => "invalid_target",
            Error::Config(_) => "config",
            Error::Job(_) => "job",
            Error::Timeout { .. } => "timeout",
            Error::Io(_) => "io",
            Error::Serialization { .. } => "serialization",
            Error::Internal { .. } => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let timeout_err = Error::timeout(5000);
        assert!(matches!(timeout_err, Error::Timeout { timeout_ms: 5000 }));

        let invalid_target_err = Error::invalid_target("not a host");
        assert!(matches!(invalid_target_err, Error::InvalidTarget(_)));
        assert_eq!(invalid_target_err.category(), "invalid_target");
    }

    #[test]
    fn test_error_categories() {
        let config_err = Error::config(ConfigError::InvalidWorkers { value: 0 });
        assert_eq!(config_err.category(), "config");
        assert!(config_err.is_config_error());

        let job_err = Error::invalid_transition("completed", "running");
        assert_eq!(job_err.category(), "job");
        assert!(job_err.to_string().contains("completed"));

        let missing = Error::job_not_found("42");
        assert!(matches!(missing, Error::Job(JobError::NotFound { ref id }) if id == "42"));
        assert_eq!(missing.to_string(), "Job error: Job 42 not found");
    }

    #[test]
    fn test_failure_notes() {
        assert_eq!(
            ScanFailure::timeout("port scanning", 30).note(),
            "Data not obtained; port scanning timed out after 30 seconds"
        );
        assert_eq!(
            ScanFailure::network("TLS/SSL analysis", "connection reset").note(),
            "Data not obtained; TLS/SSL analysis failed: connection reset"
        );
        assert_eq!(
            ScanFailure::service_not_found("TLS/SSL services").note(),
            "Scanning not possible; TLS/SSL services not detected or available"
        );
        assert_eq!(
            ScanFailure::access_denied("nmap").note(),
            "Scanning not possible; nmap access denied or blocked"
        );
    }

    #[test]
    fn test_failure_kind() {
        assert_eq!(ScanFailure::timeout("x", 1).kind(), "timeout");
        assert_eq!(ScanFailure::not_possible("x").kind(), "not_possible");
        assert_eq!(ScanFailure::network("x", "y").kind(), "network");
    }
}
