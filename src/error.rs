//! Error handling for the assessment pipeline

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the workflow engine and its activities.
///
/// Activity boundaries translate raised errors into these kinds; the retry
/// policy consults [`Error::retryable`] and [`Error::is_terminal`] to decide
/// between backoff, restart and workflow failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing privileges (raw sockets, protected paths)
    #[error("Permission error: {0}")]
    Permission(String),

    /// Target spec that cannot be assessed (bad CIDR, bad port list)
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Network operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transport failure (refused, reset, unreachable, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// External port scanner failed or produced unusable output
    #[error("Scan error: {0}")]
    Scan(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the activity retry policy may re-run the activity.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Network(_) | Error::Scan(_)
        )
    }

    /// Whether this error fails the whole workflow regardless of phase.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::Permission(_) | Error::InvalidTarget(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn terminal_kinds_are_not_retryable() {
        let terminal = [
            Error::Configuration("bad".into()),
            Error::Permission("denied".into()),
            Error::InvalidTarget("999.0.0.1".into()),
        ];
        for e in terminal {
            assert!(e.is_terminal());
            assert!(!e.retryable());
        }
    }

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(Error::Timeout("probe".into()).retryable());
        assert!(Error::Network("refused".into()).retryable());
        assert!(Error::Scan("nmap exited 1".into()).retryable());
        assert!(!Error::Internal("bug".into()).retryable());
    }
}
