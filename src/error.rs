// Error types for the Access Control Enforcer

use thiserror::Error;

/// Result type alias for enforcer operations
pub type AceResult<T> = Result<T, AceError>;

/// Main error type for enforcer operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AceError {
    /// A rule source prerequisite is structurally missing (e.g. no logical
    /// channel support on an old element).
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Access rule source not present: {0}")]
    ElementAbsent(String),

    #[error("Rule engine failure: {0}")]
    RuleEngineFailure(String),

    #[error("Invalid application identity: {0}")]
    InvalidIdentity(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid security profile: {0}")]
    InvalidProfile(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AceError {
    /// Message carried by the error, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            AceError::ResourceUnavailable(m)
            | AceError::ElementAbsent(m)
            | AceError::RuleEngineFailure(m)
            | AceError::InvalidIdentity(m)
            | AceError::PackageNotFound(m)
            | AceError::AccessDenied(m)
            | AceError::InvalidProfile(m)
            | AceError::Internal(m) => m,
        }
    }
}

impl From<std::io::Error> for AceError {
    fn from(err: std::io::Error) -> Self {
        AceError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AceError {
    fn from(err: serde_json::Error) -> Self {
        AceError::InvalidProfile(format!("JSON error: {}", err))
    }
}

/// Outcome of a failed rule source initialization.
///
/// The fallback state machine matches on these variants to decide whether to
/// move on to the next source, abort, or fail closed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("No rule source present: {0}")]
    ElementAbsent(String),

    #[error("{0}")]
    Failed(String),
}

impl From<SourceError> for AceError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::ResourceUnavailable(m) => AceError::ResourceUnavailable(m),
            SourceError::ElementAbsent(m) => AceError::ElementAbsent(m),
            SourceError::Failed(m) => AceError::RuleEngineFailure(m),
        }
    }
}

/// Stable numeric codes, used as process exit status by front ends
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AceErrorCode {
    Success = 0,
    ResourceUnavailable = 1,
    ElementAbsent = 2,
    RuleEngineFailure = 3,
    InvalidIdentity = 4,
    PackageNotFound = 5,
    AccessDenied = 6,
    InvalidProfile = 7,
    Internal = 8,
}

impl From<&AceError> for AceErrorCode {
    fn from(error: &AceError) -> Self {
        match error {
            AceError::ResourceUnavailable(_) => AceErrorCode::ResourceUnavailable,
            AceError::ElementAbsent(_) => AceErrorCode::ElementAbsent,
            AceError::RuleEngineFailure(_) => AceErrorCode::RuleEngineFailure,
            AceError::InvalidIdentity(_) => AceErrorCode::InvalidIdentity,
            AceError::PackageNotFound(_) => AceErrorCode::PackageNotFound,
            AceError::AccessDenied(_) => AceErrorCode::AccessDenied,
            AceError::InvalidProfile(_) => AceErrorCode::InvalidProfile,
            AceError::Internal(_) => AceErrorCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_classification() {
        let err: AceError = SourceError::Failed("bad response".to_string()).into();
        assert_eq!(err, AceError::RuleEngineFailure("bad response".to_string()));

        let err: AceError = SourceError::ResourceUnavailable("no channel".to_string()).into();
        assert_eq!(AceErrorCode::from(&err), AceErrorCode::ResourceUnavailable);
        assert_eq!(err.message(), "no channel");
    }

    #[test]
    fn test_error_display() {
        let err = AceError::AccessDenied("no APDU access allowed!".to_string());
        assert_eq!(err.to_string(), "Access denied: no APDU access allowed!");
        assert_eq!(AceErrorCode::from(&err) as u32, 6);
    }
}
