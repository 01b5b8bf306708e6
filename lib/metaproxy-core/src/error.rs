use thiserror::Error;

pub type Result<T> = std::result::Result<T, DirectorError>;

/// Request-fatal failures of the director pipeline.
///
/// None of these are retried, and a request that produced one is never
/// handed to the transport.
#[derive(Error, Debug)]
pub enum DirectorError {
    #[error("Invalid proxy destination {destination:?}: {reason}")]
    DestinationParse { destination: String, reason: String },

    #[error("Host not allowed: {0}")]
    HostNotAllowed(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] SignError),
}

impl DirectorError {
    /// HTTP status returned to the caller for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            DirectorError::DestinationParse { .. } => 400,
            DirectorError::HostNotAllowed(_) => 403,
            DirectorError::Signing(e) if e.is_client_error() => 401,
            DirectorError::Signing(_) => 500,
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            DirectorError::DestinationParse { .. } => "bad_destination",
            DirectorError::HostNotAllowed(_) => "host_not_allowed",
            DirectorError::Signing(_) => "signing_failed",
        }
    }
}

/// Failures while turning a credential reference into request authentication.
///
/// Messages name credentials and fields, never secret values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignError {
    #[error("Missing parameter {0:?} in credential reference")]
    MissingParameter(String),

    #[error("Invalid parameter {name:?}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    #[error("Credential {credential} has no field {field:?}")]
    MissingField { credential: String, field: String },

    #[error("Credential store error: {0}")]
    Store(String),
}

impl SignError {
    /// Whether the failure stems from the caller's reference rather than the store
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SignError::Store(_))
    }
}
