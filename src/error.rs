/// Every failure the dispatch core can report.
///
/// Errors raised by plugins travel up unchanged; only the dispatch core
/// turns them into a response status.
#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("malformed operation: {0}")]
    MalformedRequest(String),

    #[error("\"{field}\" {reason}")]
    InvalidArgument { field: String, reason: String },

    /// Missing key and foreign controller share this variant.
    #[error("Key \"{0}\" not found.")]
    NotFound(String),

    #[error("Key \"{0}\" already exists.")]
    AlreadyExists(String),

    #[error("Unknown key type \"{0}\".")]
    UnsupportedKeyType(String),

    #[error("Unsupported key algorithm \"{0}\".")]
    UnsupportedAlgorithm(String),

    #[error("Method \"{0}\" is not supported.")]
    UnsupportedOperation(String),

    #[error("Plugin \"{0}\" is not registered.")]
    UnknownPlugin(String),

    #[error("provider failure: {0}")]
    ProviderFailure(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, KmsError>;

impl KmsError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        KmsError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable name used in error bodies.
    pub fn name(&self) -> &'static str {
        match self {
            KmsError::AuthenticationFailed(_) => "AuthenticationFailed",
            KmsError::MalformedRequest(_) => "MalformedRequest",
            KmsError::InvalidArgument { .. } => "InvalidArgument",
            KmsError::NotFound(_) => "NotFound",
            KmsError::AlreadyExists(_) => "AlreadyExists",
            KmsError::UnsupportedKeyType(_) => "UnsupportedKeyType",
            KmsError::UnsupportedAlgorithm(_) => "UnsupportedAlgorithm",
            KmsError::UnsupportedOperation(_) => "UnsupportedOperation",
            KmsError::UnknownPlugin(_) => "UnknownPlugin",
            KmsError::ProviderFailure(_) => "ProviderFailure",
        }
    }
}
