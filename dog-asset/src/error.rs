use thiserror::Error;

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Errors that can occur during asset operations.
///
/// The four variants stay distinct all the way to the caller so a transport
/// layer can map them to its own status codes via [`AssetError::kind`].
#[derive(Error, Debug)]
pub enum AssetError {
    /// Malformed or out-of-range input. Raised before any filesystem mutation.
    #[error("Invalid request: {message}")]
    Validation { message: String },

    #[error("Asset not found: {what}")]
    NotFound { what: String },

    /// A filesystem operation failed after validation passed.
    #[error("Storage error while {op}: {source}")]
    Storage {
        op: String,
        #[source]
        source: std::io::Error,
    },

    /// Image decode/encode failed during an explicitly requested transform.
    #[error("Transform failed: {reason}")]
    Transform {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Coarse classification of an [`AssetError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetErrorKind {
    Validation,
    NotFound,
    Storage,
    Transform,
}

impl AssetErrorKind {
    /// HTTP-equivalent status code for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            AssetErrorKind::Validation => 400,
            AssetErrorKind::NotFound => 404,
            AssetErrorKind::Transform => 422,
            AssetErrorKind::Storage => 500,
        }
    }

    /// Whether the request was rejected before any write happened
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl AssetError {
    /// Create a validation error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Wrap an I/O failure with the operation that was being attempted
    pub fn storage<S: Into<String>>(op: S, source: std::io::Error) -> Self {
        Self::Storage {
            op: op.into(),
            source,
        }
    }

    /// Create a transform error from a codec failure
    pub fn transform<S, E>(reason: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transform {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transform error without an underlying cause
    pub fn transform_msg<S: Into<String>>(reason: S) -> Self {
        Self::Transform {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> AssetErrorKind {
        match self {
            AssetError::Validation { .. } => AssetErrorKind::Validation,
            AssetError::NotFound { .. } => AssetErrorKind::NotFound,
            AssetError::Storage { .. } => AssetErrorKind::Storage,
            AssetError::Transform { .. } => AssetErrorKind::Transform,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound { .. })
    }
}
