//! Error type for the collaborator services.

/// Errors from code execution and snippet storage.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A save request lacked one of email, name, code or language.
    #[error("missing required fields")]
    MissingFields,

    /// A request parameter was present but empty.
    #[error("invalid {0}")]
    Invalid(&'static str),

    /// The user already has a snippet with this name.
    #[error("code name '{name}' already exists for user '{email}'")]
    Duplicate { email: String, name: String },

    #[error("code not found: {0}")]
    NotFound(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The execution service failed or answered with something unusable.
    #[error("execution service: {0}")]
    Upstream(String),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
