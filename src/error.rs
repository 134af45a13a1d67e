use thiserror::Error;

/// Errors surfaced by the user entity and its store.
///
/// `Validation` and `Conflict` are caller mistakes and map to 4xx at the HTTP
/// edge (out of scope here); `Signing` and `Database` are infrastructure
/// failures that propagate.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{field} already in use")]
    Conflict { field: &'static str },

    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl UserError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
