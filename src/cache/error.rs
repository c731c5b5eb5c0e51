use thiserror::Error;

/// Error carried by binding state and returned from fetch/mutation paths.
///
/// Cloneable on purpose: the same error lives in a binding's local state and
/// in the snapshots handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query fetch failed: {message}")]
    Fetch { message: String },
    #[error("mutation failed: {message}")]
    Mutation { message: String },
}

impl QueryError {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    pub fn mutation(message: impl Into<String>) -> Self {
        Self::Mutation {
            message: message.into(),
        }
    }

    /// The underlying message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Fetch { message } | Self::Mutation { message } => message,
        }
    }
}
