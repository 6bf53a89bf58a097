use async_trait::async_trait;

use crate::domain::subscriber_email::SubscriberEmail;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Business result of a save attempt. A duplicate is not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Duplicate,
}

/// The `Display` output is safe to hand back to the visitor. Whatever caused the
/// failure is only reachable through `source()` and `Debug`.
#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("Invalid email format")]
    InvalidFormat(String),
    #[error("We could not save your subscription right now. Please try again later.")]
    IoFailure(#[source] BoxError),
    #[error("An error occurred. Please try again.")]
    Unexpected(#[source] BoxError),
}

impl StoreError {
    pub fn io(err: impl Into<BoxError>) -> Self {
        StoreError::IoFailure(err.into())
    }

    pub fn unexpected(err: impl Into<BoxError>) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::InvalidFormat(detail) => write!(f, "{}\nCaused by:\n\t{}", self, detail),
            StoreError::IoFailure(source) | StoreError::Unexpected(source) => {
                write!(f, "{}\nCaused by:\n\t{}", self, source)?;

                let mut current = source.source();
                while let Some(cause) = current {
                    write!(f, "\n\t{}", cause)?;
                    current = cause.source();
                }

                Ok(())
            }
        }
    }
}

/// Persistence boundary for subscribers. Implementations are the only writers of
/// their backing storage and guarantee that no two records share an email when
/// compared case-insensitively.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Appends `email` unless an equal address (ignoring case) is already stored.
    async fn insert_if_absent(&self, email: &SubscriberEmail) -> Result<Outcome, StoreError>;

    async fn save(&self, email: &str) -> Result<Outcome, StoreError> {
        let email =
            SubscriberEmail::parse(email.to_string()).map_err(StoreError::InvalidFormat)?;

        self.insert_if_absent(&email).await
    }
}
