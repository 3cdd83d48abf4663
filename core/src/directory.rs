//! User-existence check consumed from the identity collaborator.

use crate::types::UserId;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// The directory could not answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("User directory error: {0}")]
pub struct DirectoryError(pub String);

/// Answers "does this user exist?" before an enrollment is attempted.
pub trait UserDirectory: Send + Sync {
    /// Whether `user_id` is a known user.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the collaborator is unreachable.
    fn user_exists(
        &self,
        user_id: UserId,
    ) -> Pin<Box<dyn Future<Output = Result<bool, DirectoryError>> + Send + '_>>;
}

/// Stub directory that knows every user.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllUsers;

impl UserDirectory for AllowAllUsers {
    fn user_exists(
        &self,
        _user_id: UserId,
    ) -> Pin<Box<dyn Future<Output = Result<bool, DirectoryError>> + Send + '_>> {
        Box::pin(async { Ok(true) })
    }
}
