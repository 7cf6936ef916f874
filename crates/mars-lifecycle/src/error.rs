use thiserror::Error;

/// Errors a [`crate::SessionDecref::decref`] call can raise. Most are benign races between a
/// handle's cleanup callback and the session/actor/key it refers to going away on its own;
/// those are swallowed by the runner rather than surfaced, matching §4.3's policy.
#[derive(Debug, Error)]
pub enum DecrefError {
    #[error("session already gone")]
    SessionGone,
    #[error("connection lost")]
    ConnectionLost,
    #[error("actor missing")]
    ActorMissing,
    #[error("key already released")]
    AlreadyReleased,
    #[error("decref failed: {0}")]
    Other(String),
}

impl DecrefError {
    /// Whether this error should be treated as "done" rather than propagated to the caller's
    /// completion future.
    pub fn is_swallowed(&self) -> bool {
        matches!(
            self,
            DecrefError::SessionGone
                | DecrefError::ConnectionLost
                | DecrefError::ActorMissing
                | DecrefError::AlreadyReleased
        )
    }
}
