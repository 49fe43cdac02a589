//! Cooperative stop signal shared by the supervisor and both pumps.

use tokio_util::sync::CancellationToken;

/// Stop request for a connection or one of its attempts.
///
/// Once requested it stays requested. Child signals observe their parent's
/// request, but requesting a child leaves the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request stop. Idempotent.
    pub fn request(&self) {
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once stop is requested.
    pub async fn requested(&self) {
        self.token.cancelled().await
    }

    /// A signal that is also requested whenever this one is.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }
}
