//! Shared cancellation/shutdown plumbing handed to every plugin.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Context passed to a plugin's `start`/`stop`.
///
/// Carries a cancellation token rooted at the manager: cancelling the root
/// cancels every child, letting a plugin's event loop observe shutdown via
/// `tokio::select!` without polling a shared flag.
#[derive(Clone)]
pub struct PluginContext {
    cancellation: CancellationToken,
    start_deadline: Duration,
}

impl PluginContext {
    pub fn new(cancellation: CancellationToken, start_deadline: Duration) -> Self {
        Self {
            cancellation,
            start_deadline,
        }
    }

    /// A child token, so a plugin can hand its own sub-scopes a token that
    /// is cancelled whenever the manager cancels, without being able to
    /// cancel the manager's token itself.
    pub fn child_token(&self) -> CancellationToken {
        self.cancellation.child_token()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn start_deadline(&self) -> Duration {
        self.start_deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_token_cancels_with_parent() {
        let root = CancellationToken::new();
        let ctx = PluginContext::new(root.clone(), Duration::from_secs(20));
        let child = ctx.child_token();
        assert!(!child.is_cancelled());
        root.cancel();
        assert!(child.is_cancelled());
        assert!(ctx.is_cancelled());
    }
}
