//! Approval seams: who says yes, and who gets told that someone should.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::notify::NotifyError;

/// Asks a human whether a gated tool call may run.
///
/// `description` is the rendered prompt, e.g. the command in a fenced block.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn approve(&self, description: &str) -> bool;
}

type ApproveFn = dyn Fn(String) -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync;

/// An [`ApprovalHandler`] backed by a closure returning a future.
pub struct FnApproval {
    f: Box<ApproveFn>,
}

impl FnApproval {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            f: Box::new(move |description| Box::pin(f(description))),
        }
    }

    /// A handler that always answers `answer`.
    pub fn always(answer: bool) -> Self {
        Self::new(move |_| async move { answer })
    }
}

#[async_trait]
impl ApprovalHandler for FnApproval {
    async fn approve(&self, description: &str) -> bool {
        (self.f)(description.to_string()).await
    }
}

/// Out-of-band notice that an approval is waiting.
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    async fn notify_pending(&self, tool_name: &str, command: &str) -> Result<(), NotifyError>;
}
