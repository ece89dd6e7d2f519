//! Per-invocation cancellation.
//!
//! A `Context` is created by the command layer and threaded through every
//! call that reaches an external service. Cancelling it (Ctrl-C or the
//! `--timeout` deadline) makes every guarded call return `Error::Cancelled`
//! at its next suspension point.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `fut` unless the context is cancelled first.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        }
    }

    /// Sleep for `duration`, returning early with `Error::Cancelled`.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.guard(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    /// Cancel on Ctrl-C or once `timeout` elapses.
    ///
    /// The returned handle must be aborted when the command finishes.
    pub fn watch(&self, timeout: Option<Duration>) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            let deadline = async {
                match timeout {
                    Some(t) => tokio::time::sleep(t).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => warn!("interrupted, cancelling"),
                _ = deadline => warn!("deadline reached, cancelling"),
                _ = token.cancelled() => {
                    debug!("context cancelled");
                    return;
                }
            }
            token.cancel();
        })
    }
}
