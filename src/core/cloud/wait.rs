//! Waiting for stacks to settle.
//!
//! Stack creation and deletion are asynchronous on the provider side. The
//! bindings report the raw status string each time they are polled; this
//! module decides what it means and owns the deadline.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::core::context::Context;
use crate::error::{CloudError, Result};

/// Reported for a stack that vanished while it was being created.
pub const GONE_STATUS: &str = "DELETED";

/// Where a stack stands with respect to the operation being waited on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackPhase {
    InProgress,
    /// Settled successfully; carries the stack outputs
    Done(BTreeMap<String, String>),
    /// Settled in a terminal status other than the one wanted
    Failed(String),
}

/// Interpret a status while waiting for creation. `None` means the stack no
/// longer exists.
pub fn creation_phase(status: Option<&str>, outputs: BTreeMap<String, String>) -> StackPhase {
    match status {
        Some("CREATE_COMPLETE") => StackPhase::Done(outputs),
        Some("CREATE_IN_PROGRESS") => StackPhase::InProgress,
        Some(other) => StackPhase::Failed(other.to_string()),
        None => StackPhase::Failed(GONE_STATUS.to_string()),
    }
}

/// Interpret a status while waiting for deletion.
pub fn deletion_phase(status: Option<&str>) -> StackPhase {
    match status {
        None | Some("DELETE_COMPLETE") => StackPhase::Done(BTreeMap::new()),
        Some("DELETE_FAILED") => StackPhase::Failed("DELETE_FAILED".to_string()),
        Some(_) => StackPhase::InProgress,
    }
}

/// Poll `phase` every `interval` until the stack settles.
///
/// Fails with `CloudError::StackFailed` on a failed phase and with
/// `CloudError::Timeout` once `timeout` has passed without settling.
/// Cancelling `ctx` interrupts the wait between polls.
pub async fn wait_for_stack<F, Fut>(
    ctx: &Context,
    operation: &'static str,
    stack: &str,
    timeout: Duration,
    interval: Duration,
    mut phase: F,
) -> Result<BTreeMap<String, String>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<StackPhase>>,
{
    let started = Instant::now();
    loop {
        match phase().await? {
            StackPhase::Done(outputs) => return Ok(outputs),
            StackPhase::Failed(status) => {
                return Err(CloudError::StackFailed {
                    stack: stack.to_string(),
                    status,
                }
                .into())
            }
            StackPhase::InProgress => {}
        }
        if started.elapsed() >= timeout {
            return Err(CloudError::Timeout {
                operation,
                seconds: timeout.as_secs(),
            }
            .into());
        }
        trace!(stack, operation, "stack still in progress");
        ctx.sleep(interval).await?;
    }
}
