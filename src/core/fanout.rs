//! Run one task per partition concurrently.
//!
//! Partitions are usually regions, sometimes keys. Every task is spawned up
//! front and every handle is awaited before returning, so no task is aborted
//! because another one failed. Each task owns its result until it is joined;
//! nothing is shared between tasks.
//!
//! Results keep the input order regardless of completion order.

use std::future::Future;

use tracing::warn;

use crate::core::context::Context;
use crate::error::{Error, RegionFailure, Result};

/// Ordered outcome of a fan-out.
#[derive(Debug)]
pub struct FanOut<T> {
    outcomes: Vec<(String, Result<T>)>,
}

/// Spawn `task(partition)` for every partition and join them all.
pub async fn fan_out<P, F, Fut, T>(ctx: &Context, partitions: P, task: F) -> FanOut<T>
where
    P: IntoIterator,
    P::Item: Into<String>,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let tasks: Vec<(String, Fut)> = partitions
        .into_iter()
        .map(|p| {
            let partition: String = p.into();
            let fut = task(partition.clone());
            (partition, fut)
        })
        .collect();
    spawn_all(ctx, tasks).await
}

/// Spawn already labelled tasks and join them all.
///
/// Labels are only used for logging and reporting; they need not be unique.
/// Every failure is logged as it is collected.
pub async fn spawn_all<I, Fut, T>(ctx: &Context, tasks: I) -> FanOut<T>
where
    I: IntoIterator<Item = (String, Fut)>,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = tasks
        .into_iter()
        .map(|(partition, fut)| {
            let ctx = ctx.clone();
            let handle = tokio::spawn(async move { ctx.guard(fut).await });
            (partition, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (partition, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(Error::Cancelled),
        };
        if let Err(e) = &result {
            warn!(partition = %partition, error = %e, "task failed");
        }
        outcomes.push((partition, result));
    }
    FanOut { outcomes }
}

impl<T> FanOut<T> {
    pub fn outcomes(&self) -> &[(String, Result<T>)] {
        &self.outcomes
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|(_, r)| r.is_err())
    }

    /// Successes and failures, each in input order.
    pub fn split(self) -> (Vec<(String, T)>, Vec<RegionFailure>) {
        let mut ok = Vec::new();
        let mut failed = Vec::new();
        for (partition, result) in self.outcomes {
            match result {
                Ok(v) => ok.push((partition, v)),
                Err(e) => failed.push(RegionFailure {
                    region: partition,
                    error: Box::new(e),
                }),
            }
        }
        (ok, failed)
    }

    /// All results, or the first error in input order.
    pub fn all(self) -> Result<Vec<(String, T)>> {
        self.outcomes
            .into_iter()
            .map(|(partition, result)| result.map(|v| (partition, v)))
            .collect()
    }

    /// All results, or `Error::PartialFailure` naming every failed partition.
    pub fn all_or_partial(self) -> Result<Vec<(String, T)>> {
        let (ok, failed) = self.split();
        if failed.is_empty() {
            Ok(ok)
        } else {
            Err(Error::PartialFailure { failed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CloudError, ErrorKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn regions() -> Vec<&'static str> {
        vec!["a", "b", "c"]
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_partitions() {
        let ctx = Context::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let out = fan_out(&ctx, regions(), |r| {
            let finished = finished.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                if r == "b" {
                    Err(CloudError::service("Op", "boom").into())
                } else {
                    Ok(r.to_uppercase())
                }
            }
        })
        .await;

        assert_eq!(finished.load(Ordering::SeqCst), 3);
        let (ok, failed) = out.split();
        assert_eq!(
            ok,
            vec![("a".to_string(), "A".to_string()), ("c".to_string(), "C".to_string())]
        );
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].region, "b");
    }

    #[tokio::test]
    async fn test_order_follows_input_not_completion() {
        let ctx = Context::new();
        let out = fan_out(&ctx, regions(), |r| async move {
            let delay = match r.as_str() {
                "a" => 30,
                "b" => 10,
                _ => 0,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(r)
        })
        .await;
        let names: Vec<String> = out.all().unwrap().into_iter().map(|(_, v)| v).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_all_or_partial_names_every_failure() {
        let ctx = Context::new();
        let out = fan_out(&ctx, regions(), |r| async move {
            if r == "a" {
                Ok(())
            } else {
                Err(CloudError::service("Op", r).into())
            }
        })
        .await;
        let err = out.all_or_partial().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        match err {
            Error::PartialFailure { failed } => {
                let names: Vec<&str> = failed.iter().map(|f| f.region.as_str()).collect();
                assert_eq!(names, vec!["b", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_all_returns_first_error_in_input_order() {
        let ctx = Context::new();
        let out = fan_out(&ctx, regions(), |r| async move {
            if r == "a" {
                Ok(())
            } else {
                Err(CloudError::service("Op", format!("failed in {r}")).into())
            }
        })
        .await;
        assert!(out.has_failures());
        let err = out.all().unwrap_err();
        assert!(err.to_string().contains("failed in b"));
    }

    #[tokio::test]
    async fn test_cancellation_reaches_every_partition() {
        let ctx = Context::new();
        ctx.cancel();
        let out = fan_out(&ctx, regions(), |_| std::future::pending::<Result<()>>()).await;
        assert!(out
            .outcomes()
            .iter()
            .all(|(_, r)| matches!(r, Err(Error::Cancelled))));
    }
}
