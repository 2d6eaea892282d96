//! Structured fan-out for the retrieval branches of a turn.
//!
//! Each branch runs as its own spawned task bounded by its own timeout. The
//! caller awaits every handle and gets a [`BranchOutcome`] back; an error, a
//! timeout and a panic all look the same to it (no value) and never touch
//! sibling branches.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// How a branch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchOutcome<T> {
    Completed(T),
    /// Not launched (e.g. no enricher configured)
    Skipped,
    Failed(String),
    TimedOut(Duration),
}

impl<T> BranchOutcome<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Why there is no value, for failed or timed-out branches.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Failed(reason) => Some(reason.clone()),
            Self::TimedOut(after) => Some(format!("timed out after {}ms", after.as_millis())),
            Self::Completed(_) | Self::Skipped => None,
        }
    }
}

/// A launched branch.
pub struct Branch<T> {
    pub name: &'static str,
    handle: Option<JoinHandle<Option<Result<T, String>>>>,
    timeout: Duration,
}

impl<T: Send + 'static> Branch<T> {
    /// Spawn `fut` as a named task, cancelled once `timeout` elapses.
    pub fn spawn<F, E>(name: &'static str, timeout: Duration, fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Display,
    {
        let task = async move {
            tokio::time::timeout(timeout, fut)
                .await
                .ok()
                .map(|result| result.map_err(|e| e.to_string()))
        };
        let handle = tokio::spawn(task.instrument(tracing::debug_span!("branch", name)));
        Self {
            name,
            handle: Some(handle),
            timeout,
        }
    }

    /// A branch that was never launched.
    pub fn skipped(name: &'static str) -> Self {
        Self {
            name,
            handle: None,
            timeout: Duration::ZERO,
        }
    }

    /// Wait for the branch to finish.
    pub async fn join(self) -> BranchOutcome<T> {
        let Some(handle) = self.handle else {
            return BranchOutcome::Skipped;
        };
        match handle.await {
            Ok(Some(Ok(value))) => BranchOutcome::Completed(value),
            Ok(Some(Err(reason))) => BranchOutcome::Failed(reason),
            Ok(None) => BranchOutcome::TimedOut(self.timeout),
            Err(join_error) if join_error.is_panic() => BranchOutcome::Failed("branch panicked".into()),
            Err(join_error) => BranchOutcome::Failed(join_error.to_string()),
        }
    }
}
