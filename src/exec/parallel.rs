//! Bounded parallel execution
//!
//! Runs a batch of tasks with a concurrency cap and returns one outcome per
//! input, in input order. A failing or panicking task never aborts its
//! siblings.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::Result;

/// Per-slot result of a bounded batch
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Fulfilled(T),
    Rejected(String),
}

impl<T> TaskOutcome<T> {
    pub fn fulfilled(self) -> Option<T> {
        match self {
            TaskOutcome::Fulfilled(value) => Some(value),
            TaskOutcome::Rejected(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, TaskOutcome::Rejected(_))
    }
}

/// Drive at most `cap` tasks concurrently, collecting outcomes in input order.
pub async fn run_bounded<T, F>(tasks: Vec<F>, cap: usize) -> Vec<TaskOutcome<T>>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(cap.max(1)));
    let mut handles = Vec::with_capacity(tasks.len());

    for task in tasks {
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
        handles.push(tokio::spawn(async move {
            let result = task.await;
            drop(permit);
            result
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = match handle.await {
            Ok(Ok(value)) => TaskOutcome::Fulfilled(value),
            Ok(Err(e)) => TaskOutcome::Rejected(e.to_string()),
            Err(e) => TaskOutcome::Rejected(format!("task panicked: {}", e)),
        };
        outcomes.push(outcome);
    }
    outcomes
}
