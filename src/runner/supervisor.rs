//! Owner of fire-and-forget job tasks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

/// Keeps background job tasks alive until they finish; each task removes
/// itself from the set on completion.
#[derive(Clone, Default)]
pub struct JobSupervisor {
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl JobSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `fut` in the background under `job_id`.
    pub fn spawn<F>(&self, job_id: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job_id = job_id.into();
        let registry = self.tasks.clone();
        let id = job_id.clone();

        // Held across spawn + insert so a task that finishes immediately
        // cannot remove itself before it is registered.
        let mut tasks = self.tasks();
        let handle = tokio::spawn(async move {
            fut.await;
            registry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);
        });
        if let Some(previous) = tasks.insert(job_id.clone(), handle) {
            tracing::warn!(job_id = %job_id, "Replacing an existing background task");
            drop(previous);
        }
    }

    pub fn running_count(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.tasks().contains_key(job_id)
    }

    /// Wait for every outstanding task.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = self.tasks().drain().collect();
        if !handles.is_empty() {
            tracing::info!(count = handles.len(), "Waiting for background jobs");
        }
        let (ids, handles): (Vec<String>, Vec<JoinHandle<()>>) = handles.into_iter().unzip();
        for (job_id, result) in ids.iter().zip(futures::future::join_all(handles).await) {
            if let Err(e) = result {
                tracing::error!(job_id = %job_id, "Background job task failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for JobSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSupervisor")
            .field("running", &self.running_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn tasks_remove_themselves() {
        let sup = JobSupervisor::new();
        let (tx, rx) = oneshot::channel::<()>();
        sup.spawn("job-1", async move {
            let _ = rx.await;
        });
        assert_eq!(sup.running_count(), 1);
        assert!(sup.is_running("job-1"));

        tx.send(()).unwrap();
        for _ in 0..100 {
            if sup.running_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sup.running_count(), 0);
    }

    #[tokio::test]
    async fn immediate_completion_does_not_leak() {
        let sup = JobSupervisor::new();
        sup.spawn("fast", async {});
        sup.shutdown().await;
        tokio::task::yield_now().await;
        assert_eq!(sup.running_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_waits_for_outstanding_tasks() {
        let sup = JobSupervisor::new();
        let done = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let done = done.clone();
            sup.spawn(format!("job-{i}"), async move {
                tokio::time::sleep(Duration::from_millis(20 * (i + 1))).await;
                done.lock().unwrap().push(i);
            });
        }
        sup.shutdown().await;
        assert_eq!(done.lock().unwrap().len(), 3);
        assert_eq!(sup.running_count(), 0);
    }
}
