use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A finished task, tagged with the key it was submitted under.
#[derive(Debug)]
pub struct Completion<K, T> {
    pub key: K,
    pub result: Result<T, String>,
}

/// Bounded pool: at most `concurrency` submitted futures run at once and
/// completions come back in the order they finish.
pub struct WorkerPool<K, T> {
    slots: Arc<Semaphore>,
    tasks: JoinSet<Completion<K, T>>,
}

impl<K, T> WorkerPool<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    pub fn new(concurrency: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Queues `task`; it starts once a slot frees up. A panic inside the task
    /// is caught and reported as the completion's error.
    pub fn submit<F>(&mut self, key: K, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let slots = self.slots.clone();
        self.tasks.spawn(async move {
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return Completion {
                        key,
                        result: Err("worker pool closed".to_string()),
                    }
                }
            };
            let result = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(panic_message);
            Completion { key, result }
        });
    }

    /// Next finished task, or `None` once every submitted task was returned.
    pub async fn next_completed(&mut self) -> Option<Completion<K, T>> {
        loop {
            match self.tasks.join_next().await? {
                Ok(completion) => return Some(completion),
                // 只有 abort 才會到這裡，pool 本身從不 abort
                Err(err) => tracing::error!("worker task ended abnormally: {}", err),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", message)
    } else {
        "worker panicked".to_string()
    }
}
