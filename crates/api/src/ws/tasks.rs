use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::task::JoinHandle;

/// Registry of one session's in-flight background tasks.
///
/// Each spawned task removes its own entry when it finishes; `abort_all`
/// cancels whatever is still running at shutdown and awaits every handle,
/// suppressing cancellation and panics, so no task is left mid-flight when
/// teardown proceeds.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    tasks: DashMap<u64, JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            future.await;
            inner.tasks.remove(&id);
        });
        self.inner.tasks.insert(id, handle);
    }

    /// Cancels every registered task and joins them in bulk. Join errors
    /// (cancellation, panics) are swallowed; a task's observable output is
    /// already gated on the session's closing flag.
    pub async fn abort_all(&self) {
        let keys: Vec<u64> = self.inner.tasks.iter().map(|entry| *entry.key()).collect();
        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, handle)) = self.inner.tasks.remove(&key) {
                handle.abort();
                handles.push(handle);
            }
        }
        let _ = futures::future::join_all(handles).await;
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.is_empty()
    }
}
