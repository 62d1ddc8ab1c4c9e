//! Ownership of every worker the ingestion path starts.
//!
//! A [`Lifecycle`] carries the shutdown token, the runtime tasks are spawned
//! on, and the join handles of both tokio tasks and dedicated OS threads.
//! [`Lifecycle::shutdown`] cancels the token and waits for all of them.

use std::future::Future;
use std::io;
use std::thread;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct Lifecycle {
    cancel: CancellationToken,
    runtime: Handle,
    tasks: Vec<JoinHandle<()>>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl Lifecycle {
    pub fn new(runtime: Handle) -> Self {
        Self::with_token(CancellationToken::new(), runtime)
    }

    /// Lifecycle on the ambient tokio runtime. Panics outside a runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn with_token(cancel: CancellationToken, runtime: Handle) -> Self {
        Self {
            cancel,
            runtime,
            tasks: Vec::new(),
            threads: Vec::new(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Token cancelled together with this lifecycle.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(self.runtime.spawn(future));
    }

    /// Adopts a task spawned elsewhere.
    pub fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn spawn_thread<F>(&mut self, name: &str, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_owned()).spawn(f)?;
        self.threads.push(handle);
        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.tasks.len() + self.threads.len()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels every worker and waits for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        let threads = std::mem::take(&mut self.threads);
        let joined = tokio::task::spawn_blocking(move || {
            let mut panicked = 0usize;
            for handle in threads {
                let name = handle.thread().name().unwrap_or("unnamed").to_owned();
                if handle.join().is_err() {
                    warn!(thread = %name, "worker thread panicked");
                    panicked += 1;
                }
            }
            panicked
        })
        .await;
        match joined {
            Ok(panicked) => debug!(panicked, "lifecycle shut down"),
            Err(e) => warn!(error = %e, "failed to join worker threads"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_stops_tasks_and_threads() {
        let mut lifecycle = Lifecycle::current();
        let stopped = Arc::new(AtomicUsize::new(0));

        let token = lifecycle.child_token();
        let counter = Arc::clone(&stopped);
        lifecycle.spawn(async move {
            token.cancelled().await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let token = lifecycle.child_token();
        let counter = Arc::clone(&stopped);
        lifecycle
            .spawn_thread("test-worker", move || {
                while !token.is_cancelled() {
                    thread::sleep(Duration::from_millis(1));
                }
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(lifecycle.workers(), 2);
        lifecycle.shutdown().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }
}
