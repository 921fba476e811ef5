//! Scheduling and logging environment.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Where background work runs and where diagnostic lines go.
///
/// Constructed by the embedding application and handed to servers, clients
/// and connections; nothing in this workspace reaches for a global default.
#[derive(Debug, Clone)]
pub struct Env {
    name: Arc<str>,
    handle: Handle,
}

impl Env {
    /// Creates an environment that schedules onto `handle`.
    pub fn new(name: impl Into<Arc<str>>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    /// Creates an environment on the runtime of the calling task.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, Handle::current())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `work` on a new task.
    pub fn spawn<F>(&self, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(work)
    }

    /// Writes one diagnostic line.
    pub fn log(&self, line: impl fmt::Display) {
        tracing::warn!(env = %self.name, "{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_runs_work() {
        let env = Env::current("test");
        assert_eq!(env.name(), "test");
        let handle = env.spawn(async { 40 + 2 });
        assert_eq!(handle.await.unwrap(), 42);
    }
}
