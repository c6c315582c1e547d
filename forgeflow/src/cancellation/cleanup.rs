//! Cleanup registry for releasing provisioned environments.

use parking_lot::RwLock;
use std::time::Duration;

/// A teardown callback with an optional name for diagnostics.
struct CleanupCallback {
    callback: Box<dyn Fn() + Send + Sync>,
    name: Option<String>,
}

/// Registry for teardown callbacks executed in LIFO order.
///
/// Stages register teardown (scratch removal, environment release) as
/// they acquire resources; the registry runs on failure and abort paths
/// so no provisioned environment outlives the invocation.
#[derive(Default)]
pub struct CleanupRegistry {
    callbacks: RwLock<Vec<CleanupCallback>>,
}

impl CleanupRegistry {
    /// Creates a new cleanup registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a teardown callback.
    pub fn register<F>(&self, callback: F, name: Option<&str>)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.write().push(CleanupCallback {
            callback: Box::new(callback),
            name: name.map(String::from),
        });
    }

    /// Unregisters callbacks by name.
    ///
    /// Returns true if at least one callback was removed.
    pub fn unregister_by_name(&self, name: &str) -> bool {
        let mut callbacks = self.callbacks.write();
        let initial_len = callbacks.len();
        callbacks.retain(|cb| cb.name.as_deref() != Some(name));
        callbacks.len() < initial_len
    }

    /// Runs all teardown callbacks in LIFO order.
    ///
    /// Each callback gets a portion of the total timeout. Failures are
    /// collected but never stop the remaining callbacks. The registry is
    /// cleared after completion.
    pub async fn run_all(&self, timeout_secs: f64) -> Vec<(String, String)> {
        let callbacks: Vec<CleanupCallback> = {
            let mut cbs = self.callbacks.write();
            std::mem::take(&mut *cbs)
        };

        if callbacks.is_empty() {
            return Vec::new();
        }

        let per_callback_timeout = (timeout_secs / callbacks.len() as f64).max(0.01);
        let mut failures = Vec::new();

        for entry in callbacks.into_iter().rev() {
            let name = entry.name.clone().unwrap_or_else(|| "<unnamed>".to_string());

            let result = tokio::time::timeout(
                Duration::from_secs_f64(per_callback_timeout),
                tokio::task::spawn_blocking(move || {
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        (entry.callback)();
                    }))
                }),
            )
            .await;

            match result {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(panic))) => {
                    let msg = format!("Teardown callback panicked: {panic:?}");
                    tracing::warn!("{}: {}", name, msg);
                    failures.push((name, msg));
                }
                Ok(Err(join_err)) => {
                    let msg = format!("Teardown task join error: {join_err}");
                    tracing::warn!("{}: {}", name, msg);
                    failures.push((name, msg));
                }
                Err(_) => {
                    let msg = "Teardown callback timed out".to_string();
                    tracing::warn!("{}: {}", name, msg);
                    failures.push((name, msg));
                }
            }
        }

        failures
    }

    /// Returns the number of pending teardown callbacks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Clears all registered callbacks without running them.
    pub fn clear(&self) {
        self.callbacks.write().clear();
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

/// A drop guard that runs teardown when the scope exits, unless disarmed.
///
/// Used to guarantee scratch release even when an `.await` point is
/// abandoned mid-stage.
pub struct CleanupGuard<C: FnOnce()> {
    cleanup: Option<C>,
}

impl<C: FnOnce()> CleanupGuard<C> {
    /// Creates an armed guard.
    #[must_use]
    pub fn new(cleanup: C) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    /// Disarms the guard; teardown will not run.
    pub fn disarm(&mut self) {
        self.cleanup = None;
    }
}

impl<C: FnOnce()> Drop for CleanupGuard<C> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}
