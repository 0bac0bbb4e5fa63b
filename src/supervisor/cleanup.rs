//! Ordered teardown actions.

use crate::error::Result;

type Action<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

/// Teardown actions run in reverse order of registration.
///
/// Every action runs even if an earlier one failed; failures are logged
/// and dropped.
#[derive(Default)]
pub struct CleanupStack<'a> {
    actions: Vec<(&'static str, Action<'a>)>,
}

impl<'a> CleanupStack<'a> {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action to run on teardown.
    pub fn push<F>(&mut self, name: &'static str, action: F)
    where
        F: FnOnce() -> Result<()> + 'a,
    {
        self.actions.push((name, Box::new(action)));
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action, most recently registered first.
    pub fn run(mut self) {
        while let Some((name, action)) = self.actions.pop() {
            match action() {
                Ok(()) => tracing::debug!(step = name, "cleanup done"),
                Err(e) => tracing::warn!(step = name, error = %e, "cleanup failed"),
            }
        }
    }
}

impl Drop for CleanupStack<'_> {
    fn drop(&mut self) {
        // Only reached with pending actions when run() was skipped, e.g.
        // by a panic while the VM was running.
        if !self.actions.is_empty() {
            std::mem::take(self).run();
        }
    }
}
