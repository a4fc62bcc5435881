//! Stacked teardown actions, released last-acquired-first.

use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, warn};

use crate::registry::panic_message;

type Action = Box<dyn FnOnce() + Send>;

/// LIFO stack of release actions.
///
/// Dropping the stack runs whatever is still on it, so resources are released
/// whether or not `run_all` was called explicitly.
#[derive(Default)]
pub struct CleanupStack {
    actions: Vec<(String, Action)>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.actions.push((label.into(), Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action, most recent first. Returns how many ran.
    ///
    /// A panicking action is logged; the rest still run.
    pub fn run_all(&mut self) -> usize {
        let mut ran = 0;
        while let Some((label, action)) = self.actions.pop() {
            debug!(component = %label, "Releasing component resource");
            if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
                warn!(
                    component = %label,
                    reason = %panic_message(payload.as_ref()),
                    "Teardown action panicked"
                );
            }
            ran += 1;
        }
        ran
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        self.run_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::new();
        for i in 0..3 {
            let log = log.clone();
            stack.push(format!("c{i}"), move || log.lock().unwrap().push(i));
        }

        assert_eq!(stack.run_all(), 3);
        assert_eq!(*log.lock().unwrap(), vec![2, 1, 0]);
        assert!(stack.is_empty());
        assert_eq!(stack.run_all(), 0);
    }

    #[test]
    fn drop_releases_remaining() {
        let released = Arc::new(Mutex::new(false));
        {
            let mut stack = CleanupStack::new();
            let flag = released.clone();
            stack.push("conn", move || *flag.lock().unwrap() = true);
        }
        assert!(*released.lock().unwrap());
    }

    #[test]
    fn panicking_action_does_not_stop_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::new();
        let first = log.clone();
        stack.push("a", move || first.lock().unwrap().push("a"));
        stack.push("b", || panic!("close failed"));

        assert_eq!(stack.run_all(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }
}
