// src/lifetime.rs
//
// Cancellable lifetime scopes.
//
// The process owns a root `Lifetime`; each bus session runs under a child of
// it. Cancelling a scope cancels every scope nested beneath it. The flag is a
// plain atomic so blocking receive threads can poll it between reads, and a
// `Notify` wakes async waiters such as the publisher ticker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(
            &mut *self
                .children
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// A cloneable cancellation scope. Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct Lifetime {
    inner: Arc<Inner>,
}

impl Lifetime {
    /// Create a new root scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope nested under this one.
    /// A child of an already-cancelled scope starts out cancelled.
    pub fn child(&self) -> Lifetime {
        let child = Lifetime::new();
        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Checked after registering so a concurrent cancel() can't be missed
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancel this scope and all of its descendants. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until this scope is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_propagates_to_children() {
        let root = Lifetime::new();
        let child = root.child();
        let grandchild = child.child();

        root.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancel_leaves_parent_running() {
        let root = Lifetime::new();
        let child = root.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());

        // A fresh child of the still-running parent is live
        assert!(!root.child().is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_scope_is_cancelled() {
        let root = Lifetime::new();
        root.cancel();
        assert!(root.child().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let root = Lifetime::new();
        let child = root.child();
        let waiter = tokio::spawn({
            let child = child.clone();
            async move { child.cancelled().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        root.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .expect("waiter panicked");
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let root = Lifetime::new();
        root.cancel();
        tokio::time::timeout(Duration::from_millis(100), root.cancelled())
            .await
            .expect("should not wait");
    }
}
