//! Cancellation of blocking store work
//!
//! Store reads run on the blocking pool, where dropping the awaiting
//! `JoinHandle` does not stop them. The awaiting future holds a
//! [`CancelOnDrop`]; once it is dropped the token fires, SQLite statements
//! registered through [`Cancellation::register`] are interrupted, and
//! long-running loops stop at their next [`Cancellation::is_cancelled`] check.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    hooks: Mutex<Vec<(u64, Hook)>>,
}

impl Inner {
    fn hooks(&self) -> MutexGuard<'_, Vec<(u64, Hook)>> {
        self.hooks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Shared cancellation token for one piece of request work
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fire the token; hooks run once, on the calling thread
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        for (_, hook) in self.inner.hooks().iter() {
            hook();
        }
    }

    /// Run `hook` on cancellation for as long as the returned registration lives
    ///
    /// Registering on an already cancelled token runs the hook immediately.
    pub fn register(&self, hook: impl Fn() + Send + Sync + 'static) -> Registration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut hooks = self.inner.hooks();
        if self.is_cancelled() {
            drop(hooks);
            hook();
        } else {
            hooks.push((id, Box::new(hook)));
        }
        Registration {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Guard that cancels this token when dropped
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Keeps a cancellation hook installed; removes it on drop
#[must_use = "the hook is removed as soon as the registration is dropped"]
pub struct Registration {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.inner.hooks().retain(|(id, _)| *id != self.id);
    }
}

/// Cancels its token when dropped
#[must_use = "the token is cancelled as soon as the guard is dropped"]
pub struct CancelOnDrop(Cancellation);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&count);
        (count, move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_hooks_run_once_on_cancel() {
        let cancel = Cancellation::new();
        let (count, hook) = counter();
        let _registration = cancel.register(hook);

        assert!(!cancel.is_cancelled());
        cancel.cancel();
        cancel.cancel();

        assert!(cancel.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_registration_is_not_run() {
        let cancel = Cancellation::new();
        let (count, hook) = counter();
        drop(cancel.register(hook));

        cancel.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_register_after_cancel_runs_immediately() {
        let cancel = Cancellation::new();
        cancel.cancel();

        let (count, hook) = counter();
        let _registration = cancel.register(hook);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_guard_cancels_clones() {
        let cancel = Cancellation::new();
        let worker_view = cancel.clone();
        {
            let _guard = cancel.drop_guard();
            assert!(!worker_view.is_cancelled());
        }
        assert!(worker_view.is_cancelled());
    }
}
