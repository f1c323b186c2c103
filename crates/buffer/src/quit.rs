//! Cooperative cancellation shared by every producer of one identification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::Notify;

use crate::error::BufferError;

/// Cancellation token.
///
/// Clones share state. [`Quit::child`] derives a token that fires when its
/// parent fires but can also be fired on its own without touching the parent,
/// which lets an owner stop the work it started while leaving the caller's
/// token alone.
#[derive(Clone, Default)]
pub struct Quit {
    inner: Arc<Inner>,
}

#[derive(Default)]
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
        let children = {
            let mut guard = self
                .children
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

impl Quit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token (or any ancestor) has fired.
    pub async fn cancelled(&self) {
        loop {
            // Created before the flag check so a concurrent cancel cannot slip
            // between the check and the wait.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Derive a token that is cancelled with `self`.
    pub fn child(&self) -> Quit {
        let child = Quit::new();
        {
            let mut guard = self
                .inner
                .children
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.retain(|weak| weak.strong_count() > 0);
            guard.push(Arc::downgrade(&child.inner));
        }
        // A cancel racing the push may already have drained the child list.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<(), BufferError> {
        if self.is_cancelled() {
            Err(BufferError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for Quit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quit")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Replaceable slot holding the token a buffer should honour.
#[derive(Default)]
pub(crate) struct QuitSlot(RwLock<Option<Quit>>);

impl QuitSlot {
    pub(crate) fn set(&self, quit: Quit) {
        let mut guard = self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(quit);
    }

    pub(crate) fn check(&self) -> Result<(), BufferError> {
        let guard = self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(quit) => quit.check(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancel_is_idempotent_and_shared_by_clones() {
        let quit = Quit::new();
        let clone = quit.clone();
        assert!(!clone.is_cancelled());
        quit.cancel();
        quit.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.check(), Err(BufferError::Cancelled));
    }

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let parent = Quit::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let second = parent.child();
        parent.cancel();
        assert!(second.is_cancelled());

        let late = parent.child();
        assert!(late.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let quit = Quit::new();
        let child = quit.child();
        let waiter = tokio::spawn(async move { child.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        quit.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
    }

    #[test]
    fn empty_slot_never_blocks_reads() {
        let slot = QuitSlot::default();
        assert!(slot.check().is_ok());
        let quit = Quit::new();
        slot.set(quit.clone());
        quit.cancel();
        assert_eq!(slot.check(), Err(BufferError::Cancelled));
    }
}
