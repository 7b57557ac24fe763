//! Cooperative cancellation for coupon searches.
//!
//! A [`CancellationToken`] is a one-way flag shared by every worker of a
//! search. Producers poll [`CancellationToken::is_cancelled`] before each line
//! they emit; blocking waiters (the result aggregator) select on
//! [`CancellationToken::notified`], a channel that disconnects the moment the
//! token fires.
//!
//! Tokens form a tree: a token created with [`CancellationToken::child`] is
//! cancelled together with its parent, while cancelling the child leaves the
//! parent untouched. A search uses a child of the caller's request token so the
//! caller's deadline stops the search, but the search deciding early does not
//! cancel the caller.

use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

struct Inner {
    cancelled: AtomicBool,
    // Taken on cancel; dropping the only sender disconnects every receiver.
    notifier: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
    children: Mutex<Vec<Weak<Inner>>>,
}

/// Shared, monotonic cancellation signal.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notifier: Mutex::new(Some(tx)),
                receiver: rx,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a token that is cancelled whenever `self` is cancelled.
    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // `cancel` sets the flag before draining children, so checking under
        // the lock cannot miss a concurrent cancellation.
        if self.is_cancelled() {
            drop(children);
            child.cancel();
        } else {
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        child
    }

    /// Cancels this token and all of its descendants. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(
            self.inner
                .notifier
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let children: Vec<_> = self
            .inner
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for inner in children.into_iter().filter_map(|weak| weak.upgrade()) {
            CancellationToken { inner }.cancel();
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns a receiver that becomes disconnected once the token is cancelled.
    ///
    /// No value is ever sent on it, so a `recv` only returns (with an error)
    /// after cancellation. Intended for use inside `crossbeam_channel::select!`.
    pub fn notified(&self) -> Receiver<()> {
        self.inner.receiver.clone()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
