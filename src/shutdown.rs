//! A shareable, one-way shutdown signal.
//!
//! Every long-lived thread in a daemon (accept loop, providers, countdown
//! loops, the Hyprland event loop) holds a clone of a [`Shutdown`] and
//! returns promptly once it fires.  Waiting is done on a condition
//! variable, so a thread can sleep until "timer elapsed *or* shutdown"
//! with a single [`wait_timeout`](Shutdown::wait_timeout) call.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Cloneable shutdown token.  All clones observe the same flag.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    fired: Mutex<bool>,
    cond: Condvar,
    children: Mutex<Vec<Shutdown>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking every waiter.  Firing twice is harmless.
    pub fn trigger(&self) {
        {
            let mut fired = self.lock_fired();
            if *fired {
                return;
            }
            *fired = true;
        }
        self.inner.cond.notify_all();

        let children = std::mem::take(&mut *self.lock_children());
        for child in children {
            child.trigger();
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.lock_fired()
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        let mut fired = self.lock_fired();
        while !*fired {
            fired = match self.inner.cond.wait(fired) {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Sleep for at most `timeout`.  Returns `true` if the signal fired
    /// (before or during the wait), `false` if the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fired = self.lock_fired();
        while !*fired {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            fired = match self.inner.cond.wait_timeout(fired, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Create a token that fires when `self` fires, but can also be fired
    /// on its own without affecting `self`.
    pub fn child(&self) -> Shutdown {
        let child = Shutdown::new();
        self.link(&child);
        child
    }

    /// Make an existing token fire when `self` fires.
    ///
    /// Children that already fired on their own are dropped here, so a
    /// long-lived parent does not accumulate finished tokens.
    pub fn link(&self, other: &Shutdown) {
        let mut children = self.lock_children();
        // Checked under the children lock so a concurrent trigger cannot
        // drain the list between the check and the push.
        if self.is_triggered() {
            drop(children);
            other.trigger();
        } else {
            children.retain(|c| !c.is_triggered());
            children.push(other.clone());
        }
    }

    fn lock_fired(&self) -> MutexGuard<'_, bool> {
        self.inner.fired.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_children(&self) -> MutexGuard<'_, Vec<Shutdown>> {
        self.inner.children.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
