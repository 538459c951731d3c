//! Per-thread engine sessions.
//!
//! Engines that keep transient per-operation state (such as the key to sign
//! with) must not share that state between threads. [`SessionCache`] hands
//! every thread its own session, created on first use and reused afterwards.
//! A thread's session is torn down when the thread exits. It can also be
//! dropped earlier, explicitly with [`SessionCache::release_current`] or at
//! the end of a scope opened with [`SessionCache::enter`].

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

type SessionMap<S> = Mutex<HashMap<ThreadId, Arc<Mutex<S>>>>;

thread_local! {
    /// Exit guards of the calling thread, one per cache it has a session in.
    static EXIT_GUARDS: RefCell<HashMap<usize, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Removes a thread's session from its cache when the thread exits.
struct ThreadExit<S> {
    sessions: Weak<SessionMap<S>>,
    thread: ThreadId,
}

impl<S> Drop for ThreadExit<S> {
    fn drop(&mut self) {
        let Some(sessions) = self.sessions.upgrade() else {
            return;
        };
        if sessions.lock().remove(&self.thread).is_some() {
            tracing::debug!(thread = ?self.thread, "thread exited, released engine session");
        }
    }
}

/// Sessions keyed by the thread that created them.
pub struct SessionCache<S> {
    sessions: Arc<SessionMap<S>>,
    factory: Box<dyn Fn() -> S + Send + Sync>,
}

impl<S> SessionCache<S> {
    /// Create an empty cache. `factory` builds a session the first time a
    /// thread asks for one.
    pub fn new(factory: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            factory: Box::new(factory),
        }
    }

    /// Tear down the calling thread's session. Returns whether one existed.
    pub fn release_current(&self) -> bool {
        let id = thread::current().id();
        let removed = self.sessions.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(thread = ?id, "released engine session");
        }
        removed
    }

    /// Whether the calling thread currently has a session.
    pub fn has_current(&self) -> bool {
        self.sessions.lock().contains_key(&thread::current().id())
    }

    /// Number of live sessions across all threads.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: 'static> SessionCache<S> {
    /// The calling thread's session, created if it does not exist yet.
    pub fn current(&self) -> Arc<Mutex<S>> {
        let id = thread::current().id();
        let mut created = false;
        let session = self
            .sessions
            .lock()
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(thread = ?id, "creating engine session");
                created = true;
                Arc::new(Mutex::new((self.factory)()))
            })
            .clone();

        if created {
            self.release_on_thread_exit(id);
        }
        session
    }

    /// Run `f` with exclusive access to the calling thread's session.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let session = self.current();
        let mut guard = session.lock();
        f(&mut guard)
    }

    /// Bind the calling thread's session to a scope; it is released when the
    /// returned guard is dropped.
    pub fn enter(&self) -> SessionScope<'_, S> {
        let _ = self.current();
        SessionScope { cache: self }
    }

    fn release_on_thread_exit(&self, thread: ThreadId) {
        // The guard's weak reference keeps the allocation, and so the key, unique
        let key = Arc::as_ptr(&self.sessions) as usize;
        // Fails only while the thread is already tearing down its locals
        let _ = EXIT_GUARDS.try_with(|guards| {
            guards.borrow_mut().entry(key).or_insert_with(|| {
                Box::new(ThreadExit {
                    sessions: Arc::downgrade(&self.sessions),
                    thread,
                })
            });
        });
    }
}

impl<S> std::fmt::Debug for SessionCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("sessions", &self.len())
            .finish()
    }
}

/// Guard returned by [`SessionCache::enter`].
pub struct SessionScope<'a, S> {
    cache: &'a SessionCache<S>,
}

impl<S: 'static> SessionScope<'_, S> {
    /// Run `f` with this scope's session.
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        self.cache.with_current(f)
    }
}

impl<S> Drop for SessionScope<'_, S> {
    fn drop(&mut self) {
        self.cache.release_current();
    }
}

/// Sessions that carry a transient signing identity.
pub trait SignerSlot {
    type Signer;

    fn signer_slot(&mut self) -> &mut Option<Self::Signer>;

    /// Install `signer` for the lifetime of the returned guard.
    ///
    /// The slot is cleared when the guard drops, including on early return
    /// and unwinding, so a later operation on the same session never sees a
    /// stale signer.
    fn with_signer(&mut self, signer: Self::Signer) -> SignerScope<'_, Self>
    where
        Self: Sized,
    {
        *self.signer_slot() = Some(signer);
        SignerScope { session: self }
    }
}

/// Guard returned by [`SignerSlot::with_signer`]; dereferences to the session.
pub struct SignerScope<'a, S: SignerSlot> {
    session: &'a mut S,
}

impl<S: SignerSlot> Deref for SignerScope<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
    }
}

impl<S: SignerSlot> DerefMut for SignerScope<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
    }
}

impl<S: SignerSlot> Drop for SignerScope<'_, S> {
    fn drop(&mut self) {
        *self.session.signer_slot() = None;
    }
}
