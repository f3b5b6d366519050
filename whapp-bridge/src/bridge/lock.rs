use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// The one lock serialising every call into the session.
///
/// Guards are plain RAII values, so the lock is released on every exit path
/// of the holder, errors and cancellation included.
pub struct SessionLock<S>(Arc<Mutex<S>>);

impl<S> SessionLock<S> {
    pub fn new(session: S) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    pub async fn lock(&self) -> MutexGuard<'_, S> {
        self.0.lock().await
    }

    /// Guard that can be moved into a spawned task.
    pub async fn lock_owned(&self) -> OwnedMutexGuard<S> {
        self.0.clone().lock_owned().await
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, S>> {
        self.0.try_lock().ok()
    }
}

impl<S> Clone for SessionLock<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
