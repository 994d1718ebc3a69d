use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// TbObj allows the user to mutably share test objects (models, scoreboards, channel state)
// between Tasks. The simulation is single threaded so the lock is never contended, it only
// exists so that boxed task futures stay Send.
pub struct TbObj<T>(Arc<Mutex<T>>);

impl<T> TbObj<T> {
    pub fn new(data: T) -> TbObj<T> {
        TbObj(Arc::new(Mutex::new(data)))
    }

    /// Locks the object. The guard must not be held across an `.await`.
    pub fn get(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.get())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> TbObj<T> {
    pub fn cloned(&self) -> T {
        self.get().clone()
    }
}

impl<T> Clone for TbObj<T> {
    fn clone(&self) -> Self {
        TbObj(self.0.clone())
    }
}

impl<T: Default> Default for TbObj<T> {
    fn default() -> Self {
        TbObj::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for TbObj<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TbObj").field(&*self.get()).finish()
    }
}
