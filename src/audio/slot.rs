//! Canonical engine slots and the retire protocol
//!
//! An engine handle is an `Arc` shared between the slot and whoever grabbed a
//! copy from it, backend callbacks included. Some backends must be torn down
//! on the thread that stops them: their destructor takes a backend-global
//! lock that a callback thread may be holding while it still owns a copy.
//! Retiring therefore goes
//!
//! 1. copy the handle out of the slot,
//! 2. clear the slot so no new copies can be made,
//! 3. yield until our copy is the only strong reference,
//! 4. drop it, running the destructor right here.
//!
//! Step 3 has no timeout. A copy that is never released is a leak elsewhere
//! and leaves the caller spinning.

use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;

/// Holds the current instance of one engine kind
pub struct EngineSlot<T: ?Sized> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized> EngineSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Take a shared copy of the current handle
    pub fn get(&self) -> Option<Arc<T>> {
        self.inner.read().clone()
    }

    /// Install a handle, returning the one it replaced
    pub fn install(&self, handle: Arc<T>) -> Option<Arc<T>> {
        self.inner.write().replace(handle)
    }

    /// Clear the slot, handing the caller its handle
    pub fn take(&self) -> Option<Arc<T>> {
        self.inner.write().take()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_none()
    }

    /// Steps 1 to 4 of the retire protocol
    pub fn retire(&self) {
        retire(self.take());
    }
}

impl<T: ?Sized> Default for EngineSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// `true` once `handle` is empty or the last strong reference
pub fn is_sole_owner<T: ?Sized>(handle: &Option<Arc<T>>) -> bool {
    handle.as_ref().map_or(true, |h| Arc::strong_count(h) == 1)
}

/// Yield the thread until `ready` holds. Never blocks in the kernel, so a
/// holder that needs this thread's cooperation cannot deadlock against it.
pub fn spin_until(mut ready: impl FnMut() -> bool) {
    while !ready() {
        thread::yield_now();
    }
}

/// Wait for exclusive ownership of `handle`, then drop it on this thread
pub fn retire<T: ?Sized>(handle: Option<Arc<T>>) {
    spin_until(|| is_sole_owner(&handle));
    drop(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Engine {
        dropped_on: Arc<parking_lot::Mutex<Option<thread::ThreadId>>>,
    }

    impl Drop for Engine {
        fn drop(&mut self) {
            *self.dropped_on.lock() = Some(thread::current().id());
        }
    }

    #[test]
    fn test_install_take() {
        let slot: EngineSlot<u32> = EngineSlot::new();
        assert!(slot.is_empty());
        assert!(slot.install(Arc::new(1)).is_none());
        assert_eq!(slot.install(Arc::new(2)).as_deref(), Some(&1));
        assert_eq!(slot.get().as_deref(), Some(&2));
        assert_eq!(slot.take().as_deref(), Some(&2));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_retire_empty_slot_returns() {
        let slot: EngineSlot<u32> = EngineSlot::new();
        slot.retire();
        assert!(slot.is_empty());
    }

    #[test]
    fn test_retire_waits_for_holder_and_drops_on_caller() {
        let dropped_on = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::new(EngineSlot::new());
        slot.install(Arc::new(Engine {
            dropped_on: dropped_on.clone(),
        }));

        let copy = slot.get().unwrap();
        let released = Arc::new(AtomicBool::new(false));
        let released_flag = released.clone();
        let holder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            released_flag.store(true, Ordering::SeqCst);
            drop(copy);
        });

        slot.retire();

        assert!(released.load(Ordering::SeqCst));
        assert_eq!(*dropped_on.lock(), Some(thread::current().id()));
        holder.join().unwrap();
    }

    #[test]
    fn test_sole_owner() {
        let handle = Some(Arc::new(5));
        assert!(is_sole_owner(&handle));
        let copy = handle.clone();
        assert!(!is_sole_owner(&handle));
        drop(copy);
        assert!(is_sole_owner(&handle));
        assert!(is_sole_owner::<u32>(&None));
    }
}
