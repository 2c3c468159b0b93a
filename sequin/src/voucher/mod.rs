use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::Arc;

mod annex;
pub use annex::Annex;
use annex::AnnexMap;

#[cfg(test)]
mod tests;

thread_local! {
    /// The voucher associated with the task currently executing on this
    /// thread, if any.
    static CURRENT_VOUCHER: RefCell<Option<Arc<Voucher>>> = const { RefCell::new(None) };
}

/// An opaque context token that rides along with posted work.
///
/// A voucher is captured (shared, ref-counted) at post time and reinstalled
/// as current for the duration of the posted task's execution, so the callee
/// observes the poster's context regardless of which thread runs it.
///
/// Subsystems attach auxiliary data through typed annex slots; slot access is
/// guarded by a per-voucher lock independent of any queue lock, so attaching
/// context never contends with scheduling.
pub struct Voucher {
    annex: Mutex<AnnexMap>,
}

impl Voucher {
    fn new() -> Self {
        Self {
            annex: Mutex::new(AnnexMap::default()),
        }
    }

    /// Returns the current task's voucher without creating one.
    pub fn current() -> Option<Arc<Voucher>> {
        CURRENT_VOUCHER.with(|cell| cell.borrow().clone())
    }

    /// Returns the current task's voucher, creating and installing a fresh
    /// empty one if none exists. Idempotent within one task's execution:
    /// repeated calls return the same instance.
    pub fn current_or_create() -> Arc<Voucher> {
        CURRENT_VOUCHER.with(|cell| {
            let mut current = cell.borrow_mut();
            match &*current {
                Some(voucher) => voucher.clone(),
                None => {
                    let voucher = Arc::new(Voucher::new());
                    *current = Some(voucher.clone());
                    voucher
                }
            }
        })
    }

    /// Stores `value` in this voucher's slot for type `T`, replacing any
    /// previous value of that type.
    pub fn set_annex<T: Annex>(&self, value: T) {
        self.annex.lock().set(value);
    }

    /// Calls `f` with mutable access to the slot for type `T`, under the
    /// voucher's lock. Keep the closure brief.
    pub fn with_annex<T: Annex, R>(&self, f: impl FnOnce(Option<&mut T>) -> R) -> R {
        f(self.annex.lock().get_mut::<T>())
    }

    /// Removes the slot for type `T`. Returns whether a value was present.
    pub fn remove_annex<T: Annex>(&self) -> bool {
        self.annex.lock().remove::<T>()
    }

    pub fn annex_count(&self) -> usize {
        self.annex.lock().len()
    }
}

/// Installs a voucher (or none) as current for the guard's lifetime and
/// restores the previous one unconditionally on drop, including on unwind.
pub struct ScopedSetter {
    prev: Option<Arc<Voucher>>,
}

impl ScopedSetter {
    pub fn new(voucher: Option<Arc<Voucher>>) -> Self {
        let prev = CURRENT_VOUCHER.with(|cell| std::mem::replace(&mut *cell.borrow_mut(), voucher));
        Self { prev }
    }
}

impl Drop for ScopedSetter {
    fn drop(&mut self) {
        let prev = self.prev.take();
        // The thread-local may already be gone during thread teardown.
        let _ = CURRENT_VOUCHER.try_with(|cell| *cell.borrow_mut() = prev);
    }
}
