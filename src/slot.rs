//! Mutable callback cell shared between the user and the dispatcher task.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A swappable callback holder.
///
/// The user may assign or clear the callback at any time from any thread;
/// the dispatcher task takes it out for the duration of one invocation and
/// puts it back afterwards. A `set` that lands while an invocation is in
/// flight wins: the old callback is discarded instead of being restored, so
/// the next event already sees the replacement.
pub(crate) struct Slot<F> {
    state: Mutex<SlotState<F>>,
}

struct SlotState<F> {
    callback: Option<F>,
    generation: u64,
}

impl<F> Default for Slot<F> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                callback: None,
                generation: 0,
            }),
        }
    }
}

impl<F> Slot<F> {
    /// Replace (or clear) the stored callback.
    pub fn set(&self, callback: Option<F>) {
        let mut state = self.lock();
        state.callback = callback;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Invoke the stored callback once, if set. Returns whether a callback
    /// ran. The callback is removed from the cell while it runs, so it can
    /// freely call back into the bridge (including `set` on this very slot)
    /// without deadlocking.
    pub fn invoke(&self, call: impl FnOnce(&mut F)) -> bool {
        let (mut callback, generation) = {
            let mut state = self.lock();
            match state.callback.take() {
                Some(callback) => (callback, state.generation),
                None => return false,
            }
        };

        call(&mut callback);

        let mut state = self.lock();
        if state.generation == generation && state.callback.is_none() {
            state.callback = Some(callback);
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<F>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
