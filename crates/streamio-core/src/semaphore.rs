//! Counting semaphore used for producer back-pressure.
//!
//! The current value tracks logical queue occupancy for blocking streams.
//! Producers call [`QueueSemaphore::incr`] before queueing and stall while
//! the value sits at the maximum; consumers call [`QueueSemaphore::decr`]
//! after dequeueing to admit one more producer.

use parking_lot::{Condvar, Mutex};
use tracing::trace;

#[derive(Debug)]
struct SemaphoreState {
    max_value: usize,
    curr_value: usize,
}

/// Bounded counter whose increment blocks at the maximum.
#[derive(Debug)]
pub struct QueueSemaphore {
    state: Mutex<SemaphoreState>,
    condition: Condvar,
}

impl QueueSemaphore {
    /// Creates a semaphore with the given maximum and a current value of 0.
    pub fn new(max_value: usize) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                max_value,
                curr_value: 0,
            }),
            condition: Condvar::new(),
        }
    }

    /// Changes the maximum, waking producers if room was added.
    pub fn set_max_value(&self, max_value: usize) {
        let mut state = self.state.lock();
        state.max_value = max_value;
        self.condition.notify_all();
    }

    /// Returns the maximum.
    pub fn max_value(&self) -> usize {
        self.state.lock().max_value
    }

    /// Overwrites the current value, e.g. to resynchronize with the real
    /// queue size.
    pub fn set_curr_value(&self, value: usize) {
        let mut state = self.state.lock();
        state.curr_value = value;
        self.condition.notify_all();
    }

    /// Returns the current value.
    pub fn curr_value(&self) -> usize {
        self.state.lock().curr_value
    }

    /// Increments the value, blocking while it is at the maximum.
    pub fn incr(&self) {
        let mut state = self.state.lock();
        while state.curr_value >= state.max_value {
            trace!(curr = state.curr_value, max = state.max_value, "semaphore full, waiting");
            self.condition.wait(&mut state);
        }
        state.curr_value += 1;
    }

    /// Decrements the value and wakes one admission slot.
    pub fn decr(&self) {
        let mut state = self.state.lock();
        state.curr_value = state.curr_value.saturating_sub(1);
        self.condition.notify_all();
    }

    /// Resets the value to zero and releases every blocked producer.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.curr_value = 0;
        self.condition.notify_all();
    }
}
