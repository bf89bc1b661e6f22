use std::{collections::HashMap, time::Duration};

use crate::runtime::{set_timeout, TimeoutHandle};

/// Pending removal timers, at most one per key.
#[derive(Default)]
pub(crate) struct GarbageCollector {
    timers: HashMap<String, TimeoutHandle>,
}

impl GarbageCollector {
    /// Replaces any pending timer for `key` with one that calls `collect` after `gc_time`.
    pub(crate) fn schedule(
        &mut self,
        key: &str,
        gc_time: Duration,
        collect: impl FnOnce() + 'static,
    ) {
        self.cancel(key);
        let handle = set_timeout(collect, gc_time);
        self.timers.insert(key.to_string(), handle);
    }

    /// Cancels the pending timer for `key`. Returns whether one existed.
    pub(crate) fn cancel(&mut self, key: &str) -> bool {
        match self.timers.remove(key) {
            Some(handle) => {
                handle.clear();
                true
            }
            None => false,
        }
    }

    /// Drops the bookkeeping for a timer that already fired.
    pub(crate) fn forget(&mut self, key: &str) {
        self.timers.remove(key);
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.clear();
        }
    }

    pub(crate) fn is_scheduled(&self, key: &str) -> bool {
        self.timers.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }
}
