//! Bounded memory of recently finished calls
//!
//! Push delivery is at-least-once. Once a call has been resolved and cleared
//! from the store, a late duplicate of its push would otherwise ring again, so
//! the router remembers the last few finished call ids in insertion order.

use indexmap::IndexSet;

use crate::types::CallId;

#[derive(Debug, Clone)]
pub(crate) struct RecentCalls {
    capacity: usize,
    ids: IndexSet<CallId>,
}

impl RecentCalls {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ids: IndexSet::with_capacity(capacity),
        }
    }

    pub(crate) fn remember(&mut self, call_id: CallId) {
        if self.capacity == 0 {
            return;
        }
        // Re-inserting moves the id to the back
        self.ids.shift_remove(&call_id);
        self.ids.insert(call_id);
        while self.ids.len() > self.capacity {
            self.ids.shift_remove_index(0);
        }
    }

    pub(crate) fn contains(&self, call_id: &CallId) -> bool {
        self.ids.contains(call_id)
    }
}
