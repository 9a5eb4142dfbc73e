//! GPU resource accounting
//!
//! Every long-lived GPU object is wrapped in [`Tracked`], which registers it in
//! a [`ResourceLedger`] on creation and unregisters it on drop. Comparing the
//! ledger before startup and after shutdown shows whether anything leaked.

use std::cell::Cell;
use std::ops::Deref;
use std::rc::Rc;

use log::trace;

#[derive(Clone, Debug, Default)]
pub struct ResourceLedger {
    counts: Rc<LedgerCounts>,
}

#[derive(Debug, Default)]
struct LedgerCounts {
    live: Cell<usize>,
    created: Cell<usize>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked resources not yet dropped.
    pub fn live(&self) -> usize {
        self.counts.live.get()
    }

    /// Number of resources ever tracked.
    pub fn created(&self) -> usize {
        self.counts.created.get()
    }

    pub fn track<T>(&self, label: &'static str, resource: T) -> Tracked<T> {
        self.counts.live.set(self.counts.live.get() + 1);
        self.counts.created.set(self.counts.created.get() + 1);
        trace!("allocated {label} ({} live)", self.live());
        Tracked {
            resource,
            label,
            counts: Rc::clone(&self.counts),
        }
    }
}

/// A resource registered in a [`ResourceLedger`].
#[derive(Debug)]
pub struct Tracked<T> {
    resource: T,
    label: &'static str,
    counts: Rc<LedgerCounts>,
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.resource
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.counts.live.set(self.counts.live.get() - 1);
        trace!("released {} ({} live)", self.label, self.counts.live.get());
    }
}
