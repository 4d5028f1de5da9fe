// src/pipeline/slots.rs

//! Replaceable control slots shared between the driver and the workers
//! that may interrupt it.
//!
//! The driver arms a [`CancelCell`] before entering a plugin and disarms
//! it right after; `Pipeline::stop` and the hot-update listener fire the
//! cells from other tasks. An empty cell is a no-op, so the race between
//! the driver moving on and a late trigger landing is benign: the
//! trigger is simply lost, and the plugin it aimed at has already
//! returned.

use std::sync::Mutex;

type CancelTrigger = Box<dyn Fn() + Send>;

/// A slot holding at most one cancel trigger.
pub(crate) struct CancelCell {
    slot: Mutex<Option<CancelTrigger>>,
}

impl CancelCell {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Install a trigger, replacing any previous one.
    pub(crate) fn arm(&self, trigger: impl Fn() + Send + 'static) {
        *self.slot.lock().unwrap() = Some(Box::new(trigger));
    }

    /// Reset the slot to the no-op state.
    pub(crate) fn disarm(&self) {
        *self.slot.lock().unwrap() = None;
    }

    /// Invoke the armed trigger, if any. The trigger stays armed;
    /// idempotence is the trigger's own concern (cancel handles are).
    pub(crate) fn fire(&self) {
        let slot = self.slot.lock().unwrap();
        if let Some(trigger) = slot.as_ref() {
            trigger();
        }
    }
}

impl std::fmt::Debug for CancelCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let armed = self.slot.lock().unwrap().is_some();
        f.debug_struct("CancelCell").field("armed", &armed).finish()
    }
}

/// Identity of the plugin currently inside `Plugin::run`, published so
/// the hot-update listener can decide whether an update notice targets
/// the running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunningPlugin {
    pub(crate) name: String,
    pub(crate) generation: u64,
}
