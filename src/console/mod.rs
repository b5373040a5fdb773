pub mod command;
pub mod display;
pub mod router;
pub mod state;
pub mod topic;

use std::sync::atomic::{AtomicU8, Ordering};

/// Identity of a UI control with an edit channel. Each synchronized field is
/// bound to the control that displays it; the suppression guard is keyed by
/// this identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    MeasuredCurrent,
    SourceVoltage,
    SourceEnabled,
    MeasureContinuously,
    CurrentRange,
    Speed,
}

impl Control {
    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Per-control edit-signal guard. While a control is suppressed, any edit
/// event it raises is system-originated (the display echo of an inbound
/// update) and must not be treated as user intent.
///
/// The state synchronizer opens a [`SuppressionWindow`] around every
/// programmatic display write; the command publisher checks
/// [`EditGate::is_suppressed`] at its entry point and drops gated edits.
#[derive(Debug, Default)]
pub struct EditGate {
    suppressed: AtomicU8,
}

impl EditGate {
    /// Disarm `control`'s edit channel until the returned window is dropped.
    /// Rearming happens in `Drop`, so it is unconditional even if the display
    /// write panics.
    pub fn suppress(&self, control: Control) -> SuppressionWindow<'_> {
        self.suppressed.fetch_or(control.bit(), Ordering::SeqCst);
        SuppressionWindow {
            gate: self,
            control,
        }
    }

    pub fn is_suppressed(&self, control: Control) -> bool {
        self.suppressed.load(Ordering::SeqCst) & control.bit() != 0
    }
}

/// RAII token for one scoped suppression interval.
pub struct SuppressionWindow<'a> {
    gate: &'a EditGate,
    control: Control,
}

impl Drop for SuppressionWindow<'_> {
    fn drop(&mut self) {
        self.gate
            .suppressed
            .fetch_and(!self.control.bit(), Ordering::SeqCst);
    }
}
