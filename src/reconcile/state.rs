//! Process-wide reconciliation flags and the applied-snapshot watermark.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use super::certificates::CertificateHandoff;

const IDLE: u8 = 0;
const WAITING: u8 = 1;
const CANCELLED: u8 = 2;

/// Watermark and flags shared between the reconciler and its callers.
#[derive(Debug, Default)]
pub struct ReconciliationState {
    /// Timestamp of the last successfully applied snapshot.
    last_applied: AtomicU64,
    /// Attempts between entry and exit of `apply`.
    in_flight: AtomicUsize,
    /// Certificate wait phase of the lock holder: idle, waiting or cancelled.
    wait: AtomicU8,
}

impl ReconciliationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied.load(Ordering::Acquire)
    }

    /// Move the watermark forward. It never moves back.
    pub(crate) fn advance(&self, timestamp: u64) {
        self.last_applied.fetch_max(timestamp, Ordering::AcqRel);
    }

    /// True when `timestamp` would not move the watermark.
    pub fn is_stale(&self, timestamp: u64) -> bool {
        timestamp <= self.last_applied()
    }

    pub fn is_reconciling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.wait.load(Ordering::Acquire) == CANCELLED
    }

    /// Cancel the certificate wait in progress. Returns false, and leaves no
    /// trace, when no attempt is parked waiting.
    pub(crate) fn request_cancel(&self) -> bool {
        self.wait
            .compare_exchange(WAITING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark an attempt as started. Dropping the guard ends it.
    pub(crate) fn begin(&self) -> AttemptGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        AttemptGuard { state: self }
    }

    /// Open the cancellable window of a certificate wait. Dropping the guard
    /// closes it and discards any cancel aimed at it.
    pub(crate) fn enter_wait(&self) -> WaitGuard<'_> {
        self.wait.store(WAITING, Ordering::Release);
        WaitGuard { state: self }
    }

    /// Taken by the attempt holding the reconcile lock. On drop it clears the
    /// certificate handoff, which only ever belongs to the lock holder.
    pub(crate) fn hold<'a>(&'a self, handoff: &'a CertificateHandoff) -> HolderGuard<'a> {
        HolderGuard { handoff }
    }
}

pub(crate) struct AttemptGuard<'a> {
    state: &'a ReconciliationState,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct WaitGuard<'a> {
    state: &'a ReconciliationState,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.state.wait.store(IDLE, Ordering::Release);
    }
}

pub(crate) struct HolderGuard<'a> {
    handoff: &'a CertificateHandoff,
}

impl Drop for HolderGuard<'_> {
    fn drop(&mut self) {
        self.handoff.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_only_moves_forward() {
        let state = ReconciliationState::new();
        state.advance(100);
        state.advance(50);
        assert_eq!(state.last_applied(), 100);
        assert!(state.is_stale(100));
        assert!(!state.is_stale(101));
    }

    #[test]
    fn test_cancel_ignored_when_idle() {
        let state = ReconciliationState::new();
        assert!(!state.request_cancel());
        assert!(!state.is_cancel_requested());
    }

    #[test]
    fn test_cancel_only_reaches_a_waiting_attempt() {
        let state = ReconciliationState::new();
        let _attempt = state.begin();

        // Running but not parked: nothing to cancel, nothing left behind.
        assert!(state.is_reconciling());
        assert!(!state.request_cancel());

        {
            let _wait = state.enter_wait();
            assert!(!state.is_cancel_requested());
            assert!(state.request_cancel());
            assert!(state.is_cancel_requested());
            assert!(!state.request_cancel());
        }
        assert!(!state.is_cancel_requested());

        // A late cancel after the wait closed does not poison the next wait.
        assert!(!state.request_cancel());
        let _wait = state.enter_wait();
        assert!(!state.is_cancel_requested());
    }

    #[test]
    fn test_holder_guard_clears_handoff() {
        let state = ReconciliationState::new();
        let handoff = CertificateHandoff::new();
        {
            let _attempt = state.begin();
            let _holder = state.hold(&handoff);
            handoff.signal_pending();
        }
        assert!(!state.is_reconciling());
        assert!(!handoff.is_pending());
    }

    #[test]
    fn test_rejected_attempt_keeps_holder_state() {
        let state = ReconciliationState::new();
        let handoff = CertificateHandoff::new();
        let _holder_attempt = state.begin();
        let _holder = state.hold(&handoff);
        let _wait = state.enter_wait();
        handoff.signal_pending();
        assert!(state.request_cancel());

        // A second attempt rejected before reaching the lock.
        drop(state.begin());

        assert!(state.is_reconciling());
        assert!(state.is_cancel_requested());
        assert!(handoff.is_pending());
    }
}
