//! Per-destination send gating.
//!
//! Every transport keeps one [`ThrottledGate`] per message type it pushes.
//! A gate opens only when the candidate value differs from the last value it
//! committed AND the minimum interval has elapsed. `should_send` never
//! blocks: if the gate is contended it answers `false` and the caller tries
//! again next tick. Committing is decoupled from asking so callers can commit
//! only after the transport accepted the frame.

use std::sync::Mutex;

struct GateInner<T> {
    last_sent_ms: u32,
    last_value: Option<T>,
}

/// Rate limiter keyed on value change plus a minimum interval.
pub struct ThrottledGate<T> {
    inner: Mutex<GateInner<T>>,
    interval_ms: u32,
}

impl<T: PartialEq + Clone> ThrottledGate<T> {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            inner: Mutex::new(GateInner {
                last_sent_ms: 0,
                last_value: None,
            }),
            interval_ms,
        }
    }

    /// True iff `candidate` should be pushed now.
    ///
    /// Conservatively false when the gate is held by another thread; the
    /// next tick will ask again.
    pub fn should_send(&self, now_ms: u32, candidate: &T) -> bool {
        let Ok(inner) = self.inner.try_lock() else {
            return false;
        };
        if now_ms.wrapping_sub(inner.last_sent_ms) < self.interval_ms {
            return false;
        }
        inner.last_value.as_ref() != Some(candidate)
    }

    /// True iff the interval has elapsed, ignoring the value baseline.
    /// Used for samples that change every read (free heap).
    pub fn interval_elapsed(&self, now_ms: u32) -> bool {
        let Ok(inner) = self.inner.try_lock() else {
            return false;
        };
        now_ms.wrapping_sub(inner.last_sent_ms) >= self.interval_ms
    }

    /// Record a successful send so the gate stays closed for `interval_ms`
    /// and until the value changes again.
    pub fn commit(&self, now_ms: u32, value: T) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.last_sent_ms = now_ms;
            inner.last_value = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_until_interval_elapses() {
        let gate = ThrottledGate::new(200);
        // last_sent_ms starts at 0, so the gate stays closed for the first
        // interval after boot.
        assert!(!gate.should_send(100, &1u8));
        assert!(gate.should_send(200, &1u8));
    }

    #[test]
    fn closed_while_value_unchanged() {
        let gate = ThrottledGate::new(200);
        gate.commit(200, 7u8);
        assert!(!gate.should_send(400, &7u8), "same value never re-sends");
        assert!(gate.should_send(400, &8u8), "changed value opens the gate");
    }

    #[test]
    fn commit_restarts_the_window() {
        let gate = ThrottledGate::new(200);
        gate.commit(1000, 1u8);
        assert!(!gate.should_send(1100, &2u8));
        assert!(gate.should_send(1200, &2u8));
    }

    #[test]
    fn interval_only_ignores_value() {
        let gate = ThrottledGate::new(750);
        gate.commit(0, 42u32);
        assert!(!gate.interval_elapsed(749));
        assert!(gate.interval_elapsed(750), "same value must not block");
    }

    #[test]
    fn wrapping_clock_is_handled() {
        let gate = ThrottledGate::new(200);
        gate.commit(u32::MAX - 50, 1u8);
        // 150 ms after commit across the wrap point: still closed.
        assert!(!gate.should_send(99, &2u8));
        // 250 ms after commit: open.
        assert!(gate.should_send(199, &2u8));
    }
}
