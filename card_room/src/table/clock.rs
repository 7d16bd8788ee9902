//! Action clock bookkeeping for the table actor.
//!
//! The clock tracks which turn token the armed deadline belongs to and
//! whether the countdown is in its base phase or burning the player's
//! time bank. Expiry messages carry the token they were armed with; a
//! mismatch means the action already arrived and the callback must
//! no-op. That check is mandatory: races between action arrival and
//! expiry are intrinsic to preemptive scheduling.

use crate::game::Millis;
use std::time::Instant;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
enum ClockState {
    #[default]
    Idle,
    Base {
        token: u64,
    },
    Bank {
        token: u64,
        started: Instant,
    },
}

#[derive(Debug, Default)]
pub struct ActionClock {
    state: ClockState,
    handle: Option<JoinHandle<()>>,
}

impl ActionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the base countdown for a turn token, cancelling anything
    /// previously armed.
    pub fn arm_base(&mut self, token: u64, handle: JoinHandle<()>) {
        self.cancel();
        self.state = ClockState::Base { token };
        self.handle = Some(handle);
    }

    /// Transition base -> time-bank for the same token.
    pub fn arm_bank(&mut self, token: u64, handle: JoinHandle<()>) {
        if let Some(old) = self.handle.take() {
            old.abort();
        }
        self.state = ClockState::Bank {
            token,
            started: Instant::now(),
        };
        self.handle = Some(handle);
    }

    /// Does an expiry for `token` still refer to the armed countdown?
    pub fn matches(&self, token: u64) -> bool {
        match self.state {
            ClockState::Base { token: t } | ClockState::Bank { token: t, .. } => t == token,
            ClockState::Idle => false,
        }
    }

    pub fn armed_token(&self) -> Option<u64> {
        match self.state {
            ClockState::Base { token } | ClockState::Bank { token, .. } => Some(token),
            ClockState::Idle => None,
        }
    }

    /// Milliseconds spent in the time-bank phase so far, if in it.
    pub fn bank_elapsed_ms(&self) -> Option<Millis> {
        match self.state {
            ClockState::Bank { started, .. } => Some(started.elapsed().as_millis() as Millis),
            _ => None,
        }
    }

    /// Like [`bank_elapsed_ms`](Self::bank_elapsed_ms), but advances the
    /// epoch so consecutive reads never deduct the same interval twice.
    pub fn take_bank_elapsed_ms(&mut self) -> Option<Millis> {
        match &mut self.state {
            ClockState::Bank { started, .. } => {
                let elapsed = started.elapsed().as_millis() as Millis;
                *started = Instant::now();
                Some(elapsed)
            }
            _ => None,
        }
    }

    pub fn in_bank(&self) -> bool {
        matches!(self.state, ClockState::Bank { .. })
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.state = ClockState::Idle;
    }
}

impl Drop for ActionClock {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn dummy_handle() -> JoinHandle<()> {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
    }

    #[tokio::test]
    async fn test_idle_matches_nothing() {
        let clock = ActionClock::new();
        assert!(!clock.matches(0));
        assert!(clock.armed_token().is_none());
    }

    #[tokio::test]
    async fn test_base_arming_tracks_token() {
        let mut clock = ActionClock::new();
        clock.arm_base(7, dummy_handle());
        assert!(clock.matches(7));
        assert!(!clock.matches(8));
        assert!(!clock.in_bank());
    }

    #[tokio::test]
    async fn test_cancel_clears_state() {
        let mut clock = ActionClock::new();
        clock.arm_base(7, dummy_handle());
        clock.cancel();
        assert!(!clock.matches(7));
    }

    #[tokio::test]
    async fn test_bank_phase_reports_elapsed() {
        let mut clock = ActionClock::new();
        clock.arm_base(3, dummy_handle());
        clock.arm_bank(3, dummy_handle());
        assert!(clock.in_bank());
        assert!(clock.matches(3));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(clock.bank_elapsed_ms().unwrap() >= 10);
    }

    #[tokio::test]
    async fn test_take_bank_elapsed_advances_epoch() {
        let mut clock = ActionClock::new();
        clock.arm_base(5, dummy_handle());
        clock.arm_bank(5, dummy_handle());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let first = clock.take_bank_elapsed_ms().unwrap();
        assert!(first >= 10);
        // The epoch advanced: an immediate second read is near zero.
        let second = clock.take_bank_elapsed_ms().unwrap();
        assert!(second < first);
    }

    #[tokio::test]
    async fn test_rearm_replaces_token() {
        let mut clock = ActionClock::new();
        clock.arm_base(1, dummy_handle());
        clock.arm_base(2, dummy_handle());
        assert!(!clock.matches(1));
        assert!(clock.matches(2));
    }
}
