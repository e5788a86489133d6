//! TalkingBot // Looping
//!
//! Controls how many more times the current track is replayed.

use std::{
    error,
    fmt::{self, Display, Formatter},
    result,
};

/// Value accepted by [`LoopController::set_loop`] to repeat forever.
pub const INFINITE: i64 = -1;

/// The requested amount of repetitions is invalid, only `-1` or positive values are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTimes(pub i64);

impl Display for InvalidTimes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "cannot loop {} times", self.0)
    }
}

impl error::Error for InvalidTimes {}

/// Checks that `times` is [`INFINITE`] or positive.
pub fn validate_times(times: i64) -> result::Result<(), InvalidTimes> {
    if times == 0 || times < INFINITE {
        return Err(InvalidTimes(times));
    }

    Ok(())
}

/// How a call to [`LoopController::set_loop`] changed the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopChange {
    /// Looping was disabled and is now enabled.
    Enabled,

    /// Looping was already enabled, the remaining count was replaced.
    Reset,
}

/// Per-session loop state.
///
/// `remaining` is only meaningful while `enabled` is true: `-1` means the
/// track repeats forever and `N > 0` means it repeats `N` more times.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopController {
    enabled: bool,
    remaining: i64,
}

impl LoopController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Enables the loop for `times` repetitions, [`INFINITE`] repeats forever.
    pub fn set_loop(&mut self, times: i64) -> result::Result<LoopChange, InvalidTimes> {
        validate_times(times)?;

        let change = if self.enabled {
            LoopChange::Reset
        } else {
            LoopChange::Enabled
        };

        self.enabled = true;
        self.remaining = times;

        Ok(change)
    }

    /// Called when the current track finished normally, returns true if it must be replayed.
    pub fn on_track_finished_normally(&mut self) -> bool {
        if !self.enabled {
            return false;
        }

        match self.remaining {
            INFINITE => true,
            remaining if remaining > 0 => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.enabled = false;
                }
                true
            }
            _ => {
                // Enabled with nothing remaining, treat as disabled.
                self.reset();
                false
            }
        }
    }

    /// Disables the loop.
    pub fn reset(&mut self) {
        self.enabled = false;
        self.remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_below_infinite() {
        let mut looping = LoopController::new();
        assert_eq!(looping.set_loop(0), Err(InvalidTimes(0)));
        assert_eq!(looping.set_loop(-2), Err(InvalidTimes(-2)));
        assert!(!looping.enabled());
    }

    #[test]
    fn infinite_loop_never_exhausts() {
        let mut looping = LoopController::new();
        assert_eq!(looping.set_loop(INFINITE), Ok(LoopChange::Enabled));

        for _ in 0..1000 {
            assert!(looping.on_track_finished_normally());
        }

        assert!(looping.enabled());
    }

    #[test]
    fn counted_loop_disables_itself() {
        let mut looping = LoopController::new();
        looping.set_loop(3).unwrap();

        assert!(looping.on_track_finished_normally());
        assert!(looping.on_track_finished_normally());
        assert!(looping.on_track_finished_normally());
        assert!(!looping.enabled());
        assert!(!looping.on_track_finished_normally());
    }

    #[test]
    fn setting_twice_reports_reset() {
        let mut looping = LoopController::new();
        assert_eq!(looping.set_loop(2), Ok(LoopChange::Enabled));
        assert_eq!(looping.set_loop(INFINITE), Ok(LoopChange::Reset));
        assert_eq!(looping.remaining(), INFINITE);
    }

    #[test]
    fn disabled_loop_does_not_replay() {
        let mut looping = LoopController::new();
        assert!(!looping.on_track_finished_normally());

        looping.set_loop(5).unwrap();
        looping.reset();
        assert!(!looping.on_track_finished_normally());
        assert_eq!(looping.remaining(), 0);
    }
}
