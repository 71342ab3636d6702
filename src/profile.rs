use std::time::Duration;

pub(crate) const DEFAULT_INSTRUCTIONS_PER_SECOND: u32 = 1_000;
pub(crate) const DEFAULT_TIMER_HZ: u32 = 60;

/// Timing and start-up settings for a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Profile {
    instructions_per_second: u32,
    timer_hz: u32,
    start_paused: bool,
}

impl Profile {
    /// Rates of zero are raised to one.
    #[must_use]
    pub(crate) fn new(instructions_per_second: u32, timer_hz: u32, start_paused: bool) -> Self {
        Self {
            instructions_per_second: instructions_per_second.max(1),
            timer_hz: timer_hz.max(1),
            start_paused,
        }
    }

    #[must_use]
    pub(crate) fn instructions_per_second(self) -> u32 {
        self.instructions_per_second
    }

    #[must_use]
    pub(crate) fn timer_hz(self) -> u32 {
        self.timer_hz
    }

    #[must_use]
    pub(crate) fn start_paused(self) -> bool {
        self.start_paused
    }

    #[must_use]
    pub(crate) fn cycle_period(self) -> Duration {
        Duration::from_secs(1) / self.instructions_per_second
    }

    #[must_use]
    pub(crate) fn timer_period(self) -> Duration {
        Duration::from_secs(1) / self.timer_hz
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUCTIONS_PER_SECOND, DEFAULT_TIMER_HZ, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let profile = Profile::default();
        assert_eq!(profile.instructions_per_second(), 1_000);
        assert_eq!(profile.timer_hz(), 60);
        assert!(!profile.start_paused());
        assert_eq!(profile.cycle_period(), Duration::from_millis(1));
        assert_eq!(profile.timer_period(), Duration::from_nanos(16_666_666));
    }

    #[test]
    fn test_zero_rates_are_clamped() {
        let profile = Profile::new(0, 0, true);
        assert_eq!(profile.cycle_period(), Duration::from_secs(1));
        assert_eq!(profile.timer_period(), Duration::from_secs(1));
        assert!(profile.start_paused());
    }
}
