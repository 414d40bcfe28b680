//! Cross-tick sample history.
//!
//! [`SampleState`] is the only thing the control loop remembers from one tick
//! to the next. It is owned by the driver and handed to the entropy
//! calculation by shared reference.

/// One voltage/current pair from the sensor source, in volts and amps.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Output voltage (V).
    pub voltage: f32,
    /// Load current (A).
    pub current: f32,
}

impl Sample {
    /// Construct a sample.
    pub const fn new(voltage: f32, current: f32) -> Self {
        Self { voltage, current }
    }

    /// Both channels are finite.
    pub fn is_finite(&self) -> bool {
        self.voltage.is_finite() && self.current.is_finite()
    }
}

/// Current and previous readings plus the tick counter.
///
/// # Lifecycle
///
/// - Created from the first reading with previous = current, so the first
///   tick sees zero gradient and zero salience.
/// - [`SampleState::record`] stores the fresh reading at the start of a tick.
/// - [`SampleState::advance`] copies now into prev and bumps the counter,
///   exactly once, at the end of the tick.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleState {
    /// Voltage read this tick.
    pub voltage_now: f32,
    /// Load current read this tick.
    pub current_now: f32,
    /// Voltage from the previous tick.
    pub voltage_prev: f32,
    /// Load current from the previous tick.
    pub current_prev: f32,
    /// Completed ticks. Wraps at `u32::MAX`.
    pub sample_count: u32,
}

impl SampleState {
    /// Seed the history from the first reading.
    pub fn seeded(first: Sample) -> Self {
        Self {
            voltage_now: first.voltage,
            current_now: first.current,
            voltage_prev: first.voltage,
            current_prev: first.current,
            sample_count: 0,
        }
    }

    /// Store this tick's reading. History is untouched.
    pub fn record(&mut self, sample: Sample) {
        self.voltage_now = sample.voltage;
        self.current_now = sample.current;
    }

    /// End-of-tick update: now becomes prev, counter increments (wrapping).
    pub fn advance(&mut self) {
        self.voltage_prev = self.voltage_now;
        self.current_prev = self.current_now;
        self.sample_count = self.sample_count.wrapping_add(1);
    }

    /// Zero the tick counter without touching the readings.
    pub fn reset_count(&mut self) {
        self.sample_count = 0;
    }

    /// This tick's reading.
    pub fn now(&self) -> Sample {
        Sample::new(self.voltage_now, self.current_now)
    }

    /// The previous tick's reading.
    pub fn prev(&self) -> Sample {
        Sample::new(self.voltage_prev, self.current_prev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_has_equal_history() {
        let s = SampleState::seeded(Sample::new(5.0, 1.5));
        assert_eq!(s.now(), s.prev());
        assert_eq!(s.sample_count, 0);
    }

    #[test]
    fn test_record_leaves_prev() {
        let mut s = SampleState::seeded(Sample::new(5.0, 1.0));
        s.record(Sample::new(4.0, 2.0));
        assert_eq!(s.prev(), Sample::new(5.0, 1.0));
        assert_eq!(s.now(), Sample::new(4.0, 2.0));
        assert_eq!(s.sample_count, 0);
    }

    #[test]
    fn test_advance_shifts_and_counts() {
        let mut s = SampleState::seeded(Sample::new(5.0, 1.0));
        s.record(Sample::new(4.0, 2.0));
        s.advance();
        assert_eq!(s.prev(), Sample::new(4.0, 2.0));
        assert_eq!(s.sample_count, 1);
    }

    #[test]
    fn test_counter_wraps_without_panic() {
        let mut s = SampleState::seeded(Sample::default());
        s.sample_count = u32::MAX;
        s.advance();
        assert_eq!(s.sample_count, 0);
    }

    #[test]
    fn test_reset_count_keeps_readings() {
        let mut s = SampleState::seeded(Sample::new(3.3, 0.2));
        s.advance();
        s.advance();
        s.reset_count();
        assert_eq!(s.sample_count, 0);
        assert_eq!(s.now(), Sample::new(3.3, 0.2));
    }

    #[test]
    fn test_sample_finite_check() {
        assert!(Sample::new(5.0, 1.0).is_finite());
        assert!(!Sample::new(f32::NAN, 1.0).is_finite());
        assert!(!Sample::new(5.0, f32::NEG_INFINITY).is_finite());
    }
}
