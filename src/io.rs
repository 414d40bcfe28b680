//! Hardware seams: where readings come from and where the gate goes.
//!
//! The control loop is generic over both traits, so the same tick logic runs
//! against an ADC driver on target, a [`SimulatedConverter`] in tests, or a
//! replayed log.
//!
//! # Implementing for a new board
//!
//! ```rust,ignore
//! use erpc_core::io::{ActuatorSink, SensorSource};
//! use erpc_core::gate::Duty;
//!
//! struct Board { adc: Adc, pwm: Pwm }
//!
//! impl SensorSource for Board {
//!     fn read_voltage(&mut self) -> f32 { self.adc.read(0) as f32 * VOUT_SCALE }
//!     fn read_load_current(&mut self) -> f32 { self.adc.read(1) as f32 * ILOAD_SCALE }
//! }
//!
//! impl ActuatorSink for Board {
//!     fn set_output(&mut self, enabled: bool, duty: Duty) {
//!         self.pwm.set_duty(if enabled { duty.raw() } else { 0 });
//!     }
//! }
//! ```
//!
//! [`SimulatedConverter`]: crate::plant::SimulatedConverter

use core::cell::RefCell;

use crate::error::SensorFault;
use crate::gate::Duty;
use crate::state::Sample;

/// Supplier of unit-scaled output voltage and load current.
///
/// Reads must be non-blocking and bounded in latency. A faulted channel may
/// return a non-finite sentinel, or report through [`SensorSource::fault`], or
/// both.
pub trait SensorSource {
    /// Output voltage in volts.
    fn read_voltage(&mut self) -> f32;

    /// Load current in amps.
    fn read_load_current(&mut self) -> f32;

    /// Out-of-band fault flag for the most recent reads. Default: never faults.
    fn fault(&self) -> Option<SensorFault> {
        None
    }

    /// Read both channels, voltage first.
    fn read_sample(&mut self) -> Sample {
        let voltage = self.read_voltage();
        let current = self.read_load_current();
        Sample::new(voltage, current)
    }
}

/// Receiver of the per-tick gate decision.
///
/// Called exactly once per tick, including when the value has not changed.
pub trait ActuatorSink {
    /// Drive the power stage.
    fn set_output(&mut self, enabled: bool, duty: Duty);
}

impl<T: SensorSource + ?Sized> SensorSource for &mut T {
    fn read_voltage(&mut self) -> f32 {
        (**self).read_voltage()
    }

    fn read_load_current(&mut self) -> f32 {
        (**self).read_load_current()
    }

    fn fault(&self) -> Option<SensorFault> {
        (**self).fault()
    }
}

impl<T: ActuatorSink + ?Sized> ActuatorSink for &mut T {
    fn set_output(&mut self, enabled: bool, duty: Duty) {
        (**self).set_output(enabled, duty)
    }
}

/// Lets one device (e.g. a simulated plant) act as both source and sink.
impl<T: SensorSource> SensorSource for &RefCell<T> {
    fn read_voltage(&mut self) -> f32 {
        self.borrow_mut().read_voltage()
    }

    fn read_load_current(&mut self) -> f32 {
        self.borrow_mut().read_load_current()
    }

    fn fault(&self) -> Option<SensorFault> {
        self.borrow().fault()
    }
}

impl<T: ActuatorSink> ActuatorSink for &RefCell<T> {
    fn set_output(&mut self, enabled: bool, duty: Duty) {
        self.borrow_mut().set_output(enabled, duty)
    }
}

/// Sink that remembers the last command and counts calls. Useful on a bench
/// with no power stage attached, and in tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordingSink {
    /// Last `enabled` flag received.
    pub enabled: bool,
    /// Last duty received.
    pub duty: Duty,
    /// `set_output` calls so far.
    pub calls: u32,
    /// Enable/disable transitions observed.
    pub transitions: u32,
}

impl ActuatorSink for RecordingSink {
    fn set_output(&mut self, enabled: bool, duty: Duty) {
        if self.calls > 0 && enabled != self.enabled {
            self.transitions = self.transitions.saturating_add(1);
        }
        self.enabled = enabled;
        self.duty = duty;
        self.calls = self.calls.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f32, f32);

    impl SensorSource for Fixed {
        fn read_voltage(&mut self) -> f32 {
            self.0
        }
        fn read_load_current(&mut self) -> f32 {
            self.1
        }
    }

    #[test]
    fn test_read_sample_orders_channels() {
        let mut s = Fixed(5.0, 1.25);
        assert_eq!(s.read_sample(), Sample::new(5.0, 1.25));
        assert_eq!(s.fault(), None);
    }

    #[test]
    fn test_refcell_forwarding() {
        let cell = RefCell::new(Fixed(3.3, 0.1));
        let mut src = &cell;
        assert_eq!(src.read_voltage(), 3.3);
        cell.borrow_mut().0 = 3.0;
        assert_eq!(src.read_voltage(), 3.0);
    }

    #[test]
    fn test_recording_sink_counts_transitions() {
        let mut sink = RecordingSink::default();
        sink.set_output(false, Duty::OFF);
        sink.set_output(false, Duty::OFF);
        sink.set_output(true, Duty::MID);
        sink.set_output(false, Duty::OFF);
        assert_eq!(sink.calls, 4);
        assert_eq!(sink.transitions, 2);
        assert_eq!(sink.duty, Duty::OFF);
    }
}
