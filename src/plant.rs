//! Simulated buck converter output stage.
//!
//! A deliberately simple first-order model, good enough to close the loop in
//! tests and demos without hardware:
//!
//! - switching: `v → v + (vin·duty − v)·dt/τ` (clamped to one step of the gap)
//! - skipping:  `v → v − droop·i_load·dt`, floored at 0 V
//!
//! [`SimulatedConverter`] implements both [`SensorSource`] and
//! [`ActuatorSink`]. Wrap it in a [`RefCell`](core::cell::RefCell) and pass
//! `&cell` twice to hand one plant to a
//! [`ControlLoop`](crate::driver::ControlLoop) as both collaborators. The plant
//! integrates one step each time the loop drives it.

use crate::error::SensorFault;
use crate::gate::Duty;
use crate::io::{ActuatorSink, SensorSource};

/// Physical parameters of the simulated stage.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlantParams {
    /// Input rail (V).
    pub input_voltage: f32,
    /// Output time constant while switching (s).
    pub tau_s: f32,
    /// Output droop per amp of load while skipping (V/(A·s)).
    pub droop_v_per_amp_s: f32,
    /// Integration step; one tick (s).
    pub dt_s: f32,
}

impl Default for PlantParams {
    /// 10 V rail, 2 ms time constant, 50 V/(A·s) droop, 1 kHz ticks.
    /// Mid duty from a 10 V rail settles just above 5 V.
    fn default() -> Self {
        Self {
            input_voltage: 10.0,
            tau_s: 0.002,
            droop_v_per_amp_s: 50.0,
            dt_s: 0.001,
        }
    }
}

/// First-order converter plant with a settable load and fault injection.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatedConverter {
    params: PlantParams,
    output_voltage: f32,
    load_current: f32,
    enabled: bool,
    duty: Duty,
    voltage_dropout: bool,
    fault: Option<SensorFault>,
    steps: u64,
    switching_steps: u64,
}

impl SimulatedConverter {
    /// Plant at `output_voltage` with `load_current` drawn.
    pub fn new(params: PlantParams, output_voltage: f32, load_current: f32) -> Self {
        Self {
            params,
            output_voltage,
            load_current,
            enabled: false,
            duty: Duty::OFF,
            voltage_dropout: false,
            fault: None,
            steps: 0,
            switching_steps: 0,
        }
    }

    /// Advance the model one `dt` under the last commanded output.
    pub fn step(&mut self) {
        let p = &self.params;
        if self.enabled {
            let drive = p.input_voltage * self.duty.fraction();
            let k = (p.dt_s / p.tau_s).min(1.0);
            self.output_voltage += (drive - self.output_voltage) * k;
            self.switching_steps += 1;
        } else {
            let droop = p.droop_v_per_amp_s * self.load_current * p.dt_s;
            self.output_voltage = (self.output_voltage - droop).max(0.0);
        }
        self.steps += 1;
    }

    /// Change the load (a load step).
    pub fn set_load_current(&mut self, amps: f32) {
        self.load_current = amps;
    }

    /// Make the voltage channel read NaN until cleared.
    pub fn set_voltage_dropout(&mut self, dropout: bool) {
        self.voltage_dropout = dropout;
    }

    /// Raise or clear the out-of-band fault flag.
    pub fn set_fault(&mut self, fault: Option<SensorFault>) {
        self.fault = fault;
    }

    /// True output voltage, regardless of dropout.
    pub fn output_voltage(&self) -> f32 {
        self.output_voltage
    }

    /// Load current.
    pub fn load_current(&self) -> f32 {
        self.load_current
    }

    /// Last commanded enable flag.
    pub fn is_switching(&self) -> bool {
        self.enabled
    }

    /// Steps integrated so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Steps integrated with switching enabled.
    pub fn switching_steps(&self) -> u64 {
        self.switching_steps
    }
}

impl Default for SimulatedConverter {
    /// Default plant sitting at 5 V with no load.
    fn default() -> Self {
        Self::new(PlantParams::default(), 5.0, 0.0)
    }
}

impl SensorSource for SimulatedConverter {
    fn read_voltage(&mut self) -> f32 {
        if self.voltage_dropout {
            f32::NAN
        } else {
            self.output_voltage
        }
    }

    fn read_load_current(&mut self) -> f32 {
        self.load_current
    }

    fn fault(&self) -> Option<SensorFault> {
        self.fault
    }
}

impl ActuatorSink for SimulatedConverter {
    fn set_output(&mut self, enabled: bool, duty: Duty) {
        self.enabled = enabled;
        self.duty = if enabled { duty } else { Duty::OFF };
        self.step();
    }
}
