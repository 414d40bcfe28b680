/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! The control loop driver: cadence, tick sequencing, cross-tick state.
//!
//! ```text
//!          elapsed >= period
//!   Idle ─────────────────────▶ Sampling
//!    ▲                              │ acquire → compute → decide → actuate
//!    └──────────────────────────────┘ → advance history → count
//! ```
//!
//! One [`ControlLoop`] owns one [`SampleState`] and mutates it only through
//! `&mut self`, once per tick. Scheduling is cooperative: [`ControlLoop::poll`]
//! runs at most one tick per call and never catches up missed periods. When a
//! poll arrives a whole period or more late, the tick still runs, the overrun
//! is counted, and the schedule re-anchors at the late tick.
//!
//! # Sensor faults
//!
//! A reading is faulted when it is not finite or the source flags it. Faulted
//! values still flow through the entropy calculation. Under
//! [`FaultPolicy::LatchOff`] the gate is forced to cycle-skip once enough
//! consecutive faulted ticks accumulate; the first clean tick releases it.

use log::{debug, info, trace, warn};

use crate::command::{Command, CommandResponse, HELP_TEXT};
use crate::config::{FaultPolicy, LoopConfig};
use crate::error::{Channel, ConfigError, SensorFault};
use crate::field;
use crate::gate::{EntropyDecision, GatePolicy, GateState, ThresholdGate};
use crate::io::{ActuatorSink, SensorSource};
use crate::state::{Sample, SampleState};
use crate::telemetry::{TelemetrySnapshot, TelemetryThrottle};

#[cfg(feature = "std")]
use crate::telemetry::SnapshotCell;

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Monotonic microsecond time source for [`ControlLoop::poll`].
pub trait Clock {
    /// Microseconds since an arbitrary fixed origin. Must not go backwards.
    fn now_us(&self) -> u64;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Clock whose origin is now.
    pub fn new() -> Self {
        Self { origin: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// Driver state-machine phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    /// Waiting for the next sample period.
    Idle,
    /// Executing a tick.
    Sampling,
}

/// Outcome of one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    /// State and decision as of this tick.
    pub snapshot: TelemetrySnapshot,
    /// Fault observed on this tick's reading, if any.
    pub fault: Option<SensorFault>,
    /// The fault latch overrode the gate to cycle-skip.
    pub fault_latched: bool,
    /// This tick started a whole period or more behind schedule.
    pub late: bool,
    /// The telemetry reporter should emit this snapshot.
    pub telemetry_due: bool,
}

impl TickReport {
    /// The tick's decision.
    pub fn decision(&self) -> &EntropyDecision {
        &self.snapshot.decision
    }
}

// ─── ControlLoop ─────────────────────────────────────────────────────────────

/// Sampling-and-decision loop for one converter output.
///
/// Generic over the sensor source `S`, actuator sink `A`, and gate policy `G`
/// (the memoryless [`ThresholdGate`] unless chosen otherwise).
pub struct ControlLoop<S, A, G = ThresholdGate> {
    config: LoopConfig,
    sensor: S,
    actuator: A,
    gate: G,
    state: SampleState,
    phase: LoopPhase,
    period_us: u64,
    last_tick_us: Option<u64>,
    last_gate: GateState,
    last_snapshot: Option<TelemetrySnapshot>,
    consecutive_faults: u8,
    overruns: u32,
    telemetry: TelemetryThrottle,
    #[cfg(feature = "std")]
    publisher: Option<SnapshotCell>,
}

impl<S: SensorSource, A: ActuatorSink> ControlLoop<S, A, ThresholdGate> {
    /// Build a loop with the reference threshold gate.
    ///
    /// Reads one sample to seed the history so the first tick sees no
    /// spurious gradient. Fails if `config` does not validate.
    pub fn new(config: LoopConfig, sensor: S, actuator: A) -> Result<Self, ConfigError> {
        let gate = ThresholdGate::new(config.coefficients.threshold());
        Self::with_gate(config, sensor, actuator, gate)
    }
}

impl<S: SensorSource, A: ActuatorSink, G: GatePolicy> ControlLoop<S, A, G> {
    /// Build a loop with an explicit gate policy.
    ///
    /// `config` is re-validated here since its fields are public; nothing is
    /// read from the sensor when it is rejected.
    pub fn with_gate(
        config: LoopConfig,
        mut sensor: S,
        actuator: A,
        gate: G,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let first = sensor.read_sample();
        if let Some(fault) = detect_fault(&sensor, first) {
            warn!("seed reading faulted: {}", fault);
        }
        info!(
            "control loop start: target {:.3} V, threshold {:.3}, {} Hz",
            config.coefficients.target_voltage(),
            config.coefficients.threshold(),
            config.sample_rate_hz,
        );
        Ok(Self {
            period_us: config.sample_period_us(),
            telemetry: TelemetryThrottle::new(config.telemetry_interval_us()),
            config,
            sensor,
            actuator,
            gate,
            state: SampleState::seeded(first),
            phase: LoopPhase::Idle,
            last_tick_us: None,
            last_gate: GateState::CycleSkip,
            last_snapshot: None,
            consecutive_faults: 0,
            overruns: 0,
            #[cfg(feature = "std")]
            publisher: None,
        })
    }

    /// Publish every tick's snapshot into `cell` for a reporter thread.
    #[cfg(feature = "std")]
    pub fn with_publisher(mut self, cell: SnapshotCell) -> Self {
        self.publisher = Some(cell);
        self
    }

    /// Run one full tick now, regardless of cadence.
    pub fn tick(&mut self) -> TickReport {
        self.phase = LoopPhase::Sampling;

        let sample = self.sensor.read_sample();
        let fault = detect_fault(&self.sensor, sample);
        self.state.record(sample);

        let terms = field::compute(&self.state, &self.config.coefficients);
        let mut gate = self.gate.decide(terms.entropy_field);

        let fault_latched = self.track_fault(fault);
        if fault_latched {
            gate = GateState::CycleSkip;
            self.gate.reset();
        }

        self.actuator.set_output(gate.is_enabled(), gate.duty());
        if gate != self.last_gate {
            debug!(
                "gate {} at sample {} (field {:.4})",
                gate.label(),
                self.state.sample_count,
                terms.entropy_field
            );
            self.last_gate = gate;
        }

        let snapshot = TelemetrySnapshot {
            state: self.state,
            decision: EntropyDecision::new(&terms, gate),
        };
        trace!("{}", snapshot);

        self.state.advance();
        self.last_snapshot = Some(snapshot);
        #[cfg(feature = "std")]
        if let Some(cell) = &self.publisher {
            cell.publish(snapshot);
        }

        self.phase = LoopPhase::Idle;
        TickReport {
            snapshot,
            fault,
            fault_latched,
            late: false,
            telemetry_due: false,
        }
    }

    /// Run a tick if at least one sample period has elapsed since the last.
    ///
    /// The first poll always ticks. Returns `None` while idle.
    pub fn poll(&mut self, now_us: u64) -> Option<TickReport> {
        let late = match self.last_tick_us {
            None => false,
            Some(last) => {
                let elapsed = now_us.saturating_sub(last);
                if elapsed < self.period_us {
                    return None;
                }
                elapsed >= self.period_us.saturating_mul(2)
            }
        };
        self.last_tick_us = Some(now_us);

        let mut report = self.tick();
        if late {
            self.overruns = self.overruns.wrapping_add(1);
            warn!(
                "tick {} started late (overrun #{})",
                report.snapshot.state.sample_count, self.overruns
            );
            report.late = true;
        }
        report.telemetry_due = self.telemetry.due(now_us);
        Some(report)
    }

    /// Microseconds until the next tick is due at `now_us`; 0 when a poll
    /// would tick now.
    pub fn until_next_tick_us(&self, now_us: u64) -> u64 {
        match self.last_tick_us {
            None => 0,
            Some(last) => last
                .saturating_add(self.period_us)
                .saturating_sub(now_us),
        }
    }

    /// Poll until `shutdown` is set, handing each tick to `on_tick`. Sleeps
    /// between ticks rather than spinning.
    #[cfg(feature = "std")]
    pub fn run<C, F>(&mut self, clock: &C, shutdown: &std::sync::atomic::AtomicBool, mut on_tick: F)
    where
        C: Clock,
        F: FnMut(&TickReport),
    {
        use std::sync::atomic::Ordering;

        while !shutdown.load(Ordering::Acquire) {
            match self.poll(clock.now_us()) {
                Some(report) => on_tick(&report),
                None => {
                    let wait = self.until_next_tick_us(clock.now_us());
                    std::thread::sleep(std::time::Duration::from_micros(wait));
                }
            }
        }
        info!("control loop stopped after {} samples", self.state.sample_count);
    }

    /// Execute a console command between ticks.
    pub fn apply(&mut self, command: Command) -> CommandResponse {
        debug!("console command {:?}", command);
        match command {
            Command::ToggleTelemetry => CommandResponse::Telemetry(self.telemetry.toggle()),
            Command::ResetCounter => {
                let previous = self.state.sample_count;
                self.reset_sample_count();
                CommandResponse::CounterReset { previous }
            }
            Command::Help => CommandResponse::Help(HELP_TEXT),
        }
    }

    /// Zero the sample counter. Readings and history are kept.
    pub fn reset_sample_count(&mut self) {
        self.state.reset_count();
    }

    /// Returns `true` when the gate must be forced off this tick.
    fn track_fault(&mut self, fault: Option<SensorFault>) -> bool {
        let Some(fault) = fault else {
            if self.consecutive_faults > 0 {
                info!("sensor recovered after {} faulted ticks", self.consecutive_faults);
            }
            self.consecutive_faults = 0;
            return false;
        };
        self.consecutive_faults = self.consecutive_faults.saturating_add(1);
        warn!(
            "sensor fault at sample {}: {} ({} in a row)",
            self.state.sample_count, fault, self.consecutive_faults
        );
        match self.config.fault_policy {
            FaultPolicy::PassThrough => false,
            FaultPolicy::LatchOff { consecutive } => {
                let latched = self.consecutive_faults >= consecutive;
                if latched && self.consecutive_faults == consecutive {
                    warn!("fault latch engaged: switching forced off");
                }
                latched
            }
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    /// Live sample history (read-only).
    pub fn state(&self) -> &SampleState {
        &self.state
    }

    /// Copy of the most recent tick's snapshot.
    pub fn snapshot(&self) -> Option<TelemetrySnapshot> {
        self.last_snapshot
    }

    /// Current state-machine phase.
    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Active configuration.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Tick period in microseconds.
    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    /// Late ticks observed by [`ControlLoop::poll`].
    pub fn overrun_count(&self) -> u32 {
        self.overruns
    }

    /// Faulted ticks in a row, up to and including the last tick.
    pub fn consecutive_faults(&self) -> u8 {
        self.consecutive_faults
    }

    /// Whether telemetry emission is on.
    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry.is_enabled()
    }

    /// The gate policy.
    pub fn gate(&self) -> &G {
        &self.gate
    }

    /// The sensor source.
    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    /// The sensor source, mutably (e.g. to step a simulated load).
    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// The actuator sink.
    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Tear down the loop and return its collaborators.
    pub fn into_parts(self) -> (S, A, G) {
        (self.sensor, self.actuator, self.gate)
    }
}

fn detect_fault<S: SensorSource>(sensor: &S, sample: Sample) -> Option<SensorFault> {
    if let Some(fault) = sensor.fault() {
        return Some(fault);
    }
    if !sample.voltage.is_finite() {
        return Some(SensorFault::NonFinite(Channel::Voltage));
    }
    if !sample.current.is_finite() {
        return Some(SensorFault::NonFinite(Channel::LoadCurrent));
    }
    None
}

// ─── Tests ──────────────────────────────────────────────────────────────────
