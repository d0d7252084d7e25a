//! Motor calibration against an encoder input
//!
//! Calibration runs in two phases for one motor channel:
//!
//! 1. Minimum-duty discovery per direction. A full-duty probe must move
//!    the motor, then the lowest moving duty is bisected between a known
//!    good upper bound and an untried lower bound.
//! 2. Ladder sampling. With both minima stored and the tables cleared,
//!    the motor runs forward and reverse at every ladder percentage and
//!    the tick counts are reported so the host can fit a correction.
//!
//! Every run blocks on the delay for its full duration.

use embedded_hal::delay::DelayNs;

use ticklink_core::config::MotorChannelConfig;
use ticklink_core::traits::{MotorDriver, MotorError};
use ticklink_core::TickShared;
use ticklink_protocol::{
    CalibrationLine, CalibrationStep, Direction, PolarityReport, CALIBRATION_LADDER, FULL_DUTY,
};

/// Duration of one minimum-duty probe
pub const PROBE_MS: u32 = 750;

/// Ticks a probe must produce to count as moving
pub const PROBE_MIN_TICKS: u32 = 2;

/// Duration of one ladder sample per direction
pub const SAMPLE_MS: u32 = 3_000;

/// Ticks a ladder sample must produce
pub const SAMPLE_MIN_TICKS: u32 = 3;

/// Bisection stops once the bounds are closer than this
pub const BISECT_RESOLUTION: u8 = 5;

/// Minima below this get [`LOW_DUTY_MARGIN`] added
pub const LOW_DUTY_LIMIT: u8 = 128;

/// Safety margin for low minima
pub const LOW_DUTY_MARGIN: u8 = 10;

/// Calibration failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// The motor does not move in this direction, even at full duty
    Setup(Direction),
    /// A ladder step produced too few ticks
    Sample { direction: Direction, step: u8 },
    /// Motor output fault
    Motor(MotorError),
}

impl CalibrationError {
    /// Direction the failure occurred in, if known
    pub fn direction(&self) -> Option<Direction> {
        match *self {
            CalibrationError::Setup(direction) => Some(direction),
            CalibrationError::Sample { direction, .. } => Some(direction),
            CalibrationError::Motor(_) => None,
        }
    }
}

impl From<MotorError> for CalibrationError {
    fn from(e: MotorError) -> Self {
        CalibrationError::Motor(e)
    }
}

/// A motor, its tick input and a delay
pub struct ProbeRig<'a, M, D> {
    pub motor: &'a mut M,
    pub ticks: &'a TickShared,
    pub input: usize,
    pub delay: &'a mut D,
}

impl<'a, M: MotorDriver, D: DelayNs> ProbeRig<'a, M, D> {
    pub fn new(motor: &'a mut M, ticks: &'a TickShared, input: usize, delay: &'a mut D) -> Self {
        Self {
            motor,
            ticks,
            input,
            delay,
        }
    }

    /// Run at `duty` for `ms` and return the ticks counted meanwhile
    pub fn run_for(&mut self, direction: Direction, duty: u8, ms: u32) -> Result<u32, MotorError> {
        self.ticks.read_and_reset(self.input);
        if let Err(e) = self.motor.drive(direction, duty) {
            self.motor.stop();
            return Err(e);
        }
        self.delay.delay_ms(ms);
        self.motor.stop();
        Ok(self.ticks.read_and_reset(self.input))
    }

    /// Single minimum-duty probe
    pub fn probe(&mut self, direction: Direction, duty: u8) -> Result<bool, MotorError> {
        Ok(self.run_for(direction, duty, PROBE_MS)? >= PROBE_MIN_TICKS)
    }

    /// Lowest duty that moves the motor in `direction`
    pub fn find_min_duty(&mut self, direction: Direction) -> Result<u8, CalibrationError> {
        search_min_duty(|duty| self.probe(direction, duty))?
            .ok_or(CalibrationError::Setup(direction))
    }

    /// Full-duty run in both directions
    pub fn check_polarity(&mut self) -> Result<PolarityReport, MotorError> {
        let forward = self.run_for(Direction::Forward, FULL_DUTY, PROBE_MS)?;
        let reverse = self.run_for(Direction::Reverse, FULL_DUTY, PROBE_MS)?;
        Ok(PolarityReport { forward, reverse })
    }

    /// Calibrate one channel
    ///
    /// Stores the discovered minima into `config` (clearing its tables)
    /// and passes every progress line to `report`. On success returns the
    /// forward and reverse minima.
    pub fn calibrate(
        &mut self,
        channel: u8,
        config: &mut MotorChannelConfig,
        mut report: impl FnMut(CalibrationLine),
    ) -> Result<(u8, u8), CalibrationError> {
        let mut emit = |step| report(CalibrationLine { channel, step });

        emit(CalibrationStep::Run);
        let forward = self.find_min_duty(Direction::Forward)?;
        let reverse = self.find_min_duty(Direction::Reverse)?;
        config.set_minima(forward, reverse);
        emit(CalibrationStep::Min { forward, reverse });

        for (step, &percent) in CALIBRATION_LADDER.iter().enumerate() {
            let step = step as u8;
            let mut counts = [0u32; 2];
            for direction in [Direction::Forward, Direction::Reverse] {
                let duty = config.duty_for(direction, percent);
                let count = self.run_for(direction, duty, SAMPLE_MS)?;
                if count < SAMPLE_MIN_TICKS {
                    emit(CalibrationStep::Fail { direction, step });
                    return Err(CalibrationError::Sample { direction, step });
                }
                counts[direction.index()] = count;
            }
            emit(CalibrationStep::Sample {
                percent,
                forward: counts[0],
                reverse: counts[1],
            });
        }

        emit(CalibrationStep::End);
        Ok((forward, reverse))
    }
}

/// Bisect the lowest duty for which `passes` holds
///
/// Full duty is probed first; `Ok(None)` means even full duty failed or
/// the final re-probe of the bound failed.
pub fn search_min_duty<E>(
    mut passes: impl FnMut(u8) -> Result<bool, E>,
) -> Result<Option<u8>, E> {
    if !passes(FULL_DUTY)? {
        return Ok(None);
    }

    let mut hi = FULL_DUTY;
    let mut lo = 1u8;
    while hi - lo >= BISECT_RESOLUTION {
        let mid = ((hi as u16 + lo as u16) / 2) as u8;
        if passes(mid)? {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    if !passes(hi)? {
        return Ok(None);
    }
    if hi < LOW_DUTY_LIMIT {
        hi += LOW_DUTY_MARGIN;
    }
    Ok(Some(hi))
}

#[cfg(test)]
pub(crate) mod sim {
    //! Simulated motor and encoder driven by the delay

    use core::cell::Cell;

    use embedded_hal::delay::DelayNs;
    use ticklink_core::traits::{ForceStop, MotorDriver, MotorError};
    use ticklink_core::TickShared;
    use ticklink_protocol::Direction;

    pub struct World {
        /// Lowest moving duty per direction
        pub threshold: [u32; 2],
        /// Motor jams once this much run time has elapsed
        pub jam_after_ms: Option<u32>,
        pub elapsed_ms: Cell<u32>,
        pub direction: Cell<Option<Direction>>,
        pub duty: Cell<u8>,
    }

    impl World {
        pub fn new(forward: u32, reverse: u32) -> Self {
            Self {
                threshold: [forward, reverse],
                jam_after_ms: None,
                elapsed_ms: Cell::new(0),
                direction: Cell::new(None),
                duty: Cell::new(0),
            }
        }

        fn ticks_for(&self, ms: u32) -> u32 {
            let Some(direction) = self.direction.get() else {
                return 0;
            };
            if let Some(limit) = self.jam_after_ms {
                if self.elapsed_ms.get() >= limit {
                    return 0;
                }
            }
            let duty = self.duty.get() as u32;
            let threshold = self.threshold[direction.index()];
            if duty < threshold {
                0
            } else {
                (duty - threshold + 1) * ms / 250
            }
        }
    }

    impl ForceStop for World {
        fn force_stop(&self, _motor: u8) {
            self.duty.set(0);
        }
    }

    pub struct SimMotor<'a>(pub &'a World);

    impl MotorDriver for SimMotor<'_> {
        fn drive(&mut self, direction: Direction, duty: u8) -> Result<(), MotorError> {
            self.0.direction.set(Some(direction));
            self.0.duty.set(duty);
            Ok(())
        }

        fn stop(&mut self) {
            self.0.direction.set(None);
            self.0.duty.set(0);
        }

        fn direction(&self) -> Option<Direction> {
            self.0.direction.get()
        }

        fn duty(&self) -> u8 {
            self.0.duty.get()
        }
    }

    pub struct SimDelay<'a> {
        pub world: &'a World,
        pub ticks: &'a TickShared,
        pub input: usize,
    }

    impl DelayNs for SimDelay<'_> {
        fn delay_ns(&mut self, ns: u32) {
            self.delay_ms(ns / 1_000_000);
        }

        fn delay_ms(&mut self, ms: u32) {
            for _ in 0..self.world.ticks_for(ms) {
                self.ticks.on_tick(self.input, self.world);
            }
            if self.world.direction.get().is_some() {
                self.world
                    .elapsed_ms
                    .set(self.world.elapsed_ms.get() + ms);
            }
        }
    }
}
