//! Simulated board for host-side testing
//!
//! Motors, encoders, aux outputs and time are modelled in one
//! [`SimWorld`]. Time only advances when the world is told to (directly or
//! through [`SimDelay`]), and ticks are delivered through
//! [`TickShared::on_tick`] exactly as the input interrupts would.

use core::cell::Cell;
use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::pwm::{ErrorType, SetDutyCycle};

use ticklink_core::traits::{Clock, ForceStop, MotorDriver, MotorError};
use ticklink_core::TickShared;
use ticklink_protocol::{Direction, INPUT_CHANNELS, MOTOR_CHANNELS};

use crate::aux::AuxOutputs;
use crate::interpreter::Board;

#[derive(Debug, Default)]
struct SimMotorState {
    direction: Cell<Option<Direction>>,
    duty: Cell<u8>,
    /// Fractional ticks carried between advances, in 1/1000 tick
    residue: Cell<u32>,
}

/// Lowest duty at which a simulated motor turns
const MOVING_DUTY: u32 = 20;

/// Physical state of the simulated board
#[derive(Debug)]
pub struct SimWorld {
    now_ms: Cell<u32>,
    motors: [SimMotorState; MOTOR_CHANNELS],
    /// Encoder wiring: motor → input channel
    wiring: [Option<usize>; MOTOR_CHANNELS],
    /// Ticks per second per duty step above the threshold
    ticks_per_step: u32,
}

impl SimWorld {
    /// Motor `m` drives encoder `wiring[m]`
    pub fn new(wiring: [Option<usize>; MOTOR_CHANNELS]) -> Self {
        Self {
            now_ms: Cell::new(0),
            motors: Default::default(),
            wiring,
            ticks_per_step: 1,
        }
    }

    /// Scale the encoder rate
    pub fn with_ticks_per_step(mut self, ticks_per_step: u32) -> Self {
        self.ticks_per_step = ticks_per_step;
        self
    }

    pub fn now_ms(&self) -> u32 {
        self.now_ms.get()
    }

    /// Direction motor `m` is physically turning
    pub fn motor_direction(&self, motor: usize) -> Option<Direction> {
        self.motors.get(motor).and_then(|m| m.direction.get())
    }

    fn rate_per_s(&self, motor: usize) -> u32 {
        let state = &self.motors[motor];
        if state.direction.get().is_none() {
            return 0;
        }
        let duty = state.duty.get() as u32;
        if duty < MOVING_DUTY {
            0
        } else {
            (duty - MOVING_DUTY + 1) * self.ticks_per_step
        }
    }

    /// Advance time by `ms`, delivering encoder ticks one millisecond at
    /// a time
    pub fn advance(&self, ms: u32, ticks: &TickShared) {
        for _ in 0..ms {
            self.now_ms.set(self.now_ms.get().wrapping_add(1));
            for motor in 0..MOTOR_CHANNELS {
                let Some(input) = self.wiring[motor].filter(|&i| i < INPUT_CHANNELS) else {
                    continue;
                };
                let state = &self.motors[motor];
                let mut residue = state.residue.get() + self.rate_per_s(motor);
                while residue >= 1000 {
                    residue -= 1000;
                    ticks.on_tick(input, self);
                }
                state.residue.set(residue);
            }
        }
    }
}

impl ForceStop for SimWorld {
    fn force_stop(&self, motor: u8) {
        if let Some(state) = self.motors.get(motor as usize) {
            state.duty.set(0);
            state.direction.set(None);
            state.residue.set(0);
        }
    }
}

/// One simulated motor output
pub struct SimMotor<'w> {
    world: &'w SimWorld,
    index: usize,
    direction: Option<Direction>,
    duty: u8,
}

impl<'w> SimMotor<'w> {
    pub fn new(world: &'w SimWorld, index: usize) -> Self {
        Self {
            world,
            index,
            direction: None,
            duty: 0,
        }
    }
}

impl MotorDriver for SimMotor<'_> {
    fn drive(&mut self, direction: Direction, duty: u8) -> Result<(), MotorError> {
        let state = self.world.motors.get(self.index).ok_or(MotorError::Pwm)?;
        state.direction.set(Some(direction));
        state.duty.set(duty);
        self.direction = Some(direction);
        self.duty = duty;
        Ok(())
    }

    fn stop(&mut self) {
        self.world.force_stop(self.index as u8);
        self.direction = None;
        self.duty = 0;
    }

    fn direction(&self) -> Option<Direction> {
        self.direction
    }

    fn duty(&self) -> u8 {
        self.duty
    }
}

/// Clock reading the world's time
pub struct SimClock<'w>(pub &'w SimWorld);

impl Clock for SimClock<'_> {
    fn now_ms(&self) -> u32 {
        self.0.now_ms()
    }
}

/// Delay that advances the world instead of sleeping
pub struct SimDelay<'w> {
    pub world: &'w SimWorld,
    pub ticks: &'w TickShared,
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.world.advance(ns / 1_000_000, self.ticks);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.world.advance(ms, self.ticks);
    }
}

/// Aux output recording its last duty fraction
#[derive(Debug, Default)]
pub struct SimOutput {
    pub duty: u16,
}

impl ErrorType for SimOutput {
    type Error = Infallible;
}

impl SetDutyCycle for SimOutput {
    fn max_duty_cycle(&self) -> u16 {
        100
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.duty = duty;
        Ok(())
    }
}

/// Board type built by [`sim_board`]
pub type SimBoard<'w> = Board<SimMotor<'w>, SimOutput, SimClock<'w>, SimDelay<'w>>;

/// Assemble a board over `world`
pub fn sim_board<'w>(world: &'w SimWorld, ticks: &'w TickShared) -> SimBoard<'w> {
    Board {
        motors: [
            SimMotor::new(world, 0),
            SimMotor::new(world, 1),
            SimMotor::new(world, 2),
        ],
        aux: AuxOutputs::new(Default::default()),
        clock: SimClock(world),
        delay: SimDelay { world, ticks },
    }
}
