//! Per-command handlers
//!
//! Handlers parse every field before mutating anything, except `mot`,
//! whose groups are committed one at a time.

use embedded_hal::delay::DelayNs;
use embedded_hal::pwm::SetDutyCycle;
use embedded_io::Write;
use heapless::Vec;

use ticklink_core::config::MotorChannelConfig;
use ticklink_core::state::ModeEvent;
use ticklink_core::traits::{Clock, MotorDriver, MotorError};
use ticklink_drivers::motor::{start_servo, CalibrationError, ProbeRig, ServoMove, ServoStart};
use ticklink_protocol::command::NO_INPUT;
use ticklink_protocol::response::{
    BANNER, PROTOCOL_VERSION, TAG_HELLO, TAG_PONG, TAG_TIME, TAG_VERSION,
};
use ticklink_protocol::{
    CounterInfo, Counts, DeviceError, Direction, DirectionCalibration, DriveAction, ErrorCode,
    Field, FieldError, Fields, MotorReport, MotorSetup, MotorState, OutputEcho, OutputSymbol,
    AUX_OUTPUTS, INPUT_CHANNELS, MOTOR_CHANNELS,
};

use crate::interpreter::{Board, Interpreter};
use crate::reply::{emit, Fault};

/// Default `drv`/`srv` speed
const DEFAULT_PERCENT: u8 = 100;

type HandlerResult<E> = Result<(), Fault<E>>;

fn say<W: Write>(tx: &mut W, item: impl core::fmt::Display) -> HandlerResult<W::Error> {
    emit(tx, item).map_err(Fault::Io)
}

fn motor_index(fields: &mut Fields<'_>) -> Result<usize, FieldError> {
    Ok(fields.require()?.index(MOTOR_CHANNELS as u8)? as usize)
}

fn percent(field: Field<'_>) -> Result<u8, FieldError> {
    match field.hex_u8()? {
        p @ 1..=100 => Ok(p),
        _ => Err(field.overflow()),
    }
}

fn optional_percent(fields: &mut Fields<'_>) -> Result<u8, FieldError> {
    match fields.next() {
        Some(field) => percent(field),
        None => Ok(DEFAULT_PERCENT),
    }
}

fn direction(field: Field<'_>) -> Result<Direction, FieldError> {
    Direction::from_char(field.single_char()?).ok_or(field.syntax())
}

fn motor_fault(e: MotorError) -> DeviceError {
    log::warn!("motor output fault: {:?}", e);
    DeviceError::new(ErrorCode::Mapping)
}

fn calibration_fault(e: CalibrationError) -> DeviceError {
    log::warn!("calibration failed: {:?}", e);
    match e.direction() {
        Some(direction) => DeviceError::with_detail(ErrorCode::Calibration, direction.index() as u16),
        None => DeviceError::new(ErrorCode::Calibration),
    }
}

impl<'t, M, A, C, D> Interpreter<'t, M, A, C, D>
where
    M: MotorDriver,
    A: SetDutyCycle,
    C: Clock,
    D: DelayNs,
{
    pub(crate) fn handle_reset<W: Write>(
        &mut self,
        mut fields: Fields<'_>,
        tx: &mut W,
    ) -> HandlerResult<W::Error> {
        fields.finish()?;
        self.stop_all();
        self.ticks.reset_counts();
        self.configs.restore_defaults();
        self.driven = [false; MOTOR_CHANNELS];
        if let Err(e) = self.board.aux.restore() {
            log::warn!("aux output {} did not reset", e.index);
        }
        self.mode = self.mode.transition(ModeEvent::Reset);

        say(tx, format_args!("{}:{}", TAG_HELLO, BANNER))?;
        say(tx, format_args!("{}:{:x}", TAG_VERSION, PROTOCOL_VERSION))
    }

    pub(crate) fn handle_init<E>(&mut self, mut fields: Fields<'_>) -> HandlerResult<E> {
        fields.finish()?;
        self.stop_all();
        self.configs.restore_defaults();
        self.driven = [false; MOTOR_CHANNELS];
        self.mode = self.mode.transition(ModeEvent::EnterInit);
        Ok(())
    }

    pub(crate) fn handle_free<E>(&mut self, mut fields: Fields<'_>) -> HandlerResult<E> {
        fields.finish()?;
        self.mode = self.mode.transition(ModeEvent::EnterFree);
        Ok(())
    }

    pub(crate) fn handle_ping<W: Write>(
        &mut self,
        fields: Fields<'_>,
        tx: &mut W,
    ) -> HandlerResult<W::Error> {
        match fields.rest() {
            Some(msg) if !msg.is_empty() => say(tx, format_args!("{}:{}", TAG_PONG, msg)),
            _ => say(tx, TAG_PONG),
        }
    }

    pub(crate) fn handle_time<W: Write>(
        &mut self,
        mut fields: Fields<'_>,
        tx: &mut W,
    ) -> HandlerResult<W::Error> {
        fields.finish()?;
        let now = self.board.clock.now_ms();
        say(tx, format_args!("{}:{:x}", TAG_TIME, now))
    }

    pub(crate) fn handle_calibrate<W: Write>(
        &mut self,
        mut fields: Fields<'_>,
        tx: &mut W,
    ) -> HandlerResult<W::Error> {
        let channel = motor_index(&mut fields)?;
        fields.finish()?;

        let config = &mut self.configs;
        let Some(config) = config.get_mut(channel) else {
            return Err(Fault::code(ErrorCode::Mapping));
        };
        let Some(input) = config.input_index() else {
            return Err(Fault::code(ErrorCode::Mapping));
        };

        let Board { motors, delay, .. } = &mut self.board;
        let mut rig = ProbeRig::new(&mut motors[channel], self.ticks, input, delay);
        let mut io_error = None;
        let result = rig.calibrate(channel as u8, config, |line| {
            if io_error.is_none() {
                if let Err(e) = emit(tx, line) {
                    io_error = Some(e);
                }
            }
        });
        self.driven[channel] = false;

        if let Some(e) = io_error {
            return Err(Fault::Io(e));
        }
        result.map(|_| ()).map_err(|e| calibration_fault(e).into())
    }

    pub(crate) fn handle_check_polarity<W: Write>(
        &mut self,
        mut fields: Fields<'_>,
        tx: &mut W,
    ) -> HandlerResult<W::Error> {
        let channel = motor_index(&mut fields)?;
        fields.finish()?;

        let Some(input) = self.configs.get(channel).and_then(|c| c.input_index()) else {
            return Err(Fault::code(ErrorCode::Mapping));
        };

        let Board { motors, delay, .. } = &mut self.board;
        let mut rig = ProbeRig::new(&mut motors[channel], self.ticks, input, delay);
        let report = rig
            .check_polarity()
            .map_err(|e| calibration_fault(CalibrationError::Motor(e)))?;
        self.driven[channel] = true;
        say(tx, report)
    }

    /// Groups are committed as they parse; a bad group leaves earlier ones
    /// applied. No groups at all restores every default.
    pub(crate) fn handle_motors<E>(&mut self, mut fields: Fields<'_>) -> HandlerResult<E> {
        if fields.is_empty() {
            self.stop_all();
            self.configs.restore_defaults();
            self.driven = [false; MOTOR_CHANNELS];
            return Ok(());
        }

        while let Some(channel_field) = fields.next() {
            let channel = channel_field.index(MOTOR_CHANNELS as u8)?;
            let forward_field = fields.require()?;
            let forward = DirectionCalibration::parse(forward_field.text, forward_field.offset)?;
            let reverse_field = fields.require()?;
            let reverse = DirectionCalibration::parse(reverse_field.text, reverse_field.offset)?;
            let input_field = fields.require()?;
            let input = if input_field.text == NO_INPUT {
                None
            } else {
                Some(input_field.index(INPUT_CHANNELS as u8)?)
            };

            let setup = MotorSetup {
                channel,
                forward,
                reverse,
                input,
            };
            let config =
                MotorChannelConfig::from_setup(&setup).map_err(|_| forward_field.overflow())?;

            let index = channel as usize;
            self.stop_motor(index);
            self.configs.apply(index, config);
            self.driven[index] = false;
            log::debug!("motor {} configured", channel);
        }
        Ok(())
    }

    pub(crate) fn handle_drive<E>(&mut self, mut fields: Fields<'_>) -> HandlerResult<E> {
        let motor = motor_index(&mut fields)?;
        let action_field = fields.require()?;
        let action =
            DriveAction::from_char(action_field.single_char()?).ok_or(action_field.syntax())?;
        let percent = optional_percent(&mut fields)?;
        fields.finish()?;

        match action {
            DriveAction::Stop => self.stop_motor(motor),
            DriveAction::Run(direction) => {
                let duty = self
                    .configs
                    .get(motor)
                    .map(|c| c.duty_for(direction, percent))
                    .unwrap_or(0);
                self.board.motors[motor]
                    .drive(direction, duty)
                    .map_err(motor_fault)?;
            }
        }
        self.driven[motor] = true;
        Ok(())
    }

    /// A channel without an input mapping answers `err-map` and its motor
    /// is stopped, including one still running from an earlier `drv`.
    pub(crate) fn handle_servo<E>(&mut self, mut fields: Fields<'_>) -> HandlerResult<E> {
        let motor = motor_index(&mut fields)?;
        let direction = direction(fields.require()?)?;
        let target_field = fields.require()?;
        let target = target_field.hex_u16()?;
        if target == 0 {
            return Err(target_field.syntax().into());
        }
        let percent = optional_percent(&mut fields)?;
        fields.finish()?;

        let Some(config) = self.configs.get(motor) else {
            return Err(Fault::code(ErrorCode::Mapping));
        };
        let request = ServoMove {
            motor: motor as u8,
            direction,
            percent,
            target,
        };
        let started = start_servo(&mut self.board.motors[motor], self.ticks, config, request)
            .map_err(motor_fault)?;

        match started {
            ServoStart::Started => {
                self.driven[motor] = true;
                Ok(())
            }
            ServoStart::Ignored => {
                log::debug!("motor {} trap already armed", motor);
                Ok(())
            }
            ServoStart::Unmapped => {
                self.driven[motor] = true;
                Err(Fault::code(ErrorCode::Mapping))
            }
        }
    }

    pub(crate) fn handle_set<W: Write>(
        &mut self,
        mut fields: Fields<'_>,
        tx: &mut W,
    ) -> HandlerResult<W::Error> {
        let field = fields.require()?;
        fields.finish()?;

        let mut symbols = [OutputSymbol::Keep; AUX_OUTPUTS];
        let mut chars = field.text.char_indices();
        for slot in symbols.iter_mut() {
            let (i, c) = chars.next().ok_or(FieldError::Syntax {
                offset: field.offset + field.text.len(),
            })?;
            *slot = OutputSymbol::from_char(c).ok_or(FieldError::Syntax {
                offset: field.offset + i,
            })?;
        }
        if let Some((i, _)) = chars.next() {
            return Err(FieldError::Syntax {
                offset: field.offset + i,
            }
            .into());
        }

        if let Err(e) = self.board.aux.apply(&symbols) {
            log::warn!("aux output {} rejected its level", e.index);
            return Err(Fault::code(ErrorCode::Mapping));
        }
        say(tx, OutputEcho(self.board.aux.echo()))
    }

    pub(crate) fn handle_query_counts<W: Write>(
        &mut self,
        mut fields: Fields<'_>,
        tx: &mut W,
    ) -> HandlerResult<W::Error> {
        let only = match fields.next() {
            Some(field) => Some(field.index(INPUT_CHANNELS as u8)? as usize),
            None => None,
        };
        fields.finish()?;

        let mut counts = Vec::new();
        for input in 0..INPUT_CHANNELS {
            if only.map_or(true, |i| i == input) {
                counts
                    .push(self.ticks.read_and_reset(input))
                    .map_err(|_| Fault::code(ErrorCode::Overflow))?;
            }
        }
        say(tx, Counts(counts))
    }

    pub(crate) fn handle_motor_status<W: Write>(
        &mut self,
        mut fields: Fields<'_>,
        tx: &mut W,
    ) -> HandlerResult<W::Error> {
        let motor = motor_index(&mut fields)?;
        fields.finish()?;

        let driver = &self.board.motors[motor];
        let state = if !self.driven[motor] {
            MotorState::Unknown
        } else {
            match driver.direction() {
                Some(direction) => MotorState::Running(direction),
                None => MotorState::Stopped,
            }
        };
        let counter = self
            .configs
            .get(motor)
            .and_then(|c| c.input_index())
            .map(|input| CounterInfo {
                input: input as u8,
                count: self.ticks.count(input),
                trap: self
                    .ticks
                    .trap(input)
                    .filter(|t| t.motor as usize == motor)
                    .map(|t| t.target),
            });

        say(
            tx,
            MotorReport {
                motor: motor as u8,
                state,
                duty: driver.duty(),
                counter,
            },
        )
    }
}
