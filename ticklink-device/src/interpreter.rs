//! Command interpreter
//!
//! The interpreter is the central loop of the device. Each pass it:
//! - Drains trap completion events raised by the input interrupts
//! - Reads serial bytes until at most one line is complete
//! - Gates the command by mode, runs its handler and answers `rdy` or
//!   `err-…`

use embedded_hal::delay::DelayNs;
use embedded_hal::pwm::SetDutyCycle;
use embedded_io::{Error as _, Read, ReadReady, Write};

use ticklink_core::config::ChannelConfigs;
use ticklink_core::state::{is_allowed, Mode};
use ticklink_core::traits::{Clock, MotorDriver};
use ticklink_core::TickShared;
use ticklink_protocol::response::PROMPT;
use ticklink_protocol::{
    CommandName, DeviceError, ErrorCode, Event, Fields, Line, LineAssembler, LineError,
    MOTOR_CHANNELS,
};

use crate::aux::AuxOutputs;
use crate::reply::{emit, line_error, Fault};

/// Hardware owned by the interpreter
pub struct Board<M, A, C, D> {
    pub motors: [M; MOTOR_CHANNELS],
    pub aux: AuxOutputs<A>,
    pub clock: C,
    /// Blocking delay used by calibration runs
    pub delay: D,
}

/// Device command interpreter
pub struct Interpreter<'t, M, A, C, D> {
    pub(crate) board: Board<M, A, C, D>,
    pub(crate) ticks: &'t TickShared,
    pub(crate) mode: Mode,
    pub(crate) configs: ChannelConfigs,
    /// Motor driven since its channel was last configured
    pub(crate) driven: [bool; MOTOR_CHANNELS],
    assembler: LineAssembler,
}

impl<'t, M, A, C, D> Interpreter<'t, M, A, C, D>
where
    M: MotorDriver,
    A: SetDutyCycle,
    C: Clock,
    D: DelayNs,
{
    /// Create an interpreter in [`Mode::Disconnected`]
    pub fn new(board: Board<M, A, C, D>, ticks: &'t TickShared) -> Self {
        Self {
            board,
            ticks,
            mode: Mode::Disconnected,
            configs: ChannelConfigs::new(),
            driven: [false; MOTOR_CHANNELS],
            assembler: LineAssembler::new(),
        }
    }

    /// Get current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn board(&self) -> &Board<M, A, C, D> {
        &self.board
    }

    pub fn configs(&self) -> &ChannelConfigs {
        &self.configs
    }

    /// Report a UART framing or parity fault
    ///
    /// The line being received is dropped and answered with `err-frm`
    /// once its newline arrives.
    pub fn framing_fault(&mut self) {
        self.assembler.transport_fault();
    }

    /// One control-loop pass
    ///
    /// Returns true if a line was handled.
    pub fn poll<R, W>(&mut self, rx: &mut R, tx: &mut W) -> Result<bool, W::Error>
    where
        R: Read + ReadReady,
        W: Write,
    {
        self.drain_events(tx)?;

        loop {
            match rx.read_ready() {
                Ok(true) => {}
                Ok(false) => return Ok(false),
                Err(e) => {
                    log::warn!("rx not ready: {:?}", e.kind());
                    return Ok(false);
                }
            }

            let mut byte = [0u8; 1];
            match rx.read(&mut byte) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    if let Some(received) = self.assembler.feed(byte[0]) {
                        self.step(received, tx)?;
                        return Ok(true);
                    }
                }
                Err(e) => {
                    log::warn!("rx fault: {:?}", e.kind());
                    self.assembler.transport_fault();
                }
            }
        }
    }

    /// Emit `trap:<m>` for every trap that fired since the last pass
    pub fn drain_events<W: Write>(&mut self, tx: &mut W) -> Result<(), W::Error> {
        let fired = self.ticks.take_events();
        if fired == 0 {
            return Ok(());
        }
        for motor in 0..MOTOR_CHANNELS {
            if fired & (1 << motor) != 0 {
                // The interrupt already cut the output; sync the driver
                self.board.motors[motor].stop();
                log::debug!("trap fired on motor {}", motor);
                emit(tx, Event::Trap { motor: motor as u8 })?;
            }
        }
        Ok(())
    }

    /// Handle one assembled line (or the error that replaced it)
    pub fn step<W: Write>(
        &mut self,
        received: Result<Line, LineError>,
        tx: &mut W,
    ) -> Result<(), W::Error> {
        match received {
            Ok(line) => self.handle_line(&line, tx),
            Err(e) => {
                log::warn!("line rejected: {:?}", e);
                emit(tx, line_error(e))
            }
        }
    }

    /// Handle one command line and write its terminal reply
    pub fn handle_line<W: Write>(&mut self, line: &str, tx: &mut W) -> Result<(), W::Error> {
        log::debug!("cmd: {}", line);
        match self.dispatch(line, tx) {
            Ok(()) => emit(tx, PROMPT),
            Err(Fault::Reply(e)) => {
                log::info!("cmd `{}` failed: {}", line, e);
                emit(tx, e)
            }
            Err(Fault::Io(e)) => Err(e),
        }
    }

    fn dispatch<W: Write>(&mut self, line: &str, tx: &mut W) -> Result<(), Fault<W::Error>> {
        let mut fields = Fields::new(line);
        let name = fields.next().map(|f| f.text).unwrap_or("");
        let Some(command) = CommandName::from_name(name) else {
            return Err(DeviceError::with_detail(ErrorCode::Syntax, 0).into());
        };
        if !is_allowed(command, self.mode) {
            return Err(Fault::code(ErrorCode::Mode));
        }

        match command {
            CommandName::Reset => self.handle_reset(fields, tx),
            CommandName::Init => self.handle_init(fields),
            CommandName::Free => self.handle_free(fields),
            CommandName::Ping => self.handle_ping(fields, tx),
            CommandName::Time => self.handle_time(fields, tx),
            CommandName::Calibrate => self.handle_calibrate(fields, tx),
            CommandName::CheckPolarity => self.handle_check_polarity(fields, tx),
            CommandName::Motors => self.handle_motors(fields),
            CommandName::Drive => self.handle_drive(fields),
            CommandName::Servo => self.handle_servo(fields),
            CommandName::Set => self.handle_set(fields, tx),
            CommandName::QueryCounts => self.handle_query_counts(fields, tx),
            CommandName::MotorStatus => self.handle_motor_status(fields, tx),
        }
    }

    /// Stop every motor and disarm every trap
    pub(crate) fn stop_all(&mut self) {
        for motor in self.board.motors.iter_mut() {
            motor.stop();
        }
        self.ticks.disarm_all();
    }

    /// Stop one motor and disarm its trap
    pub(crate) fn stop_motor(&mut self, motor: usize) {
        self.board.motors[motor].stop();
        self.ticks.disarm_motor(motor as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{sim_board, SimWorld};
    use crate::testing::{Sink, Source};

    #[test]
    fn test_poll_handles_one_line_per_pass() {
        let world = SimWorld::new([None; 3]);
        let ticks = TickShared::new();
        let mut dev = Interpreter::new(sim_board(&world, &ticks), &ticks);
        let mut rx = Source::default();
        let mut tx = Sink::default();

        rx.push("reset\r\nfree\n");
        assert_eq!(dev.poll(&mut rx, &mut tx), Ok(true));
        assert_eq!(tx.take_lines(), ["hello:ticklink", "ver:100", "rdy"]);
        assert_eq!(dev.poll(&mut rx, &mut tx), Ok(true));
        assert_eq!(tx.take_lines(), ["rdy"]);
        assert_eq!(dev.mode(), Mode::Free);
        assert_eq!(dev.poll(&mut rx, &mut tx), Ok(false));
        assert!(tx.take_lines().is_empty());
    }

    #[test]
    fn test_partial_line_waits() {
        let world = SimWorld::new([None; 3]);
        let ticks = TickShared::new();
        let mut dev = Interpreter::new(sim_board(&world, &ticks), &ticks);
        let mut rx = Source::default();
        let mut tx = Sink::default();

        rx.push("pi");
        assert_eq!(dev.poll(&mut rx, &mut tx), Ok(false));
        rx.push("ng\n");
        assert_eq!(dev.poll(&mut rx, &mut tx), Ok(true));
        assert_eq!(tx.take_lines(), ["pong", "rdy"]);
    }

    #[test]
    fn test_overlong_line_rejected_without_side_effects() {
        let world = SimWorld::new([None; 3]);
        let ticks = TickShared::new();
        let mut dev = Interpreter::new(sim_board(&world, &ticks), &ticks);
        let mut rx = Source::default();
        let mut tx = Sink::default();

        rx.push("reset:");
        rx.push(&"x".repeat(300));
        rx.push("\n");
        assert_eq!(dev.poll(&mut rx, &mut tx), Ok(true));
        assert_eq!(tx.take_lines(), ["err-ovf"]);
        assert_eq!(dev.mode(), Mode::Disconnected);
    }

    #[test]
    fn test_line_errors() {
        let world = SimWorld::new([None; 3]);
        let ticks = TickShared::new();
        let mut dev = Interpreter::new(sim_board(&world, &ticks), &ticks);
        let mut tx = Sink::default();

        dev.step(Err(LineError::Framing), &mut tx).unwrap();
        dev.step(Err(LineError::Encoding { offset: 3 }), &mut tx).unwrap();
        assert_eq!(tx.take_lines(), ["err-frm", "err-syn-3"]);
    }

    #[test]
    fn test_framing_fault_drops_line() {
        let world = SimWorld::new([None; 3]);
        let ticks = TickShared::new();
        let mut dev = Interpreter::new(sim_board(&world, &ticks), &ticks);
        let mut rx = Source::default();
        let mut tx = Sink::default();

        rx.push("res");
        dev.poll(&mut rx, &mut tx).unwrap();
        dev.framing_fault();
        rx.push("et\nping\n");
        assert_eq!(dev.poll(&mut rx, &mut tx), Ok(true));
        assert_eq!(tx.take_lines(), ["err-frm"]);
        assert_eq!(dev.mode(), Mode::Disconnected);
        assert_eq!(dev.poll(&mut rx, &mut tx), Ok(true));
        assert_eq!(tx.take_lines(), ["pong", "rdy"]);
    }

    #[test]
    fn test_trap_event_precedes_next_reply() {
        let world = SimWorld::new([Some(1), None, None]);
        let ticks = TickShared::new();
        let mut dev = Interpreter::new(sim_board(&world, &ticks), &ticks);
        let mut rx = Source::default();
        let mut tx = Sink::default();

        rx.push("reset\nmot:0:0:0:1\nfree\nsrv:0:f:0002\n");
        for _ in 0..4 {
            dev.poll(&mut rx, &mut tx).unwrap();
        }
        tx.take_lines();

        world.advance(100, &ticks);
        rx.push("ping\n");
        dev.poll(&mut rx, &mut tx).unwrap();
        assert_eq!(tx.take_lines(), ["trap:0", "pong", "rdy"]);
        assert!(!dev.board().motors[0].is_running());
    }
}
