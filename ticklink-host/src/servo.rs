//! Servo moves and their completion
//!
//! A channel is "moving" from just before its `srv` command is written
//! until the device reports `trap:<m>`. Waiters sleep on the dispatcher
//! condvar; if no event arrives for a whole event window the waiter polls
//! `mstat` for the channels still moving, since a trap line can be lost on
//! the wire.

use std::time::Instant;

use tracing::{debug, warn};

use ticklink_protocol::{Command, Direction, MOTOR_CHANNELS};

use crate::error::{HostError, Result};
use crate::session::Session;

impl Session {
    /// Start a servo move of `ticks` encoder ticks
    ///
    /// Completion is awaited separately with [`wait_servo`](Self::wait_servo).
    pub fn servo(
        &self,
        motor: u8,
        direction: Direction,
        ticks: u16,
        percent: Option<u8>,
    ) -> Result<()> {
        self.set_moving(motor, true);
        let result = self.call(&Command::Servo {
            motor,
            direction,
            ticks,
            percent,
        });
        if result.is_err() {
            self.set_moving(motor, false);
        }
        result
    }

    /// Mapped channels with a servo move still in progress
    pub fn moving(&self) -> Vec<u8> {
        let all: Vec<u8> = (0..MOTOR_CHANNELS as u8).collect();
        self.shared.state.lock().servo.busy(&all)
    }

    /// Block until every mapped channel in `channels` has finished its move
    pub fn wait_servo(&self, channels: &[u8]) -> Result<()> {
        let window = self.config.servo_event_window();
        let timeout = self.config.servo_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            let still_moving = {
                let mut state = self.shared.state.lock();
                loop {
                    if let Some(err) = state.latched.take() {
                        return Err(err);
                    }
                    let busy = state.servo.busy(channels);
                    if busy.is_empty() {
                        return Ok(());
                    }
                    if state.disconnected {
                        return Err(HostError::Disconnected);
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(HostError::Timeout(timeout));
                    }
                    let wake = (now + window).min(deadline);
                    if self.shared.changed.wait_until(&mut state, wake).timed_out() {
                        break state.servo.busy(channels);
                    }
                }
            };
            if still_moving.is_empty() || Instant::now() >= deadline {
                continue;
            }

            warn!(?still_moving, "no servo event within {:?}, polling", window);
            for motor in still_moving {
                let report = self.motor_status(motor)?;
                if !report.is_servoing() {
                    debug!(motor, "servo finished without event");
                    self.set_moving(motor, false);
                }
            }
        }
    }

    fn set_moving(&self, motor: u8, moving: bool) {
        let mut state = self.shared.state.lock();
        if let Some(flag) = state.servo.moving.get_mut(motor as usize) {
            *flag = moving;
        }
        self.shared.changed.notify_all();
    }
}
