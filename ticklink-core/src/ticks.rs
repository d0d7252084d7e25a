//! Tick counters and servo traps shared with the input interrupts
//!
//! Every piece of state the interrupt handlers touch lives behind one
//! critical-section mutex. The interrupt path increments the counter,
//! checks the armed trap, force-stops the owning motor and raises the
//! completion event, all inside one critical section. The main loop only
//! reads-and-resets, arms, disarms and drains events.

use core::cell::RefCell;

use critical_section::Mutex;

use ticklink_protocol::{INPUT_CHANNELS, MOTOR_CHANNELS};

use crate::traits::ForceStop;

/// An armed servo trap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Trap {
    /// Tick count at which the trap fires
    pub target: u16,
    /// Motor stopped when the trap fires
    pub motor: u8,
}

/// Result of arming a trap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmOutcome {
    /// Counter reset and trap armed
    Armed,
    /// A trap was already armed on this input; nothing changed
    AlreadyArmed,
    /// No such input channel
    NoInput,
}

#[derive(Debug, Default)]
struct TickState {
    counts: [u32; INPUT_CHANNELS],
    traps: [Option<Trap>; INPUT_CHANNELS],
    /// Bit `m` set once motor `m`'s trap fired
    pending: u8,
}

/// Counters, traps and pending trap events
#[derive(Debug)]
pub struct TickShared {
    inner: Mutex<RefCell<TickState>>,
}

impl Default for TickShared {
    fn default() -> Self {
        Self::new()
    }
}

impl TickShared {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(TickState {
                counts: [0; INPUT_CHANNELS],
                traps: [None; INPUT_CHANNELS],
                pending: 0,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut TickState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// Record one tick on `input`
    ///
    /// Called from the input interrupt. If the tick reaches an armed
    /// trap's target the motor is stopped through `stop` before the trap
    /// event is raised.
    pub fn on_tick<S: ForceStop + ?Sized>(&self, input: usize, stop: &S) {
        self.with(|state| {
            let Some(count) = state.counts.get_mut(input) else {
                return;
            };
            *count = count.wrapping_add(1);
            let count = *count;

            if let Some(trap) = state.traps[input] {
                if count >= trap.target as u32 {
                    stop.force_stop(trap.motor);
                    state.traps[input] = None;
                    state.pending |= 1 << trap.motor;
                }
            }
        })
    }

    /// Live count without resetting it
    pub fn count(&self, input: usize) -> u32 {
        self.with(|state| state.counts.get(input).copied().unwrap_or(0))
    }

    /// Read and zero one counter
    pub fn read_and_reset(&self, input: usize) -> u32 {
        self.with(|state| match state.counts.get_mut(input) {
            Some(count) => core::mem::take(count),
            None => 0,
        })
    }

    /// Zero every counter
    pub fn reset_counts(&self) {
        self.with(|state| state.counts = [0; INPUT_CHANNELS])
    }

    /// Reset the counter of `input` and arm a trap on it
    pub fn arm(&self, input: usize, trap: Trap) -> ArmOutcome {
        self.with(|state| {
            if input >= INPUT_CHANNELS || trap.motor as usize >= MOTOR_CHANNELS {
                return ArmOutcome::NoInput;
            }
            if state.traps[input].is_some() {
                return ArmOutcome::AlreadyArmed;
            }
            state.counts[input] = 0;
            state.traps[input] = Some(trap);
            ArmOutcome::Armed
        })
    }

    /// Armed trap on `input`
    pub fn trap(&self, input: usize) -> Option<Trap> {
        self.with(|state| state.traps.get(input).copied().flatten())
    }

    /// Disarm every trap owned by `motor`
    pub fn disarm_motor(&self, motor: u8) {
        self.with(|state| {
            for slot in state.traps.iter_mut() {
                if matches!(slot, Some(trap) if trap.motor == motor) {
                    *slot = None;
                }
            }
            state.pending &= !(1 << motor);
        })
    }

    /// Disarm every trap and drop pending events
    pub fn disarm_all(&self) {
        self.with(|state| {
            state.traps = [None; INPUT_CHANNELS];
            state.pending = 0;
        })
    }

    /// Take the set of motors whose traps fired since the last call
    pub fn take_events(&self) -> u8 {
        self.with(|state| core::mem::take(&mut state.pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[derive(Default)]
    struct StopLog {
        stopped: Cell<u8>,
    }

    impl ForceStop for StopLog {
        fn force_stop(&self, motor: u8) {
            self.stopped.set(self.stopped.get() | 1 << motor);
        }
    }

    #[test]
    fn test_count_and_read_and_reset() {
        let ticks = TickShared::new();
        let stop = StopLog::default();
        for _ in 0..5 {
            ticks.on_tick(0, &stop);
        }
        ticks.on_tick(1, &stop);
        assert_eq!(ticks.count(0), 5);
        assert_eq!(ticks.read_and_reset(0), 5);
        assert_eq!(ticks.read_and_reset(0), 0);
        assert_eq!(ticks.count(1), 1);
    }

    #[test]
    fn test_out_of_range_input_ignored() {
        let ticks = TickShared::new();
        ticks.on_tick(7, &StopLog::default());
        assert_eq!(ticks.count(7), 0);
        assert_eq!(ticks.read_and_reset(7), 0);
    }

    #[test]
    fn test_trap_fires_at_target() {
        let ticks = TickShared::new();
        let stop = StopLog::default();
        ticks.on_tick(0, &stop);
        assert_eq!(ticks.arm(0, Trap { target: 3, motor: 2 }), ArmOutcome::Armed);
        assert_eq!(ticks.count(0), 0);

        ticks.on_tick(0, &stop);
        ticks.on_tick(0, &stop);
        assert_eq!(stop.stopped.get(), 0);
        assert_eq!(ticks.take_events(), 0);

        ticks.on_tick(0, &stop);
        assert_eq!(stop.stopped.get(), 1 << 2);
        assert_eq!(ticks.trap(0), None);
        assert_eq!(ticks.take_events(), 1 << 2);
        assert_eq!(ticks.take_events(), 0);
    }

    #[test]
    fn test_rearm_ignored_while_armed() {
        let ticks = TickShared::new();
        let first = Trap { target: 10, motor: 0 };
        assert_eq!(ticks.arm(1, first), ArmOutcome::Armed);
        ticks.on_tick(1, &StopLog::default());
        assert_eq!(
            ticks.arm(1, Trap { target: 2, motor: 0 }),
            ArmOutcome::AlreadyArmed
        );
        assert_eq!(ticks.trap(1), Some(first));
        assert_eq!(ticks.count(1), 1);
    }

    #[test]
    fn test_disarm_motor() {
        let ticks = TickShared::new();
        ticks.arm(0, Trap { target: 1, motor: 1 });
        ticks.arm(1, Trap { target: 1, motor: 2 });
        ticks.disarm_motor(1);
        assert_eq!(ticks.trap(0), None);
        assert!(ticks.trap(1).is_some());
    }

    #[test]
    fn test_disarm_all_drops_events() {
        let ticks = TickShared::new();
        ticks.arm(0, Trap { target: 1, motor: 0 });
        ticks.on_tick(0, &StopLog::default());
        ticks.disarm_all();
        assert_eq!(ticks.take_events(), 0);
    }
}
