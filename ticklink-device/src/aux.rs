//! Auxiliary outputs driven by `set`
//!
//! Six PWM outputs, each held at one of five levels (0/4 to 4/4 duty).

use embedded_hal::pwm::SetDutyCycle;

use ticklink_protocol::{OutputSymbol, AUX_OUTPUTS, MAX_OUTPUT_LEVEL};

/// Aux output bank
pub struct AuxOutputs<P> {
    outputs: [P; AUX_OUTPUTS],
    levels: [u8; AUX_OUTPUTS],
}

/// An output rejected its duty cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputFault {
    pub index: usize,
}

impl<P: SetDutyCycle> AuxOutputs<P> {
    /// Wrap the outputs; their hardware state is left untouched until
    /// [`AuxOutputs::restore`] or [`AuxOutputs::apply`]
    pub fn new(outputs: [P; AUX_OUTPUTS]) -> Self {
        Self {
            outputs,
            levels: [0; AUX_OUTPUTS],
        }
    }

    /// Current level of every output (0–4)
    pub fn levels(&self) -> [u8; AUX_OUTPUTS] {
        self.levels
    }

    fn set_level(&mut self, index: usize, level: u8) -> Result<(), OutputFault> {
        self.outputs[index]
            .set_duty_cycle_fraction(level as u16, MAX_OUTPUT_LEVEL as u16)
            .map_err(|_| OutputFault { index })?;
        self.levels[index] = level;
        Ok(())
    }

    /// Switch every output off
    pub fn restore(&mut self) -> Result<(), OutputFault> {
        let mut result = Ok(());
        for index in 0..AUX_OUTPUTS {
            if let Err(e) = self.set_level(index, 0) {
                result = Err(e);
            }
        }
        result
    }

    /// Apply one symbol per output
    pub fn apply(&mut self, symbols: &[OutputSymbol; AUX_OUTPUTS]) -> Result<(), OutputFault> {
        for (index, symbol) in symbols.iter().enumerate() {
            let level = match *symbol {
                OutputSymbol::On => MAX_OUTPUT_LEVEL,
                OutputSymbol::Off => 0,
                OutputSymbol::Keep => continue,
                OutputSymbol::Level(n) => n.min(MAX_OUTPUT_LEVEL),
            };
            self.set_level(index, level)?;
        }
        Ok(())
    }

    /// Resulting state as `set` reply symbols
    pub fn echo(&self) -> [OutputSymbol; AUX_OUTPUTS] {
        self.levels.map(|level| match level {
            0 => OutputSymbol::Off,
            MAX_OUTPUT_LEVEL => OutputSymbol::On,
            n => OutputSymbol::Level(n),
        })
    }
}
