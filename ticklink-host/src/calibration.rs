//! Calibration runs and table fitting
//!
//! `cal:<m>` reports the minimum moving duty per direction and the ticks
//! counted at each ladder percentage with no correction applied.
//! [`CalibrationReport::fit`] turns those samples into the correction
//! values that make tick rate proportional to the requested percentage;
//! the result is stored as calibration strings and replayed with `mot`.

use ticklink_protocol::response::TAG_CAL;
use ticklink_protocol::{
    percent_to_duty, CalibrationLine, CalibrationStep, Command, Direction, DirectionCalibration,
    ErrorCode, FieldError, MotorSetup, FULL_DUTY, MAX_CAL_POINTS,
};

use crate::dispatcher::Outcome;
use crate::error::{HostError, Result};
use crate::session::{Expect, Session};

/// Ticks counted at one ladder percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub percent: u8,
    /// Forward and reverse tick counts
    pub ticks: [u32; 2],
}

/// Everything one `cal` run reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationReport {
    pub channel: u8,
    /// Forward and reverse minimum duty
    pub minima: [u8; 2],
    pub samples: Vec<Sample>,
}

impl CalibrationReport {
    /// Assemble a report from the `cal` lines of one run
    pub fn from_lines<'a>(
        channel: u8,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let mut report = Self {
            channel,
            minima: [0; 2],
            samples: Vec::new(),
        };
        let mut finished = false;

        for line in lines {
            let text = line
                .strip_prefix(TAG_CAL)
                .and_then(|rest| rest.strip_prefix(':'))
                .ok_or_else(|| HostError::protocol(line, "not a calibration line"))?;
            let parsed = CalibrationLine::parse(text).map_err(|e| HostError::protocol(line, e))?;
            if parsed.channel != channel {
                return Err(HostError::protocol(line, "wrong channel"));
            }
            match parsed.step {
                CalibrationStep::Run => {}
                CalibrationStep::Min { forward, reverse } => report.minima = [forward, reverse],
                CalibrationStep::Sample {
                    percent,
                    forward,
                    reverse,
                } => report.samples.push(Sample {
                    percent,
                    ticks: [forward, reverse],
                }),
                CalibrationStep::Fail { direction, step } => {
                    return Err(HostError::CalibrationFailed {
                        channel,
                        direction: Some(direction),
                        step: Some(step),
                    })
                }
                CalibrationStep::End => finished = true,
            }
        }

        if !finished {
            return Err(HostError::protocol("", "calibration run did not finish"));
        }
        Ok(report)
    }

    /// Correction for one direction
    ///
    /// Sample `i` was taken at raw level `L(pᵢ)` and counted `tᵢ` ticks.
    /// The target for step `i` is `t_max · pᵢ / 100`; its correction
    /// value is the raw level at which the measured curve (through the
    /// origin, made non-decreasing) reaches that target.
    pub fn fit_direction(&self, direction: Direction) -> DirectionCalibration {
        let d = direction.index();
        let mut cal = DirectionCalibration::uncorrected(self.minima[d]);

        let mut curve: Vec<(u32, u64)> = vec![(0, 0)];
        let mut peak = 0u64;
        for sample in self.samples.iter().take(MAX_CAL_POINTS) {
            peak = peak.max(sample.ticks[d] as u64);
            curve.push((percent_to_duty(sample.percent) as u32, peak));
        }
        if peak == 0 {
            return cal;
        }

        for sample in self.samples.iter().take(MAX_CAL_POINTS) {
            let target = peak * sample.percent.min(100) as u64 / 100;
            // At most MAX_CAL_POINTS samples
            let _ = cal.values.push(level_for(&curve, target));
        }
        cal
    }

    /// Forward and reverse calibration strings
    pub fn fit(&self) -> [DirectionCalibration; 2] {
        [
            self.fit_direction(Direction::Forward),
            self.fit_direction(Direction::Reverse),
        ]
    }

    /// `mot` group applying the fitted calibration
    pub fn setup(&self, input: Option<u8>) -> MotorSetup {
        let [forward, reverse] = self.fit();
        MotorSetup {
            channel: self.channel,
            forward,
            reverse,
            input,
        }
    }
}

/// Raw level at which the piecewise-linear `curve` reaches `target`
fn level_for(curve: &[(u32, u64)], target: u64) -> u8 {
    let mut lower = (0u32, 0u64);
    for &(level, ticks) in curve {
        if ticks >= target {
            if ticks == lower.1 {
                return level.min(FULL_DUTY as u32) as u8;
            }
            let span = (level - lower.0) as u64;
            let x = lower.0 as u64 + (target - lower.1) * span / (ticks - lower.1);
            return x.min(FULL_DUTY as u64) as u8;
        }
        lower = (level, ticks);
    }
    FULL_DUTY
}

/// `mot` group from stored calibration strings
pub fn stored_setup(
    channel: u8,
    forward: &str,
    reverse: &str,
    input: Option<u8>,
) -> std::result::Result<MotorSetup, FieldError> {
    Ok(MotorSetup {
        channel,
        forward: DirectionCalibration::parse(forward, 0)?,
        reverse: DirectionCalibration::parse(reverse, 0)?,
        input,
    })
}

impl Session {
    /// Calibrate one mapped channel
    ///
    /// Runs for over a minute on the device; the call timeout must allow
    /// for it. A failed sampling step is reported with its ladder index.
    pub fn calibrate(&self, channel: u8) -> Result<CalibrationReport> {
        let command = Command::Calibrate(channel);
        let (outcome, mut replies) = self.transact(&command, &[Expect::All(TAG_CAL)])?;
        let lines = replies.pop().unwrap_or_default();
        let lines = lines.iter().map(String::as_str);

        match outcome {
            Outcome::Ready => CalibrationReport::from_lines(channel, lines),
            Outcome::Failed(e) if e.code == ErrorCode::Calibration => {
                match CalibrationReport::from_lines(channel, lines) {
                    Err(failed @ HostError::CalibrationFailed { .. }) => Err(failed),
                    // No fail line: the minimum search gave up
                    _ => Err(HostError::CalibrationFailed {
                        channel,
                        direction: match e.detail {
                            Some(0) => Some(Direction::Forward),
                            Some(1) => Some(Direction::Reverse),
                            _ => None,
                        },
                        step: None,
                    }),
                }
            }
            Outcome::Failed(e) => Err(HostError::Device(e)),
        }
    }
}
