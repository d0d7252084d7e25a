//! Line assembly for the ticklink wire protocol.
//!
//! Line format:
//! - ASCII text, fields separated by `:`
//! - terminated by `\n` (a preceding `\r` is ignored)
//! - at most [`MAX_LINE_LEN`] bytes before the terminator
//!
//! A line that grows past the bound is not truncated: every byte up to the
//! next newline is dropped and the line is reported once as
//! [`LineError::Overflow`] when that newline arrives.

use heapless::String;

/// Line terminator
pub const LINE_END: u8 = b'\n';

/// Maximum line length in bytes, excluding the terminator
pub const MAX_LINE_LEN: usize = 255;

/// A complete received line
pub type Line = String<MAX_LINE_LEN>;

/// Errors reported for a completed line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineError {
    /// Line exceeded [`MAX_LINE_LEN`]; its content was discarded
    Overflow,
    /// A non-ASCII byte was received at the given offset
    Encoding { offset: usize },
    /// The transport flagged a framing or parity fault inside this line
    Framing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssembleState {
    /// Accumulating bytes of the current line
    Collecting,
    /// Dropping bytes until the next newline
    Discarding(LineError),
}

/// Byte-at-a-time line assembler
///
/// Feed received bytes with [`LineAssembler::feed`]; a complete line (or
/// the error that spoiled it) is returned when its newline arrives.
#[derive(Debug, Clone)]
pub struct LineAssembler {
    state: AssembleState,
    buffer: Line,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAssembler {
    /// Create an empty assembler
    pub const fn new() -> Self {
        Self {
            state: AssembleState::Collecting,
            buffer: String::new(),
        }
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.state = AssembleState::Collecting;
        self.buffer.clear();
    }

    /// Mark the current line as spoiled by a transport fault
    ///
    /// The rest of the line is discarded and [`LineError::Framing`] is
    /// reported at its newline.
    pub fn transport_fault(&mut self) {
        self.buffer.clear();
        self.state = AssembleState::Discarding(LineError::Framing);
    }

    /// Feed a single byte
    ///
    /// Returns `Some(Ok(line))` when a newline completes a line,
    /// `Some(Err(_))` when it completes a spoiled line, and `None` while
    /// more bytes are needed. Empty lines are skipped.
    pub fn feed(&mut self, byte: u8) -> Option<Result<Line, LineError>> {
        if byte == LINE_END {
            let state = self.state;
            self.state = AssembleState::Collecting;
            return match state {
                AssembleState::Discarding(err) => {
                    self.buffer.clear();
                    Some(Err(err))
                }
                AssembleState::Collecting if self.buffer.is_empty() => None,
                AssembleState::Collecting => Some(Ok(core::mem::take(&mut self.buffer))),
            };
        }

        if byte == b'\r' {
            return None;
        }

        if let AssembleState::Collecting = self.state {
            if !byte.is_ascii() {
                let offset = self.buffer.len();
                self.buffer.clear();
                self.state = AssembleState::Discarding(LineError::Encoding { offset });
            } else if self.buffer.push(byte as char).is_err() {
                self.buffer.clear();
                self.state = AssembleState::Discarding(LineError::Overflow);
            }
        }
        None
    }

    /// Feed multiple bytes, returning the first completed line
    ///
    /// Bytes after a completed line are not consumed; the number of bytes
    /// consumed is returned alongside the result.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> (usize, Option<Result<Line, LineError>>) {
        for (i, &byte) in bytes.iter().enumerate() {
            if let Some(result) = self.feed(byte) {
                return (i + 1, Some(result));
            }
        }
        (bytes.len(), None)
    }
}
