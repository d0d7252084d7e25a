//! Reply lines and handler failures

use core::fmt::{self, Write as _};

use embedded_io::Write;
use heapless::String;

use ticklink_protocol::{DeviceError, ErrorCode, FieldError, LineError, MAX_LINE_LEN};

/// Write one reply line
pub fn emit<W: Write>(tx: &mut W, item: impl fmt::Display) -> Result<(), W::Error> {
    let mut line: String<MAX_LINE_LEN> = String::new();
    if write!(line, "{}", item).is_err() {
        log::warn!("reply truncated: {}", line);
    }
    tx.write_all(line.as_bytes())?;
    tx.write_all(b"\n")
}

/// Why a handler did not finish with `rdy`
#[derive(Debug)]
pub enum Fault<E> {
    /// Answer with this error line
    Reply(DeviceError),
    /// The serial output failed
    Io(E),
}

impl<E> Fault<E> {
    pub fn code(code: ErrorCode) -> Self {
        Fault::Reply(DeviceError::new(code))
    }
}

impl<E> From<DeviceError> for Fault<E> {
    fn from(e: DeviceError) -> Self {
        Fault::Reply(e)
    }
}

impl<E> From<FieldError> for Fault<E> {
    fn from(e: FieldError) -> Self {
        Fault::Reply(field_error(e))
    }
}

/// Error line for a malformed field
pub fn field_error(e: FieldError) -> DeviceError {
    let offset = e.offset().min(u16::MAX as usize) as u16;
    match e {
        FieldError::Syntax { .. } => DeviceError::with_detail(ErrorCode::Syntax, offset),
        FieldError::Overflow { .. } => DeviceError::with_detail(ErrorCode::Overflow, offset),
    }
}

/// Error line for a line the assembler rejected
pub fn line_error(e: LineError) -> DeviceError {
    match e {
        LineError::Overflow => DeviceError::new(ErrorCode::Overflow),
        LineError::Encoding { offset } => {
            DeviceError::with_detail(ErrorCode::Syntax, offset.min(u16::MAX as usize) as u16)
        }
        LineError::Framing => DeviceError::new(ErrorCode::Framing),
    }
}
