//! Serial endpoints for interpreter tests

use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use core::convert::Infallible;

use embedded_io::{ErrorType, Read, ReadReady, Write};

/// Collects everything the interpreter writes
#[derive(Debug, Default)]
pub struct Sink(pub Vec<u8>);

impl Sink {
    /// Written lines without terminators; clears the sink
    pub fn take_lines(&mut self) -> Vec<String> {
        let text = String::from_utf8(core::mem::take(&mut self.0)).unwrap();
        text.lines().map(String::from).collect()
    }
}

impl ErrorType for Sink {
    type Error = Infallible;
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Bytes waiting to be read by the interpreter
#[derive(Debug, Default)]
pub struct Source(pub VecDeque<u8>);

impl Source {
    pub fn push(&mut self, text: &str) {
        self.0.extend(text.bytes());
    }
}

impl ErrorType for Source {
    type Error = Infallible;
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.0.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl ReadReady for Source {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.is_empty())
    }
}
