//! Byte links between a session and a device
//!
//! A session runs over any `Read` half and `Write` half. [`open_serial`]
//! splits a serial port into the two; [`pipe`] builds an in-memory link
//! for running a device in the same process.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::Result;

/// Open the configured serial port as (reader, writer), 8N1
pub fn open_serial(config: &SessionConfig) -> Result<(Box<dyn SerialPort>, Box<dyn SerialPort>)> {
    let writer = serialport::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(config.read_timeout())
        .open()?;
    let reader = writer.try_clone()?;
    debug!(port = %config.port, baud = config.baud_rate, "serial port open");
    Ok((reader, writer))
}

/// Receiving half of a pipe
#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    buffered: VecDeque<u8>,
    closed: bool,
}

/// Sending half of a pipe
#[derive(Debug, Clone)]
pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

/// One end of a pipe
#[derive(Debug)]
pub struct PipeEnd {
    pub reader: PipeReader,
    pub writer: PipeWriter,
}

impl PipeEnd {
    pub fn into_split(self) -> (PipeReader, PipeWriter) {
        (self.reader, self.writer)
    }
}

/// Two connected pipe ends
pub fn pipe() -> (PipeEnd, PipeEnd) {
    let (a_tx, a_rx) = crossbeam_channel::unbounded();
    let (b_tx, b_rx) = crossbeam_channel::unbounded();
    (
        PipeEnd {
            reader: PipeReader::new(b_rx),
            writer: PipeWriter { tx: a_tx },
        },
        PipeEnd {
            reader: PipeReader::new(a_rx),
            writer: PipeWriter { tx: b_tx },
        },
    )
}

impl PipeReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            buffered: VecDeque::new(),
            closed: false,
        }
    }

    /// True if a read would return data without blocking
    pub fn is_ready(&mut self) -> bool {
        while self.buffered.is_empty() && !self.closed {
            match self.rx.try_recv() {
                Ok(chunk) => self.buffered.extend(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.closed = true,
            }
        }
        !self.buffered.is_empty()
    }

    /// True once the writer is gone and every byte has been read
    pub fn is_closed(&mut self) -> bool {
        !self.is_ready() && self.closed
    }
}

impl Read for PipeReader {
    /// Blocks until data arrives; returns 0 once the writer is gone
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buffered.is_empty() && !self.closed {
            match self.rx.recv() {
                Ok(chunk) => self.buffered.extend(chunk),
                Err(_) => self.closed = true,
            }
        }
        let n = buf.len().min(self.buffered.len());
        for (slot, byte) in buf.iter_mut().zip(self.buffered.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_carries_bytes_both_ways() {
        let (mut host, mut device) = pipe();
        host.writer.write_all(b"ping\n").unwrap();
        device.writer.write_all(b"pong\n").unwrap();

        let mut buf = [0u8; 16];
        assert!(device.reader.is_ready());
        let n = device.reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping\n");
        let n = host.reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong\n");
    }

    #[test]
    fn test_partial_reads_keep_order() {
        let (mut host, mut device) = pipe();
        host.writer.write_all(b"abc").unwrap();
        host.writer.write_all(b"de").unwrap();

        let mut buf = [0u8; 2];
        let mut out = Vec::new();
        while device.reader.is_ready() {
            let n = device.reader.read(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abcde");
    }

    #[test]
    fn test_close_is_seen_after_drain() {
        let (host, mut device) = pipe();
        let (_reader, mut writer) = host.into_split();
        writer.write_all(b"x").unwrap();
        drop(writer);

        assert!(!device.reader.is_closed());
        let mut buf = [0u8; 4];
        assert_eq!(device.reader.read(&mut buf).unwrap(), 1);
        assert!(device.reader.is_closed());
        assert_eq!(device.reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_to_dropped_reader_fails() {
        let (mut host, device) = pipe();
        drop(device);
        let err = host.writer.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
