//! Simulated device behind an in-memory link

#![allow(dead_code)]

use std::convert::Infallible;
use std::io::BufRead;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embedded_io::{ErrorType, Read, ReadReady, Write};
use ticklink_core::TickShared;
use ticklink_device::sim::{sim_board, SimWorld};
use ticklink_device::Interpreter;
use ticklink_host::link::{pipe, PipeReader, PipeWriter};
use ticklink_host::{Session, SessionConfig};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Device UART receive side
struct DeviceRx(PipeReader);

impl ErrorType for DeviceRx {
    type Error = Infallible;
}

impl Read for DeviceRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(std::io::Read::read(&mut self.0, buf).unwrap_or(0))
    }
}

impl ReadReady for DeviceRx {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.is_ready())
    }
}

/// Device UART transmit side; can lose `trap:` lines
struct DeviceTx {
    writer: PipeWriter,
    line: Vec<u8>,
    drop_traps: Arc<AtomicUsize>,
}

impl DeviceTx {
    fn finish_line(&mut self) {
        let line = std::mem::take(&mut self.line);
        if line.starts_with(b"trap:") {
            let dropped = self
                .drop_traps
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if dropped {
                return;
            }
        }
        // The host may already be gone
        let _ = std::io::Write::write_all(&mut self.writer, &line);
    }
}

impl ErrorType for DeviceTx {
    type Error = Infallible;
}

impl Write for DeviceTx {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            self.line.push(byte);
            if byte == b'\n' {
                self.finish_line();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Device wiring and link behaviour
pub struct Rig {
    /// Motor → encoder input actually wired on the board
    pub wiring: [Option<usize>; 3],
    pub config: SessionConfig,
    /// Number of `trap:` lines to lose
    pub drop_traps: usize,
}

impl Default for Rig {
    fn default() -> Self {
        Self {
            wiring: [Some(0), Some(1), None],
            config: SessionConfig {
                call_timeout_ms: 10_000,
                servo_event_window_ms: 2_000,
                servo_timeout_ms: 10_000,
                ..SessionConfig::default()
            },
            drop_traps: 0,
        }
    }
}

pub struct Bench {
    pub session: Session,
    /// `trap:` lines still to be lost
    pub drop_traps: Arc<AtomicUsize>,
}

impl Rig {
    /// Start the device thread and connect a session to it
    pub fn start(self) -> Bench {
        init_tracing();
        let (host, device) = pipe();
        let (host_rx, host_tx) = host.into_split();
        let (device_rx, device_tx) = device.into_split();
        let drop_traps = Arc::new(AtomicUsize::new(self.drop_traps));

        let wiring = self.wiring;
        let drops = drop_traps.clone();
        thread::spawn(move || {
            let world = SimWorld::new(wiring).with_ticks_per_step(4);
            let ticks = TickShared::new();
            let mut interpreter = Interpreter::new(sim_board(&world, &ticks), &ticks);
            let mut rx = DeviceRx(device_rx);
            let mut tx = DeviceTx {
                writer: device_tx,
                line: Vec::new(),
                drop_traps: drops,
            };

            while !rx.0.is_closed() {
                world.advance(1, &ticks);
                match interpreter.poll(&mut rx, &mut tx) {
                    Ok(true) => {}
                    Ok(false) => thread::sleep(Duration::from_micros(200)),
                    Err(e) => match e {},
                }
            }
        });

        let session = Session::new(host_rx, host_tx, self.config).expect("session");
        session.connect().expect("connect");
        Bench {
            session,
            drop_traps,
        }
    }
}

/// Session against a device that answers each command line from a script
pub fn scripted(script: impl Fn(&str) -> Vec<&'static str> + Send + 'static) -> Session {
    init_tracing();
    let (host, device) = pipe();
    let (host_rx, host_tx) = host.into_split();
    let (device_rx, mut device_tx) = device.into_split();
    thread::spawn(move || {
        for line in std::io::BufReader::new(device_rx).lines() {
            let Ok(line) = line else { break };
            for reply in script(&line) {
                let reply = format!("{}\n", reply);
                if std::io::Write::write_all(&mut device_tx, reply.as_bytes()).is_err() {
                    return;
                }
            }
        }
    });
    Session::new(host_rx, host_tx, Rig::default().config).expect("session")
}
