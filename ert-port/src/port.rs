use std::fs::{File, OpenOptions};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Fire-and-forget hardware event emitter. A code stays latched on the
/// port until the next write; there is no acknowledgement. Mid-run
/// write failures are reported through `tracing` and otherwise ignored:
/// a scan session is never aborted because the recording cable dropped.
pub trait EventPort {
    fn set(&mut self, code: u8);
}

impl<P: EventPort + ?Sized> EventPort for Box<P> {
    fn set(&mut self, code: u8) {
        (**self).set(code);
    }
}

/// Parallel port driven through `/dev/port` at a fixed I/O address.
pub struct ParallelPort {
    dev: File,
    address: u64,
}

impl ParallelPort {
    /// Opens the port and latches zero. Failing to open is a setup
    /// error and therefore fatal, unlike later write failures.
    pub fn open(address: u16) -> io::Result<Self> {
        let dev = OpenOptions::new().write(true).open("/dev/port")?;
        let mut port = Self {
            dev,
            address: address as u64,
        };
        port.write_byte(0)?;
        Ok(port)
    }

    fn write_byte(&mut self, code: u8) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.dev.write_at(&[code], self.address)?;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            let _ = code;
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "raw port access is only available on unix",
            ))
        }
    }
}

impl EventPort for ParallelPort {
    fn set(&mut self, code: u8) {
        if let Err(e) = self.write_byte(code) {
            warn!(code, error = %e, "parallel port write failed");
        }
    }
}

/// Stand-in when event markers are disabled: reports codes to the
/// console only, mirroring what the port would have carried.
#[derive(Debug, Default)]
pub struct NullPort;

impl EventPort for NullPort {
    fn set(&mut self, code: u8) {
        debug!(code, "port event (port disabled)");
    }
}

/// Test port that remembers every code written, in order. Clones share
/// the same history so tests can keep a handle while the engine owns
/// the port.
#[derive(Debug, Clone, Default)]
pub struct RecordingPort {
    codes: Arc<Mutex<Vec<u8>>>,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn codes(&self) -> Vec<u8> {
        self.codes.lock().unwrap().clone()
    }
}

impl EventPort for RecordingPort {
    fn set(&mut self, code: u8) {
        self.codes.lock().unwrap().push(code);
    }
}
