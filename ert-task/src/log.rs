use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Append-only timestamped text sink. Every display transition and
/// run/group/block boundary becomes one `<seconds>\t<label>` line for
/// offline analysis; the parameter table is dumped at the top so each
/// log is self-describing.
pub struct EventLog {
    sink: Box<dyn Write + Send>,
}

impl EventLog {
    pub fn to_file(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(Self {
            sink: Box::new(BufWriter::new(file)),
        })
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(writer),
        }
    }

    /// In-memory log plus a handle to read it back; used by tests.
    pub fn memory() -> (Self, MemoryLogHandle) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let handle = MemoryLogHandle {
            buf: Arc::clone(&buf),
        };
        (Self::from_writer(MemoryWriter { buf }), handle)
    }

    pub fn log(&mut self, t: Duration, msg: &str) {
        // Flushed per line so an aborted session still leaves a
        // complete log.
        let _ = writeln!(self.sink, "{:.3}\t{}", t.as_secs_f64(), msg);
        let _ = self.sink.flush();
    }

    pub fn param_dump(&mut self, t: Duration, lines: &[String]) {
        self.log(t, "---START PARAMETERS---");
        for line in lines {
            self.log(t, line);
        }
        self.log(t, "---END PARAMETERS---");
    }
}

struct MemoryWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryLogHandle {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLogHandle {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    pub fn lines_matching(&self, needle: &str) -> usize {
        self.contents()
            .lines()
            .filter(|l| l.contains(needle))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_timestamp_and_label() {
        let (mut log, handle) = EventLog::memory();
        log.log(Duration::from_millis(1500), "Display Fixation");
        assert_eq!(handle.contents(), "1.500\tDisplay Fixation\n");
    }

    #[test]
    fn param_dump_is_bracketed() {
        let (mut log, handle) = EventLog::memory();
        log.param_dump(
            Duration::ZERO,
            &["a: 1".to_string(), "b: 2".to_string()],
        );
        let text = handle.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first().unwrap(), &"0.000\t---START PARAMETERS---");
        assert_eq!(lines.last().unwrap(), &"0.000\t---END PARAMETERS---");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn file_log_appends_to_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/run.log");
        {
            let mut log = EventLog::to_file(&path).unwrap();
            log.log(Duration::from_secs(2), "===== START RUN 1/2 =====");
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "2.000\t===== START RUN 1/2 =====\n");
    }
}
