//! Logging interface of the interpreter.
//!
//! The interpreter releases its log messages to an [`EcalLogger`]. The
//! production logger forwards to `tracing`, tests use the in-memory ring
//! buffer implementation.

use std::collections::VecDeque;

use parking_lot::Mutex;

pub trait EcalLogger: Send + Sync {
    /// Add a new error log message.
    fn log_error(&self, msg: String);

    /// Add a new info log message.
    fn log_info(&self, msg: String);

    /// Add a new debug log message.
    fn log_debug(&self, msg: String);
}

/// Logger which forwards to the `tracing` ecosystem.
#[derive(Default)]
pub struct ConsoleLogger;

impl EcalLogger for ConsoleLogger {
    fn log_error(&self, msg: String) {
        tracing::error!("{}", msg);
    }

    fn log_info(&self, msg: String) {
        tracing::info!("{}", msg);
    }

    fn log_debug(&self, msg: String) {
        tracing::debug!("{}", msg);
    }
}

/// Logger which discards all messages.
#[derive(Default)]
pub struct NullLogger;

impl EcalLogger for NullLogger {
    fn log_error(&self, _msg: String) {}
    fn log_info(&self, _msg: String) {}
    fn log_debug(&self, _msg: String) {}
}

/// Ring buffer logger recording messages as `<msg>`, `debug: <msg>` and
/// `error: <msg>`.
pub struct MemoryLogger {
    buf: Mutex<VecDeque<String>>,
    cap: usize,
}

impl MemoryLogger {
    pub fn new(cap: usize) -> MemoryLogger {
        MemoryLogger {
            buf: Mutex::new(VecDeque::new()),
            cap,
        }
    }

    fn push(&self, msg: String) {
        let mut buf = self.buf.lock();
        if buf.len() == self.cap {
            buf.pop_front();
        }
        buf.push_back(msg);
    }

    /// All recorded messages joined by newlines.
    pub fn string(&self) -> String {
        self.buf.lock().iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Snapshot of the recorded messages.
    pub fn slice(&self) -> Vec<String> {
        self.buf.lock().iter().cloned().collect()
    }

    pub fn reset(&self) {
        self.buf.lock().clear();
    }
}

impl EcalLogger for MemoryLogger {
    fn log_error(&self, msg: String) {
        self.push(format!("error: {}", msg));
    }

    fn log_info(&self, msg: String) {
        self.push(msg);
    }

    fn log_debug(&self, msg: String) {
        self.push(format!("debug: {}", msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_logger() {
        let l = MemoryLogger::new(10);
        l.log_info("Hello".into());
        l.log_debug("foo".into());
        l.log_error("bar".into());

        assert_eq!(l.string(), "Hello\ndebug: foo\nerror: bar");
        assert_eq!(l.slice().len(), 3);

        l.reset();
        assert_eq!(l.string(), "");
    }

    #[test]
    fn test_memory_logger_capacity() {
        let l = MemoryLogger::new(2);
        l.log_info("1".into());
        l.log_info("2".into());
        l.log_info("3".into());

        assert_eq!(l.string(), "2\n3");
    }
}
