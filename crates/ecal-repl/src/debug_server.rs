//! TCP debug console.
//!
//! A newline-delimited text protocol: commands are prefixed with `##`,
//! every reply is a single JSON document terminated by a blank line.
//! Input without the prefix is evaluated as ECAL code in the global scope
//! and the result is returned base64 encoded.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use base64::Engine as _;
use ecal_core::{DebugCommand, EcalRuntime};

pub struct DebugServer {
    addr: String,
    runtime: Arc<EcalRuntime>,
}

impl DebugServer {
    pub fn new(addr: impl Into<String>, runtime: Arc<EcalRuntime>) -> DebugServer {
        DebugServer {
            addr: addr.into(),
            runtime,
        }
    }

    /// Accept connections until the listener fails; one thread per
    /// connection.
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr)?;
        tracing::info!("Debug server listening on {}", self.addr);

        for stream in listener.incoming() {
            let stream = stream?;
            let runtime = self.runtime.clone();

            thread::spawn(move || {
                if let Err(e) = handle_connection(stream, &runtime) {
                    tracing::debug!("Debug connection ended: {}", e);
                }
            });
        }

        Ok(())
    }

    /// Run the server on a background thread.
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            if let Err(e) = self.run() {
                tracing::error!("Debug server failed: {}", e);
            }
        })
    }
}

fn handle_connection(stream: TcpStream, runtime: &EcalRuntime) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut stream = stream;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }

        let reply = handle_line(runtime, line.trim());
        stream.write_all(serde_json::to_string(&reply)?.as_bytes())?;
        stream.write_all(b"\n\n")?;
        stream.flush()?;
    }
}

fn debugger_error(msg: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({ "DebuggerError": msg.to_string() })
}

/// Process one console line and produce the JSON reply.
pub fn handle_line(runtime: &EcalRuntime, line: &str) -> serde_json::Value {
    let Some(command) = line.strip_prefix("##") else {
        // Evaluate as ECAL code.
        return match runtime.eval_source("debugserver", line) {
            Ok(value) => serde_json::json!({
                "EncodedOutput":
                    base64::engine::general_purpose::STANDARD.encode(value.to_string())
            }),
            Err(e) => debugger_error(e),
        };
    };

    let Some(debugger) = runtime.provider().debugger.clone() else {
        return debugger_error("No debugger attached");
    };

    let parts: Vec<&str> = command.split_whitespace().collect();

    let parse_tid = |s: Option<&&str>| -> Result<u64, serde_json::Value> {
        s.and_then(|s| s.parse().ok())
            .ok_or_else(|| debugger_error("Need a thread id"))
    };

    match parts.first().copied() {
        Some("status") => debugger.status(),

        Some("describe") => match parse_tid(parts.get(1)) {
            Ok(tid) => debugger
                .describe(tid)
                .unwrap_or_else(debugger_error),
            Err(e) => e,
        },

        Some("inspect") => match parse_tid(parts.get(1)) {
            Ok(tid) => debugger.inspect(tid).unwrap_or_else(debugger_error),
            Err(e) => e,
        },

        Some("break") => match parts.get(1) {
            Some(key) => {
                debugger.set_break_point(*key);
                serde_json::json!({ "ok": true })
            }
            None => debugger_error("Need a breakpoint of the form source:line"),
        },

        Some("rmbreak") => match parts.get(1) {
            Some(source) => {
                debugger.rm_break_points(source);
                serde_json::json!({ "ok": true })
            }
            None => debugger_error("Need a source name"),
        },

        Some("cont") => match (parse_tid(parts.get(1)), parts.get(2)) {
            (Ok(tid), Some(kind)) => match DebugCommand::parse(kind) {
                Some(cmd) => match debugger.continue_thread(tid, cmd) {
                    Ok(()) => serde_json::json!({ "ok": true }),
                    Err(e) => debugger_error(e),
                },
                None => debugger_error(format!("Unknown continue kind: {}", kind)),
            },
            (Err(e), _) => e,
            _ => debugger_error("Need a thread id and a continue kind"),
        },

        Some("extract") => match (parse_tid(parts.get(1)), parts.get(2), parts.get(3)) {
            (Ok(tid), Some(var), Some(dest)) => {
                match debugger.extract_value(tid, var, dest) {
                    Ok(()) => serde_json::json!({ "ok": true }),
                    Err(e) => debugger_error(e),
                }
            }
            (Err(e), _, _) => e,
            _ => debugger_error("Need a thread id, a variable and a destination"),
        },

        Some("inject") => match (parse_tid(parts.get(1)), parts.get(2)) {
            (Ok(tid), Some(var)) => {
                let expr = parts[3..].join(" ");
                if expr.is_empty() {
                    return debugger_error("Need an expression");
                }

                match debugger.inject_value(tid, var, &expr) {
                    Ok(()) => serde_json::json!({ "ok": true }),
                    Err(e) => debugger_error(e),
                }
            }
            (Err(e), _) => e,
            _ => debugger_error("Need a thread id, a variable and an expression"),
        },

        Some(other) => debugger_error(format!("Unknown command: {}", other)),
        None => debugger_error("Empty command"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpStream;

    use ecal_core::util::logging::MemoryLogger;
    use ecal_core::{EcalDebugger, EcalRuntimeProvider, Processor};

    use super::*;

    fn debug_runtime() -> Arc<EcalRuntime> {
        let debugger = Arc::new(EcalDebugger::new());

        let erp = EcalRuntimeProvider::with_parts(
            "debugserver",
            None,
            Arc::new(MemoryLogger::new(10)),
            Some(debugger),
            Processor::new(1),
        );

        Arc::new(EcalRuntime::with_provider(erp))
    }

    fn read_reply(stream: &mut TcpStream) -> serde_json::Value {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            stream.read_exact(&mut byte).unwrap();
            buf.push(byte[0]);

            if buf.ends_with(b"\n\n") {
                break;
            }
        }

        serde_json::from_slice(&buf).unwrap()
    }

    #[test]
    fn test_handle_line() {
        let runtime = debug_runtime();

        let reply = handle_line(&runtime, "##status");
        assert!(reply.get("breakpoints").is_some());

        let reply = handle_line(&runtime, "##break test:3");
        assert_eq!(reply, serde_json::json!({"ok": true}));
        assert_eq!(
            handle_line(&runtime, "##status")["breakpoints"],
            serde_json::json!({"test:3": true})
        );

        let reply = handle_line(&runtime, "##rmbreak test");
        assert_eq!(reply, serde_json::json!({"ok": true}));

        let reply = handle_line(&runtime, "##nosuch");
        assert_eq!(
            reply,
            serde_json::json!({"DebuggerError": "Unknown command: nosuch"})
        );

        let reply = handle_line(&runtime, "##describe 99");
        assert_eq!(
            reply,
            serde_json::json!({"DebuggerError": "Unknown thread: 99"})
        );

        // Code evaluation returns base64 encoded output.
        let reply = handle_line(&runtime, "6 * 7");
        assert_eq!(
            reply,
            serde_json::json!({
                "EncodedOutput": base64::engine::general_purpose::STANDARD.encode("42")
            })
        );

        let reply = handle_line(&runtime, "1 +");
        assert!(reply["DebuggerError"]
            .as_str()
            .unwrap()
            .starts_with("Parse error"));
    }

    #[test]
    fn test_server_round_trip() {
        let runtime = debug_runtime();

        // Bind on an ephemeral port first, then serve it.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = DebugServer::new(addr.to_string(), runtime);
        server.spawn();

        let mut stream = loop {
            match TcpStream::connect(addr) {
                Ok(s) => break s,
                Err(_) => std::thread::sleep(std::time::Duration::from_millis(10)),
            }
        };

        stream.write_all(b"##status\n").unwrap();
        let reply = read_reply(&mut stream);
        assert!(reply.get("threads").is_some());

        stream.write_all(b"a := 2\n").unwrap();
        read_reply(&mut stream);

        stream.write_all(b"a + 1\n").unwrap();
        let reply = read_reply(&mut stream);
        assert_eq!(
            reply["EncodedOutput"],
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode("3"))
        );
    }
}
