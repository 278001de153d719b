//! Interactive console for the ECAL runtime.
//!
//! Wraps the core runtime with command handling and multi-line input
//! collection. Lines starting with `.` are console commands, everything
//! else is evaluated as ECAL code.

pub mod commands;

use ecal_core::{EcalRuntime, Value};

pub use commands::ReplCommand;

pub struct Console {
    runtime: std::sync::Arc<EcalRuntime>,
    running: bool,
}

impl Console {
    pub fn new(runtime: std::sync::Arc<EcalRuntime>) -> Console {
        Console {
            runtime,
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn runtime(&self) -> &std::sync::Arc<EcalRuntime> {
        &self.runtime
    }

    /// Handle one complete input; returns the text to display.
    pub fn handle_input(&mut self, input: &str) -> String {
        match commands::parse_command(input) {
            ReplCommand::Empty => String::new(),
            ReplCommand::Help => help_text(),
            ReplCommand::Quit => {
                self.running = false;
                "Bye!".to_string()
            }
            ReplCommand::Symbols => {
                let (pkgs, consts, funcs) = ecal_core::stdlib::symbols();
                format!(
                    "Packages: {}\nConstants: {}\nFunctions: {}\nBuiltins: {}",
                    pkgs.join(", "),
                    consts.join(", "),
                    funcs.join(", "),
                    ecal_core::evaluator::func_provider::builtin_names().join(", ")
                )
            }
            ReplCommand::Env => self.runtime.global_scope().to_string(),
            ReplCommand::Unknown(cmd) => {
                format!("Unknown command: .{} (try .help)", cmd)
            }
            ReplCommand::Eval(code) => match self.runtime.eval_source("console", &code) {
                Ok(Value::Null) => String::new(),
                Ok(value) => value.to_string(),
                Err(err) => err.to_string(),
            },
        }
    }
}

fn help_text() -> String {
    [
        "Console commands:",
        "  .help    - this help text",
        "  .sym     - list stdlib symbols",
        "  .env     - dump the global environment",
        "  .quit    - end the console session",
    ]
    .join("\n")
}

/// True if the input has unbalanced brackets and the console should
/// collect more lines.
pub fn needs_more_input(input: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;

    for c in input.chars() {
        match in_string {
            Some(quote) => {
                if c == quote {
                    in_string = None;
                }
            }
            None => match c {
                '"' | '\'' => in_string = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            },
        }
    }

    depth > 0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ecal_core::util::logging::MemoryLogger;
    use ecal_core::EcalConfig;

    use super::*;

    fn test_console() -> Console {
        let runtime = EcalRuntime::new(EcalConfig::default(), Arc::new(MemoryLogger::new(10)));
        Console::new(Arc::new(runtime))
    }

    #[test]
    fn test_eval_and_commands() {
        let mut console = test_console();

        assert_eq!(console.handle_input("1 + 2"), "3");
        assert_eq!(console.handle_input("a := 5"), "");
        assert_eq!(console.handle_input("a * 2"), "10");

        assert!(console.handle_input(".help").contains(".quit"));
        assert!(console.handle_input(".sym").contains("math.sqrt"));
        assert!(console.handle_input(".env").contains("a (number) : 5"));
        assert!(console.handle_input(".nope").contains("Unknown command"));

        assert!(console.is_running());
        assert_eq!(console.handle_input(".quit"), "Bye!");
        assert!(!console.is_running());
    }

    #[test]
    fn test_error_display() {
        let mut console = test_console();

        assert_eq!(
            console.handle_input("1 + \"x\""),
            "ECAL error in console: Operand is not a number (x) (Line:1 Pos:3)"
        );
    }

    #[test]
    fn test_needs_more_input() {
        assert!(needs_more_input("if a == 1 {"));
        assert!(needs_more_input("f := func (x) {\n  x"));
        assert!(!needs_more_input("if a == 1 { b := 1 }"));
        assert!(!needs_more_input("a := \"{\""));
        assert!(!needs_more_input("1 + 2"));
    }
}
