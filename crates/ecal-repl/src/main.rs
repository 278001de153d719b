use std::fs;
use std::sync::Arc;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use ecal_core::util::logging::ConsoleLogger;
use ecal_core::{
    init_tracing, EcalConfig, EcalDebugger, EcalRuntime, EcalRuntimeProvider, Processor,
};
use ecal_repl::debug_server::DebugServer;
use ecal_repl::repl::{needs_more_input, Console};
use rustyline::error::ReadlineError;

fn main() -> Result<()> {
    let matches = Command::new("ecal")
        .version(ecal_core::VERSION)
        .about("ECAL - Event condition action language")
        .arg(
            Arg::new("dir")
                .long("dir")
                .value_name("PATH")
                .help("Root directory for imports")
                .default_value(".")
                .global(true),
        )
        .arg(
            Arg::new("serveraddr")
                .long("serveraddr")
                .value_name("ADDR")
                .help("Debug server address")
                .default_value("localhost:33274")
                .global(true),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_name("N")
                .help("Worker threads of the event processor")
                .default_value("1")
                .global(true),
        )
        .arg(
            Arg::new("loglevel")
                .long("loglevel")
                .value_name("LEVEL")
                .help("Log level: Debug, Info or Error")
                .default_value("Info")
                .global(true),
        )
        .subcommand(Command::new("console").about("Interactive ECAL console"))
        .subcommand(
            Command::new("run").about("Execute an ECAL script").arg(
                Arg::new("file")
                    .value_name("FILE")
                    .help("Script file to execute")
                    .required(true),
            ),
        )
        .subcommand(
            Command::new("debug")
                .about("Interactive console with debug server")
                .arg(
                    Arg::new("breakonstart")
                        .long("breakonstart")
                        .help("Suspend new threads on their first statement")
                        .action(ArgAction::SetTrue),
                ),
        )
        .get_matches();

    let dir = matches.get_one::<String>("dir").unwrap().clone();
    let server_addr = matches.get_one::<String>("serveraddr").unwrap().clone();
    let workers: usize = matches.get_one::<String>("workers").unwrap().parse()?;

    let loglevel = matches.get_one::<String>("loglevel").unwrap().to_lowercase();
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", format!("ecal={0},ecal_core={0}", loglevel));
    }
    init_tracing();

    let config = EcalConfig {
        name: "ecal".to_string(),
        worker_count: workers,
        fail_on_first: false,
        import_root: Some(dir.into()),
    };

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let file = run_matches.get_one::<String>("file").unwrap();
            run_script(&config, file)
        }
        Some(("debug", debug_matches)) => {
            let debugger = Arc::new(EcalDebugger::new());
            debugger.break_on_start(debug_matches.get_flag("breakonstart"));

            let runtime = Arc::new(build_runtime(&config, Some(debugger)));

            DebugServer::new(server_addr, runtime.clone()).spawn();
            interactive(runtime)
        }
        _ => {
            let runtime = Arc::new(build_runtime(&config, None));
            interactive(runtime)
        }
    }
}

fn build_runtime(config: &EcalConfig, debugger: Option<Arc<EcalDebugger>>) -> EcalRuntime {
    let locator = config.import_root.as_ref().map(|root| {
        Arc::new(ecal_core::FileImportLocator::new(root.clone()))
            as Arc<dyn ecal_core::ImportLocator>
    });

    let processor = Processor::new(config.worker_count);
    processor.set_fail_on_first(config.fail_on_first);

    let provider = EcalRuntimeProvider::with_parts(
        config.name.clone(),
        locator,
        Arc::new(ConsoleLogger),
        debugger,
        processor,
    );

    EcalRuntime::with_provider(provider)
}

/// Execute a script file; uncaught evaluation errors terminate with a
/// non-zero exit code.
fn run_script(config: &EcalConfig, file: &str) -> Result<()> {
    let source = fs::read_to_string(file)?;

    let config = EcalConfig {
        name: file.to_string(),
        ..config.clone()
    };

    let runtime = build_runtime(&config, None);

    match runtime.eval_source(file, &source) {
        Ok(_) => {
            runtime.stop();
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err);

            if let ecal_core::runtime::EcalRuntimeError::Eval(ref e) = err {
                for frame in e.trace_strings() {
                    eprintln!("  {}", frame);
                }
            }

            runtime.stop();
            std::process::exit(1);
        }
    }
}

fn interactive(runtime: Arc<EcalRuntime>) -> Result<()> {
    println!("ECAL console v{} (.help for commands)", ecal_core::VERSION);

    let mut console = Console::new(runtime.clone());
    let mut editor = rustyline::DefaultEditor::new()?;
    let mut pending = String::new();

    while console.is_running() {
        let prompt = if pending.is_empty() { "> " } else { "... " };

        match editor.readline(prompt) {
            Ok(line) => {
                if !pending.is_empty() {
                    pending.push('\n');
                }
                pending.push_str(&line);

                if needs_more_input(&pending) {
                    continue;
                }

                let input = std::mem::take(&mut pending);
                let _ = editor.add_history_entry(&input);

                let output = console.handle_input(&input);
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
            Err(ReadlineError::Interrupted) => {
                pending.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Input error: {}", err);
                break;
            }
        }
    }

    runtime.stop();
    Ok(())
}
