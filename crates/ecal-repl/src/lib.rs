//! Interactive front-end components for ECAL: the console, the script
//! runner helpers and the TCP debug server.

pub mod debug_server;
pub mod repl;

pub use debug_server::DebugServer;
pub use repl::{Console, ReplCommand};
