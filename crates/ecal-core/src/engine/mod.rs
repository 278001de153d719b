//! Event engine.
//!
//! Application code submits [`Event`]s to a [`Processor`]. The processor
//! matches events against registered [`Rule`]s, orders the matching rules
//! by priority and suppression and executes their actions on a worker
//! pool. A [`Monitor`] tree tracks each event cascade and accumulates the
//! errors of failed rules at its root.

pub mod event;
pub mod monitor;
pub mod pool;
pub mod processor;
pub mod rule;

pub use event::Event;
pub use monitor::{EventErrors, Monitor};
pub use processor::Processor;
pub use rule::{Rule, RuleAction, RuleScope};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Cannot add rule {0} twice")]
    DuplicateRule(String),
    #[error("Invalid kind match pattern {0}")]
    InvalidPattern(String),
    #[error("Event kind must not be empty")]
    EmptyKind,
    #[error("Processor is not running")]
    NotRunning,
}
