//! Utility definitions shared across the interpreter and the event engine.

pub mod import;
pub mod logging;
pub mod types;

pub use import::{FileImportLocator, ImportError, ImportLocator, MemoryImportLocator};
pub use logging::{ConsoleLogger, EcalLogger, MemoryLogger, NullLogger};
pub use types::{EcalFunction, FuncContext};
