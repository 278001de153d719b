//! Import resolution.
//!
//! Two locator implementations: a file-system locator rooted at a
//! directory, which also detects circular imports, and an in-memory
//! locator for tests and embedded use.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ImportError(pub String);

/// Resolves an import path to source text.
pub trait ImportLocator: Send + Sync {
    fn resolve(&self, path: &str) -> Result<String, ImportError>;

    /// Called once the resolved source has been fully evaluated. Locators
    /// which track in-flight imports release the path here.
    fn finished(&self, _path: &str) {}
}

/// Locator reading `<root>/<path>.ecal` (or `<root>/<path>` if the suffix
/// is already present). Imports which are resolved again before they
/// finished evaluating are circular.
pub struct FileImportLocator {
    root: PathBuf,
    in_flight: Mutex<HashSet<String>>,
}

impl FileImportLocator {
    pub fn new(root: impl Into<PathBuf>) -> FileImportLocator {
        FileImportLocator {
            root: root.into(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }
}

impl ImportLocator for FileImportLocator {
    fn resolve(&self, path: &str) -> Result<String, ImportError> {
        if !self.in_flight.lock().insert(path.to_string()) {
            return Err(ImportError(format!("Circular import: {}", path)));
        }

        let mut file = self.root.join(path);
        if file.extension().is_none() {
            file.set_extension("ecal");
        }

        fs::read_to_string(&file).map_err(|e| {
            self.in_flight.lock().remove(path);
            ImportError(format!("Cannot read import {}: {}", file.display(), e))
        })
    }

    fn finished(&self, path: &str) {
        self.in_flight.lock().remove(path);
    }
}

/// Locator serving sources from an in-memory map.
#[derive(Default)]
pub struct MemoryImportLocator {
    files: Mutex<HashMap<String, String>>,
    in_flight: Mutex<HashSet<String>>,
}

impl MemoryImportLocator {
    pub fn new() -> MemoryImportLocator {
        MemoryImportLocator::default()
    }

    pub fn insert(&self, path: impl Into<String>, source: impl Into<String>) {
        self.files.lock().insert(path.into(), source.into());
    }
}

impl ImportLocator for MemoryImportLocator {
    fn resolve(&self, path: &str) -> Result<String, ImportError> {
        if !self.in_flight.lock().insert(path.to_string()) {
            return Err(ImportError(format!("Circular import: {}", path)));
        }

        self.files.lock().get(path).cloned().ok_or_else(|| {
            self.in_flight.lock().remove(path);
            ImportError(format!("Unknown import: {}", path))
        })
    }

    fn finished(&self, path: &str) {
        self.in_flight.lock().remove(path);
    }
}
