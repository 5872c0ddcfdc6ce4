// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugin module loading.
//
// A module is anything that can hand out monitor initializers by symbol
// name.  Built-in modules come from an in-process catalog; everything else
// is opened as a shared library with `libloading`.  Shared libraries export
// the initializers as Rust-ABI functions, so they must be built with the same
// toolchain as the spooler.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use libloading::Library;
use tracing::{debug, info};

use spoolwerk_core::error::{Result, SpoolError};

use crate::abi::{
    InitializeMonitorEx, InitializePrintMonitor, InitializePrintMonitor2,
    InitializePrintMonitorUi,
};

pub const INITIALIZE_PRINT_MONITOR2: &str = "InitializePrintMonitor2";
pub const INITIALIZE_PRINT_MONITOR: &str = "InitializePrintMonitor";
pub const INITIALIZE_MONITOR_EX: &str = "InitializeMonitorEx";
pub const INITIALIZE_PRINT_MONITOR_UI: &str = "InitializePrintMonitorUI";

/// One initializer exported by a module.
#[derive(Clone, Copy)]
pub enum EntryPoint {
    PrintMonitor2(InitializePrintMonitor2),
    PrintMonitor(InitializePrintMonitor),
    MonitorEx(InitializeMonitorEx),
    PrintMonitorUi(InitializePrintMonitorUi),
}

impl EntryPoint {
    /// Symbol name this initializer is exported under.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::PrintMonitor2(_) => INITIALIZE_PRINT_MONITOR2,
            Self::PrintMonitor(_) => INITIALIZE_PRINT_MONITOR,
            Self::MonitorEx(_) => INITIALIZE_MONITOR_EX,
            Self::PrintMonitorUi(_) => INITIALIZE_PRINT_MONITOR_UI,
        }
    }
}

/// A loaded module.  Dropping it releases the code behind its entry points,
/// so every table obtained from it must be dropped first.
pub trait PluginModule: Send + Sync {
    fn path(&self) -> &str;

    fn entry_point(&self, symbol: &str) -> Option<EntryPoint>;
}

/// Opens modules by path.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<Box<dyn PluginModule>>;
}

/// A module assembled in-process from a list of exports.
pub struct StaticModule {
    path: String,
    exports: Vec<EntryPoint>,
}

impl StaticModule {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            exports: Vec::new(),
        }
    }

    pub fn export(mut self, entry: EntryPoint) -> Self {
        self.exports.push(entry);
        self
    }
}

impl PluginModule for StaticModule {
    fn path(&self) -> &str {
        &self.path
    }

    fn entry_point(&self, symbol: &str) -> Option<EntryPoint> {
        self.exports.iter().find(|e| e.symbol() == symbol).copied()
    }
}

pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn PluginModule> + Send + Sync>;

/// Strip a trailing `.dll` so `localspl.dll` and `localspl` name the same
/// built-in module.
fn catalog_key(path: &str) -> String {
    let lower = path.to_ascii_lowercase();
    match lower.strip_suffix(".dll") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Registry of built-in modules keyed by name.
///
/// Every `load` builds a fresh module from its factory and counts it, so a
/// reload after a full unload is observable.
#[derive(Default)]
pub struct BuiltinCatalog {
    factories: Mutex<HashMap<String, ModuleFactory>>,
    opened: Mutex<HashMap<String, usize>>,
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the `localspl` monitor and its `localui` companion.
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        catalog.register(crate::localmon::MODULE_NAME, Arc::new(crate::localmon::module));
        catalog.register(crate::localui::MODULE_NAME, Arc::new(crate::localui::module));
        catalog
    }

    pub fn register(&self, name: &str, factory: ModuleFactory) {
        self.factories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(catalog_key(name), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&catalog_key(name))
    }

    /// How many times `name` has been loaded.
    pub fn open_count(&self, name: &str) -> usize {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&catalog_key(name))
            .copied()
            .unwrap_or(0)
    }
}

impl ModuleLoader for BuiltinCatalog {
    fn load(&self, path: &str) -> Result<Box<dyn PluginModule>> {
        let key = catalog_key(path);
        let factory = self
            .factories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or_else(|| SpoolError::ModuleNotFound(path.to_string()))?;
        *self
            .opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(0) += 1;
        debug!(module = path, "built-in module opened");
        Ok(factory())
    }
}

/// A shared library opened with `libloading`.
pub struct DylibModule {
    path: String,
    library: Library,
}

impl PluginModule for DylibModule {
    fn path(&self) -> &str {
        &self.path
    }

    fn entry_point(&self, symbol: &str) -> Option<EntryPoint> {
        let name = format!("{symbol}\0");
        // SAFETY: the exported symbols are declared with exactly these Rust
        // signatures, and the library outlives the copied fn pointers because
        // the registry drops every table before the module.
        unsafe {
            match symbol {
                INITIALIZE_PRINT_MONITOR2 => self
                    .library
                    .get::<InitializePrintMonitor2>(name.as_bytes())
                    .ok()
                    .map(|s| EntryPoint::PrintMonitor2(*s)),
                INITIALIZE_PRINT_MONITOR => self
                    .library
                    .get::<InitializePrintMonitor>(name.as_bytes())
                    .ok()
                    .map(|s| EntryPoint::PrintMonitor(*s)),
                INITIALIZE_MONITOR_EX => self
                    .library
                    .get::<InitializeMonitorEx>(name.as_bytes())
                    .ok()
                    .map(|s| EntryPoint::MonitorEx(*s)),
                INITIALIZE_PRINT_MONITOR_UI => self
                    .library
                    .get::<InitializePrintMonitorUi>(name.as_bytes())
                    .ok()
                    .map(|s| EntryPoint::PrintMonitorUi(*s)),
                _ => None,
            }
        }
    }
}

/// Opens shared libraries from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl ModuleLoader for DylibLoader {
    fn load(&self, path: &str) -> Result<Box<dyn PluginModule>> {
        // SAFETY: loading a library runs its initializers; monitor modules
        // are trusted configuration installed by an administrator.
        let library = unsafe { Library::new(Path::new(path)) }
            .map_err(|e| SpoolError::ModuleNotFound(format!("{path}: {e}")))?;
        info!(module = path, "monitor library loaded");
        Ok(Box::new(DylibModule {
            path: path.to_string(),
            library,
        }))
    }
}

/// Built-in catalog first, shared libraries otherwise.
pub struct DefaultLoader {
    catalog: Arc<BuiltinCatalog>,
    dylib: DylibLoader,
}

impl DefaultLoader {
    pub fn new(catalog: Arc<BuiltinCatalog>) -> Self {
        Self {
            catalog,
            dylib: DylibLoader,
        }
    }

    pub fn catalog(&self) -> &Arc<BuiltinCatalog> {
        &self.catalog
    }
}

impl Default for DefaultLoader {
    fn default() -> Self {
        Self::new(Arc::new(BuiltinCatalog::with_defaults()))
    }
}

impl ModuleLoader for DefaultLoader {
    fn load(&self, path: &str) -> Result<Box<dyn PluginModule>> {
        if self.catalog.contains(path) {
            self.catalog.load(path)
        } else {
            self.dylib.load(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_accepts_dll_suffix_and_counts_opens() {
        let catalog = BuiltinCatalog::with_defaults();
        assert!(catalog.contains("localspl.dll"));
        assert!(catalog.contains("LOCALUI"));

        let module = catalog.load("localspl.dll").expect("load");
        assert!(module.entry_point(INITIALIZE_PRINT_MONITOR2).is_some());
        assert!(module.entry_point(INITIALIZE_PRINT_MONITOR).is_none());
        catalog.load("localspl").expect("load again");
        assert_eq!(catalog.open_count("localspl"), 2);
    }

    #[test]
    fn missing_module_is_module_not_found() {
        let loader = DefaultLoader::default();
        let err = loader
            .load("/nonexistent/libmissing-monitor.so")
            .err()
            .expect("should fail");
        assert!(matches!(err, SpoolError::ModuleNotFound(_)));
    }

    #[test]
    fn static_module_finds_exports_by_symbol() {
        fn ui() -> Option<crate::abi::MonitorUi> {
            None
        }
        let module = StaticModule::new("uionly").export(EntryPoint::PrintMonitorUi(ui));
        assert_eq!(module.path(), "uionly");
        assert!(matches!(
            module.entry_point(INITIALIZE_PRINT_MONITOR_UI),
            Some(EntryPoint::PrintMonitorUi(_))
        ));
        assert!(module.entry_point(INITIALIZE_MONITOR_EX).is_none());
    }
}
