//! Dynamic loading of configured plugins.
//!
//! Per entry: refuse relative paths, dlopen the library, resolve the
//! initializer, run it against the host API, then check that it really put a
//! current-ABI table into its slot. A failed entry has its registrations
//! rolled back and is quarantined so that detection reports why the format is
//! unavailable.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use libloading::{Library, Symbol};
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, info, warn};

use nep_abi::{NcError, PluginInitFn, Slot, UdfSlot, NEP_DISPATCH_VERSION};
use nep_core::host::run_initializer;
use nep_core::{QuarantineReason, Registry};

use crate::errors::{PluginError, Result};
use crate::paths::rc_search_path;
use crate::rc::{Diagnostic, PluginConfig, PluginEntry};

/// Libraries stay mapped for the life of the process: their tables may be
/// bound to live sessions.
static RETAINED: Lazy<Mutex<Vec<Library>>> = Lazy::new(|| Mutex::new(Vec::new()));

fn retain(lib: Library) {
    RETAINED.lock().expect("plugin list poisoned").push(lib);
}

/// Number of libraries loaded so far in this process.
pub fn retained_libraries() -> usize {
    RETAINED.lock().expect("plugin list poisoned").len()
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedPlugin {
    pub slot: UdfSlot,
    pub library: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<UdfSlot>,
    pub skipped: Vec<Diagnostic>,
    pub failed: Vec<FailedPlugin>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Read rc files in order. Missing files are not an error; unreadable ones
/// become diagnostics.
pub fn read_config(paths: &[PathBuf]) -> PluginConfig {
    let mut config = PluginConfig::new();
    for path in paths {
        match fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "reading rc file");
                config.add_text(&text, &path.display().to_string());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "rc file unreadable");
                config.push_diagnostic(Diagnostic {
                    source: path.display().to_string(),
                    message: format!("unreadable: {e}"),
                });
            }
        }
    }
    config
}

/// dlopen `entry.library` and resolve its initializer. The library is
/// retained for the rest of the process.
pub fn resolve_initializer(entry: &PluginEntry) -> Result<PluginInitFn> {
    let path: &Path = &entry.library;
    if !path.is_absolute() {
        return Err(PluginError::RelativePath {
            slot: entry.slot,
            path: path.to_path_buf(),
        });
    }

    let lib = unsafe { Library::new(path) }.map_err(|source| PluginError::Library {
        slot: entry.slot,
        path: path.to_path_buf(),
        source,
    })?;

    let init: PluginInitFn = {
        let sym: Symbol<PluginInitFn> =
            unsafe { lib.get(entry.init.as_bytes()) }.map_err(|source| PluginError::Symbol {
                slot: entry.slot,
                symbol: entry.init.clone(),
                path: path.to_path_buf(),
                source,
            })?;
        *sym
    };

    // The initializer may register tables even if it later fails.
    retain(lib);
    Ok(init)
}

/// Load one entry from its shared library.
pub fn load_entry(registry: &mut Registry, entry: &PluginEntry) -> Result<()> {
    let init = resolve_initializer(entry)?;
    unsafe { activate(registry, entry, init) }
}

/// Run `init` for `entry` and verify the result. This is the post-dlopen half
/// of [`load_entry`], usable with initializers linked into the process.
///
/// # Safety
/// `init` must follow the [`PluginInitFn`] contract.
///
/// On failure every user slot is put back as it was before `init` ran, so
/// nothing the initializer registered stays routable.
pub unsafe fn activate(registry: &mut Registry, entry: &PluginEntry, init: PluginInitFn) -> Result<()> {
    let snapshot = registry.snapshot_users();
    let result = unsafe { run_and_verify(registry, entry, init) };
    if let Err(e) = &result {
        debug!(slot = %entry.slot, error = %e, "rolling back plugin registrations");
        registry.restore_users(snapshot);
    }
    result
}

unsafe fn run_and_verify(registry: &mut Registry, entry: &PluginEntry, init: PluginInitFn) -> Result<()> {
    let slot = Slot::User(entry.slot);
    let before = registry.revision_of(slot);

    unsafe { run_initializer(registry, init) }.map_err(|error| PluginError::Init {
        slot: entry.slot,
        symbol: entry.init.clone(),
        error,
    })?;

    let desc = match registry.lookup(slot) {
        Ok(d) if Some(d.revision) != before => d,
        _ => {
            return Err(PluginError::NotRegistered {
                slot: entry.slot,
                symbol: entry.init.clone(),
            })
        }
    };
    if !desc.table.is_current() {
        return Err(PluginError::Init {
            slot: entry.slot,
            symbol: entry.init.clone(),
            error: NcError::AbiMismatch {
                expected: NEP_DISPATCH_VERSION,
                found: desc.table.version,
            },
        });
    }

    let (table, caps, own_magic) = (desc.table, desc.caps, desc.magic.clone());

    match (own_magic.as_deref(), entry.magic.as_deref()) {
        (None, Some(configured)) => {
            registry
                .register(slot, table, Some(configured), caps)
                .map_err(|error| PluginError::Init {
                    slot: entry.slot,
                    symbol: entry.init.clone(),
                    error,
                })?;
        }
        (Some(own), Some(configured)) if own != configured => {
            warn!(
                slot = %entry.slot,
                plugin = ?own,
                configured = ?configured,
                "configured magic differs from the plugin's; keeping the plugin's"
            );
        }
        _ => {}
    }

    info!(slot = %entry.slot, library = %entry.library.display(), "plugin loaded");
    Ok(())
}

/// Load every complete entry in `config`. Failures are quarantined and
/// reported; they never abort the remaining entries.
pub fn load_all(registry: &mut Registry, config: &PluginConfig) -> LoadReport {
    unsafe { load_all_with(registry, config, resolve_initializer) }
}

/// [`load_all`] with a custom initializer lookup in place of dlopen.
///
/// # Safety
/// Every initializer `resolve` returns must follow the [`PluginInitFn`]
/// contract.
pub unsafe fn load_all_with(
    registry: &mut Registry,
    config: &PluginConfig,
    mut resolve: impl FnMut(&PluginEntry) -> Result<PluginInitFn>,
) -> LoadReport {
    let (entries, skipped) = config.entries();
    let mut report = LoadReport {
        skipped,
        ..LoadReport::default()
    };

    for entry in &entries {
        let result = resolve(entry).and_then(|init| unsafe { activate(registry, entry, init) });
        match result {
            Ok(()) => report.loaded.push(entry.slot),
            Err(e) => {
                quarantine(registry, entry, &e);
                report.failed.push(FailedPlugin {
                    slot: entry.slot,
                    library: entry.library.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

/// Read the rc search path and load what it configures.
pub fn autoload(registry: &mut Registry) -> LoadReport {
    let paths = rc_search_path();
    if paths.is_empty() {
        debug!("rc files disabled");
    }
    load_all(registry, &read_config(&paths))
}

/// Record `err` against `entry.slot` so detection can report it.
pub fn quarantine(registry: &mut Registry, entry: &PluginEntry, err: &PluginError) {
    warn!(slot = %entry.slot, error = %err, "plugin quarantined");
    let reason = QuarantineReason::from_error(&err.to_nc_error());
    registry.quarantine(entry.slot, entry.magic.clone(), reason);
}
