//! NEP plugins: everything between rc files and a populated registry.
//!
//! - `rc`: `KEY=VALUE` parsing, `NETCDF.UDFn.*` plugin keys, magic escapes
//! - `paths`: the rc search path and its environment overrides
//! - `loader`: dlopen, initializer call, post-load checks, quarantine
//! - `runtime`: the lazily built process-wide engine

pub mod errors;
pub mod loader;
pub mod paths;
pub mod rc;
pub mod runtime;

pub use errors::{PluginError, Result};
pub use loader::{
    activate, autoload, load_all, load_all_with, load_entry, read_config, resolve_initializer,
    FailedPlugin, LoadReport,
};
pub use rc::{Diagnostic, PluginConfig, PluginEntry};
