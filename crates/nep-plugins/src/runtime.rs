//! Process-wide engine.
//!
//! The first call builds the engine, runs the caller's static registrations,
//! and autoloads rc-configured plugins. Later calls return the same engine.

use std::sync::{OnceLock, RwLock};

use tracing::{info, warn};

use nep_core::{Engine, EngineConfig};

use crate::loader::{autoload, LoadReport};

static ENGINE: OnceLock<RwLock<Engine>> = OnceLock::new();
static REPORT: OnceLock<LoadReport> = OnceLock::new();

/// The process engine with default configuration.
pub fn engine() -> &'static RwLock<Engine> {
    init_engine(EngineConfig::default(), |_| {})
}

/// Build the process engine. `config` and `setup` only take effect on the
/// first call; `setup` runs before rc plugins load, so rc entries may replace
/// what it registers.
pub fn init_engine(
    config: EngineConfig,
    setup: impl FnOnce(&mut Engine),
) -> &'static RwLock<Engine> {
    ENGINE.get_or_init(|| {
        let mut engine = Engine::new(config);
        setup(&mut engine);

        let report = autoload(engine.registry_mut());
        for d in &report.skipped {
            warn!(source = %d.source, "{}", d.message);
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "plugin autoload finished"
        );
        let _ = REPORT.set(report);
        RwLock::new(engine)
    })
}

/// What autoload did, once the engine exists.
pub fn load_report() -> Option<&'static LoadReport> {
    REPORT.get()
}
