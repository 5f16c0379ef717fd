use nep_abi::{stubs, DispatchTable, Slot, UdfSlot};
use nep_core::EngineConfig;
use nep_plugins::paths::ENV_RC_IGNORE;
use nep_plugins::runtime;

static TABLE: DispatchTable = stubs::READ_ONLY;

// Single test: the engine is process-wide.
#[test]
fn engine_is_built_once() {
    std::env::set_var(ENV_RC_IGNORE, "1");
    let slot = Slot::User(UdfSlot::new(9).unwrap());

    let engine = runtime::init_engine(EngineConfig::default(), |e| {
        e.register(slot, &TABLE, Some(b"RT9")).unwrap();
    });
    assert!(engine.read().unwrap().registry().is_registered(slot));

    let report = runtime::load_report().unwrap();
    assert!(report.is_clean());
    assert!(report.loaded.is_empty());

    let again = runtime::init_engine(EngineConfig::default(), |_| panic!("setup ran twice"));
    assert!(std::ptr::eq(engine, again));
    assert!(std::ptr::eq(engine, runtime::engine()));
}
