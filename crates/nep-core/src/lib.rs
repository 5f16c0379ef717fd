//! NEP core: the routing engine.
//!
//! - `registry`: routing value -> backend table, magic-number scan order.
//! - `detect`: explicit override, mode flags, URL, magic, extension.
//! - `engine`: session handles bound to a backend table, one routed method
//!   per dispatch slot.
//! - `host`: the C-ABI registration entry point handed to initializers.

pub mod config;
pub mod detect;
pub mod engine;
pub mod host;
pub mod registry;

pub use config::EngineConfig;
pub use detect::{Detection, OpenRequest, Rule};
pub use engine::Engine;
pub use registry::{FormatDescriptor, QuarantineReason, Quarantined, Registry, UserSnapshot};

pub use nep_abi as abi;
