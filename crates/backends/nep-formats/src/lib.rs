//! NEP extension pack: GeoTIFF, NASA CDF and GRIB2 backends.
//!
//! Built as a `cdylib` the crate is a plugin exporting
//! `nep_geotiff_initialize`, `nep_cdf_initialize` and `nep_grib2_initialize`.
//! Linked as an `rlib`, [`register_all`] installs the same tables through the
//! same host entry point.

pub mod cdf;
pub mod ffi;
pub mod geotiff;
pub mod grib2;
pub mod skeleton;
pub mod source;
pub mod tiff;

use tracing::debug;

use nep_abi::{NcResult, PluginInitFn};
use nep_core::host::run_initializer;
use nep_core::Engine;

pub use ffi::{nep_cdf_initialize, nep_geotiff_initialize, nep_grib2_initialize};

/// Initializers in registration order, with their exported names.
pub const INITIALIZERS: [(&str, PluginInitFn); 3] = [
    ("nep_geotiff_initialize", nep_geotiff_initialize),
    ("nep_cdf_initialize", nep_cdf_initialize),
    ("nep_grib2_initialize", nep_grib2_initialize),
];

/// Register every backend in this crate with `engine`.
pub fn register_all(engine: &mut Engine) -> NcResult<()> {
    for (name, init) in INITIALIZERS {
        // SAFETY: the initializers above follow the PluginInitFn contract and
        // only register 'static tables.
        unsafe { run_initializer(engine.registry_mut(), init) }?;
        debug!(initializer = name, "registered");
    }
    Ok(())
}
