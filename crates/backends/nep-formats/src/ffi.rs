//! Exported initializers. A host that loads this library as a plugin names
//! one of these as `NETCDF.UDFn.INIT`.

use nep_abi::ffi::status_of;
use nep_abi::{HostApi, Mode, NcResult};

use crate::{cdf, geotiff, grib2};

pub const GEOTIFF_BIGTIFF_MODE: Mode = Mode::UDF0;
pub const GEOTIFF_CLASSIC_MODE: Mode = Mode::UDF1;
pub const CDF_MODE: Mode = Mode::UDF2;
pub const GRIB2_MODE: Mode = Mode::UDF3;

fn with_host(host: *const HostApi, f: impl FnOnce(&HostApi) -> NcResult<()>) -> i32 {
    status_of(unsafe { HostApi::from_ptr(host) }.and_then(f))
}

/// Registers GeoTIFF at UDF0 (BigTIFF, `II+`) and UDF1 (classic, `II*`).
///
/// # Safety
/// `host` must be null or point to a valid [`HostApi`].
#[no_mangle]
pub unsafe extern "C" fn nep_geotiff_initialize(host: *const HostApi) -> i32 {
    with_host(host, |h| {
        h.register(GEOTIFF_BIGTIFF_MODE, &geotiff::GEOTIFF_TABLE, Some(geotiff::MAGIC_BIGTIFF))?;
        h.register(GEOTIFF_CLASSIC_MODE, &geotiff::GEOTIFF_TABLE, Some(geotiff::MAGIC_CLASSIC))
    })
}

/// # Safety
/// `host` must be null or point to a valid [`HostApi`].
#[no_mangle]
pub unsafe extern "C" fn nep_cdf_initialize(host: *const HostApi) -> i32 {
    with_host(host, |h| h.register(CDF_MODE, &cdf::CDF_TABLE, Some(cdf::MAGIC)))
}

/// # Safety
/// `host` must be null or point to a valid [`HostApi`].
#[no_mangle]
pub unsafe extern "C" fn nep_grib2_initialize(host: *const HostApi) -> i32 {
    with_host(host, |h| h.register(GRIB2_MODE, &grib2::GRIB2_TABLE, Some(grib2::MAGIC)))
}
