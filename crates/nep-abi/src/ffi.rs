//! C-ABI surface between the engine and dynamically loaded backends.
//!
//! A plugin library exports an initializer with the [`PluginInitFn`]
//! signature. The host calls it with a [`HostApi`] whose `def_user_format`
//! entry is the same registration call built-in backends use. The table
//! pointer handed back must stay valid for the life of the process (a
//! `static` inside the plugin; the host never unloads plugin libraries).
//!
//! `DispatchTable` slots are Rust-ABI function pointers: host and plugins
//! must be built with the same toolchain, and `NEP_DISPATCH_VERSION` gates
//! the table layout.

#![allow(improper_ctypes_definitions)]

use core::ffi::c_void;

use crate::dispatch::DispatchTable;
use crate::error::{NcError, NcResult, NC_NOERR};
use crate::types::Mode;

/// Bump this when the dispatch table changes. Tables declaring any other
/// version are rejected wholesale.
pub const NEP_DISPATCH_VERSION: u32 = 5;

/// Longest magic number a format may register.
pub const MAX_MAGIC_LEN: usize = 8;

/// Classic format ("CDF" followed by a version byte).
pub const MAGIC_CLASSIC: &[u8] = b"CDF";

/// HDF5 superblock signature.
pub const MAGIC_HDF5: &[u8] = b"\x89HDF\r\n\x1a\n";

/// `(ctx, mode, table, magic, magic_len) -> status`. A null `magic` means none.
pub type DefUserFormatFn = unsafe extern "C" fn(
    ctx: *mut c_void,
    mode: u32,
    table: *const DispatchTable,
    magic: *const u8,
    magic_len: usize,
) -> i32;

#[repr(C)]
pub struct HostApi {
    pub abi_version: u32,
    pub ctx: *mut c_void,
    pub def_user_format: DefUserFormatFn,
}

/// Plugin initializer. Returns `NC_NOERR` or an `NcError` status code.
pub type PluginInitFn = unsafe extern "C" fn(host: *const HostApi) -> i32;

impl HostApi {
    /// Borrow the host API handed to an initializer, checking the host speaks
    /// the same dispatch version as this plugin.
    ///
    /// # Safety
    /// `ptr` must be null or point to a `HostApi` valid for `'a`.
    pub unsafe fn from_ptr<'a>(ptr: *const HostApi) -> NcResult<&'a HostApi> {
        let host = unsafe { ptr.as_ref() }
            .ok_or_else(|| NcError::InvalidArgument("null host api".into()))?;
        if host.abi_version != NEP_DISPATCH_VERSION {
            return Err(NcError::AbiMismatch {
                expected: NEP_DISPATCH_VERSION,
                found: host.abi_version,
            });
        }
        Ok(host)
    }

    /// Register `table` under the user-defined slot named in `mode`.
    pub fn register(
        &self,
        mode: Mode,
        table: &'static DispatchTable,
        magic: Option<&[u8]>,
    ) -> NcResult<()> {
        let (ptr, len) = match magic {
            Some(m) => (m.as_ptr(), m.len()),
            None => (core::ptr::null(), 0),
        };
        let rc = unsafe { (self.def_user_format)(self.ctx, mode.bits(), table, ptr, len) };
        if rc == NC_NOERR {
            Ok(())
        } else {
            Err(NcError::from_code(rc, "host rejected registration"))
        }
    }
}

/// Validate a table pointer received across the C boundary.
///
/// Only the leading version word is read until it matches; a table built
/// against another layout is never dereferenced as a `DispatchTable`.
///
/// # Safety
/// `ptr` must be null or point to memory that stays valid for the rest of the
/// process and starts with a `u32` version word.
pub unsafe fn table_from_ptr(ptr: *const DispatchTable) -> NcResult<&'static DispatchTable> {
    if ptr.is_null() {
        return Err(NcError::InvalidArgument("null dispatch table".into()));
    }
    let found = unsafe { core::ptr::read(ptr.cast::<u32>()) };
    if found != NEP_DISPATCH_VERSION {
        return Err(NcError::AbiMismatch {
            expected: NEP_DISPATCH_VERSION,
            found,
        });
    }
    Ok(unsafe { &*ptr })
}

/// Convert an initializer outcome into the status code the host expects.
pub fn status_of(result: NcResult<()>) -> i32 {
    match result {
        Ok(()) => NC_NOERR,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CURRENT: DispatchTable = DispatchTable::EMPTY;
    static STALE: DispatchTable = DispatchTable {
        version: 999,
        ..DispatchTable::EMPTY
    };

    #[test]
    fn table_pointer_checks() {
        assert!(unsafe { table_from_ptr(&CURRENT) }.is_ok());
        assert!(matches!(
            unsafe { table_from_ptr(&STALE) },
            Err(NcError::AbiMismatch { expected: 5, found: 999 })
        ));
        assert!(matches!(
            unsafe { table_from_ptr(core::ptr::null()) },
            Err(NcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn host_api_version_gate() {
        unsafe extern "C" fn reject(
            _ctx: *mut c_void,
            _mode: u32,
            _table: *const DispatchTable,
            _magic: *const u8,
            _len: usize,
        ) -> i32 {
            -36
        }
        let host = HostApi {
            abi_version: 4,
            ctx: core::ptr::null_mut(),
            def_user_format: reject,
        };
        assert!(matches!(
            unsafe { HostApi::from_ptr(&host) },
            Err(NcError::AbiMismatch { found: 4, .. })
        ));

        let host = HostApi {
            abi_version: NEP_DISPATCH_VERSION,
            ..host
        };
        let host = unsafe { HostApi::from_ptr(&host) }.unwrap();
        let err = host.register(Mode::UDF0, &CURRENT, Some(b"AAAA")).unwrap_err();
        assert!(matches!(err, NcError::InvalidArgument(_)));
        assert_eq!(status_of(Err(err)), -36);
    }
}
