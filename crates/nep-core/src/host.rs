//! Host side of the C-ABI registration surface.
//!
//! Built-in and plugin initializers register through the same entry point:
//! [`HostApi::def_user_format`], which forwards into [`Registry::register_mode`].

use core::ffi::c_void;

use tracing::warn;

use nep_abi::ffi::{table_from_ptr, HostApi, PluginInitFn, MAX_MAGIC_LEN};
use nep_abi::{Mode, NcError, NcResult, NC_NOERR, NEP_DISPATCH_VERSION};

use crate::registry::Registry;

/// What `HostApi::ctx` points at while an initializer runs.
pub struct HostContext<'a> {
    registry: &'a mut Registry,
    /// Full detail of the last rejected registration; the status code alone
    /// loses it.
    rejected: Option<NcError>,
}

impl<'a> HostContext<'a> {
    pub fn new(registry: &'a mut Registry) -> Self {
        Self {
            registry,
            rejected: None,
        }
    }

    pub fn take_rejection(&mut self) -> Option<NcError> {
        self.rejected.take()
    }
}

unsafe extern "C" fn host_def_user_format(
    ctx: *mut c_void,
    mode: u32,
    table: *const nep_abi::DispatchTable,
    magic: *const u8,
    magic_len: usize,
) -> i32 {
    let Some(host) = (unsafe { ctx.cast::<HostContext<'_>>().as_mut() }) else {
        return NcError::InvalidArgument("null host context".into()).code();
    };
    let result = (|| {
        let table = unsafe { table_from_ptr(table) }?;
        let magic = if magic.is_null() || magic_len == 0 {
            None
        } else if magic_len > MAX_MAGIC_LEN {
            return Err(NcError::InvalidArgument(format!(
                "magic number is {magic_len} bytes, maximum is {MAX_MAGIC_LEN}"
            )));
        } else {
            Some(unsafe { std::slice::from_raw_parts(magic, magic_len) })
        };
        let mode = Mode::from_bits_retain(mode);
        host.registry.register_mode(mode, table, magic)
    })();
    match result {
        Ok(()) => NC_NOERR,
        Err(e) => {
            warn!(mode = format_args!("{mode:#x}"), error = %e, "registration rejected");
            let code = e.code();
            host.rejected = Some(e);
            code
        }
    }
}

/// Build the host API an initializer receives. The returned value borrows
/// `ctx` through a raw pointer: it must not outlive the borrow.
pub fn host_api(ctx: &mut HostContext<'_>) -> HostApi {
    HostApi {
        abi_version: NEP_DISPATCH_VERSION,
        ctx: (ctx as *mut HostContext<'_>).cast(),
        def_user_format: host_def_user_format,
    }
}

/// Invoke an initializer against `registry`.
///
/// # Safety
/// `init` must be a valid initializer following the [`PluginInitFn`]
/// contract; any table it registers must stay alive for the process.
///
/// An initializer that passes a rejected registration's status straight back
/// gets the rejection itself, with its full detail, as the error.
pub unsafe fn run_initializer(registry: &mut Registry, init: PluginInitFn) -> NcResult<()> {
    let mut ctx = HostContext::new(registry);
    let host = host_api(&mut ctx);
    let rc = unsafe { init(&host) };
    if rc == NC_NOERR {
        return Ok(());
    }
    match ctx.take_rejection() {
        Some(e) if e.code() == rc => Err(e),
        _ => Err(NcError::from_code(rc, "initializer returned an error")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nep_abi::ffi::status_of;
    use nep_abi::{DispatchTable, Slot, UdfSlot};

    static TABLE: DispatchTable = DispatchTable::EMPTY;
    static OLD: DispatchTable = DispatchTable {
        version: 4,
        ..DispatchTable::EMPTY
    };

    unsafe extern "C" fn init_ok(host: *const HostApi) -> i32 {
        let result = unsafe { HostApi::from_ptr(host) }
            .and_then(|h| h.register(Mode::UDF6, &TABLE, Some(b"ZZ")));
        status_of(result)
    }

    unsafe extern "C" fn init_old_table(host: *const HostApi) -> i32 {
        let result = unsafe { HostApi::from_ptr(host) }
            .and_then(|h| h.register(Mode::UDF6, &OLD, None));
        status_of(result)
    }

    #[test]
    fn initializer_registers_through_host() {
        let mut r = Registry::new();
        unsafe { run_initializer(&mut r, init_ok) }.unwrap();
        let (table, magic) = r.inq_user_format(UdfSlot::new(6).unwrap()).unwrap();
        assert!(std::ptr::eq(table, &TABLE));
        assert_eq!(magic, Some(&b"ZZ"[..]));
    }

    #[test]
    fn stale_table_is_rejected_wholesale() {
        let mut r = Registry::new();
        let err = unsafe { run_initializer(&mut r, init_old_table) }.unwrap_err();
        assert!(matches!(err, NcError::AbiMismatch { expected: 5, found: 4 }));
        assert!(!r.is_registered(Slot::User(UdfSlot::new(6).unwrap())));
    }
}
