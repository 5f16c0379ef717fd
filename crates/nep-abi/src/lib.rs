//! NEP ABI crate: the dispatch contract shared by the routing engine and every
//! format backend, whether linked in statically or loaded as a plugin.

pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod file;
pub mod stubs;
pub mod types;

pub use dispatch::{DispatchTable, GetSlabFn, Op, PutSlabFn};
pub use error::{NcError, NcResult, NC_NOERR};
pub use ffi::{HostApi, PluginInitFn, MAX_MAGIC_LEN, NEP_DISPATCH_VERSION};
pub use file::OpenFile;
pub use types::*;
