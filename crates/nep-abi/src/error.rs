use thiserror::Error;

use crate::types::Ncid;

/// Status code for success on the C-ABI boundary.
pub const NC_NOERR: i32 = 0;

/// Engine-level failure. Every variant maps to a stable status code so it can
/// cross the plugin boundary (see [`NcError::code`] / [`NcError::from_code`]).
#[derive(Debug, Error)]
pub enum NcError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no such format: {0}")]
    NoSuchFormat(String),

    /// The slot is absent or wired to a "feature absent" stub.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// A mutating call reached a read-only stub.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("bad handle: {0}")]
    BadHandle(Ncid),

    #[error("ABI mismatch: engine expects dispatch version {expected}, table declares {found}")]
    AbiMismatch { expected: u32, found: u32 },

    #[error("unknown format: {0}")]
    DetectionFailed(String),

    #[error("plugin load failed: {0}")]
    PluginLoad(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("index out of range: {0}")]
    Range(String),

    #[error("filter {0} not available")]
    NoFilter(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error {code}: {message}")]
    Backend { code: i32, message: String },
}

pub type NcResult<T> = std::result::Result<T, NcError>;

// Codes follow the netCDF numbering where an equivalent exists.
const CODE_BAD_ID: i32 = -33;
const CODE_INVAL: i32 = -36;
const CODE_PERM: i32 = -37;
const CODE_NOT_FOUND: i32 = -49;
const CODE_NOT_NC: i32 = -51;
const CODE_RANGE: i32 = -57;
const CODE_IO: i32 = -68;
const CODE_UNSUPPORTED: i32 = -111;
const CODE_NOT_BUILT: i32 = -128;
const CODE_NO_FILTER: i32 = -136;
const CODE_ABI: i32 = -150;
const CODE_PLUGIN: i32 = -151;

impl NcError {
    /// Stable negative status code for this error kind.
    pub fn code(&self) -> i32 {
        match self {
            NcError::InvalidArgument(_) => CODE_INVAL,
            NcError::NoSuchFormat(_) => CODE_NOT_BUILT,
            NcError::Unsupported(_) => CODE_UNSUPPORTED,
            NcError::PermissionDenied(_) => CODE_PERM,
            NcError::BadHandle(_) => CODE_BAD_ID,
            NcError::AbiMismatch { .. } => CODE_ABI,
            NcError::DetectionFailed(_) => CODE_NOT_NC,
            NcError::PluginLoad(_) => CODE_PLUGIN,
            NcError::NotFound(_) => CODE_NOT_FOUND,
            NcError::Range(_) => CODE_RANGE,
            NcError::NoFilter(_) => CODE_NO_FILTER,
            NcError::Io(_) => CODE_IO,
            NcError::Backend { code, .. } => *code,
        }
    }

    /// Rebuild an error from a status code returned across the C-ABI.
    /// Detail that does not survive the boundary is replaced by `context`.
    pub fn from_code(code: i32, context: &str) -> NcError {
        let msg = context.to_string();
        match code {
            CODE_BAD_ID => NcError::BadHandle(Ncid::INVALID),
            CODE_INVAL => NcError::InvalidArgument(msg),
            CODE_NOT_BUILT => NcError::NoSuchFormat(msg),
            CODE_UNSUPPORTED => NcError::Unsupported(msg),
            CODE_PERM => NcError::PermissionDenied(msg),
            CODE_NOT_NC => NcError::DetectionFailed(msg),
            CODE_PLUGIN => NcError::PluginLoad(msg),
            CODE_NOT_FOUND => NcError::NotFound(msg),
            CODE_RANGE => NcError::Range(msg),
            CODE_IO => NcError::Io(std::io::Error::other(msg)),
            // The versions do not survive the wire.
            CODE_ABI => NcError::AbiMismatch {
                expected: crate::ffi::NEP_DISPATCH_VERSION,
                found: 0,
            },
            other => NcError::Backend {
                code: other,
                message: msg,
            },
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        NcError::Unsupported(what.into())
    }

    pub fn read_only(what: impl Into<String>) -> Self {
        NcError::PermissionDenied(what.into())
    }
}
