use std::path::PathBuf;

use thiserror::Error;

use nep_abi::{NcError, UdfSlot};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{slot}: library path {path} is not absolute")]
    RelativePath { slot: UdfSlot, path: PathBuf },

    #[error("{slot}: failed to load {path}: {source}")]
    Library {
        slot: UdfSlot,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("{slot}: symbol {symbol} not found in {path}: {source}")]
    Symbol {
        slot: UdfSlot,
        symbol: String,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("{slot}: initializer {symbol} failed: {error}")]
    Init {
        slot: UdfSlot,
        symbol: String,
        error: NcError,
    },

    #[error("{slot}: initializer {symbol} returned without registering the slot")]
    NotRegistered { slot: UdfSlot, symbol: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Engine-level error this failure surfaces as.
    pub fn to_nc_error(&self) -> NcError {
        match self {
            PluginError::Init {
                error: NcError::AbiMismatch { expected, found },
                ..
            } => NcError::AbiMismatch {
                expected: *expected,
                found: *found,
            },
            other => NcError::PluginLoad(other.to_string()),
        }
    }
}

impl From<PluginError> for NcError {
    fn from(e: PluginError) -> Self {
        e.to_nc_error()
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
