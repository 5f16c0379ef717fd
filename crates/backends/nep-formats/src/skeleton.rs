//! Shared slots for backends that validate their header and present an
//! empty root group.

use tracing::info;

use nep_abi::stubs;
use nep_abi::{
    AttInfo, DatasetSummary, DimInfo, DispatchTable, FileFormat, FormatExtended, Mode, NcError,
    NcResult, Ncid, OpenFile, Slot, VarInfo,
};

use crate::source::Source;

/// Flags these backends refuse at open.
pub const ILLEGAL_OPEN_FLAGS: Mode = Mode::WRITE
    .union(Mode::MMAP)
    .union(Mode::OFFSET_64BIT)
    .union(Mode::DISKLESS);

/// Per-session state: the opened source and what the header said.
#[derive(Debug)]
pub struct Skeleton {
    /// Held open for the life of the session.
    pub src: Source,
    pub kind: &'static str,
    pub version: u32,
}

pub fn check_open_mode(file: &OpenFile, kind: &str) -> NcResult<()> {
    let bad = file.mode() & ILLEGAL_OPEN_FLAGS;
    if bad.is_empty() {
        Ok(())
    } else {
        Err(NcError::InvalidArgument(format!(
            "{kind} files cannot be opened with mode {:#x}",
            bad.bits()
        )))
    }
}

fn skeleton_close(file: &mut OpenFile) -> NcResult<Option<Vec<u8>>> {
    file.take_state();
    Ok(None)
}

fn skeleton_inq_format(file: &mut OpenFile) -> NcResult<FileFormat> {
    match file.slot() {
        Slot::User(u) => Ok(FileFormat::User(u)),
        Slot::Builtin(_) => Ok(FileFormat::Netcdf4),
    }
}

fn skeleton_inq_format_extended(file: &mut OpenFile) -> NcResult<FormatExtended> {
    Ok(FormatExtended {
        formatx: file.slot().routing_value(),
        mode: file.mode(),
    })
}

fn skeleton_inq(file: &mut OpenFile, _ncid: Ncid) -> NcResult<DatasetSummary> {
    file.state::<Skeleton>()?;
    Ok(DatasetSummary::default())
}

fn skeleton_show_metadata(file: &mut OpenFile, _ncid: Ncid) -> NcResult<()> {
    let s = file.state::<Skeleton>()?;
    info!(path = file.path(), kind = s.kind, version = s.version, "empty root group");
    Ok(())
}

fn skeleton_inq_dimid(_file: &mut OpenFile, _ncid: Ncid, name: &str) -> NcResult<i32> {
    Err(NcError::NotFound(format!("dimension {name}")))
}

fn skeleton_inq_dim(_file: &mut OpenFile, _ncid: Ncid, dimid: i32) -> NcResult<DimInfo> {
    Err(NcError::NotFound(format!("dimension id {dimid}")))
}

fn skeleton_inq_unlimdim(_file: &mut OpenFile, _ncid: Ncid) -> NcResult<Option<i32>> {
    Ok(None)
}

fn skeleton_inq_varid(_file: &mut OpenFile, _ncid: Ncid, name: &str) -> NcResult<i32> {
    Err(NcError::NotFound(format!("variable {name}")))
}

fn skeleton_inq_var_all(_file: &mut OpenFile, _ncid: Ncid, varid: i32) -> NcResult<VarInfo> {
    Err(NcError::NotFound(format!("variable id {varid}")))
}

fn skeleton_inq_att(_file: &mut OpenFile, _ncid: Ncid, _varid: i32, name: &str) -> NcResult<AttInfo> {
    Err(NcError::NotFound(format!("attribute {name}")))
}

fn skeleton_inq_attname(_file: &mut OpenFile, _ncid: Ncid, _varid: i32, attnum: i32) -> NcResult<String> {
    Err(NcError::NotFound(format!("attribute number {attnum}")))
}

/// Read-only base with every inquiry answering "empty". Backends add `open`.
pub const EMPTY_GROUP: DispatchTable = DispatchTable {
    close: Some(skeleton_close),
    inq_format: Some(skeleton_inq_format),
    inq_format_extended: Some(skeleton_inq_format_extended),
    inq: Some(skeleton_inq),
    inq_dimid: Some(skeleton_inq_dimid),
    inq_dim: Some(skeleton_inq_dim),
    inq_unlimdim: Some(skeleton_inq_unlimdim),
    inq_varid: Some(skeleton_inq_varid),
    inq_var_all: Some(skeleton_inq_var_all),
    inq_att: Some(skeleton_inq_att),
    inq_attname: Some(skeleton_inq_attname),
    show_metadata: Some(skeleton_show_metadata),
    ..stubs::READ_ONLY
};
