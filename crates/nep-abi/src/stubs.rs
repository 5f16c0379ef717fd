//! Shared slot implementations backends wire into their tables instead of
//! writing every operation themselves.
//!
//! - `ro_*`: mutating operations on inherently read-only formats.
//! - `notnc4_*`: operations outside the classic data model (groups, user
//!   types, per-variable storage tuning).
//! - `noop_*`: succeed without doing anything, or report "no filter".
//! - `root_*`: group queries for formats with a single root group.
//! - `default_*`: generic implementations routed back through the session's
//!   own table (strided from contiguous, mapped from strided, listings from
//!   counts).
//!
//! [`READ_ONLY`] and [`FLAT`] are prebuilt bases for struct-update syntax.

use crate::dispatch::{DispatchTable, GetSlabFn, PutSlabFn};
use crate::error::{NcError, NcResult};
use crate::ffi::NEP_DISPATCH_VERSION;
use crate::file::OpenFile;
use crate::types::{
    AttValue, ChunkCache, CompoundField, EnddefParams, Endianness, EnumMember, FillMode, NcType,
    Ncid, ParAccess, Quantize, Slab, Storage, TypeInfo, UserTypeInfo, VlenElement,
};

macro_rules! reject_stubs {
    ($kind:ident, $why:literal; $( $name:ident => $op:literal ($($arg:ty),*) -> $ret:ty; )*) => {
        $(
            pub fn $name(file: &mut OpenFile $(, _: $arg)*) -> NcResult<$ret> {
                Err(NcError::$kind(format!(
                    concat!($op, ": ", $why, " ({}, {})"),
                    file.slot(),
                    file.path()
                )))
            }
        )*
    };
}

reject_stubs! { PermissionDenied, "format is read-only";
    ro_create => "create" (Option<&[u8]>) -> ();
    ro_redef => "redef" () -> ();
    ro_enddef => "enddef" (EnddefParams) -> ();
    ro_set_fill => "set_fill" (FillMode) -> FillMode;
    ro_def_dim => "def_dim" (Ncid, &str, Option<usize>) -> i32;
    ro_rename_dim => "rename_dim" (Ncid, i32, &str) -> ();
    ro_rename_att => "rename_att" (Ncid, i32, &str, &str) -> ();
    ro_del_att => "del_att" (Ncid, i32, &str) -> ();
    ro_put_att => "put_att" (Ncid, i32, &str, &AttValue<'_>) -> ();
    ro_def_var => "def_var" (Ncid, &str, NcType, &[i32]) -> i32;
    ro_rename_var => "rename_var" (Ncid, i32, &str) -> ();
    ro_put_vara => "put_vara" (Ncid, i32, &Slab<'_>, &[u8], NcType) -> ();
    ro_put_vars => "put_vars" (Ncid, i32, &Slab<'_>, &[u8], NcType) -> ();
    ro_put_varm => "put_varm" (Ncid, i32, &Slab<'_>, &[u8], NcType) -> ();
    ro_def_var_fill => "def_var_fill" (Ncid, i32, bool, Option<&[u8]>) -> ();
}

reject_stubs! { Unsupported, "not available in the classic data model";
    notnc4_var_par_access => "var_par_access" (Ncid, i32, ParAccess) -> ();
    notnc4_def_grp => "def_grp" (Ncid, &str) -> Ncid;
    notnc4_rename_grp => "rename_grp" (Ncid, &str) -> ();
    notnc4_inq_user_type => "inq_user_type" (Ncid, NcType) -> UserTypeInfo;
    notnc4_def_compound => "def_compound" (Ncid, usize, &str) -> NcType;
    notnc4_insert_compound => "insert_compound" (Ncid, NcType, &str, usize, NcType) -> ();
    notnc4_insert_array_compound => "insert_array_compound" (Ncid, NcType, &str, usize, NcType, &[usize]) -> ();
    notnc4_inq_compound_field => "inq_compound_field" (Ncid, NcType, i32) -> CompoundField;
    notnc4_inq_compound_fieldindex => "inq_compound_fieldindex" (Ncid, NcType, &str) -> i32;
    notnc4_def_vlen => "def_vlen" (Ncid, &str, NcType) -> NcType;
    notnc4_put_vlen_element => "put_vlen_element" (Ncid, NcType, &mut VlenElement, usize, &[u8]) -> ();
    notnc4_get_vlen_element => "get_vlen_element" (Ncid, NcType, &VlenElement) -> Vec<u8>;
    notnc4_def_enum => "def_enum" (Ncid, NcType, &str) -> NcType;
    notnc4_insert_enum => "insert_enum" (Ncid, NcType, &str, i64) -> ();
    notnc4_inq_enum_member => "inq_enum_member" (Ncid, NcType, i32) -> EnumMember;
    notnc4_inq_enum_ident => "inq_enum_ident" (Ncid, NcType, i64) -> String;
    notnc4_def_opaque => "def_opaque" (Ncid, usize, &str) -> NcType;
    notnc4_def_var_deflate => "def_var_deflate" (Ncid, i32, bool, Option<u32>) -> ();
    notnc4_def_var_fletcher32 => "def_var_fletcher32" (Ncid, i32, bool) -> ();
    notnc4_def_var_chunking => "def_var_chunking" (Ncid, i32, &Storage) -> ();
    notnc4_def_var_endian => "def_var_endian" (Ncid, i32, Endianness) -> ();
    notnc4_def_var_filter => "def_var_filter" (Ncid, i32, u32, &[u32]) -> ();
    notnc4_set_var_chunk_cache => "set_var_chunk_cache" (Ncid, i32, ChunkCache) -> ();
    notnc4_get_var_chunk_cache => "get_var_chunk_cache" (Ncid, i32) -> ChunkCache;
    notnc4_def_var_quantize => "def_var_quantize" (Ncid, i32, Quantize) -> ();
    notnc4_inq_var_quantize => "inq_var_quantize" (Ncid, i32) -> Quantize;
}

pub fn noop_sync(_file: &mut OpenFile) -> NcResult<()> {
    Ok(())
}

pub fn noop_show_metadata(_file: &mut OpenFile, _ncid: Ncid) -> NcResult<()> {
    Ok(())
}

pub fn noop_inq_var_filter_ids(_file: &mut OpenFile, _ncid: Ncid, _varid: i32) -> NcResult<Vec<u32>> {
    Ok(Vec::new())
}

pub fn noop_inq_var_filter_info(
    _file: &mut OpenFile,
    _ncid: Ncid,
    _varid: i32,
    id: u32,
) -> NcResult<Vec<u32>> {
    Err(NcError::NoFilter(id))
}

pub fn noop_inq_filter_avail(_file: &mut OpenFile, _ncid: Ncid, id: u32) -> NcResult<()> {
    Err(NcError::NoFilter(id))
}

// Single-group formats: the root group is the only group, named "/".

fn is_root_path(name: &str) -> bool {
    matches!(name, "" | "/")
}

pub fn root_inq_ncid(_file: &mut OpenFile, ncid: Ncid, name: &str) -> NcResult<Ncid> {
    if is_root_path(name) {
        Ok(ncid.root())
    } else {
        Err(NcError::NotFound(format!("group {name}")))
    }
}

pub fn root_inq_grps(_file: &mut OpenFile, _ncid: Ncid) -> NcResult<Vec<Ncid>> {
    Ok(Vec::new())
}

pub fn root_inq_grpname(_file: &mut OpenFile, _ncid: Ncid) -> NcResult<String> {
    Ok("/".to_string())
}

pub fn root_inq_grp_parent(_file: &mut OpenFile, ncid: Ncid) -> NcResult<Ncid> {
    Err(NcError::NotFound(format!("parent of root group ({ncid})")))
}

pub fn root_inq_grp_full_ncid(file: &mut OpenFile, ncid: Ncid, name: &str) -> NcResult<Ncid> {
    root_inq_ncid(file, ncid, name)
}

pub fn root_inq_typeids(_file: &mut OpenFile, _ncid: Ncid) -> NcResult<Vec<NcType>> {
    Ok(Vec::new())
}

pub fn root_inq_type_equal(
    _file: &mut OpenFile,
    _ncid1: Ncid,
    t1: NcType,
    _ncid2: Ncid,
    t2: NcType,
) -> NcResult<bool> {
    if t1.is_atomic() && t2.is_atomic() {
        Ok(t1 == t2)
    } else {
        Err(NcError::unsupported("inq_type_equal: user-defined types"))
    }
}

pub fn default_inq_type(_file: &mut OpenFile, _ncid: Ncid, xtype: NcType) -> NcResult<TypeInfo> {
    match (xtype.atomic_name(), xtype.atomic_size()) {
        (Some(name), Some(size)) => Ok(TypeInfo {
            name: name.to_string(),
            size,
        }),
        _ => Err(NcError::NotFound(format!("type {}", xtype.0))),
    }
}

pub fn default_inq_typeid(_file: &mut OpenFile, _ncid: Ncid, name: &str) -> NcResult<NcType> {
    (1..=12)
        .map(NcType)
        .find(|t| t.atomic_name() == Some(name))
        .ok_or_else(|| NcError::NotFound(format!("type {name}")))
}

pub fn default_inq_unlimdims(file: &mut OpenFile, ncid: Ncid) -> NcResult<Vec<i32>> {
    let inq_unlimdim = file
        .table()
        .inq_unlimdim
        .ok_or_else(|| NcError::unsupported("inq_unlimdim"))?;
    Ok(inq_unlimdim(file, ncid)?.into_iter().collect())
}

pub fn default_inq_varids(file: &mut OpenFile, ncid: Ncid) -> NcResult<Vec<i32>> {
    let inq = file.table().inq.ok_or_else(|| NcError::unsupported("inq"))?;
    let n = inq(file, ncid)?.nvars;
    Ok((0..n as i32).collect())
}

pub fn default_inq_dimids(file: &mut OpenFile, ncid: Ncid, _include_parents: bool) -> NcResult<Vec<i32>> {
    let inq = file.table().inq.ok_or_else(|| NcError::unsupported("inq"))?;
    let n = inq(file, ncid)?.ndims;
    Ok((0..n as i32).collect())
}

/// Size in bytes of one in-memory element of `xtype`.
pub fn element_size(file: &mut OpenFile, ncid: Ncid, xtype: NcType) -> NcResult<usize> {
    if let Some(size) = xtype.atomic_size() {
        return Ok(size);
    }
    let inq_type = file
        .table()
        .inq_type
        .ok_or_else(|| NcError::unsupported(format!("size of type {}", xtype.0)))?;
    Ok(inq_type(file, ncid, xtype)?.size)
}

/// Walk a strided selection as runs of contiguous file elements.
///
/// `visit` receives the run's start and count (rank-length, count is 1
/// everywhere but possibly the last dimension) and the run's element offset
/// in the packed caller buffer.
fn for_each_run(
    slab: &Slab<'_>,
    mut visit: impl FnMut(&[usize], &[usize], usize) -> NcResult<()>,
) -> NcResult<()> {
    let rank = slab.rank();
    if rank == 0 {
        return visit(&[], &[], 0);
    }
    if slab.count.iter().any(|c| *c == 0) {
        return Ok(());
    }
    let stride = |d: usize| slab.stride.map_or(1, |s| s[d] as usize);
    let last = rank - 1;
    let run_len = if stride(last) == 1 { slab.count[last] } else { 1 };

    let mut idx = vec![0usize; rank];
    let mut run_start = vec![0usize; rank];
    let mut run_count = vec![1usize; rank];
    run_count[last] = run_len;
    let mut offset = 0usize;

    loop {
        for d in 0..rank {
            run_start[d] = idx[d]
                .checked_mul(stride(d))
                .and_then(|o| o.checked_add(slab.start[d]))
                .ok_or_else(|| NcError::Range(format!("dimension {d} index overflows")))?;
        }
        visit(&run_start[..], &run_count[..], offset)?;
        offset += run_len;

        let mut d = last;
        idx[d] += run_len;
        while idx[d] >= slab.count[d] {
            idx[d] = 0;
            if d == 0 {
                return Ok(());
            }
            d -= 1;
            idx[d] += 1;
        }
    }
}

fn check_buffer(len: usize, needed: usize, what: &str) -> NcResult<()> {
    if len < needed {
        return Err(NcError::InvalidArgument(format!(
            "{what} buffer holds {len} bytes, selection needs {needed}"
        )));
    }
    Ok(())
}

/// Strided read built from a contiguous read primitive.
pub fn strided_read(
    contig: GetSlabFn,
    file: &mut OpenFile,
    ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    out: &mut [u8],
    mem_type: NcType,
) -> NcResult<()> {
    slab.validate()?;
    if slab.is_unit_stride() {
        return contig(file, ncid, varid, &Slab::contiguous(slab.start, slab.count), out, mem_type);
    }
    let size = element_size(file, ncid, mem_type)?;
    check_buffer(out.len(), slab.byte_len(size)?, "read")?;
    for_each_run(slab, |start, count, offset| {
        let bytes = count.iter().product::<usize>() * size;
        let dst = &mut out[offset * size..offset * size + bytes];
        contig(file, ncid, varid, &Slab::contiguous(start, count), dst, mem_type)
    })
}

/// Strided write built from a contiguous write primitive.
pub fn strided_write(
    contig: PutSlabFn,
    file: &mut OpenFile,
    ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    data: &[u8],
    mem_type: NcType,
) -> NcResult<()> {
    slab.validate()?;
    if slab.is_unit_stride() {
        return contig(file, ncid, varid, &Slab::contiguous(slab.start, slab.count), data, mem_type);
    }
    let size = element_size(file, ncid, mem_type)?;
    check_buffer(data.len(), slab.byte_len(size)?, "write")?;
    for_each_run(slab, |start, count, offset| {
        let bytes = count.iter().product::<usize>() * size;
        let src = &data[offset * size..offset * size + bytes];
        contig(file, ncid, varid, &Slab::contiguous(start, count), src, mem_type)
    })
}

/// Element offsets (in units of elements) of every selected value in a
/// caller buffer laid out by `imap`, in row-major selection order.
fn mapped_offsets(count: &[usize], imap: &[isize]) -> NcResult<Vec<usize>> {
    if let Some(bad) = imap.iter().find(|m| **m < 0) {
        return Err(NcError::Range(format!("imap entry {bad} must not be negative")));
    }
    let total: usize = count.iter().product();
    let mut offsets = Vec::with_capacity(total);
    if total == 0 {
        return Ok(offsets);
    }
    let rank = count.len();
    let mut idx = vec![0usize; rank];
    loop {
        let offset = idx
            .iter()
            .zip(imap)
            .try_fold(0usize, |acc, (i, m)| acc.checked_add(i.checked_mul(*m as usize)?))
            .ok_or_else(|| NcError::Range("imap offset overflows".into()))?;
        offsets.push(offset);
        let mut d = rank;
        loop {
            if d == 0 {
                return Ok(offsets);
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < count[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}

/// Bytes a mapped caller buffer must hold to reach every offset.
fn mapped_extent(offsets: &[usize], size: usize) -> NcResult<usize> {
    offsets
        .iter()
        .max()
        .map_or(Some(0), |m| m.checked_add(1)?.checked_mul(size))
        .ok_or_else(|| NcError::Range("imap extent overflows".into()))
}

/// Mapped read built from a strided read primitive.
pub fn mapped_read(
    strided: GetSlabFn,
    file: &mut OpenFile,
    ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    out: &mut [u8],
    mem_type: NcType,
) -> NcResult<()> {
    slab.validate()?;
    let unmapped = Slab {
        imap: None,
        ..*slab
    };
    let Some(imap) = slab.imap else {
        return strided(file, ncid, varid, &unmapped, out, mem_type);
    };
    let size = element_size(file, ncid, mem_type)?;
    let offsets = mapped_offsets(slab.count, imap)?;
    let needed = mapped_extent(&offsets, size)?;
    check_buffer(out.len(), needed, "read")?;

    let mut packed = vec![0u8; offsets.len() * size];
    strided(file, ncid, varid, &unmapped, &mut packed, mem_type)?;
    for (i, off) in offsets.iter().enumerate() {
        out[off * size..(off + 1) * size].copy_from_slice(&packed[i * size..(i + 1) * size]);
    }
    Ok(())
}

/// Mapped write built from a strided write primitive.
pub fn mapped_write(
    strided: PutSlabFn,
    file: &mut OpenFile,
    ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    data: &[u8],
    mem_type: NcType,
) -> NcResult<()> {
    slab.validate()?;
    let unmapped = Slab {
        imap: None,
        ..*slab
    };
    let Some(imap) = slab.imap else {
        return strided(file, ncid, varid, &unmapped, data, mem_type);
    };
    let size = element_size(file, ncid, mem_type)?;
    let offsets = mapped_offsets(slab.count, imap)?;
    let needed = mapped_extent(&offsets, size)?;
    check_buffer(data.len(), needed, "write")?;

    let mut packed = Vec::with_capacity(offsets.len() * size);
    for off in &offsets {
        packed.extend_from_slice(&data[off * size..(off + 1) * size]);
    }
    strided(file, ncid, varid, &unmapped, &packed, mem_type)
}

pub fn default_get_vars(
    file: &mut OpenFile,
    ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    out: &mut [u8],
    mem_type: NcType,
) -> NcResult<()> {
    let contig = file.table().get_vara.ok_or_else(|| NcError::unsupported("get_vara"))?;
    strided_read(contig, file, ncid, varid, slab, out, mem_type)
}

pub fn default_put_vars(
    file: &mut OpenFile,
    ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    data: &[u8],
    mem_type: NcType,
) -> NcResult<()> {
    let contig = file.table().put_vara.ok_or_else(|| NcError::unsupported("put_vara"))?;
    strided_write(contig, file, ncid, varid, slab, data, mem_type)
}

pub fn default_get_varm(
    file: &mut OpenFile,
    ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    out: &mut [u8],
    mem_type: NcType,
) -> NcResult<()> {
    let strided = file.table().get_vars.unwrap_or(default_get_vars);
    mapped_read(strided, file, ncid, varid, slab, out, mem_type)
}

pub fn default_put_varm(
    file: &mut OpenFile,
    ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    data: &[u8],
    mem_type: NcType,
) -> NcResult<()> {
    let strided = file.table().put_vars.unwrap_or(default_put_vars);
    mapped_write(strided, file, ncid, varid, slab, data, mem_type)
}

/// Base for classic-model formats: every optional slot wired to a shared stub
/// or generic default. Backends fill in the core and inherit the rest.
pub const FLAT: DispatchTable = DispatchTable {
    version: NEP_DISPATCH_VERSION,
    sync: Some(noop_sync),
    inq_type: Some(default_inq_type),
    get_vars: Some(default_get_vars),
    put_vars: Some(default_put_vars),
    get_varm: Some(default_get_varm),
    put_varm: Some(default_put_varm),
    var_par_access: Some(notnc4_var_par_access),
    show_metadata: Some(noop_show_metadata),
    inq_unlimdims: Some(default_inq_unlimdims),
    inq_ncid: Some(root_inq_ncid),
    inq_grps: Some(root_inq_grps),
    inq_grpname: Some(root_inq_grpname),
    inq_grpname_full: Some(root_inq_grpname),
    inq_grp_parent: Some(root_inq_grp_parent),
    inq_grp_full_ncid: Some(root_inq_grp_full_ncid),
    inq_varids: Some(default_inq_varids),
    inq_dimids: Some(default_inq_dimids),
    inq_typeids: Some(root_inq_typeids),
    inq_type_equal: Some(root_inq_type_equal),
    def_grp: Some(notnc4_def_grp),
    rename_grp: Some(notnc4_rename_grp),
    inq_user_type: Some(notnc4_inq_user_type),
    inq_typeid: Some(default_inq_typeid),
    def_compound: Some(notnc4_def_compound),
    insert_compound: Some(notnc4_insert_compound),
    insert_array_compound: Some(notnc4_insert_array_compound),
    inq_compound_field: Some(notnc4_inq_compound_field),
    inq_compound_fieldindex: Some(notnc4_inq_compound_fieldindex),
    def_vlen: Some(notnc4_def_vlen),
    put_vlen_element: Some(notnc4_put_vlen_element),
    get_vlen_element: Some(notnc4_get_vlen_element),
    def_enum: Some(notnc4_def_enum),
    insert_enum: Some(notnc4_insert_enum),
    inq_enum_member: Some(notnc4_inq_enum_member),
    inq_enum_ident: Some(notnc4_inq_enum_ident),
    def_opaque: Some(notnc4_def_opaque),
    def_var_deflate: Some(notnc4_def_var_deflate),
    def_var_fletcher32: Some(notnc4_def_var_fletcher32),
    def_var_chunking: Some(notnc4_def_var_chunking),
    def_var_endian: Some(notnc4_def_var_endian),
    def_var_filter: Some(notnc4_def_var_filter),
    set_var_chunk_cache: Some(notnc4_set_var_chunk_cache),
    get_var_chunk_cache: Some(notnc4_get_var_chunk_cache),
    inq_var_filter_ids: Some(noop_inq_var_filter_ids),
    inq_var_filter_info: Some(noop_inq_var_filter_info),
    def_var_quantize: Some(notnc4_def_var_quantize),
    inq_var_quantize: Some(notnc4_inq_var_quantize),
    inq_filter_avail: Some(noop_inq_filter_avail),
    ..DispatchTable::EMPTY
};

/// [`FLAT`] with every mutating slot rejecting with `PermissionDenied`.
pub const READ_ONLY: DispatchTable = DispatchTable {
    create: Some(ro_create),
    redef: Some(ro_redef),
    enddef: Some(ro_enddef),
    set_fill: Some(ro_set_fill),
    def_dim: Some(ro_def_dim),
    rename_dim: Some(ro_rename_dim),
    rename_att: Some(ro_rename_att),
    del_att: Some(ro_del_att),
    put_att: Some(ro_put_att),
    def_var: Some(ro_def_var),
    rename_var: Some(ro_rename_var),
    put_vara: Some(ro_put_vara),
    put_vars: Some(ro_put_vars),
    put_varm: Some(ro_put_varm),
    def_var_fill: Some(ro_def_var_fill),
    ..FLAT
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Op;
    use crate::types::{BuiltinFormat, Mode, Slot};

    // 4x4 grid of u16 values 0..16, read-only contiguous access.
    fn grid_get_vara(
        _file: &mut OpenFile,
        _ncid: Ncid,
        _varid: i32,
        slab: &Slab<'_>,
        out: &mut [u8],
        _mem: NcType,
    ) -> NcResult<()> {
        let rows = slab.start[0]..slab.start[0].saturating_add(slab.count[0]);
        let cols = slab.start[1]..slab.start[1].saturating_add(slab.count[1]);
        if rows.end > 4 || cols.end > 4 {
            return Err(NcError::Range(format!("{rows:?} x {cols:?}")));
        }
        let mut o = 0;
        for r in rows {
            for c in cols.clone() {
                let v = (r * 4 + c) as u16;
                out[o..o + 2].copy_from_slice(&v.to_le_bytes());
                o += 2;
            }
        }
        Ok(())
    }

    static GRID: DispatchTable = DispatchTable {
        get_vara: Some(grid_get_vara),
        ..READ_ONLY
    };

    fn open_grid() -> OpenFile {
        OpenFile::new(1, Slot::Builtin(BuiltinFormat::Nc3), "grid", Mode::empty(), &GRID)
    }

    fn values(buf: &[u8]) -> Vec<u16> {
        buf.chunks(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect()
    }

    #[test]
    fn unit_stride_matches_contiguous() {
        let mut f = open_grid();
        let ncid = f.ncid();
        let (start, count) = ([0, 0], [4, 4]);

        let mut direct = vec![0u8; 32];
        grid_get_vara(&mut f, ncid, 0, &Slab::contiguous(&start, &count), &mut direct, NcType::USHORT)
            .unwrap();
        let mut strided = vec![0u8; 32];
        default_get_vars(&mut f, ncid, 0, &Slab::strided(&start, &count, &[1, 1]), &mut strided, NcType::USHORT)
            .unwrap();
        assert_eq!(direct, strided);
    }

    #[test]
    fn strided_reads_pick_every_other_cell() {
        let mut f = open_grid();
        let ncid = f.ncid();
        let mut out = vec![0u8; 8];
        default_get_vars(&mut f, ncid, 0, &Slab::strided(&[0, 0], &[2, 2], &[2, 2]), &mut out, NcType::USHORT)
            .unwrap();
        assert_eq!(values(&out), vec![0, 2, 8, 10]);

        let mut rows = vec![0u8; 8];
        default_get_vars(&mut f, ncid, 0, &Slab::strided(&[1, 1], &[2, 2], &[2, 1]), &mut rows, NcType::USHORT)
            .unwrap();
        assert_eq!(values(&rows), vec![5, 6, 13, 14]);
    }

    #[test]
    fn mapped_read_transposes() {
        let mut f = open_grid();
        let ncid = f.ncid();
        let mut out = vec![0u8; 8];
        // imap (1, 2) stores element (i, j) at i + 2j: a transpose.
        let slab = Slab::mapped(&[0, 0], &[2, 2], None, &[1, 2]);
        default_get_varm(&mut f, ncid, 0, &slab, &mut out, NcType::USHORT).unwrap();
        assert_eq!(values(&out), vec![0, 4, 1, 5]);
    }

    #[test]
    fn short_buffers_and_bad_strides_are_rejected() {
        let mut f = open_grid();
        let ncid = f.ncid();
        let mut out = vec![0u8; 4];
        assert!(default_get_vars(&mut f, ncid, 0, &Slab::strided(&[0, 0], &[2, 2], &[2, 2]), &mut out, NcType::USHORT)
            .is_err());
        assert!(matches!(
            default_get_vars(&mut f, ncid, 0, &Slab::strided(&[0, 0], &[1, 1], &[0, 1]), &mut out, NcType::USHORT),
            Err(NcError::Range(_))
        ));
    }

    #[test]
    fn selections_past_the_index_range_fail_cleanly() {
        let mut f = open_grid();
        let ncid = f.ncid();
        let mut out = vec![0u8; 8];
        let err = default_get_vars(
            &mut f,
            ncid,
            0,
            &Slab::strided(&[usize::MAX, 0], &[1, 1], &[2, 1]),
            &mut out,
            NcType::USHORT,
        )
        .unwrap_err();
        assert!(matches!(err, NcError::Range(_)));

        let err = default_get_varm(
            &mut f,
            ncid,
            0,
            &Slab::mapped(&[0, 0], &[2, 2], None, &[1, isize::MAX]),
            &mut out,
            NcType::USHORT,
        )
        .unwrap_err();
        assert!(matches!(err, NcError::Range(_)));

        // Contiguous reads reach the backend, which still bounds-checks.
        let err = grid_get_vara(&mut f, ncid, 0, &Slab::contiguous(&[usize::MAX, 0], &[1, 1]), &mut out, NcType::USHORT)
            .unwrap_err();
        assert!(matches!(err, NcError::Range(_)));
    }

    #[test]
    fn read_only_base_rejects_mutation() {
        let mut f = open_grid();
        let ncid = f.ncid();
        let def_dim = GRID.def_dim.unwrap();
        assert!(matches!(def_dim(&mut f, ncid, "x", Some(3)), Err(NcError::PermissionDenied(_))));
        let def_grp = GRID.def_grp.unwrap();
        assert!(matches!(def_grp(&mut f, ncid, "g"), Err(NcError::Unsupported(_))));
        let avail = GRID.inq_filter_avail.unwrap();
        assert!(matches!(avail(&mut f, ncid, 307), Err(NcError::NoFilter(307))));
    }

    #[test]
    fn flat_base_leaves_core_slots_to_the_backend() {
        for op in [Op::Open, Op::Close, Op::Inq, Op::GetVara, Op::DefDim, Op::PutAtt] {
            assert!(!FLAT.has(op), "{}", op.name());
        }
        assert!(FLAT.has(Op::GetVars));
        assert!(READ_ONLY.has(Op::PutVara));
    }
}
