//! In-memory test backend.
//!
//! `open` yields a fixed 4x4 `ushort` grid named "grid" (values 0..16,
//! row-major); `create` yields an empty writable dataset. `close` on an
//! `INMEMORY` session returns `MAGIC` followed by the grid bytes.

#![allow(dead_code)]

use nep_abi::stubs;
use nep_abi::{
    AttInfo, AttValue, DatasetSummary, DimInfo, DispatchTable, EnddefParams, FileFormat,
    FormatExtended, Mode, NcError, NcResult, NcType, Ncid, OpenFile, Slab, Slot, VarInfo,
    NC_GLOBAL,
};

pub const MAGIC: &[u8] = b"NEPM";

#[derive(Debug, Default)]
pub struct MemVar {
    pub name: String,
    pub xtype: NcType,
    pub dimids: Vec<i32>,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MemDataset {
    pub dims: Vec<(String, usize)>,
    pub vars: Vec<MemVar>,
    pub atts: Vec<(String, NcType, usize, Vec<u8>)>,
    pub define_mode: bool,
}

impl MemDataset {
    fn grid() -> Self {
        let data = (0u16..16).flat_map(|v| v.to_le_bytes()).collect();
        Self {
            dims: vec![("y".into(), 4), ("x".into(), 4)],
            vars: vec![MemVar {
                name: "grid".into(),
                xtype: NcType::USHORT,
                dimids: vec![0, 1],
                data,
            }],
            atts: Vec::new(),
            define_mode: false,
        }
    }

    fn var(&self, varid: i32) -> NcResult<&MemVar> {
        self.vars
            .get(varid as usize)
            .ok_or_else(|| NcError::NotFound(format!("varid {varid}")))
    }

    fn shape(&self, var: &MemVar) -> Vec<usize> {
        var.dimids.iter().map(|d| self.dims[*d as usize].1).collect()
    }
}

/// Byte offsets in a row-major variable for every element of a contiguous slab.
fn slab_offsets(shape: &[usize], slab: &Slab<'_>, size: usize) -> NcResult<Vec<usize>> {
    slab.validate()?;
    for d in 0..shape.len() {
        if slab.end(d).map_or(true, |end| end > shape[d]) {
            return Err(NcError::Range(format!("dimension {d} exceeds {}", shape[d])));
        }
    }
    let mut out = Vec::with_capacity(slab.elements());
    if slab.elements() == 0 {
        return Ok(out);
    }
    let mut idx = vec![0usize; shape.len()];
    loop {
        let mut linear = 0;
        for d in 0..shape.len() {
            linear = linear * shape[d] + slab.start[d] + idx[d];
        }
        out.push(linear * size);
        let mut d = shape.len();
        loop {
            if d == 0 {
                return Ok(out);
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < slab.count[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}

fn mem_create(file: &mut OpenFile, _initial: Option<&[u8]>) -> NcResult<()> {
    file.set_state(MemDataset {
        define_mode: true,
        ..MemDataset::default()
    });
    Ok(())
}

fn mem_open(file: &mut OpenFile, memory: Option<&[u8]>) -> NcResult<()> {
    if let Some(image) = memory {
        if !image.starts_with(MAGIC) {
            return Err(NcError::DetectionFailed("not a memory dataset".into()));
        }
    }
    file.set_state(MemDataset::grid());
    Ok(())
}

fn mem_close(file: &mut OpenFile) -> NcResult<Option<Vec<u8>>> {
    let ds = file.state::<MemDataset>()?;
    if !file.mode().contains(Mode::INMEMORY) {
        return Ok(None);
    }
    let mut image = MAGIC.to_vec();
    for v in &ds.vars {
        image.extend_from_slice(&v.data);
    }
    Ok(Some(image))
}

fn mem_redef(file: &mut OpenFile) -> NcResult<()> {
    file.require_writable("redef")?;
    let ds = file.state_mut::<MemDataset>()?;
    if ds.define_mode {
        return Err(NcError::InvalidArgument("already in define mode".into()));
    }
    ds.define_mode = true;
    Ok(())
}

fn mem_enddef(file: &mut OpenFile, _params: EnddefParams) -> NcResult<()> {
    let ds = file.state_mut::<MemDataset>()?;
    if !ds.define_mode {
        return Err(NcError::InvalidArgument("not in define mode".into()));
    }
    ds.define_mode = false;
    let shapes: Vec<usize> = ds
        .vars
        .iter()
        .map(|v| {
            let n: usize = v.dimids.iter().map(|d| ds.dims[*d as usize].1).product();
            n * v.xtype.atomic_size().unwrap_or(1)
        })
        .collect();
    for (v, len) in ds.vars.iter_mut().zip(shapes) {
        v.data.resize(len, 0);
    }
    Ok(())
}

fn mem_inq_format(file: &mut OpenFile) -> NcResult<FileFormat> {
    Ok(match file.slot() {
        Slot::User(u) => FileFormat::User(u),
        Slot::Builtin(_) => FileFormat::Classic,
    })
}

fn mem_inq_format_extended(file: &mut OpenFile) -> NcResult<FormatExtended> {
    Ok(FormatExtended {
        formatx: file.slot().routing_value(),
        mode: file.mode(),
    })
}

fn mem_inq(file: &mut OpenFile, _ncid: Ncid) -> NcResult<DatasetSummary> {
    let ds = file.state::<MemDataset>()?;
    Ok(DatasetSummary {
        ndims: ds.dims.len(),
        nvars: ds.vars.len(),
        natts: ds.atts.len(),
        unlimdimid: None,
    })
}

fn mem_def_dim(file: &mut OpenFile, _ncid: Ncid, name: &str, len: Option<usize>) -> NcResult<i32> {
    let ds = file.state_mut::<MemDataset>()?;
    if !ds.define_mode {
        return Err(NcError::InvalidArgument("not in define mode".into()));
    }
    let len = len.ok_or_else(|| NcError::unsupported("unlimited dimensions"))?;
    ds.dims.push((name.to_string(), len));
    Ok(ds.dims.len() as i32 - 1)
}

fn mem_inq_dimid(file: &mut OpenFile, _ncid: Ncid, name: &str) -> NcResult<i32> {
    let ds = file.state::<MemDataset>()?;
    ds.dims
        .iter()
        .position(|(n, _)| n == name)
        .map(|i| i as i32)
        .ok_or_else(|| NcError::NotFound(format!("dimension {name}")))
}

fn mem_inq_dim(file: &mut OpenFile, _ncid: Ncid, dimid: i32) -> NcResult<DimInfo> {
    let ds = file.state::<MemDataset>()?;
    let (name, len) = ds
        .dims
        .get(dimid as usize)
        .ok_or_else(|| NcError::NotFound(format!("dimid {dimid}")))?;
    Ok(DimInfo {
        name: name.clone(),
        len: *len,
        unlimited: false,
    })
}

fn mem_inq_unlimdim(_file: &mut OpenFile, _ncid: Ncid) -> NcResult<Option<i32>> {
    Ok(None)
}

fn mem_def_var(
    file: &mut OpenFile,
    _ncid: Ncid,
    name: &str,
    xtype: NcType,
    dimids: &[i32],
) -> NcResult<i32> {
    let ds = file.state_mut::<MemDataset>()?;
    if !ds.define_mode {
        return Err(NcError::InvalidArgument("not in define mode".into()));
    }
    if let Some(bad) = dimids.iter().find(|d| **d < 0 || **d as usize >= ds.dims.len()) {
        return Err(NcError::NotFound(format!("dimid {bad}")));
    }
    ds.vars.push(MemVar {
        name: name.to_string(),
        xtype,
        dimids: dimids.to_vec(),
        data: Vec::new(),
    });
    Ok(ds.vars.len() as i32 - 1)
}

fn mem_inq_varid(file: &mut OpenFile, _ncid: Ncid, name: &str) -> NcResult<i32> {
    let ds = file.state::<MemDataset>()?;
    ds.vars
        .iter()
        .position(|v| v.name == name)
        .map(|i| i as i32)
        .ok_or_else(|| NcError::NotFound(format!("variable {name}")))
}

fn mem_inq_var_all(file: &mut OpenFile, _ncid: Ncid, varid: i32) -> NcResult<VarInfo> {
    let ds = file.state::<MemDataset>()?;
    let v = ds.var(varid)?;
    Ok(VarInfo {
        name: v.name.clone(),
        xtype: v.xtype,
        dimids: v.dimids.clone(),
        ..VarInfo::default()
    })
}

pub fn mem_get_vara(
    file: &mut OpenFile,
    _ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    out: &mut [u8],
    mem_type: NcType,
) -> NcResult<()> {
    let ds = file.state::<MemDataset>()?;
    let v = ds.var(varid)?;
    if mem_type != v.xtype {
        return Err(NcError::unsupported("type conversion"));
    }
    let size = v.xtype.atomic_size().unwrap_or(1);
    let offsets = slab_offsets(&ds.shape(v), slab, size)?;
    if out.len() < offsets.len() * size {
        return Err(NcError::InvalidArgument("output buffer too small".into()));
    }
    for (i, off) in offsets.iter().enumerate() {
        out[i * size..(i + 1) * size].copy_from_slice(&v.data[*off..off + size]);
    }
    Ok(())
}

fn mem_put_vara(
    file: &mut OpenFile,
    _ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    data: &[u8],
    mem_type: NcType,
) -> NcResult<()> {
    file.require_writable("put_vara")?;
    let ds = file.state_mut::<MemDataset>()?;
    if ds.define_mode {
        return Err(NcError::InvalidArgument("in define mode".into()));
    }
    let shape = ds.shape(ds.var(varid)?);
    let v = &mut ds.vars[varid as usize];
    if mem_type != v.xtype {
        return Err(NcError::unsupported("type conversion"));
    }
    let size = v.xtype.atomic_size().unwrap_or(1);
    let offsets = slab_offsets(&shape, slab, size)?;
    if data.len() < offsets.len() * size {
        return Err(NcError::InvalidArgument("input buffer too small".into()));
    }
    for (i, off) in offsets.iter().enumerate() {
        v.data[*off..off + size].copy_from_slice(&data[i * size..(i + 1) * size]);
    }
    Ok(())
}

fn mem_put_att(file: &mut OpenFile, _ncid: Ncid, varid: i32, name: &str, value: &AttValue<'_>) -> NcResult<()> {
    if varid != NC_GLOBAL {
        return Err(NcError::unsupported("variable attributes"));
    }
    let ds = file.state_mut::<MemDataset>()?;
    ds.atts.retain(|(n, ..)| n != name);
    ds.atts
        .push((name.to_string(), value.file_type, value.len, value.data.to_vec()));
    Ok(())
}

fn mem_inq_att(file: &mut OpenFile, _ncid: Ncid, _varid: i32, name: &str) -> NcResult<AttInfo> {
    let ds = file.state::<MemDataset>()?;
    ds.atts
        .iter()
        .find(|(n, ..)| n == name)
        .map(|(_, xtype, len, _)| AttInfo { xtype: *xtype, len: *len })
        .ok_or_else(|| NcError::NotFound(format!("attribute {name}")))
}

fn mem_get_att(
    file: &mut OpenFile,
    _ncid: Ncid,
    _varid: i32,
    name: &str,
    out: &mut [u8],
    _mem_type: NcType,
) -> NcResult<()> {
    let ds = file.state::<MemDataset>()?;
    let (.., data) = ds
        .atts
        .iter()
        .find(|(n, ..)| n == name)
        .ok_or_else(|| NcError::NotFound(format!("attribute {name}")))?;
    out[..data.len()].copy_from_slice(data);
    Ok(())
}

/// Full read/write backend on top of the classic-model base.
pub const MEM: DispatchTable = DispatchTable {
    create: Some(mem_create),
    open: Some(mem_open),
    redef: Some(mem_redef),
    enddef: Some(mem_enddef),
    close: Some(mem_close),
    inq_format: Some(mem_inq_format),
    inq_format_extended: Some(mem_inq_format_extended),
    inq: Some(mem_inq),
    def_dim: Some(mem_def_dim),
    inq_dimid: Some(mem_inq_dimid),
    inq_dim: Some(mem_inq_dim),
    inq_unlimdim: Some(mem_inq_unlimdim),
    inq_att: Some(mem_inq_att),
    get_att: Some(mem_get_att),
    put_att: Some(mem_put_att),
    def_var: Some(mem_def_var),
    inq_varid: Some(mem_inq_varid),
    inq_var_all: Some(mem_inq_var_all),
    get_vara: Some(mem_get_vara),
    put_vara: Some(mem_put_vara),
    ..stubs::FLAT
};

pub static MEM_TABLE: DispatchTable = MEM;
pub static MEM_A: DispatchTable = MEM;
pub static MEM_B: DispatchTable = MEM;

/// Read-only variant: same reads, every mutation rejected.
pub static MEM_RO: DispatchTable = DispatchTable {
    open: Some(mem_open),
    close: Some(mem_close),
    inq_format: Some(mem_inq_format),
    inq: Some(mem_inq),
    inq_dimid: Some(mem_inq_dimid),
    inq_dim: Some(mem_inq_dim),
    inq_unlimdim: Some(mem_inq_unlimdim),
    inq_varid: Some(mem_inq_varid),
    inq_var_all: Some(mem_inq_var_all),
    get_vara: Some(mem_get_vara),
    ..stubs::READ_ONLY
};

/// Only `open`, `close`, and contiguous reads; strided/mapped slots wired to
/// the shared defaults, nothing else.
pub static CONTIG_ONLY: DispatchTable = DispatchTable {
    open: Some(mem_open),
    close: Some(mem_close),
    get_vara: Some(mem_get_vara),
    get_vars: Some(stubs::default_get_vars),
    get_varm: Some(stubs::default_get_varm),
    ..DispatchTable::EMPTY
};

fn failing_open(_file: &mut OpenFile, _memory: Option<&[u8]>) -> NcResult<()> {
    Err(NcError::Backend {
        code: -999,
        message: "corrupt header".into(),
    })
}

/// `open` always fails.
pub static BROKEN: DispatchTable = DispatchTable {
    open: Some(failing_open),
    ..DispatchTable::EMPTY
};

/// A table built against an older dispatch version.
pub static STALE: DispatchTable = DispatchTable {
    version: 999,
    ..MEM
};

pub fn tmp_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path.to_string_lossy().into_owned()
}

pub fn u16s(buf: &[u8]) -> Vec<u16> {
    buf.chunks(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect()
}
