//! GeoTIFF backend (read-only).
//!
//! The raster appears as one variable `data` over dimensions `x`, `y` and,
//! for multi-sample images, `band`: `data(y, x)` or `data(band, y, x)`. The
//! GeoKey directory is exposed as the global attribute `GeoKeyDirectory`.
//! Only uncompressed striped images can be read; tiled or compressed rasters
//! open fine but reject data reads.

use std::path::Path;

use tracing::debug;

use nep_abi::stubs;
use nep_abi::{
    AttInfo, DatasetSummary, DimInfo, DispatchTable, Endianness, FileFormat, FormatExtended, Mode,
    NcError, NcResult, NcType, Ncid, OpenFile, Slab, Slot, Storage, VarInfo, NC_GLOBAL,
};

use crate::source::Source;
use crate::tiff::{self, tag, ByteOrder, Header, Ifd};

/// Little-endian BigTIFF.
pub const MAGIC_BIGTIFF: &[u8] = b"II+";
/// Little-endian classic TIFF.
pub const MAGIC_CLASSIC: &[u8] = b"II*";

pub const VAR_NAME: &str = "data";
pub const GEOKEY_ATT: &str = "GeoKeyDirectory";

const DIM_X: i32 = 0;
const DIM_Y: i32 = 1;
const DIM_BAND: i32 = 2;

/// Whether `head` starts like a TIFF with its first IFD in range. Reads
/// nothing beyond the header.
pub fn sniff(head: &[u8]) -> Option<Header> {
    tiff::parse_header(head)
}

/// Full GeoTIFF check: a valid TIFF header whose first IFD carries the
/// GeoKey directory tag. Anything that is not a TIFF is `Ok(false)`.
pub fn is_geotiff(path: &Path) -> NcResult<bool> {
    let mut src = Source::File(std::fs::File::open(path)?);
    Ok(geo_ifd(&mut src).is_some())
}

pub fn is_geotiff_bytes(image: &[u8]) -> bool {
    geo_ifd(&mut Source::Memory(image.to_vec())).is_some()
}

fn geo_ifd(src: &mut Source) -> Option<Ifd> {
    let header = sniff(&src.prefix(16).ok()?)?;
    let ifd = Ifd::read(src, header).ok()?;
    ifd.has(tag::GEO_KEY_DIRECTORY).then_some(ifd)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Samples of one pixel are adjacent (PlanarConfiguration 1).
    Chunky,
    /// One plane per band (PlanarConfiguration 2).
    Planar,
}

#[derive(Debug)]
struct Raster {
    src: Source,
    order: ByteOrder,
    width: usize,
    height: usize,
    bands: usize,
    xtype: NcType,
    sample_size: usize,
    layout: Layout,
    compression: u64,
    /// `(TileLength, TileWidth)` of a tiled image.
    tile: Option<(usize, usize)>,
    rows_per_strip: usize,
    strip_offsets: Vec<u64>,
    strip_counts: Vec<u64>,
    geokeys: Vec<u16>,
}

fn sample_type(format: u64, bits: u64) -> NcResult<NcType> {
    Ok(match (format, bits) {
        (1, 8) => NcType::UBYTE,
        (1, 16) => NcType::USHORT,
        (1, 32) => NcType::UINT,
        (1, 64) => NcType::UINT64,
        (2, 8) => NcType::BYTE,
        (2, 16) => NcType::SHORT,
        (2, 32) => NcType::INT,
        (2, 64) => NcType::INT64,
        (3, 32) => NcType::FLOAT,
        (3, 64) => NcType::DOUBLE,
        _ => {
            return Err(NcError::unsupported(format!(
                "{bits}-bit samples with SampleFormat {format}"
            )))
        }
    })
}

fn to_usize(v: u64, what: &str) -> NcResult<usize> {
    usize::try_from(v).map_err(|_| NcError::Range(format!("{what} {v} does not fit in memory")))
}

impl Raster {
    fn load(mut src: Source, path: &str) -> NcResult<Self> {
        let ifd = geo_ifd(&mut src)
            .ok_or_else(|| NcError::DetectionFailed(format!("{path} is not a GeoTIFF file")))?;
        let order = ifd.header.order;

        let width = to_usize(ifd.required(&mut src, tag::IMAGE_WIDTH)?, "width")?;
        let height = to_usize(ifd.required(&mut src, tag::IMAGE_LENGTH)?, "height")?;
        let bands = to_usize(ifd.scalar(&mut src, tag::SAMPLES_PER_PIXEL, 1)?, "band count")?;
        let bits = ifd.scalar(&mut src, tag::BITS_PER_SAMPLE, 1)?;
        let format = ifd.scalar(&mut src, tag::SAMPLE_FORMAT, 1)?;
        let xtype = sample_type(format, bits)?;
        let layout = match ifd.scalar(&mut src, tag::PLANAR_CONFIG, 1)? {
            2 => Layout::Planar,
            _ => Layout::Chunky,
        };
        let rows_per_strip = ifd
            .scalar(&mut src, tag::ROWS_PER_STRIP, u32::MAX as u64)?
            .min(height as u64)
            .max(1);

        let tile = if ifd.has(tag::TILE_WIDTH) {
            let w = to_usize(ifd.required(&mut src, tag::TILE_WIDTH)?, "tile width")?;
            let h = to_usize(ifd.required(&mut src, tag::TILE_LENGTH)?, "tile length")?;
            Some((h.max(1), w.max(1)))
        } else {
            None
        };

        let geokeys = ifd
            .values(&mut src, tag::GEO_KEY_DIRECTORY)?
            .unwrap_or_default()
            .into_iter()
            .map(|v| v as u16)
            .collect();

        Ok(Self {
            order,
            width,
            height,
            bands,
            xtype,
            sample_size: (bits / 8) as usize,
            layout,
            compression: ifd.scalar(&mut src, tag::COMPRESSION, 1)?,
            tile,
            rows_per_strip: rows_per_strip as usize,
            strip_offsets: ifd.values(&mut src, tag::STRIP_OFFSETS)?.unwrap_or_default(),
            strip_counts: ifd.values(&mut src, tag::STRIP_BYTE_COUNTS)?.unwrap_or_default(),
            geokeys,
            src,
        })
    }

    fn ndims(&self) -> usize {
        if self.bands > 1 {
            3
        } else {
            2
        }
    }

    fn dimids(&self) -> Vec<i32> {
        if self.bands > 1 {
            vec![DIM_BAND, DIM_Y, DIM_X]
        } else {
            vec![DIM_Y, DIM_X]
        }
    }

    fn dim(&self, dimid: i32) -> NcResult<DimInfo> {
        let (name, len) = match dimid {
            DIM_X => ("x", self.width),
            DIM_Y => ("y", self.height),
            DIM_BAND if self.bands > 1 => ("band", self.bands),
            _ => return Err(NcError::NotFound(format!("dimension id {dimid}"))),
        };
        Ok(DimInfo {
            name: name.into(),
            len,
            unlimited: false,
        })
    }

    fn check_readable(&self) -> NcResult<()> {
        if self.tile.is_some() {
            return Err(NcError::unsupported("reading tiled GeoTIFF rasters"));
        }
        if self.compression != 1 {
            return Err(NcError::unsupported(format!(
                "reading GeoTIFF compression scheme {}",
                self.compression
            )));
        }
        Ok(())
    }

    /// Read `nx` samples of `band` starting at pixel (`x0`, `y`) into `out`,
    /// converted to native byte order.
    fn read_row(&mut self, band: usize, y: usize, x0: usize, nx: usize, out: &mut [u8]) -> NcResult<()> {
        let size = self.sample_size;
        let strips_per_plane = self.height.div_ceil(self.rows_per_strip);
        let (strip, pixel_stride, first) = match self.layout {
            Layout::Chunky => (y / self.rows_per_strip, self.bands * size, band * size),
            Layout::Planar => (
                band * strips_per_plane + y / self.rows_per_strip,
                size,
                0,
            ),
        };
        let offset = *self
            .strip_offsets
            .get(strip)
            .ok_or_else(|| NcError::Range(format!("strip {strip} is missing")))?;
        let row_bytes = self.width * pixel_stride;
        let within = (y % self.rows_per_strip) * row_bytes + x0 * pixel_stride;
        let span = (nx - 1) * pixel_stride + size;
        if let Some(&count) = self.strip_counts.get(strip) {
            if (within + span) as u64 > count {
                return Err(NcError::Range(format!("strip {strip} is shorter than its rows")));
            }
        }

        let mut raw = vec![0u8; span];
        self.src.read_at(offset + within as u64, &mut raw)?;
        for (i, dst) in out.chunks_exact_mut(size).take(nx).enumerate() {
            let at = i * pixel_stride + first;
            dst.copy_from_slice(&raw[at..at + size]);
            if !self.order.is_native() {
                dst.reverse();
            }
        }
        Ok(())
    }

    fn read_slab(&mut self, slab: &Slab<'_>, out: &mut [u8]) -> NcResult<()> {
        slab.validate()?;
        let shape: Vec<usize> = self
            .dimids()
            .iter()
            .map(|d| self.dim(*d).map(|i| i.len))
            .collect::<NcResult<_>>()?;
        if slab.rank() != shape.len() {
            return Err(NcError::InvalidArgument(format!(
                "{VAR_NAME} has rank {}, selection has rank {}",
                shape.len(),
                slab.rank()
            )));
        }
        for (d, len) in shape.iter().enumerate() {
            if slab.end(d).map_or(true, |end| end > *len) {
                return Err(NcError::Range(format!(
                    "start {} + count {} exceeds dimension length {len}",
                    slab.start[d], slab.count[d]
                )));
            }
        }
        let needed = slab.byte_len(self.sample_size)?;
        if out.len() < needed {
            return Err(NcError::InvalidArgument(format!(
                "read buffer holds {} bytes, selection needs {needed}",
                out.len()
            )));
        }
        if needed == 0 {
            return Ok(());
        }
        self.check_readable()?;

        let (b0, nb) = if shape.len() == 3 {
            (slab.start[0], slab.count[0])
        } else {
            (0, 1)
        };
        let r = shape.len();
        let (y0, ny) = (slab.start[r - 2], slab.count[r - 2]);
        let (x0, nx) = (slab.start[r - 1], slab.count[r - 1]);
        let row_len = nx * self.sample_size;

        for b in 0..nb {
            for y in 0..ny {
                let at = (b * ny + y) * row_len;
                self.read_row(b0 + b, y0 + y, x0, nx, &mut out[at..at + row_len])?;
            }
        }
        Ok(())
    }
}

fn raster(file: &mut OpenFile) -> NcResult<&mut Raster> {
    file.state_mut::<Raster>()
}

fn require_var(varid: i32) -> NcResult<()> {
    if varid == 0 {
        Ok(())
    } else {
        Err(NcError::NotFound(format!("variable id {varid}")))
    }
}

fn geotiff_open(file: &mut OpenFile, memory: Option<&[u8]>) -> NcResult<()> {
    if file.mode().contains(Mode::WRITE) {
        return Err(NcError::PermissionDenied("GeoTIFF files are read-only".into()));
    }
    let src = Source::open(file.path(), memory)?;
    let raster = Raster::load(src, file.path())?;
    debug!(
        path = file.path(),
        width = raster.width,
        height = raster.height,
        bands = raster.bands,
        xtype = raster.xtype.0,
        "opened GeoTIFF"
    );
    file.set_state(raster);
    Ok(())
}

fn geotiff_close(file: &mut OpenFile) -> NcResult<Option<Vec<u8>>> {
    file.take_state();
    Ok(None)
}

fn geotiff_inq_format(file: &mut OpenFile) -> NcResult<FileFormat> {
    match file.slot() {
        Slot::User(u) => Ok(FileFormat::User(u)),
        Slot::Builtin(_) => Ok(FileFormat::Netcdf4),
    }
}

fn geotiff_inq_format_extended(file: &mut OpenFile) -> NcResult<FormatExtended> {
    Ok(FormatExtended {
        formatx: file.slot().routing_value(),
        mode: file.mode(),
    })
}

fn geotiff_inq(file: &mut OpenFile, _ncid: Ncid) -> NcResult<DatasetSummary> {
    let r = raster(file)?;
    Ok(DatasetSummary {
        ndims: r.ndims(),
        nvars: 1,
        natts: usize::from(!r.geokeys.is_empty()),
        unlimdimid: None,
    })
}

fn geotiff_inq_dimid(file: &mut OpenFile, _ncid: Ncid, name: &str) -> NcResult<i32> {
    let r = raster(file)?;
    [DIM_X, DIM_Y, DIM_BAND]
        .into_iter()
        .find(|d| r.dim(*d).is_ok_and(|i| i.name == name))
        .ok_or_else(|| NcError::NotFound(format!("dimension {name}")))
}

fn geotiff_inq_dim(file: &mut OpenFile, _ncid: Ncid, dimid: i32) -> NcResult<DimInfo> {
    raster(file)?.dim(dimid)
}

fn geotiff_inq_unlimdim(_file: &mut OpenFile, _ncid: Ncid) -> NcResult<Option<i32>> {
    Ok(None)
}

fn geotiff_inq_varid(_file: &mut OpenFile, _ncid: Ncid, name: &str) -> NcResult<i32> {
    if name == VAR_NAME {
        Ok(0)
    } else {
        Err(NcError::NotFound(format!("variable {name}")))
    }
}

fn geotiff_inq_var_all(file: &mut OpenFile, _ncid: Ncid, varid: i32) -> NcResult<VarInfo> {
    require_var(varid)?;
    let r = raster(file)?;
    // Strips are chunks a full row wide.
    let (rows, cols) = r.tile.unwrap_or((r.rows_per_strip, r.width));
    let storage = Storage::Chunked(match r.ndims() {
        3 if r.layout == Layout::Planar => vec![1, rows, cols],
        3 => vec![r.bands, rows, cols],
        _ => vec![rows, cols],
    });
    Ok(VarInfo {
        name: VAR_NAME.into(),
        xtype: r.xtype,
        dimids: r.dimids(),
        storage,
        endianness: match r.order {
            ByteOrder::Little => Endianness::Little,
            ByteOrder::Big => Endianness::Big,
        },
        no_fill: true,
        ..VarInfo::default()
    })
}

fn geotiff_get_vara(
    file: &mut OpenFile,
    _ncid: Ncid,
    varid: i32,
    slab: &Slab<'_>,
    out: &mut [u8],
    mem_type: NcType,
) -> NcResult<()> {
    require_var(varid)?;
    let r = raster(file)?;
    if mem_type != r.xtype && mem_type != NcType::NAT {
        return Err(NcError::unsupported(format!(
            "conversion from type {} to {}",
            r.xtype.0, mem_type.0
        )));
    }
    r.read_slab(slab, out)
}

fn geokey_att(r: &Raster, varid: i32, name: &str) -> NcResult<()> {
    if varid == NC_GLOBAL && name == GEOKEY_ATT && !r.geokeys.is_empty() {
        Ok(())
    } else {
        Err(NcError::NotFound(format!("attribute {name}")))
    }
}

fn geotiff_inq_att(file: &mut OpenFile, _ncid: Ncid, varid: i32, name: &str) -> NcResult<AttInfo> {
    let r = raster(file)?;
    geokey_att(r, varid, name)?;
    Ok(AttInfo {
        xtype: NcType::USHORT,
        len: r.geokeys.len(),
    })
}

fn geotiff_inq_attid(file: &mut OpenFile, _ncid: Ncid, varid: i32, name: &str) -> NcResult<i32> {
    geokey_att(raster(file)?, varid, name).map(|_| 0)
}

fn geotiff_inq_attname(file: &mut OpenFile, _ncid: Ncid, varid: i32, attnum: i32) -> NcResult<String> {
    let r = raster(file)?;
    if varid == NC_GLOBAL && attnum == 0 && !r.geokeys.is_empty() {
        Ok(GEOKEY_ATT.into())
    } else {
        Err(NcError::NotFound(format!("attribute number {attnum}")))
    }
}

fn geotiff_get_att(
    file: &mut OpenFile,
    _ncid: Ncid,
    varid: i32,
    name: &str,
    out: &mut [u8],
    mem_type: NcType,
) -> NcResult<()> {
    let r = raster(file)?;
    geokey_att(r, varid, name)?;
    if mem_type != NcType::USHORT && mem_type != NcType::NAT {
        return Err(NcError::unsupported(format!("{GEOKEY_ATT} as type {}", mem_type.0)));
    }
    let needed = r.geokeys.len() * 2;
    if out.len() < needed {
        return Err(NcError::InvalidArgument(format!(
            "attribute buffer holds {} bytes, {GEOKEY_ATT} needs {needed}",
            out.len()
        )));
    }
    for (dst, v) in out.chunks_exact_mut(2).zip(&r.geokeys) {
        dst.copy_from_slice(&v.to_ne_bytes());
    }
    Ok(())
}

/// Table registered at both the BigTIFF and the classic-TIFF slot.
pub static GEOTIFF_TABLE: DispatchTable = DispatchTable {
    open: Some(geotiff_open),
    close: Some(geotiff_close),
    inq_format: Some(geotiff_inq_format),
    inq_format_extended: Some(geotiff_inq_format_extended),
    inq: Some(geotiff_inq),
    inq_dimid: Some(geotiff_inq_dimid),
    inq_dim: Some(geotiff_inq_dim),
    inq_unlimdim: Some(geotiff_inq_unlimdim),
    inq_att: Some(geotiff_inq_att),
    inq_attid: Some(geotiff_inq_attid),
    inq_attname: Some(geotiff_inq_attname),
    get_att: Some(geotiff_get_att),
    inq_varid: Some(geotiff_inq_varid),
    inq_var_all: Some(geotiff_inq_var_all),
    get_vara: Some(geotiff_get_vara),
    ..stubs::READ_ONLY
};
