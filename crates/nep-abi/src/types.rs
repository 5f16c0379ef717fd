//! Data model shared by the engine and every backend.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{NcError, NcResult};

/// Variable id used to address global (file-level) attributes.
pub const NC_GLOBAL: i32 = -1;

/// First type id available for user-defined types.
pub const FIRST_USER_TYPE_ID: i32 = 32;

/// Externally visible dataset id: session id in the upper 16 bits, group id in
/// the lower 16 bits (root group = 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ncid(pub i32);

impl Ncid {
    pub const INVALID: Ncid = Ncid(-1);

    /// Largest session id that keeps the ncid positive. Negative values are
    /// status codes to C callers.
    pub const MAX_SESSION: u16 = 0x7FFF;

    const SHIFT: u32 = 16;

    /// Sessions above [`Ncid::MAX_SESSION`] give a negative id; the engine
    /// never allocates them.
    #[inline]
    pub fn new(session: u16, group: u16) -> Self {
        Ncid(((session as i32) << Self::SHIFT) | group as i32)
    }

    #[inline]
    pub fn session(self) -> u16 {
        ((self.0 as u32) >> Self::SHIFT) as u16
    }

    #[inline]
    pub fn group(self) -> u16 {
        (self.0 as u32 & 0xFFFF) as u16
    }

    /// Same session, root group.
    #[inline]
    pub fn root(self) -> Self {
        Ncid::new(self.session(), 0)
    }

    /// Same session, another group.
    #[inline]
    pub fn with_group(self, group: u16) -> Self {
        Ncid::new(self.session(), group)
    }
}

impl fmt::Display for Ncid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ncid {} (session {}, group {})", self.0, self.session(), self.group())
    }
}

/// Type id. Atomic types are 1..=12; ids from [`FIRST_USER_TYPE_ID`] are user-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NcType(pub i32);

impl NcType {
    pub const NAT: NcType = NcType(0);
    pub const BYTE: NcType = NcType(1);
    pub const CHAR: NcType = NcType(2);
    pub const SHORT: NcType = NcType(3);
    pub const INT: NcType = NcType(4);
    pub const FLOAT: NcType = NcType(5);
    pub const DOUBLE: NcType = NcType(6);
    pub const UBYTE: NcType = NcType(7);
    pub const USHORT: NcType = NcType(8);
    pub const UINT: NcType = NcType(9);
    pub const INT64: NcType = NcType(10);
    pub const UINT64: NcType = NcType(11);
    pub const STRING: NcType = NcType(12);

    pub fn is_atomic(self) -> bool {
        (1..=12).contains(&self.0)
    }

    pub fn is_user_defined(self) -> bool {
        self.0 >= FIRST_USER_TYPE_ID
    }

    /// In-memory size of one element for atomic types.
    pub fn atomic_size(self) -> Option<usize> {
        Some(match self {
            NcType::BYTE | NcType::CHAR | NcType::UBYTE => 1,
            NcType::SHORT | NcType::USHORT => 2,
            NcType::INT | NcType::UINT | NcType::FLOAT => 4,
            NcType::DOUBLE | NcType::INT64 | NcType::UINT64 => 8,
            NcType::STRING => std::mem::size_of::<usize>(),
            _ => return None,
        })
    }

    pub fn atomic_name(self) -> Option<&'static str> {
        Some(match self {
            NcType::BYTE => "byte",
            NcType::CHAR => "char",
            NcType::SHORT => "short",
            NcType::INT => "int",
            NcType::FLOAT => "float",
            NcType::DOUBLE => "double",
            NcType::UBYTE => "ubyte",
            NcType::USHORT => "ushort",
            NcType::UINT => "uint",
            NcType::INT64 => "int64",
            NcType::UINT64 => "uint64",
            NcType::STRING => "string",
            _ => return None,
        })
    }
}

bitflags! {
    /// Open/create mode flags.
    ///
    /// The ten user-defined-format bits occupy one contiguous field starting at
    /// bit 16, so `UDFn == UDF0 << n` for every slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Mode: u32 {
        const WRITE         = 0x0000_0001;
        const NOCLOBBER     = 0x0000_0004;
        const DISKLESS      = 0x0000_0008;
        const MMAP          = 0x0000_0010;
        const DATA_64BIT    = 0x0000_0020;
        const CLASSIC_MODEL = 0x0000_0100;
        const OFFSET_64BIT  = 0x0000_0200;
        const SHARE         = 0x0000_0800;
        const NETCDF4       = 0x0000_1000;
        const PERSIST       = 0x0000_4000;
        const INMEMORY      = 0x0000_8000;

        const UDF0 = 0x0001_0000;
        const UDF1 = 0x0002_0000;
        const UDF2 = 0x0004_0000;
        const UDF3 = 0x0008_0000;
        const UDF4 = 0x0010_0000;
        const UDF5 = 0x0020_0000;
        const UDF6 = 0x0040_0000;
        const UDF7 = 0x0080_0000;
        const UDF8 = 0x0100_0000;
        const UDF9 = 0x0200_0000;

        const UDF_MASK = 0x03FF_0000;
    }
}

impl Mode {
    /// User-defined slots named by this mode.
    pub fn udf_slots(self) -> Vec<UdfSlot> {
        UdfSlot::all().filter(|s| self.contains(s.mode_flag())).collect()
    }

    /// Auxiliary capability flags a registration may carry.
    pub fn capabilities(self) -> Mode {
        self & (Mode::NETCDF4 | Mode::CLASSIC_MODEL)
    }
}

/// One of the ten user-defined format slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UdfSlot(u8);

impl UdfSlot {
    pub const COUNT: u8 = 10;

    pub fn new(index: u8) -> Option<Self> {
        (index < Self::COUNT).then_some(UdfSlot(index))
    }

    pub fn all() -> impl Iterator<Item = UdfSlot> {
        (0..Self::COUNT).map(UdfSlot)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn mode_flag(self) -> Mode {
        Mode::from_bits_retain(Mode::UDF0.bits() << self.0)
    }

    /// "UDF0".."UDF9", the name used in configuration keys.
    pub fn name(self) -> String {
        format!("UDF{}", self.0)
    }

    /// Parse "UDF3" (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let prefix = s.get(..3)?;
        if !prefix.eq_ignore_ascii_case("udf") {
            return None;
        }
        let n: u8 = s.get(3..)?.parse().ok()?;
        UdfSlot::new(n)
    }
}

impl fmt::Display for UdfSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UDF{}", self.0)
    }
}

/// Formats compiled into the engine's routing space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinFormat {
    /// Classic binary format (CDF-1/2/5).
    Nc3,
    /// HDF5-backed enhanced format.
    Hdf5,
    PnetCdf,
    Dap2,
    Dap4,
    NcZarr,
}

impl BuiltinFormat {
    pub const ALL: [BuiltinFormat; 6] = [
        BuiltinFormat::Nc3,
        BuiltinFormat::Hdf5,
        BuiltinFormat::PnetCdf,
        BuiltinFormat::Dap2,
        BuiltinFormat::Dap4,
        BuiltinFormat::NcZarr,
    ];

    /// Order in which built-in magic numbers are compared.
    pub const MAGIC_PRIORITY: [BuiltinFormat; 3] =
        [BuiltinFormat::Hdf5, BuiltinFormat::Nc3, BuiltinFormat::PnetCdf];

    pub fn routing_value(self) -> i32 {
        match self {
            BuiltinFormat::Nc3 => 1,
            BuiltinFormat::Hdf5 => 2,
            BuiltinFormat::PnetCdf => 4,
            BuiltinFormat::Dap2 => 5,
            BuiltinFormat::Dap4 => 6,
            BuiltinFormat::NcZarr => 10,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinFormat::Nc3 => "classic",
            BuiltinFormat::Hdf5 => "hdf5",
            BuiltinFormat::PnetCdf => "pnetcdf",
            BuiltinFormat::Dap2 => "dap2",
            BuiltinFormat::Dap4 => "dap4",
            BuiltinFormat::NcZarr => "nczarr",
        }
    }

    /// Magic number the format is normally registered with.
    pub fn default_magic(self) -> Option<&'static [u8]> {
        match self {
            BuiltinFormat::Nc3 => Some(crate::ffi::MAGIC_CLASSIC),
            BuiltinFormat::Hdf5 => Some(crate::ffi::MAGIC_HDF5),
            _ => None,
        }
    }
}

/// Registry routing key: a built-in format or a user-defined slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Builtin(BuiltinFormat),
    User(UdfSlot),
}

impl Slot {
    const USER_BASE: i32 = 11;

    pub fn routing_value(self) -> i32 {
        match self {
            Slot::Builtin(b) => b.routing_value(),
            Slot::User(u) => Self::USER_BASE + u.index() as i32,
        }
    }

    pub fn from_routing_value(v: i32) -> Option<Self> {
        if let Some(b) = BuiltinFormat::ALL.iter().find(|b| b.routing_value() == v) {
            return Some(Slot::Builtin(*b));
        }
        let idx = v.checked_sub(Self::USER_BASE)?;
        u8::try_from(idx).ok().and_then(UdfSlot::new).map(Slot::User)
    }

    /// Decode a registration mode: exactly one UDF bit, optionally combined
    /// with capability flags. Anything else is rejected.
    pub fn from_registration_mode(mode: Mode) -> NcResult<Slot> {
        let slots = mode.udf_slots();
        let [slot] = slots.as_slice() else {
            return Err(NcError::InvalidArgument(format!(
                "registration mode {:#x} must name exactly one user-defined slot",
                mode.bits()
            )));
        };
        let allowed = Mode::UDF_MASK | Mode::NETCDF4 | Mode::CLASSIC_MODEL;
        if !allowed.contains(mode) {
            return Err(NcError::InvalidArgument(format!(
                "registration mode {:#x} carries flags other than capabilities",
                mode.bits()
            )));
        }
        Ok(Slot::User(*slot))
    }

    pub fn name(self) -> String {
        match self {
            Slot::Builtin(b) => b.name().to_string(),
            Slot::User(u) => u.name(),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Format reported by `inq_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    Classic,
    Offset64,
    Netcdf4,
    Netcdf4Classic,
    Data64,
    User(UdfSlot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatExtended {
    /// Routing value of the governing slot.
    pub formatx: i32,
    pub mode: Mode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub ndims: usize,
    pub nvars: usize,
    pub natts: usize,
    pub unlimdimid: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimInfo {
    pub name: String,
    pub len: usize,
    pub unlimited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttInfo {
    pub xtype: NcType,
    pub len: usize,
}

/// Attribute payload for `put_att`: `len` values of `file_type`, supplied in
/// memory as `mem_type`.
#[derive(Debug, Clone, Copy)]
pub struct AttValue<'a> {
    pub file_type: NcType,
    pub len: usize,
    pub data: &'a [u8],
    pub mem_type: NcType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Storage {
    #[default]
    Contiguous,
    Chunked(Vec<usize>),
    Compact,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    #[default]
    Native,
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillMode {
    #[default]
    Fill,
    NoFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParAccess {
    Independent,
    Collective,
}

/// Everything `inq_var_all` reports about a variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarInfo {
    pub name: String,
    pub xtype: NcType,
    pub dimids: Vec<i32>,
    pub natts: usize,
    pub storage: Storage,
    pub shuffle: bool,
    pub deflate_level: Option<u32>,
    pub fletcher32: bool,
    pub endianness: Endianness,
    pub no_fill: bool,
    pub fill_value: Option<Vec<u8>>,
    pub filters: Vec<u32>,
}

/// Alignment hints passed to `enddef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnddefParams {
    pub h_minfree: usize,
    pub v_align: usize,
    pub v_minfree: usize,
    pub r_align: usize,
}

impl Default for EnddefParams {
    fn default() -> Self {
        Self {
            h_minfree: 0,
            v_align: 4,
            v_minfree: 0,
            r_align: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeClass {
    Atomic,
    Compound,
    Vlen,
    Opaque,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTypeInfo {
    pub name: String,
    pub size: usize,
    pub base_type: NcType,
    pub nfields: usize,
    pub class: TypeClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundField {
    pub name: String,
    pub offset: usize,
    pub field_type: NcType,
    pub dims: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

/// One variable-length element as handed between caller and backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VlenElement {
    pub len: usize,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkCache {
    pub size: usize,
    pub nelems: usize,
    pub preemption: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantizeMode {
    #[default]
    None,
    BitGroom,
    GranularBitRound,
    BitRound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantize {
    pub mode: QuantizeMode,
    pub nsd: u32,
}

/// Hyperslab selection. `stride`/`imap` are absent for contiguous access.
#[derive(Debug, Clone, Copy)]
pub struct Slab<'a> {
    pub start: &'a [usize],
    pub count: &'a [usize],
    pub stride: Option<&'a [isize]>,
    pub imap: Option<&'a [isize]>,
}

impl<'a> Slab<'a> {
    pub fn contiguous(start: &'a [usize], count: &'a [usize]) -> Self {
        Self {
            start,
            count,
            stride: None,
            imap: None,
        }
    }

    pub fn strided(start: &'a [usize], count: &'a [usize], stride: &'a [isize]) -> Self {
        Self {
            start,
            count,
            stride: Some(stride),
            imap: None,
        }
    }

    pub fn mapped(
        start: &'a [usize],
        count: &'a [usize],
        stride: Option<&'a [isize]>,
        imap: &'a [isize],
    ) -> Self {
        Self {
            start,
            count,
            stride,
            imap: Some(imap),
        }
    }

    pub fn rank(&self) -> usize {
        self.start.len()
    }

    /// Number of elements selected.
    pub fn elements(&self) -> usize {
        self.count.iter().product()
    }

    /// Bytes needed to hold the selection at `size` bytes per element.
    pub fn byte_len(&self, size: usize) -> NcResult<usize> {
        self.count
            .iter()
            .try_fold(size, |acc, c| acc.checked_mul(*c))
            .ok_or_else(|| NcError::Range("selection size overflows".into()))
    }

    /// One past the last index the selection touches in dimension `d`, or
    /// `None` when that is not representable.
    pub fn end(&self, d: usize) -> Option<usize> {
        let step = self.stride.map_or(1, |s| s[d].unsigned_abs());
        match self.count[d] {
            0 => Some(self.start[d]),
            n => (n - 1).checked_mul(step)?.checked_add(self.start[d])?.checked_add(1),
        }
    }

    /// Check that every per-dimension vector has the same rank, that strides
    /// are positive and that the selected indices and element count fit in
    /// `usize`.
    pub fn validate(&self) -> NcResult<()> {
        let rank = self.rank();
        if self.count.len() != rank {
            return Err(NcError::InvalidArgument(format!(
                "start has rank {rank}, count has rank {}",
                self.count.len()
            )));
        }
        if let Some(stride) = self.stride {
            if stride.len() != rank {
                return Err(NcError::InvalidArgument(format!(
                    "stride has rank {}, expected {rank}",
                    stride.len()
                )));
            }
            if let Some(bad) = stride.iter().find(|s| **s <= 0) {
                return Err(NcError::Range(format!("stride {bad} must be positive")));
            }
        }
        if let Some(imap) = self.imap {
            if imap.len() != rank {
                return Err(NcError::InvalidArgument(format!(
                    "imap has rank {}, expected {rank}",
                    imap.len()
                )));
            }
        }
        for d in 0..rank {
            if self.end(d).is_none() {
                return Err(NcError::Range(format!(
                    "dimension {d}: start {} with count {} runs past the index range",
                    self.start[d], self.count[d]
                )));
            }
        }
        self.byte_len(1).map(|_| ())
    }

    /// True when the stride (if any) is 1 in every dimension.
    pub fn is_unit_stride(&self) -> bool {
        self.stride.map_or(true, |s| s.iter().all(|v| *v == 1))
    }
}
