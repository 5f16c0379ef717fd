//! The function table every backend populates.
//!
//! The slot set is fixed and declared once, in order, through
//! `dispatch_table!`; that single list produces the table struct, the [`Op`]
//! catalogue used for enumeration, and the presence checks. Changing the list
//! (adding, removing, reordering, or re-typing a slot) changes the contract
//! and requires bumping [`NEP_DISPATCH_VERSION`].

use std::fmt;

use crate::error::NcResult;
use crate::ffi::NEP_DISPATCH_VERSION;
use crate::file::OpenFile;
use crate::types::{
    AttInfo, AttValue, ChunkCache, CompoundField, DatasetSummary, DimInfo, EnddefParams,
    Endianness, EnumMember, FileFormat, FillMode, FormatExtended, NcType, Ncid, ParAccess,
    Quantize, Slab, Storage, TypeInfo, UserTypeInfo, VarInfo, VlenElement,
};

/// Contiguous/strided/mapped read primitive.
pub type GetSlabFn =
    fn(&mut OpenFile, Ncid, i32, &Slab<'_>, &mut [u8], NcType) -> NcResult<()>;
/// Contiguous/strided/mapped write primitive.
pub type PutSlabFn = fn(&mut OpenFile, Ncid, i32, &Slab<'_>, &[u8], NcType) -> NcResult<()>;

macro_rules! dispatch_table {
    ($( $(#[$doc:meta])* $field:ident => $variant:ident ($($arg:ty),*) -> $ret:ty; )*) => {
        /// A backend's operation slots plus the ABI version it was built against.
        ///
        /// Every slot receives the session's [`OpenFile`] first. `None` means the
        /// backend does not implement the operation; the engine reports
        /// `Unsupported` for it.
        ///
        /// `version` is the first field of a `repr(C)` struct so it can be read
        /// before the rest of a foreign table is trusted.
        #[derive(Clone, Copy)]
        #[repr(C)]
        pub struct DispatchTable {
            pub version: u32,
            $( $(#[$doc])* pub $field: Option<fn(&mut OpenFile $(, $arg)*) -> NcResult<$ret>>, )*
        }

        /// Enumerable catalogue of the table's slots, in declaration order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Op {
            $( $variant, )*
        }

        impl Op {
            pub const ALL: &'static [Op] = &[ $( Op::$variant, )* ];

            /// Slot name as it appears in the table.
            pub fn name(self) -> &'static str {
                match self {
                    $( Op::$variant => stringify!($field), )*
                }
            }
        }

        impl DispatchTable {
            /// A table at the current version with every slot absent.
            pub const EMPTY: DispatchTable = DispatchTable {
                version: NEP_DISPATCH_VERSION,
                $( $field: None, )*
            };

            /// Whether the slot for `op` is populated.
            pub fn has(&self, op: Op) -> bool {
                match op {
                    $( Op::$variant => self.$field.is_some(), )*
                }
            }
        }
    };
}

dispatch_table! {
    /// Create a new dataset. Receives an optional initial in-memory image.
    create => Create(Option<&[u8]>) -> ();
    /// Open an existing dataset. Receives the in-memory image for `INMEMORY` opens.
    open => Open(Option<&[u8]>) -> ();
    redef => Redef() -> ();
    enddef => Enddef(EnddefParams) -> ();
    sync => Sync() -> ();
    abort => Abort() -> ();
    /// Returns the final image for in-memory datasets.
    close => Close() -> Option<Vec<u8>>;
    /// Returns the previous fill mode.
    set_fill => SetFill(FillMode) -> FillMode;
    inq_format => InqFormat() -> FileFormat;
    inq_format_extended => InqFormatExtended() -> FormatExtended;
    inq => Inq(Ncid) -> DatasetSummary;
    inq_type => InqType(Ncid, NcType) -> TypeInfo;

    /// `None` length defines the unlimited dimension.
    def_dim => DefDim(Ncid, &str, Option<usize>) -> i32;
    inq_dimid => InqDimid(Ncid, &str) -> i32;
    inq_dim => InqDim(Ncid, i32) -> DimInfo;
    inq_unlimdim => InqUnlimdim(Ncid) -> Option<i32>;
    rename_dim => RenameDim(Ncid, i32, &str) -> ();

    inq_att => InqAtt(Ncid, i32, &str) -> AttInfo;
    inq_attid => InqAttid(Ncid, i32, &str) -> i32;
    inq_attname => InqAttname(Ncid, i32, i32) -> String;
    rename_att => RenameAtt(Ncid, i32, &str, &str) -> ();
    del_att => DelAtt(Ncid, i32, &str) -> ();
    get_att => GetAtt(Ncid, i32, &str, &mut [u8], NcType) -> ();
    put_att => PutAtt(Ncid, i32, &str, &AttValue<'_>) -> ();

    def_var => DefVar(Ncid, &str, NcType, &[i32]) -> i32;
    inq_varid => InqVarid(Ncid, &str) -> i32;
    rename_var => RenameVar(Ncid, i32, &str) -> ();
    get_vara => GetVara(Ncid, i32, &Slab<'_>, &mut [u8], NcType) -> ();
    put_vara => PutVara(Ncid, i32, &Slab<'_>, &[u8], NcType) -> ();
    get_vars => GetVars(Ncid, i32, &Slab<'_>, &mut [u8], NcType) -> ();
    put_vars => PutVars(Ncid, i32, &Slab<'_>, &[u8], NcType) -> ();
    get_varm => GetVarm(Ncid, i32, &Slab<'_>, &mut [u8], NcType) -> ();
    put_varm => PutVarm(Ncid, i32, &Slab<'_>, &[u8], NcType) -> ();
    inq_var_all => InqVarAll(Ncid, i32) -> VarInfo;
    var_par_access => VarParAccess(Ncid, i32, ParAccess) -> ();
    def_var_fill => DefVarFill(Ncid, i32, bool, Option<&[u8]>) -> ();

    show_metadata => ShowMetadata(Ncid) -> ();
    inq_unlimdims => InqUnlimdims(Ncid) -> Vec<i32>;

    inq_ncid => InqNcid(Ncid, &str) -> Ncid;
    inq_grps => InqGrps(Ncid) -> Vec<Ncid>;
    inq_grpname => InqGrpname(Ncid) -> String;
    inq_grpname_full => InqGrpnameFull(Ncid) -> String;
    inq_grp_parent => InqGrpParent(Ncid) -> Ncid;
    inq_grp_full_ncid => InqGrpFullNcid(Ncid, &str) -> Ncid;
    inq_varids => InqVarids(Ncid) -> Vec<i32>;
    /// The flag asks for dimensions visible from parent groups too.
    inq_dimids => InqDimids(Ncid, bool) -> Vec<i32>;
    inq_typeids => InqTypeids(Ncid) -> Vec<NcType>;
    inq_type_equal => InqTypeEqual(Ncid, NcType, Ncid, NcType) -> bool;
    def_grp => DefGrp(Ncid, &str) -> Ncid;
    rename_grp => RenameGrp(Ncid, &str) -> ();
    inq_user_type => InqUserType(Ncid, NcType) -> UserTypeInfo;
    inq_typeid => InqTypeid(Ncid, &str) -> NcType;

    def_compound => DefCompound(Ncid, usize, &str) -> NcType;
    insert_compound => InsertCompound(Ncid, NcType, &str, usize, NcType) -> ();
    insert_array_compound => InsertArrayCompound(Ncid, NcType, &str, usize, NcType, &[usize]) -> ();
    inq_compound_field => InqCompoundField(Ncid, NcType, i32) -> CompoundField;
    inq_compound_fieldindex => InqCompoundFieldindex(Ncid, NcType, &str) -> i32;
    def_vlen => DefVlen(Ncid, &str, NcType) -> NcType;
    put_vlen_element => PutVlenElement(Ncid, NcType, &mut VlenElement, usize, &[u8]) -> ();
    get_vlen_element => GetVlenElement(Ncid, NcType, &VlenElement) -> Vec<u8>;
    def_enum => DefEnum(Ncid, NcType, &str) -> NcType;
    insert_enum => InsertEnum(Ncid, NcType, &str, i64) -> ();
    inq_enum_member => InqEnumMember(Ncid, NcType, i32) -> EnumMember;
    inq_enum_ident => InqEnumIdent(Ncid, NcType, i64) -> String;
    def_opaque => DefOpaque(Ncid, usize, &str) -> NcType;

    def_var_deflate => DefVarDeflate(Ncid, i32, bool, Option<u32>) -> ();
    def_var_fletcher32 => DefVarFletcher32(Ncid, i32, bool) -> ();
    def_var_chunking => DefVarChunking(Ncid, i32, &Storage) -> ();
    def_var_endian => DefVarEndian(Ncid, i32, Endianness) -> ();
    def_var_filter => DefVarFilter(Ncid, i32, u32, &[u32]) -> ();
    set_var_chunk_cache => SetVarChunkCache(Ncid, i32, ChunkCache) -> ();
    get_var_chunk_cache => GetVarChunkCache(Ncid, i32) -> ChunkCache;
    inq_var_filter_ids => InqVarFilterIds(Ncid, i32) -> Vec<u32>;
    inq_var_filter_info => InqVarFilterInfo(Ncid, i32, u32) -> Vec<u32>;
    def_var_quantize => DefVarQuantize(Ncid, i32, Quantize) -> ();
    inq_var_quantize => InqVarQuantize(Ncid, i32) -> Quantize;
    inq_filter_avail => InqFilterAvail(Ncid, u32) -> ();
}

impl DispatchTable {
    /// Populated slots, in declaration order.
    pub fn populated(&self) -> impl Iterator<Item = Op> + '_ {
        Op::ALL.iter().copied().filter(|op| self.has(*op))
    }

    /// Whether the table was built against the engine's dispatch version.
    pub fn is_current(&self) -> bool {
        self.version == NEP_DISPATCH_VERSION
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.populated().map(Op::name).collect();
        f.debug_struct("DispatchTable")
            .field("version", &self.version)
            .field("populated", &names)
            .finish()
    }
}
