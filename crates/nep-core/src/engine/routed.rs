//! One `Engine` method per dispatch slot. Each looks up the session owning the
//! ncid and calls through its bound table; an absent slot is `Unsupported`.

use nep_abi::{
    AttInfo, AttValue, ChunkCache, CompoundField, DatasetSummary, DimInfo, EnddefParams,
    Endianness, EnumMember, FileFormat, FillMode, FormatExtended, NcError, NcResult, NcType, Ncid,
    OpenFile, ParAccess, Quantize, Slab, Storage, TypeInfo, UserTypeInfo, VarInfo, VlenElement,
};

use super::Engine;

fn absent(file: &OpenFile, op: &str) -> NcError {
    NcError::unsupported(format!("{op} is not implemented by the {} backend", file.slot()))
}

macro_rules! routed {
    (
        file { $( $(#[$fdoc:meta])* $fname:ident ( $($farg:ident : $fty:ty),* ) -> $fret:ty; )* }
        group { $( $(#[$gdoc:meta])* $gname:ident ( $($garg:ident : $gty:ty),* ) -> $gret:ty; )* }
    ) => {
        impl Engine {
            $(
                $(#[$fdoc])*
                pub fn $fname(&self, ncid: Ncid $(, $farg: $fty)*) -> NcResult<$fret> {
                    self.with_session(ncid, |file| {
                        let slot = file.table().$fname.ok_or_else(|| absent(file, stringify!($fname)))?;
                        slot(file $(, $farg)*)
                    })
                }
            )*
            $(
                $(#[$gdoc])*
                pub fn $gname(&self, ncid: Ncid $(, $garg: $gty)*) -> NcResult<$gret> {
                    self.with_session(ncid, |file| {
                        let slot = file.table().$gname.ok_or_else(|| absent(file, stringify!($gname)))?;
                        slot(file, ncid $(, $garg)*)
                    })
                }
            )*
        }
    };
}

routed! {
    file {
    /// Enter define mode.
    redef() -> ();
    /// Leave define mode.
    enddef(params: EnddefParams) -> ();
    sync() -> ();
    /// Returns the previous fill mode.
    set_fill(fill: FillMode) -> FillMode;
    inq_format() -> FileFormat;
    inq_format_extended() -> FormatExtended;
    }

    group {
    inq() -> DatasetSummary;
    inq_type(xtype: NcType) -> TypeInfo;

    /// `None` defines the unlimited dimension.
    def_dim(name: &str, len: Option<usize>) -> i32;
    inq_dimid(name: &str) -> i32;
    inq_dim(dimid: i32) -> DimInfo;
    inq_unlimdim() -> Option<i32>;
    rename_dim(dimid: i32, name: &str) -> ();

    inq_att(varid: i32, name: &str) -> AttInfo;
    inq_attid(varid: i32, name: &str) -> i32;
    inq_attname(varid: i32, attnum: i32) -> String;
    rename_att(varid: i32, name: &str, new_name: &str) -> ();
    del_att(varid: i32, name: &str) -> ();
    get_att(varid: i32, name: &str, out: &mut [u8], mem_type: NcType) -> ();
    put_att(varid: i32, name: &str, value: &AttValue<'_>) -> ();

    def_var(name: &str, xtype: NcType, dimids: &[i32]) -> i32;
    inq_varid(name: &str) -> i32;
    rename_var(varid: i32, name: &str) -> ();
    get_vara(varid: i32, slab: &Slab<'_>, out: &mut [u8], mem_type: NcType) -> ();
    put_vara(varid: i32, slab: &Slab<'_>, data: &[u8], mem_type: NcType) -> ();
    get_vars(varid: i32, slab: &Slab<'_>, out: &mut [u8], mem_type: NcType) -> ();
    put_vars(varid: i32, slab: &Slab<'_>, data: &[u8], mem_type: NcType) -> ();
    get_varm(varid: i32, slab: &Slab<'_>, out: &mut [u8], mem_type: NcType) -> ();
    put_varm(varid: i32, slab: &Slab<'_>, data: &[u8], mem_type: NcType) -> ();
    inq_var_all(varid: i32) -> VarInfo;
    var_par_access(varid: i32, access: ParAccess) -> ();
    def_var_fill(varid: i32, no_fill: bool, fill_value: Option<&[u8]>) -> ();

    show_metadata() -> ();
    inq_unlimdims() -> Vec<i32>;

    inq_ncid(name: &str) -> Ncid;
    inq_grps() -> Vec<Ncid>;
    inq_grpname() -> String;
    inq_grpname_full() -> String;
    inq_grp_parent() -> Ncid;
    inq_grp_full_ncid(full_name: &str) -> Ncid;
    inq_varids() -> Vec<i32>;
    inq_dimids(include_parents: bool) -> Vec<i32>;
    inq_typeids() -> Vec<NcType>;
    inq_type_equal(t1: NcType, ncid2: Ncid, t2: NcType) -> bool;
    def_grp(name: &str) -> Ncid;
    rename_grp(name: &str) -> ();
    inq_user_type(xtype: NcType) -> UserTypeInfo;
    inq_typeid(name: &str) -> NcType;

    def_compound(size: usize, name: &str) -> NcType;
    insert_compound(xtype: NcType, name: &str, offset: usize, field_type: NcType) -> ();
    insert_array_compound(xtype: NcType, name: &str, offset: usize, field_type: NcType, dims: &[usize]) -> ();
    inq_compound_field(xtype: NcType, fieldid: i32) -> CompoundField;
    inq_compound_fieldindex(xtype: NcType, name: &str) -> i32;
    def_vlen(name: &str, base_type: NcType) -> NcType;
    put_vlen_element(xtype: NcType, element: &mut VlenElement, len: usize, data: &[u8]) -> ();
    get_vlen_element(xtype: NcType, element: &VlenElement) -> Vec<u8>;
    def_enum(base_type: NcType, name: &str) -> NcType;
    insert_enum(xtype: NcType, name: &str, value: i64) -> ();
    inq_enum_member(xtype: NcType, idx: i32) -> EnumMember;
    inq_enum_ident(xtype: NcType, value: i64) -> String;
    def_opaque(size: usize, name: &str) -> NcType;

    def_var_deflate(varid: i32, shuffle: bool, level: Option<u32>) -> ();
    def_var_fletcher32(varid: i32, enabled: bool) -> ();
    def_var_chunking(varid: i32, storage: &Storage) -> ();
    def_var_endian(varid: i32, endian: Endianness) -> ();
    def_var_filter(varid: i32, id: u32, params: &[u32]) -> ();
    set_var_chunk_cache(varid: i32, cache: ChunkCache) -> ();
    get_var_chunk_cache(varid: i32) -> ChunkCache;
    inq_var_filter_ids(varid: i32) -> Vec<u32>;
    inq_var_filter_info(varid: i32, id: u32) -> Vec<u32>;
    def_var_quantize(varid: i32, quantize: Quantize) -> ();
    inq_var_quantize(varid: i32) -> Quantize;
    inq_filter_avail(id: u32) -> ();
    }
}
