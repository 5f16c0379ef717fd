mod common;

use common::{build, f32s, ramp, u16s, write_tmp, TiffLayout};

use nep_abi::{FileFormat, Mode, NcError, NcType, Slab, Slot, Storage, UdfSlot, NC_GLOBAL};
use nep_core::{Engine, OpenRequest, Rule};
use nep_formats::geotiff::{is_geotiff, is_geotiff_bytes, GEOKEY_ATT};
use nep_formats::register_all;

fn udf(n: u8) -> UdfSlot {
    UdfSlot::new(n).unwrap()
}

fn engine() -> Engine {
    let mut e = Engine::default();
    register_all(&mut e).unwrap();
    e
}

#[test]
fn detection_needs_the_geokey_directory() {
    let dir = tempfile::tempdir().unwrap();
    let geo = write_tmp(&dir, "geo.tif", &build(&TiffLayout::default(), &ramp));
    let plain = write_tmp(
        &dir,
        "plain.tif",
        &build(
            &TiffLayout {
                geokeys: None,
                ..TiffLayout::default()
            },
            &ramp,
        ),
    );
    let big = build(
        &TiffLayout {
            bigtiff: true,
            ..TiffLayout::default()
        },
        &ramp,
    );

    assert!(is_geotiff(&geo).unwrap());
    assert!(!is_geotiff(&plain).unwrap());
    assert!(is_geotiff_bytes(&big));
    assert!(!is_geotiff_bytes(b"CDF\x01 not a tiff"));
}

#[test]
fn classic_tiff_opens_through_magic() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tmp(&dir, "ramp.tif", &build(&TiffLayout::default(), &ramp));
    let path = path.to_str().unwrap();
    let e = engine();

    let d = e.detect(&OpenRequest::new(path, Mode::empty())).unwrap();
    assert_eq!(d.slot, Slot::User(udf(1)));
    assert_eq!(d.rule, Rule::Magic);

    let ncid = e.open(path, Mode::empty()).unwrap();
    assert_eq!(e.inq_format(ncid).unwrap(), FileFormat::User(udf(1)));
    let s = e.inq(ncid).unwrap();
    assert_eq!((s.ndims, s.nvars, s.natts), (2, 1, 1));
    assert_eq!(e.inq_dim(ncid, 0).unwrap().name, "x");
    assert_eq!(e.inq_dim(ncid, 1).unwrap().len, 3);
    assert!(matches!(e.inq_dim(ncid, 2), Err(NcError::NotFound(_))));
    assert_eq!(e.inq_dimid(ncid, "y").unwrap(), 1);

    let varid = e.inq_varid(ncid, "data").unwrap();
    let info = e.inq_var_all(ncid, varid).unwrap();
    assert_eq!(info.xtype, NcType::USHORT);
    assert_eq!(info.dimids, [1, 0]);

    let mut out = vec![0u8; 3 * 4 * 2];
    e.get_vara(ncid, varid, &Slab::contiguous(&[0, 0], &[3, 4]), &mut out, NcType::USHORT)
        .unwrap();
    assert_eq!(u16s(&out), [0, 1, 2, 3, 100, 101, 102, 103, 200, 201, 202, 203]);

    let mut out = vec![0u8; 2 * 2 * 2];
    e.get_vara(ncid, varid, &Slab::contiguous(&[1, 2], &[2, 2]), &mut out, NcType::USHORT)
        .unwrap();
    assert_eq!(u16s(&out), [102, 103, 202, 203]);

    // Strided reads come from the generic default over get_vara.
    let mut out = vec![0u8; 2 * 2 * 2];
    e.get_vars(
        ncid,
        varid,
        &Slab::strided(&[0, 0], &[2, 2], &[2, 3]),
        &mut out,
        NcType::USHORT,
    )
    .unwrap();
    assert_eq!(u16s(&out), [0, 3, 200, 203]);

    e.close(ncid).unwrap();
}

#[test]
fn reads_are_bounds_and_type_checked() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tmp(&dir, "ramp.tif", &build(&TiffLayout::default(), &ramp));
    let e = engine();
    let ncid = e.open(path.to_str().unwrap(), Mode::empty()).unwrap();

    let mut out = vec![0u8; 64];
    let err = e
        .get_vara(ncid, 0, &Slab::contiguous(&[2, 0], &[2, 4]), &mut out, NcType::USHORT)
        .unwrap_err();
    assert!(matches!(err, NcError::Range(_)));
    let err = e
        .get_vara(ncid, 0, &Slab::contiguous(&[0, 0], &[1, 1]), &mut out, NcType::FLOAT)
        .unwrap_err();
    assert!(matches!(err, NcError::Unsupported(_)));
    let err = e
        .get_vara(ncid, 1, &Slab::contiguous(&[0, 0], &[1, 1]), &mut out, NcType::USHORT)
        .unwrap_err();
    assert!(matches!(err, NcError::NotFound(_)));
}

#[test]
fn selections_past_the_index_range_are_range_errors() {
    let image = build(&TiffLayout::default(), &ramp);
    let e = engine();
    let ncid = e.open_mem("ramp.tif", Mode::empty(), &image).unwrap();

    let mut out = vec![0u8; 64];
    for (start, count) in [([usize::MAX, 0], [1, 1]), ([0, usize::MAX], [1, 1]), ([0, 0], [usize::MAX, 2])] {
        let err = e
            .get_vara(ncid, 0, &Slab::contiguous(&start, &count), &mut out, NcType::USHORT)
            .unwrap_err();
        assert!(matches!(err, NcError::Range(_)), "{start:?} {count:?}: {err}");
    }
    let err = e
        .get_vars(ncid, 0, &Slab::strided(&[usize::MAX, 0], &[1, 1], &[2, 1]), &mut out, NcType::USHORT)
        .unwrap_err();
    assert!(matches!(err, NcError::Range(_)));

    // The session is still usable afterwards.
    let mut one = [0u8; 2];
    e.get_vara(ncid, 0, &Slab::contiguous(&[2, 3], &[1, 1]), &mut one, NcType::USHORT)
        .unwrap();
    assert_eq!(u16s(&one), [203]);
}

#[test]
fn bigtiff_multiband_chunky() {
    let layout = TiffLayout {
        bigtiff: true,
        bands: 3,
        bits: 8,
        width: 5,
        height: 4,
        rows_per_strip: 2,
        ..TiffLayout::default()
    };
    let pixel = |b: usize, y: usize, x: usize| (10 * b + 4 * y + x) as u64;
    let image = build(&layout, &pixel);
    let e = engine();
    let ncid = e.open_mem("mem.tif", Mode::empty(), &image).unwrap();
    assert_eq!(e.inq_format(ncid).unwrap(), FileFormat::User(udf(0)));
    assert_eq!(e.inq_dimid(ncid, "band").unwrap(), 2);
    assert_eq!(e.inq_var_all(ncid, 0).unwrap().dimids, [2, 1, 0]);

    // Bands 1..3, rows 1..3 (crossing a strip boundary), columns 3..5.
    let mut out = vec![0u8; 2 * 2 * 2];
    e.get_vara(ncid, 0, &Slab::contiguous(&[1, 1, 3], &[2, 2, 2]), &mut out, NcType::UBYTE)
        .unwrap();
    let expected: Vec<u8> = [(1, 1, 3), (1, 1, 4), (1, 2, 3), (1, 2, 4), (2, 1, 3), (2, 1, 4), (2, 2, 3), (2, 2, 4)]
        .iter()
        .map(|&(b, y, x)| pixel(b, y, x) as u8)
        .collect();
    assert_eq!(out, expected);
}

#[test]
fn planar_float_with_many_strips() {
    let layout = TiffLayout {
        bands: 2,
        bits: 32,
        sample_format: 3,
        planar: true,
        width: 3,
        height: 5,
        rows_per_strip: 2,
        ..TiffLayout::default()
    };
    let value = |b: usize, y: usize, x: usize| 0.5 + b as f32 * 10.0 + y as f32 + x as f32 / 10.0;
    let image = build(&layout, &move |b, y, x| value(b, y, x).to_bits() as u64);
    let e = engine();
    let ncid = e.open_mem("planar.tif", Mode::empty(), &image).unwrap();
    assert_eq!(e.inq_var_all(ncid, 0).unwrap().xtype, NcType::FLOAT);

    let mut out = vec![0u8; 5 * 4];
    e.get_vara(ncid, 0, &Slab::contiguous(&[1, 0, 2], &[1, 5, 1]), &mut out, NcType::FLOAT)
        .unwrap();
    let expected: Vec<f32> = (0..5).map(|y| value(1, y, 2)).collect();
    assert_eq!(f32s(&out), expected);
}

#[test]
fn big_endian_tiff_needs_an_explicit_slot() {
    let image = build(
        &TiffLayout {
            big_endian: true,
            ..TiffLayout::default()
        },
        &ramp,
    );
    let e = engine();
    // "MM" matches no registered magic.
    let err = e.open_mem("be.tif", Mode::empty(), &image).unwrap_err();
    assert!(matches!(err, NcError::DetectionFailed(_)));

    let req = OpenRequest::new("be.tif", Mode::empty())
        .with_memory(&image)
        .with_format(Slot::User(udf(1)));
    let ncid = e.open_with(&req).unwrap();
    let mut out = vec![0u8; 4 * 2];
    e.get_vara(ncid, 0, &Slab::contiguous(&[2, 0], &[1, 4]), &mut out, NcType::USHORT)
        .unwrap();
    assert_eq!(u16s(&out), [200, 201, 202, 203]);
}

#[test]
fn geokey_directory_is_a_global_attribute() {
    let image = build(&TiffLayout::default(), &ramp);
    let e = engine();
    let ncid = e.open_mem("geo.tif", Mode::empty(), &image).unwrap();

    assert_eq!(e.inq_attname(ncid, NC_GLOBAL, 0).unwrap(), GEOKEY_ATT);
    let att = e.inq_att(ncid, NC_GLOBAL, GEOKEY_ATT).unwrap();
    assert_eq!((att.xtype, att.len), (NcType::USHORT, 8));
    let mut out = vec![0u8; 16];
    e.get_att(ncid, NC_GLOBAL, GEOKEY_ATT, &mut out, NcType::USHORT).unwrap();
    assert_eq!(u16s(&out), [1, 1, 0, 1, 1024, 0, 1, 2]);
    assert!(matches!(e.inq_att(ncid, 0, GEOKEY_ATT), Err(NcError::NotFound(_))));
}

#[test]
fn plain_tiff_with_tiff_magic_is_refused() {
    let image = build(
        &TiffLayout {
            geokeys: None,
            ..TiffLayout::default()
        },
        &ramp,
    );
    let e = engine();
    let err = e.open_mem("plain.tif", Mode::empty(), &image).unwrap_err();
    assert!(matches!(err, NcError::DetectionFailed(_)));
    assert_eq!(e.open_sessions(), 0);
}

#[test]
fn geotiff_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tmp(&dir, "ro.tif", &build(&TiffLayout::default(), &ramp));
    let path = path.to_str().unwrap();
    let e = engine();

    let err = e.open(path, Mode::WRITE).unwrap_err();
    assert!(matches!(err, NcError::PermissionDenied(_)));

    let ncid = e.open(path, Mode::empty()).unwrap();
    let data = [0u8; 2];
    let err = e
        .put_vara(ncid, 0, &Slab::contiguous(&[0, 0], &[1, 1]), &data, NcType::USHORT)
        .unwrap_err();
    assert!(matches!(err, NcError::PermissionDenied(_)));
    assert!(matches!(e.redef(ncid), Err(NcError::PermissionDenied(_))));
}

#[test]
fn compressed_rasters_open_but_do_not_read() {
    let image = build(
        &TiffLayout {
            compression: 5,
            ..TiffLayout::default()
        },
        &ramp,
    );
    let e = engine();
    let ncid = e.open_mem("lzw.tif", Mode::empty(), &image).unwrap();
    assert_eq!(e.inq(ncid).unwrap().nvars, 1);
    let mut out = vec![0u8; 2];
    let err = e
        .get_vara(ncid, 0, &Slab::contiguous(&[0, 0], &[1, 1]), &mut out, NcType::USHORT)
        .unwrap_err();
    assert!(matches!(err, NcError::Unsupported(_)));
}

#[test]
fn storage_reports_strips_or_tiles_as_chunks() {
    let e = engine();
    let striped = build(
        &TiffLayout {
            rows_per_strip: 2,
            ..TiffLayout::default()
        },
        &ramp,
    );
    let ncid = e.open_mem("striped.tif", Mode::empty(), &striped).unwrap();
    assert_eq!(e.inq_var_all(ncid, 0).unwrap().storage, Storage::Chunked(vec![2, 4]));

    let tiled = build(
        &TiffLayout {
            bands: 2,
            bits: 8,
            tile: Some((16, 32)),
            ..TiffLayout::default()
        },
        &ramp,
    );
    let ncid = e.open_mem("tiled.tif", Mode::empty(), &tiled).unwrap();
    assert_eq!(e.inq_var_all(ncid, 0).unwrap().storage, Storage::Chunked(vec![2, 32, 16]));

    let mut out = vec![0u8; 1];
    let err = e
        .get_vara(ncid, 0, &Slab::contiguous(&[0, 0, 0], &[1, 1, 1]), &mut out, NcType::UBYTE)
        .unwrap_err();
    assert!(matches!(err, NcError::Unsupported(_)));
}
