//! Synthetic TIFF writer for backend tests.

#![allow(dead_code)]

use std::path::PathBuf;

pub struct TiffLayout {
    pub bigtiff: bool,
    pub big_endian: bool,
    pub width: u32,
    pub height: u32,
    pub bands: u16,
    pub bits: u16,
    /// 1 = unsigned, 2 = signed, 3 = IEEE float.
    pub sample_format: u16,
    pub planar: bool,
    pub rows_per_strip: u32,
    pub compression: u16,
    /// `(TileWidth, TileLength)` tags; the data itself stays in strips.
    pub tile: Option<(u32, u32)>,
    pub geokeys: Option<Vec<u16>>,
}

impl Default for TiffLayout {
    fn default() -> Self {
        Self {
            bigtiff: false,
            big_endian: false,
            width: 4,
            height: 3,
            bands: 1,
            bits: 16,
            sample_format: 1,
            planar: false,
            rows_per_strip: 3,
            compression: 1,
            tile: None,
            geokeys: Some(vec![1, 1, 0, 1, 1024, 0, 1, 2]),
        }
    }
}

const SHORT: u16 = 3;
const LONG: u16 = 4;
const LONG8: u16 = 16;

fn put(buf: &mut Vec<u8>, v: u64, size: usize, be: bool) {
    let mut b = v.to_le_bytes()[..size].to_vec();
    if be {
        b.reverse();
    }
    buf.extend_from_slice(&b);
}

/// Sample value at (band, y, x) as raw bits, for integer and float samples.
pub type Pixel = dyn Fn(usize, usize, usize) -> u64;

pub fn build(layout: &TiffLayout, pixel: &Pixel) -> Vec<u8> {
    let be = layout.big_endian;
    let size = (layout.bits / 8) as usize;
    let (w, h, nb) = (layout.width as usize, layout.height as usize, layout.bands as usize);
    let rps = layout.rows_per_strip as usize;

    let mut strips: Vec<Vec<u8>> = Vec::new();
    let planes = if layout.planar { nb } else { 1 };
    for plane in 0..planes {
        for first in (0..h).step_by(rps) {
            let mut strip = Vec::new();
            for y in first..(first + rps).min(h) {
                for x in 0..w {
                    if layout.planar {
                        put(&mut strip, pixel(plane, y, x), size, be);
                    } else {
                        for b in 0..nb {
                            put(&mut strip, pixel(b, y, x), size, be);
                        }
                    }
                }
            }
            strips.push(strip);
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(if be { b"MM" } else { b"II" });
    put(&mut out, if layout.bigtiff { 43 } else { 42 }, 2, be);
    if layout.bigtiff {
        put(&mut out, 8, 2, be);
        put(&mut out, 0, 2, be);
    }
    let ifd_ptr = out.len();
    let word = if layout.bigtiff { 8 } else { 4 };
    put(&mut out, 0, word, be);

    let mut offsets = Vec::new();
    let mut counts = Vec::new();
    for s in &strips {
        offsets.push(out.len() as u64);
        counts.push(s.len() as u64);
        out.extend_from_slice(s);
    }
    if out.len() % 2 == 1 {
        out.push(0);
    }
    let ifd_offset = out.len();
    let mut patch = Vec::new();
    put(&mut patch, ifd_offset as u64, word, be);
    out[ifd_ptr..ifd_ptr + word].copy_from_slice(&patch);

    let offset_type = if layout.bigtiff { LONG8 } else { LONG };
    let mut entries: Vec<(u16, u16, Vec<u64>)> = vec![
        (256, LONG, vec![layout.width as u64]),
        (257, LONG, vec![layout.height as u64]),
        (258, SHORT, vec![layout.bits as u64; nb]),
        (259, SHORT, vec![layout.compression as u64]),
        (262, SHORT, vec![1]),
        (273, offset_type, offsets),
        (277, SHORT, vec![nb as u64]),
        (278, LONG, vec![rps as u64]),
        (279, offset_type, counts),
        (284, SHORT, vec![if layout.planar { 2 } else { 1 }]),
        (339, SHORT, vec![layout.sample_format as u64; nb]),
    ];
    if let Some((tw, tl)) = layout.tile {
        entries.push((322, LONG, vec![tw as u64]));
        entries.push((323, LONG, vec![tl as u64]));
    }
    if let Some(keys) = &layout.geokeys {
        entries.push((34735, SHORT, keys.iter().map(|k| *k as u64).collect()));
    }
    entries.sort_by_key(|e| e.0);

    let (count_len, entry_len) = if layout.bigtiff { (8, 20) } else { (2, 12) };
    let extra_base = ifd_offset + count_len + entries.len() * entry_len + word;
    let mut extra = Vec::new();

    put(&mut out, entries.len() as u64, count_len, be);
    for (tag, ty, values) in &entries {
        let vsize = match *ty {
            SHORT => 2,
            LONG => 4,
            _ => 8,
        };
        let mut payload = Vec::new();
        for v in values {
            put(&mut payload, *v, vsize, be);
        }
        put(&mut out, *tag as u64, 2, be);
        put(&mut out, *ty as u64, 2, be);
        put(&mut out, values.len() as u64, word, be);
        if payload.len() <= word {
            payload.resize(word, 0);
            out.extend_from_slice(&payload);
        } else {
            put(&mut out, (extra_base + extra.len()) as u64, word, be);
            extra.extend_from_slice(&payload);
            if extra.len() % 2 == 1 {
                extra.push(0);
            }
        }
    }
    put(&mut out, 0, word, be);
    assert_eq!(out.len(), extra_base);
    out.extend_from_slice(&extra);
    out
}

/// `100 * y + x`, plus `1000 * band`.
pub fn ramp(band: usize, y: usize, x: usize) -> u64 {
    (1000 * band + 100 * y + x) as u64
}

pub fn write_tmp(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn u16s(buf: &[u8]) -> Vec<u16> {
    buf.chunks_exact(2)
        .map(|c| u16::from_ne_bytes([c[0], c[1]]))
        .collect()
}

pub fn f32s(buf: &[u8]) -> Vec<f32> {
    buf.chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
