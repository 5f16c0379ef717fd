//! Minimal TIFF / BigTIFF container reader: header, first IFD, integer tag
//! values. Enough for format detection and uncompressed strip access.

use std::io;

use crate::source::Source;

pub const VERSION_CLASSIC: u16 = 42;
pub const VERSION_BIGTIFF: u16 = 43;

/// Largest first-IFD offset accepted when sniffing.
pub const MAX_IFD_OFFSET: u64 = 100 * 1024 * 1024;
/// More entries than this in one IFD means the file is not a TIFF.
const MAX_IFD_ENTRIES: u64 = 4096;

pub mod tag {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn is_native(self) -> bool {
        match self {
            ByteOrder::Little => cfg!(target_endian = "little"),
            ByteOrder::Big => cfg!(target_endian = "big"),
        }
    }

    pub fn u16(self, b: &[u8]) -> u16 {
        let b = [b[0], b[1]];
        match self {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        }
    }

    pub fn u32(self, b: &[u8]) -> u32 {
        let b = [b[0], b[1], b[2], b[3]];
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }

    pub fn u64(self, b: &[u8]) -> u64 {
        let mut a = [0u8; 8];
        a.copy_from_slice(&b[..8]);
        match self {
            ByteOrder::Little => u64::from_le_bytes(a),
            ByteOrder::Big => u64::from_be_bytes(a),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub order: ByteOrder,
    pub bigtiff: bool,
    pub ifd_offset: u64,
}

/// Parse the first 8 (classic) or 16 (BigTIFF) bytes. `None` for anything
/// that is not a plausible TIFF.
pub fn parse_header(head: &[u8]) -> Option<Header> {
    let order = match head.get(..2)? {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    let version = order.u16(head.get(2..4)?);
    let (bigtiff, ifd_offset) = match version {
        VERSION_CLASSIC => (false, order.u32(head.get(4..8)?) as u64),
        VERSION_BIGTIFF => {
            // Offset byte size (always 8), then a reserved zero word.
            if order.u16(head.get(4..6)?) != 8 {
                return None;
            }
            (true, order.u64(head.get(8..16)?))
        }
        _ => return None,
    };
    let min = if bigtiff { 16 } else { 8 };
    if ifd_offset < min || ifd_offset > MAX_IFD_OFFSET {
        return None;
    }
    Some(Header {
        order,
        bigtiff,
        ifd_offset,
    })
}

/// One IFD entry with its value field kept raw until asked for.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u64,
    inline: [u8; 8],
}

fn type_size(field_type: u16) -> Option<usize> {
    Some(match field_type {
        1 | 2 | 6 | 7 => 1,
        3 | 8 => 2,
        4 | 9 | 11 | 13 => 4,
        5 | 10 | 12 | 16 | 17 | 18 => 8,
        _ => return None,
    })
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#[derive(Debug, Clone)]
pub struct Ifd {
    pub header: Header,
    pub entries: Vec<Entry>,
}

impl Ifd {
    /// Read the first IFD.
    pub fn read(src: &mut Source, header: Header) -> io::Result<Self> {
        let order = header.order;
        let (count_len, entry_len) = if header.bigtiff { (8, 20) } else { (2, 12) };

        let mut buf = [0u8; 8];
        src.read_at(header.ifd_offset, &mut buf[..count_len])?;
        let n = if header.bigtiff {
            order.u64(&buf)
        } else {
            order.u16(&buf) as u64
        };
        if n > MAX_IFD_ENTRIES {
            return Err(invalid(format!("IFD claims {n} entries")));
        }

        let mut raw = vec![0u8; n as usize * entry_len];
        src.read_at(header.ifd_offset + count_len as u64, &mut raw)?;

        let entries = raw
            .chunks_exact(entry_len)
            .map(|e| {
                let mut inline = [0u8; 8];
                let (count, value) = if header.bigtiff {
                    (order.u64(&e[4..12]), &e[12..20])
                } else {
                    (order.u32(&e[4..8]) as u64, &e[8..12])
                };
                inline[..value.len()].copy_from_slice(value);
                Entry {
                    tag: order.u16(&e[0..2]),
                    field_type: order.u16(&e[2..4]),
                    count,
                    inline,
                }
            })
            .collect();
        Ok(Self { header, entries })
    }

    pub fn has(&self, tag: u16) -> bool {
        self.entries.iter().any(|e| e.tag == tag)
    }

    pub fn entry(&self, tag: u16) -> Option<&Entry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Unsigned integer values of `tag` (BYTE, SHORT, LONG, LONG8, IFD8).
    pub fn values(&self, src: &mut Source, tag: u16) -> io::Result<Option<Vec<u64>>> {
        let Some(e) = self.entry(tag) else {
            return Ok(None);
        };
        let order = self.header.order;
        let size = type_size(e.field_type)
            .filter(|_| matches!(e.field_type, 1 | 3 | 4 | 16 | 18))
            .ok_or_else(|| invalid(format!("tag {tag} has non-integer type {}", e.field_type)))?;
        let total = usize::try_from(e.count)
            .ok()
            .and_then(|c| c.checked_mul(size))
            .ok_or_else(|| invalid(format!("tag {tag} count {} is too large", e.count)))?;

        let inline_len = if self.header.bigtiff { 8 } else { 4 };
        let bytes = if total <= inline_len {
            e.inline[..total].to_vec()
        } else {
            let offset = if self.header.bigtiff {
                order.u64(&e.inline)
            } else {
                order.u32(&e.inline) as u64
            };
            let mut out = vec![0u8; total];
            src.read_at(offset, &mut out)?;
            out
        };

        let values = bytes
            .chunks_exact(size)
            .map(|c| match size {
                1 => c[0] as u64,
                2 => order.u16(c) as u64,
                4 => order.u32(c) as u64,
                _ => order.u64(c),
            })
            .collect();
        Ok(Some(values))
    }

    /// First value of `tag`, or `default` if the tag is absent.
    pub fn scalar(&self, src: &mut Source, tag: u16, default: u64) -> io::Result<u64> {
        Ok(self
            .values(src, tag)?
            .and_then(|v| v.first().copied())
            .unwrap_or(default))
    }

    /// First value of a tag the image cannot do without.
    pub fn required(&self, src: &mut Source, tag: u16) -> io::Result<u64> {
        self.values(src, tag)?
            .and_then(|v| v.first().copied())
            .ok_or_else(|| invalid(format!("required tag {tag} is missing")))
    }
}
