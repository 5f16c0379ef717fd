//! GRIB2 backend skeleton. Checks the indicator section (magic, edition 2,
//! total length) and presents an empty root group.

use tracing::debug;

use nep_abi::{DispatchTable, NcError, NcResult, OpenFile};

use crate::skeleton::{check_open_mode, Skeleton, EMPTY_GROUP};
use crate::source::open_with_magic;

pub const MAGIC: &[u8] = b"GRIB";

/// Indicator section length in edition 2.
const INDICATOR_LEN: usize = 16;

fn grib2_open(file: &mut OpenFile, memory: Option<&[u8]>) -> NcResult<()> {
    check_open_mode(file, "GRIB2")?;
    let (src, head) = open_with_magic(file.path(), memory, MAGIC, "GRIB")?;
    if head.len() < INDICATOR_LEN {
        return Err(NcError::DetectionFailed(format!(
            "{} is too short for a GRIB indicator section",
            file.path()
        )));
    }
    let edition = head[7];
    if edition != 2 {
        return Err(NcError::unsupported(format!("GRIB edition {edition}")));
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&head[8..16]);
    let total = u64::from_be_bytes(len);
    if total < INDICATOR_LEN as u64 {
        return Err(NcError::DetectionFailed(format!(
            "GRIB message length {total} is shorter than its indicator section"
        )));
    }
    debug!(path = file.path(), discipline = head[6], total, "opened GRIB2");
    file.set_state(Skeleton {
        src,
        kind: "GRIB2",
        version: u32::from(edition),
    });
    Ok(())
}

pub static GRIB2_TABLE: DispatchTable = DispatchTable {
    open: Some(grib2_open),
    ..EMPTY_GROUP
};
