//! NASA CDF backend skeleton. Validates the version 3 magic and the
//! compression marker, then presents an empty root group.

use tracing::debug;

use nep_abi::{DispatchTable, NcError, NcResult, OpenFile};

use crate::skeleton::{check_open_mode, Skeleton, EMPTY_GROUP};
use crate::source::open_with_magic;

/// CDF version 3 magic number.
pub const MAGIC: &[u8] = &[0xCD, 0xF3, 0x00, 0x01];

const UNCOMPRESSED: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];
const COMPRESSED: [u8; 4] = [0xCC, 0xCC, 0x00, 0x01];

fn cdf_open(file: &mut OpenFile, memory: Option<&[u8]>) -> NcResult<()> {
    check_open_mode(file, "CDF")?;
    let (src, head) = open_with_magic(file.path(), memory, MAGIC, "CDF")?;
    match head.get(4..8) {
        Some(m) if m == UNCOMPRESSED => {}
        Some(m) if m == COMPRESSED => {
            return Err(NcError::unsupported("whole-file compressed CDF"));
        }
        _ => {
            return Err(NcError::DetectionFailed(format!(
                "{} has a CDF magic number but no valid second magic word",
                file.path()
            )))
        }
    }
    debug!(path = file.path(), "opened CDF");
    file.set_state(Skeleton {
        src,
        kind: "CDF",
        version: 3,
    });
    Ok(())
}

pub static CDF_TABLE: DispatchTable = DispatchTable {
    open: Some(cdf_open),
    ..EMPTY_GROUP
};
