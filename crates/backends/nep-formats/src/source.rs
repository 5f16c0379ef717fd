//! Byte sources shared by the backends: a file on disk or an in-memory image.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use nep_abi::{NcError, NcResult};

#[derive(Debug)]
pub enum Source {
    File(File),
    Memory(Vec<u8>),
}

impl Source {
    /// The in-memory image if one was handed to `open`, otherwise the file.
    pub fn open(path: &str, memory: Option<&[u8]>) -> NcResult<Self> {
        match memory {
            Some(image) => Ok(Source::Memory(image.to_vec())),
            None => Ok(Source::File(File::open(Path::new(path))?)),
        }
    }

    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        match self {
            Source::File(f) => {
                f.seek(SeekFrom::Start(offset))?;
                f.read_exact(buf)
            }
            Source::Memory(image) => {
                let start = usize::try_from(offset).map_err(|_| eof(offset))?;
                let end = start.checked_add(buf.len()).ok_or_else(|| eof(offset))?;
                let src = image.get(start..end).ok_or_else(|| eof(offset))?;
                buf.copy_from_slice(src);
                Ok(())
            }
        }
    }

    /// Up to `n` leading bytes; shorter if the source is shorter.
    pub fn prefix(&mut self, n: usize) -> io::Result<Vec<u8>> {
        match self {
            Source::File(f) => {
                f.seek(SeekFrom::Start(0))?;
                let mut out = Vec::with_capacity(n);
                f.take(n as u64).read_to_end(&mut out)?;
                Ok(out)
            }
            Source::Memory(image) => Ok(image[..image.len().min(n)].to_vec()),
        }
    }
}

fn eof(offset: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read past the end of the image at offset {offset}"),
    )
}

/// Open `path` (or the image) and require it to start with `magic`.
pub fn open_with_magic(
    path: &str,
    memory: Option<&[u8]>,
    magic: &[u8],
    what: &str,
) -> NcResult<(Source, Vec<u8>)> {
    let mut src = Source::open(path, memory)?;
    let head = src.prefix(16)?;
    if !head.starts_with(magic) {
        return Err(NcError::DetectionFailed(format!("{path} is not a {what} file")));
    }
    Ok((src, head))
}
