//! Append-mode chunk writer for resume files.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Write all of `buf` to `w`.
///
/// Short writes advance the offset and loop. `Interrupted` retries the same slice
/// without advancing. A write that accepts zero bytes is `WriteZero`; any other
/// error is returned as-is and the remainder of the chunk is not written.
pub fn write_fully<W: Write + ?Sized>(w: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match w.write(&buf[offset..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {} bytes", offset, buf.len()),
                ));
            }
            Ok(n) => offset += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Append `data` to the file at `path`, creating it if needed.
///
/// The handle is opened for this call only and closed on every return path, so
/// between chunks the file holds exactly the bytes written so far. With `sync`
/// the data is flushed to disk (`fdatasync`) before returning.
pub fn append_chunk(path: &Path, data: &[u8], sync: bool) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    write_fully(&mut file, data)?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}
