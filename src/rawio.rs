//! Positioned read/write helpers over an open file.
//!
//! These are the only functions in the crate that touch the platform
//! file API directly. Transfers use an explicit 64 bit offset rather
//! than the file's own cursor, so they stay correct for large files and
//! for descriptors shared with other code, and they retry interrupted
//! system calls. Everything else in the crate is built on them.

use std::fs::File;
use std::io;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;

#[cfg(unix)]
fn read_at(file: &File, offset: u64, dst: &mut [u8]) -> io::Result<usize> {
    file.read_at(dst, offset)
}

#[cfg(windows)]
fn read_at(file: &File, offset: u64, dst: &mut [u8]) -> io::Result<usize> {
    file.seek_read(dst, offset)
}

#[cfg(unix)]
fn write_at(file: &File, offset: u64, src: &[u8]) -> io::Result<usize> {
    file.write_at(src, offset)
}

#[cfg(windows)]
fn write_at(file: &File, offset: u64, src: &[u8]) -> io::Result<usize> {
    file.seek_write(src, offset)
}

/// Read up to `dst.len()` bytes at `offset`, retrying interrupted calls
/// and continuing short transfers. Returns the byte count actually read,
/// which is less than `dst.len()` only at end of file.
pub fn fd_read(file: &File, offset: u64, dst: &mut [u8]) -> io::Result<usize> {
    let mut done = 0;
    while done < dst.len() {
        match read_at(file, offset + done as u64, &mut dst[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

/// Write all of `src` at `offset`, retrying interrupted calls and
/// continuing short transfers. Returns `src.len()` on success.
pub fn fd_write(file: &File, offset: u64, src: &[u8]) -> io::Result<usize> {
    let mut done = 0;
    while done < src.len() {
        match write_at(file, offset + done as u64, &src[done..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("sfcodex_rawio_{}_{}", std::process::id(), name))
    }

    #[test]
    fn write_then_read_at_offset() {
        let path = temp_file("rw");
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();

        assert_eq!(fd_write(&file, 0, b"RIFFxxxxWAVE").unwrap(), 12);
        assert_eq!(fd_write(&file, 4, b"1234").unwrap(), 4);

        let mut buf = [0u8; 12];
        assert_eq!(fd_read(&file, 0, &mut buf).unwrap(), 12);
        assert_eq!(&buf, b"RIFF1234WAVE");

        let mut tail = [0u8; 4];
        assert_eq!(fd_read(&file, 8, &mut tail).unwrap(), 4);
        assert_eq!(&tail, b"WAVE");

        drop(file);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn read_past_eof_is_short() {
        let path = temp_file("eof");
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();

        fd_write(&file, 0, b"abcd").unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(fd_read(&file, 0, &mut buf).unwrap(), 4);
        assert_eq!(fd_read(&file, 2, &mut buf).unwrap(), 2);
        assert_eq!(fd_read(&file, 100, &mut buf).unwrap(), 0);

        drop(file);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn sparse_write_extends_file() {
        let path = temp_file("sparse");
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();

        fd_write(&file, 100, b"tail").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(fd_read(&file, 100, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"tail");

        drop(file);
        let _ = fs::remove_file(&path);
    }
}
