//! Shared helpers for the integration tests: unique temp files and a
//! minimal synthetic soundfile format exercising the dispatch surface.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sfcodex_lib::prelude::*;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// A temp file path unique to this process and call.
pub fn temp_path(name: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "sfcodex_test_{}_{}_{}",
        std::process::id(),
        n,
        name
    ))
}

/// Synthetic format with a fixed 12 byte header:
/// magic "SNDT", sample rate u32, channels u16, bytes per sample u16,
/// all little-endian, sound data running to the end of the file.
pub struct SndtFormat;

pub const SNDT_MAGIC: &[u8; 4] = b"SNDT";
pub const SNDT_HEADER_SIZE: u64 = 12;

pub const SNDT_ERR_BAD_MAGIC: i32 = -7;

impl SoundFormat for SndtFormat {
    fn name(&self) -> &'static str {
        "sndt"
    }

    fn min_header_size(&self) -> usize {
        SNDT_HEADER_SIZE as usize
    }

    fn is_header(&self, buf: &[u8]) -> bool {
        buf.starts_with(SNDT_MAGIC)
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let mut buf = [0u8; 12];
        if sf.read_at(0, &mut buf)? < 12 || !buf.starts_with(SNDT_MAGIC) {
            return Err(SoundFileError::format(SNDT_ERR_BAD_MAGIC, "bad SNDT magic"));
        }
        let mut cur = std::io::Cursor::new(&buf[4..]);
        let samplerate = cur.read_u32::<LittleEndian>()?;
        let channels = cur.read_u16::<LittleEndian>()?;
        let bytespersample = cur.read_u16::<LittleEndian>()?;
        sf.set_format(samplerate, channels, bytespersample, false)?;

        let filesize = sf.file().unwrap().metadata()?.len();
        sf.set_headersize(Some(SNDT_HEADER_SIZE));
        sf.set_bytelimit(Some(filesize.saturating_sub(SNDT_HEADER_SIZE)));
        sf.set_cursor(SNDT_HEADER_SIZE);
        Ok(())
    }

    fn write_header(&self, sf: &mut SoundFile, _nframes: u64) -> Result<usize> {
        let mut out: Vec<u8> = Vec::with_capacity(12);
        out.extend_from_slice(SNDT_MAGIC);
        out.write_u32::<LittleEndian>(sf.samplerate()).unwrap();
        out.write_u16::<LittleEndian>(sf.nchannels()).unwrap();
        out.write_u16::<LittleEndian>(sf.bytespersample()).unwrap();
        sf.write_at(0, &out)?;
        sf.set_headersize(Some(SNDT_HEADER_SIZE));
        sf.set_cursor(SNDT_HEADER_SIZE);
        sf.set_bytelimit(None);
        Ok(out.len())
    }

    fn update_header(&self, _sf: &mut SoundFile, _nframes: u64) -> Result<()> {
        // Nothing in the header depends on the frame count.
        Ok(())
    }

    fn has_extension(&self, filename: &str) -> bool {
        filename.to_lowercase().ends_with(".sndt")
    }

    fn add_extension(&self, filename: &str) -> String {
        format!("{filename}.sndt")
    }

    fn endianness(&self, _requested: Option<Endian>) -> Endian {
        Endian::Little
    }

    fn read_meta(&self, sf: &mut SoundFile, sink: &mut dyn MetaSink) -> Result<()> {
        sink.post(
            "samplerate",
            &[MetaValue::Float(sf.samplerate() as f64)],
        );
        sink.post("magic", &[MetaValue::from("SNDT")]);
        Ok(())
    }

    fn strerror(&self, errnum: i32) -> Option<&'static str> {
        match errnum {
            SNDT_ERR_BAD_MAGIC => Some("bad SNDT magic"),
            _ => None,
        }
    }
}
