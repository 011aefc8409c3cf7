//! FORM/AIFF format implementation: big-endian PCM 16/24/32 bit, plus
//! AIFF-C files with `NONE` (big) or `sowt` (little) byte order.
//!
//! The COMM chunk stores the sample rate as an 80 bit IEEE extended
//! float; AIFF's chunk layout varies per file, so the byte positions of
//! the size-dependent header fields are kept as implementation-private
//! data for `update_header`.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, SoundFileError};
use crate::formats::Endian;
use crate::{SoundFile, SoundFormat};

// Chunk identifiers
const FORM_CHUNK_ID: &[u8; 4] = b"FORM";
const AIFF_FORMAT_ID: &[u8; 4] = b"AIFF";
const AIFC_FORMAT_ID: &[u8; 4] = b"AIFC";
const COMM_CHUNK_ID: &[u8; 4] = b"COMM";
const SSND_CHUNK_ID: &[u8; 4] = b"SSND";

// AIFF-C compression ids
const COMP_NONE: &[u8; 4] = b"NONE";
const COMP_TWOS: &[u8; 4] = b"twos";
const COMP_SOWT: &[u8; 4] = b"sowt";

const FORM_HEADER_SIZE: u64 = 12; // FORM + size + AIFF
const COMM_CHUNK_SIZE: u32 = 18;
// FORM header + COMM chunk + SSND chunk header
const MIN_HEADER_SIZE: usize = 54;

// Private error codes, described via the strerror hook
const ERR_NOT_AIFF: i32 = -1;
const ERR_NO_COMM: i32 = -2;
const ERR_NO_SSND: i32 = -3;
const ERR_BAD_COMM: i32 = -4;

/// Byte positions of the size-dependent header fields, recorded while
/// reading or writing a header and consumed by `update_header`.
struct AiffChunkPos {
    nframes: u64,
    ssnd_size: u64,
}

pub struct AiffFormat;

impl SoundFormat for AiffFormat {
    fn name(&self) -> &'static str {
        "aiff"
    }

    fn min_header_size(&self) -> usize {
        MIN_HEADER_SIZE
    }

    fn is_header(&self, buf: &[u8]) -> bool {
        buf.len() >= 12
            && &buf[0..4] == FORM_CHUNK_ID
            && (&buf[8..12] == AIFF_FORMAT_ID || &buf[8..12] == AIFC_FORMAT_ID)
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let mut form = [0u8; 12];
        if sf.read_at(0, &mut form)? < 12 || &form[0..4] != FORM_CHUNK_ID {
            return Err(SoundFileError::format(ERR_NOT_AIFF, "missing FORM header"));
        }
        let aifc = match &form[8..12] {
            id if id == AIFF_FORMAT_ID => false,
            id if id == AIFC_FORMAT_ID => true,
            _ => return Err(SoundFileError::format(ERR_NOT_AIFF, "not an AIFF or AIFC form")),
        };

        let mut pos = FORM_HEADER_SIZE;
        let mut comm: Option<(u16, u32, u16, u32, bool, u64)> = None;
        let mut ssnd: Option<(u64, u64, u64)> = None;
        while comm.is_none() || ssnd.is_none() {
            let mut head = [0u8; 8];
            if sf.read_at(pos, &mut head)? < 8 {
                break;
            }
            let size = u32::from_be_bytes([head[4], head[5], head[6], head[7]]) as u64;
            let id: [u8; 4] = [head[0], head[1], head[2], head[3]];

            match &id {
                COMM_CHUNK_ID => {
                    if size < COMM_CHUNK_SIZE as u64 {
                        return Err(SoundFileError::format(ERR_BAD_COMM, "COMM chunk too small"));
                    }
                    let take = (size.min(24)) as usize;
                    let mut buf = [0u8; 24];
                    if sf.read_at(pos + 8, &mut buf[..take])? < take {
                        return Err(SoundFileError::format(ERR_BAD_COMM, "truncated COMM chunk"));
                    }
                    let mut cur = Cursor::new(&buf[..take]);
                    let channels = cur.read_u16::<BigEndian>()?;
                    let nframes = cur.read_u32::<BigEndian>()?;
                    let bits = cur.read_u16::<BigEndian>()?;
                    let mut rate = [0u8; 10];
                    std::io::Read::read_exact(&mut cur, &mut rate)?;
                    let samplerate = read_extended(&rate).round();
                    if !(samplerate > 0.0) || samplerate > u32::MAX as f64 {
                        return Err(SoundFileError::format(ERR_BAD_COMM, "bad sample rate"));
                    }

                    // AIFF-C carries a compression id after the rate;
                    // only uncompressed byte orders are supported.
                    let mut bigendian = true;
                    if aifc {
                        if take < 22 {
                            return Err(SoundFileError::format(
                                ERR_BAD_COMM,
                                "AIFC COMM without compression id",
                            ));
                        }
                        let comp: [u8; 4] = [buf[18], buf[19], buf[20], buf[21]];
                        bigendian = match &comp {
                            COMP_NONE | COMP_TWOS => true,
                            COMP_SOWT => false,
                            _ => return Err(SoundFileError::SampleFormat),
                        };
                    }
                    // nframes field position for update_header
                    comm = Some((channels, nframes, bits, samplerate as u32, bigendian, pos + 10));
                }
                SSND_CHUNK_ID => {
                    if size < 8 {
                        return Err(SoundFileError::format(ERR_NO_SSND, "SSND chunk too small"));
                    }
                    let mut buf = [0u8; 8];
                    if sf.read_at(pos + 8, &mut buf)? < 8 {
                        return Err(SoundFileError::format(ERR_NO_SSND, "truncated SSND chunk"));
                    }
                    let offset = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64;
                    if size < 8 + offset {
                        return Err(SoundFileError::format(ERR_NO_SSND, "bad SSND offset"));
                    }
                    let datastart = pos + 16 + offset;
                    let datasize = size - 8 - offset;
                    ssnd = Some((datastart, datasize, pos + 4));
                }
                _ => {}
            }
            pos += 8 + size + (size & 1);
        }

        let (channels, _nframes, bits, samplerate, bigendian, nframes_pos) =
            comm.ok_or_else(|| SoundFileError::format(ERR_NO_COMM, "no COMM chunk"))?;
        let (datastart, datasize, ssnd_size_pos) =
            ssnd.ok_or_else(|| SoundFileError::format(ERR_NO_SSND, "no SSND chunk"))?;

        let bytespersample = match bits {
            16 => 2,
            24 => 3,
            32 => 4,
            _ => return Err(SoundFileError::SampleFormat),
        };
        sf.set_format(samplerate, channels, bytespersample, bigendian)?;
        sf.set_headersize(Some(datastart));
        sf.set_bytelimit(Some(datasize));
        sf.set_cursor(datastart);
        sf.set_data(Box::new(AiffChunkPos {
            nframes: nframes_pos,
            ssnd_size: ssnd_size_pos,
        }));
        Ok(())
    }

    fn write_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<usize> {
        let bpf = sf.bytesperframe() as u64;
        if bpf == 0 {
            return Err(SoundFileError::NoFormat);
        }
        let datasize = nframes
            .checked_mul(bpf)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(SoundFileError::OutOfRange)?;

        let formsize = u32::try_from(MIN_HEADER_SIZE as u64 - 8 + datasize as u64)
            .map_err(|_| SoundFileError::OutOfRange)?;

        let mut out = Vec::with_capacity(MIN_HEADER_SIZE);
        out.extend_from_slice(FORM_CHUNK_ID);
        out.write_u32::<BigEndian>(formsize)?;
        out.extend_from_slice(AIFF_FORMAT_ID);

        out.extend_from_slice(COMM_CHUNK_ID);
        out.write_u32::<BigEndian>(COMM_CHUNK_SIZE)?;
        out.write_u16::<BigEndian>(sf.nchannels())?;
        out.write_u32::<BigEndian>(u32::try_from(nframes).unwrap_or(0))?;
        out.write_u16::<BigEndian>(sf.bytespersample() * 8)?;
        out.extend_from_slice(&write_extended(sf.samplerate() as f64));

        out.extend_from_slice(SSND_CHUNK_ID);
        out.write_u32::<BigEndian>(8 + datasize)?;
        out.write_u32::<BigEndian>(0)?; // offset
        out.write_u32::<BigEndian>(0)?; // block size

        sf.write_at(0, &out)?;
        sf.set_headersize(Some(MIN_HEADER_SIZE as u64));
        sf.set_cursor(MIN_HEADER_SIZE as u64);
        sf.set_bytelimit(None);
        sf.set_data(Box::new(AiffChunkPos {
            nframes: 22,
            ssnd_size: 42,
        }));
        Ok(out.len())
    }

    fn update_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<()> {
        let bpf = sf.bytesperframe() as u64;
        if bpf == 0 {
            return Err(SoundFileError::NoFormat);
        }
        let headersize = sf.headersize().ok_or(SoundFileError::NoFormat)?;
        let datasize = nframes
            .checked_mul(bpf)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(SoundFileError::OutOfRange)?;
        let (nframes_pos, ssnd_size_pos) = match sf.data::<AiffChunkPos>() {
            Some(pos) => (pos.nframes, pos.ssnd_size),
            None => return Err(SoundFileError::NoFormat),
        };
        let formsize = u32::try_from(headersize - 8 + datasize as u64)
            .map_err(|_| SoundFileError::OutOfRange)?;

        let mut word = [0u8; 4];
        (&mut word[..]).write_u32::<BigEndian>(formsize)?;
        sf.write_at(4, &word)?;
        (&mut word[..]).write_u32::<BigEndian>(u32::try_from(nframes).unwrap_or(0))?;
        sf.write_at(nframes_pos, &word)?;
        (&mut word[..]).write_u32::<BigEndian>(8 + datasize)?;
        sf.write_at(ssnd_size_pos, &word)?;
        Ok(())
    }

    fn has_extension(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        lower.ends_with(".aif") || lower.ends_with(".aiff") || lower.ends_with(".aifc")
    }

    fn add_extension(&self, filename: &str) -> String {
        format!("{filename}.aif")
    }

    fn endianness(&self, _requested: Option<Endian>) -> Endian {
        Endian::Big
    }

    fn strerror(&self, errnum: i32) -> Option<&'static str> {
        match errnum {
            ERR_NOT_AIFF => Some("missing FORM/AIFF signature"),
            ERR_NO_COMM => Some("no COMM chunk"),
            ERR_NO_SSND => Some("no SSND chunk"),
            ERR_BAD_COMM => Some("bad COMM chunk"),
            _ => None,
        }
    }
}

/// Decode an 80 bit IEEE extended float: 1 sign bit, 15 exponent bits
/// (bias 16383), 64 mantissa bits with an explicit leading bit.
fn read_extended(b: &[u8; 10]) -> f64 {
    let exponent = (((b[0] & 0x7F) as i32) << 8) | b[1] as i32;
    let mut m = [0u8; 8];
    m.copy_from_slice(&b[2..10]);
    let mantissa = u64::from_be_bytes(m);
    if exponent == 0 && mantissa == 0 {
        return 0.0;
    }
    let sign = if b[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    sign * mantissa as f64 * 2f64.powi(exponent - 16383 - 63)
}

/// Encode a positive value as an 80 bit IEEE extended float. Values at
/// or below zero encode as zero.
fn write_extended(value: f64) -> [u8; 10] {
    let mut out = [0u8; 10];
    if value <= 0.0 {
        return out;
    }
    let mut exponent: i32 = 16383;
    let mut fraction = value;
    while fraction >= 2.0 {
        fraction /= 2.0;
        exponent += 1;
    }
    while fraction < 1.0 {
        fraction *= 2.0;
        exponent -= 1;
    }
    let mantissa = (fraction * (1u64 << 63) as f64) as u64;
    out[0] = ((exponent >> 8) & 0x7F) as u8;
    out[1] = (exponent & 0xFF) as u8;
    out[2..10].copy_from_slice(&mantissa.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::sync::Arc;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("sfcodex_aiff_{}_{}", std::process::id(), name))
    }

    fn open_rw(path: &std::path::Path) -> File {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .unwrap()
    }

    #[test]
    fn extended_float_roundtrip() {
        for rate in [8000u32, 22050, 44100, 48000, 88200, 96000, 192000] {
            let encoded = write_extended(rate as f64);
            assert_eq!(read_extended(&encoded).round() as u32, rate, "rate {rate}");
        }
        assert_eq!(read_extended(&write_extended(0.0)), 0.0);
    }

    #[test]
    fn extended_float_known_bytes() {
        // Reference encoding of 44100 Hz.
        assert_eq!(
            write_extended(44100.0),
            [0x40, 0x0E, 0xAC, 0x44, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            write_extended(48000.0),
            [0x40, 0x0E, 0xBB, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn detection() {
        let aiff = AiffFormat;
        let mut buf = [0u8; 64];
        buf[0..4].copy_from_slice(b"FORM");
        buf[8..12].copy_from_slice(b"AIFF");
        assert!(aiff.is_header(&buf));
        buf[8..12].copy_from_slice(b"AIFC");
        assert!(aiff.is_header(&buf));
        buf[0..4].copy_from_slice(b"RIFF");
        assert!(!aiff.is_header(&buf));
    }

    #[test]
    fn header_roundtrip_pcm24() {
        let path = temp_path("roundtrip");
        let mut sf = SoundFile::new();
        sf.open(open_rw(&path), Arc::new(AiffFormat)).unwrap();
        sf.set_format(96000, 2, 3, true).unwrap();
        assert_eq!(sf.write_header(4).unwrap(), 54);

        sf.write_samples(&[0u8; 24]).unwrap();
        sf.close().unwrap();

        let mut sf = SoundFile::new();
        sf.open(File::open(&path).unwrap(), Arc::new(AiffFormat))
            .unwrap();
        sf.read_header().unwrap();
        assert_eq!(sf.samplerate(), 96000);
        assert_eq!(sf.nchannels(), 2);
        assert_eq!(sf.bytespersample(), 3);
        assert!(sf.bigendian());
        assert_eq!(sf.headersize(), Some(54));
        assert_eq!(sf.bytelimit(), Some(24));
        sf.close().unwrap();
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn update_after_write_is_idempotent() {
        let a = temp_path("update_a");
        let b = temp_path("update_b");

        for path in [&a, &b] {
            let mut sf = SoundFile::new();
            sf.open(open_rw(path), Arc::new(AiffFormat)).unwrap();
            sf.set_format(44100, 1, 2, true).unwrap();
            sf.write_header(6).unwrap();
            sf.write_samples(&[0u8; 12]).unwrap();
            sf.close().unwrap();
        }

        let mut sf = SoundFile::new();
        sf.open(
            File::options().read(true).write(true).open(&b).unwrap(),
            Arc::new(AiffFormat),
        )
        .unwrap();
        sf.read_header().unwrap();
        sf.update_header(6).unwrap();
        sf.update_header(6).unwrap();
        sf.close().unwrap();

        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
        let _ = fs::remove_file(&a);
        let _ = fs::remove_file(&b);
    }

    #[test]
    fn streaming_header_finalized_by_update() {
        let path = temp_path("streaming");
        let mut sf = SoundFile::new();
        sf.open(open_rw(&path), Arc::new(AiffFormat)).unwrap();
        sf.set_format(48000, 1, 2, true).unwrap();
        sf.write_header(0).unwrap(); // provisional
        sf.write_samples(&[7u8; 10]).unwrap(); // 5 frames
        sf.update_header(5).unwrap();
        sf.close().unwrap();

        let bytes = fs::read(&path).unwrap();
        // COMM frame count and SSND chunk size reflect the final count.
        assert_eq!(u32::from_be_bytes(bytes[22..26].try_into().unwrap()), 5);
        assert_eq!(u32::from_be_bytes(bytes[42..46].try_into().unwrap()), 18);
        assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 56);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn sowt_aifc_reads_little_endian() {
        let path = temp_path("sowt");
        let file = open_rw(&path);

        let mut out: Vec<u8> = Vec::new();
        out.extend_from_slice(b"FORM");
        out.write_u32::<BigEndian>(0).unwrap(); // patched below
        out.extend_from_slice(b"AIFC");
        out.extend_from_slice(b"COMM");
        out.write_u32::<BigEndian>(24).unwrap();
        out.write_u16::<BigEndian>(2).unwrap(); // channels
        out.write_u32::<BigEndian>(1).unwrap(); // frames
        out.write_u16::<BigEndian>(16).unwrap(); // bits
        out.extend_from_slice(&write_extended(44100.0));
        out.extend_from_slice(b"sowt");
        out.write_u16::<BigEndian>(0).unwrap(); // empty pstring
        out.extend_from_slice(b"SSND");
        out.write_u32::<BigEndian>(12).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]); // 1 frame
        let formsize = out.len() as u32 - 8;
        out[4..8].copy_from_slice(&formsize.to_be_bytes());
        crate::rawio::fd_write(&file, 0, &out).unwrap();

        let mut sf = SoundFile::new();
        sf.open(file, Arc::new(AiffFormat)).unwrap();
        sf.read_header().unwrap();
        assert!(!sf.bigendian());
        assert_eq!(sf.samplerate(), 44100);
        assert_eq!(sf.bytelimit(), Some(4));
        sf.close().unwrap();
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn unknown_compression_is_unsupported() {
        let path = temp_path("badcomp");
        let file = open_rw(&path);

        let mut out: Vec<u8> = Vec::new();
        out.extend_from_slice(b"FORM");
        out.write_u32::<BigEndian>(50).unwrap();
        out.extend_from_slice(b"AIFC");
        out.extend_from_slice(b"COMM");
        out.write_u32::<BigEndian>(24).unwrap();
        out.write_u16::<BigEndian>(2).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u16::<BigEndian>(16).unwrap();
        out.extend_from_slice(&write_extended(44100.0));
        out.extend_from_slice(b"ima4"); // compressed
        out.write_u16::<BigEndian>(0).unwrap();
        crate::rawio::fd_write(&file, 0, &out).unwrap();

        let mut sf = SoundFile::new();
        sf.open(file, Arc::new(AiffFormat)).unwrap();
        assert!(matches!(
            sf.read_header(),
            Err(SoundFileError::SampleFormat)
        ));
        sf.close().unwrap();
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn extensions() {
        let aiff = AiffFormat;
        assert!(aiff.has_extension("song.aif"));
        assert!(aiff.has_extension("song.AIFF"));
        assert!(aiff.has_extension("song.aifc"));
        assert!(!aiff.has_extension("song.wav"));
        assert_eq!(aiff.add_extension("song"), "song.aif");
    }
}
