//! RIFF/WAVE format implementation: little-endian PCM 16/24 bit and
//! IEEE float 32 bit sample data.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, SoundFileError};
use crate::formats::Endian;
use crate::{SoundFile, SoundFormat};

// Chunk identifiers
const RIFF_CHUNK_ID: &[u8; 4] = b"RIFF";
const WAVE_FORMAT_ID: &[u8; 4] = b"WAVE";
const FMT_CHUNK_ID: &[u8; 4] = b"fmt ";
const FACT_CHUNK_ID: &[u8; 4] = b"fact";
const DATA_CHUNK_ID: &[u8; 4] = b"data";

// Format tags
const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

const RIFF_HEADER_SIZE: u64 = 12; // RIFF + size + WAVE
const FMT_CHUNK_SIZE: u32 = 16;
// RIFF header + fmt chunk + data chunk header
const MIN_HEADER_SIZE: usize = 44;

// Private error codes, described via the strerror hook
const ERR_NOT_WAVE: i32 = -1;
const ERR_NO_FMT: i32 = -2;
const ERR_BAD_FMT: i32 = -3;
const ERR_NO_DATA: i32 = -4;

pub struct WavFormat;

impl WavFormat {
    /// Header length this implementation writes: a fact chunk is present
    /// for float files only.
    fn written_header_size(bytespersample: u16) -> u64 {
        if bytespersample == 4 { 56 } else { 44 }
    }
}

impl SoundFormat for WavFormat {
    fn name(&self) -> &'static str {
        "wave"
    }

    fn min_header_size(&self) -> usize {
        MIN_HEADER_SIZE
    }

    fn is_header(&self, buf: &[u8]) -> bool {
        buf.len() >= 12 && &buf[0..4] == RIFF_CHUNK_ID && &buf[8..12] == WAVE_FORMAT_ID
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let mut riff = [0u8; 12];
        if sf.read_at(0, &mut riff)? < 12
            || &riff[0..4] != RIFF_CHUNK_ID
            || &riff[8..12] != WAVE_FORMAT_ID
        {
            return Err(SoundFileError::format(ERR_NOT_WAVE, "missing RIFF/WAVE signature"));
        }

        // Walk chunks until the data chunk; sound data starts right
        // after its header.
        let mut pos = RIFF_HEADER_SIZE;
        let mut fmt: Option<(u16, u16, u32, u16)> = None;
        loop {
            let mut head = [0u8; 8];
            if sf.read_at(pos, &mut head)? < 8 {
                let code = if fmt.is_none() { ERR_NO_FMT } else { ERR_NO_DATA };
                return Err(SoundFileError::format(code, "unexpected end of header"));
            }
            let size = u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as u64;
            let id: [u8; 4] = [head[0], head[1], head[2], head[3]];

            match &id {
                FMT_CHUNK_ID => {
                    if size < FMT_CHUNK_SIZE as u64 {
                        return Err(SoundFileError::format(ERR_BAD_FMT, "fmt chunk too small"));
                    }
                    let take = (size.min(40)) as usize;
                    let mut buf = [0u8; 40];
                    if sf.read_at(pos + 8, &mut buf[..take])? < take {
                        return Err(SoundFileError::format(ERR_BAD_FMT, "truncated fmt chunk"));
                    }
                    let mut cur = Cursor::new(&buf[..take]);
                    let mut tag = cur.read_u16::<LittleEndian>()?;
                    let channels = cur.read_u16::<LittleEndian>()?;
                    let samplerate = cur.read_u32::<LittleEndian>()?;
                    cur.read_u32::<LittleEndian>()?; // byte rate
                    cur.read_u16::<LittleEndian>()?; // block align
                    let bits = cur.read_u16::<LittleEndian>()?;
                    if tag == FORMAT_EXTENSIBLE {
                        // First two bytes of the subformat GUID hold the
                        // actual format tag.
                        if take < 26 {
                            return Err(SoundFileError::format(
                                ERR_BAD_FMT,
                                "truncated extensible fmt chunk",
                            ));
                        }
                        tag = u16::from_le_bytes([buf[24], buf[25]]);
                    }
                    fmt = Some((tag, channels, samplerate, bits));
                }
                DATA_CHUNK_ID => {
                    let (tag, channels, samplerate, bits) =
                        fmt.ok_or_else(|| {
                            SoundFileError::format(ERR_NO_FMT, "no fmt chunk before sound data")
                        })?;
                    let bytespersample = match (tag, bits) {
                        (FORMAT_PCM, 16) => 2,
                        (FORMAT_PCM, 24) => 3,
                        (FORMAT_PCM, 32) => 4,
                        (FORMAT_IEEE_FLOAT, 32) => 4,
                        _ => return Err(SoundFileError::SampleFormat),
                    };
                    sf.set_format(samplerate, channels, bytespersample, false)?;
                    sf.set_headersize(Some(pos + 8));
                    sf.set_bytelimit(Some(size));
                    sf.set_cursor(pos + 8);
                    return Ok(());
                }
                _ => {}
            }
            // Chunks are word-aligned; odd sizes carry a pad byte.
            pos += 8 + size + (size & 1);
        }
    }

    fn write_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<usize> {
        let bpf = sf.bytesperframe() as u64;
        if bpf == 0 {
            return Err(SoundFileError::NoFormat);
        }
        let float = sf.bytespersample() == 4;
        let headersize = Self::written_header_size(sf.bytespersample());
        let datasize = nframes
            .checked_mul(bpf)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(SoundFileError::OutOfRange)?;

        let riffsize = u32::try_from(headersize - 8 + datasize as u64)
            .map_err(|_| SoundFileError::OutOfRange)?;

        let mut out = Vec::with_capacity(headersize as usize);
        out.extend_from_slice(RIFF_CHUNK_ID);
        out.write_u32::<LittleEndian>(riffsize)?;
        out.extend_from_slice(WAVE_FORMAT_ID);

        out.extend_from_slice(FMT_CHUNK_ID);
        out.write_u32::<LittleEndian>(FMT_CHUNK_SIZE)?;
        out.write_u16::<LittleEndian>(if float { FORMAT_IEEE_FLOAT } else { FORMAT_PCM })?;
        out.write_u16::<LittleEndian>(sf.nchannels())?;
        out.write_u32::<LittleEndian>(sf.samplerate())?;
        out.write_u32::<LittleEndian>(sf.samplerate() * bpf as u32)?;
        out.write_u16::<LittleEndian>(bpf as u16)?;
        out.write_u16::<LittleEndian>(sf.bytespersample() * 8)?;

        if float {
            out.extend_from_slice(FACT_CHUNK_ID);
            out.write_u32::<LittleEndian>(4)?;
            out.write_u32::<LittleEndian>(u32::try_from(nframes).unwrap_or(0))?;
        }

        out.extend_from_slice(DATA_CHUNK_ID);
        out.write_u32::<LittleEndian>(datasize)?;

        sf.write_at(0, &out)?;
        sf.set_headersize(Some(headersize));
        sf.set_cursor(headersize);
        sf.set_bytelimit(None);
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

        // RIFF size spans everything after its own chunk header; the
        // data size field sits at the end of the header we point past.
        let riffsize = u32::try_from(headersize - 8 + datasize as u64)
            .map_err(|_| SoundFileError::OutOfRange)?;
        let mut word = [0u8; 4];
        (&mut word[..]).write_u32::<LittleEndian>(riffsize)?;
        sf.write_at(4, &word)?;
        (&mut word[..]).write_u32::<LittleEndian>(datasize)?;
        sf.write_at(headersize - 4, &word)?;

        // Refresh the fact frame count when a fact chunk directly
        // precedes the data chunk (our own float layout).
        if headersize >= 20 {
            let mut id = [0u8; 4];
            if sf.read_at(headersize - 20, &mut id)? == 4 && &id == FACT_CHUNK_ID {
                (&mut word[..]).write_u32::<LittleEndian>(u32::try_from(nframes).unwrap_or(0))?;
                sf.write_at(headersize - 12, &word)?;
            }
        }
        Ok(())
    }

    fn has_extension(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        lower.ends_with(".wav") || lower.ends_with(".wave")
    }

    fn add_extension(&self, filename: &str) -> String {
        format!("{filename}.wav")
    }

    fn endianness(&self, _requested: Option<Endian>) -> Endian {
        Endian::Little
    }

    fn strerror(&self, errnum: i32) -> Option<&'static str> {
        match errnum {
            ERR_NOT_WAVE => Some("missing RIFF/WAVE signature"),
            ERR_NO_FMT => Some("no fmt chunk before sound data"),
            ERR_BAD_FMT => Some("bad fmt chunk"),
            ERR_NO_DATA => Some("no data chunk"),
            _ => None,
        }
    }
}
