//! Soundfile abstraction layer: read and write sample data in multiple
//! on-disk formats through one uniform handle.
//!
//! The host never parses a header itself. It asks a [`FormatRegistry`]
//! which registered [`SoundFormat`] claims a file, binds that format
//! into a [`SoundFile`] handle, and from then on every header, seek and
//! sample-transfer call dispatches through the bound format. New formats
//! are added at runtime by registering another implementation; nothing
//! in the core knows WAV from AIFF.

pub mod byteswap;
pub mod error;
pub mod formats;
pub mod prelude;
pub mod rawio;

use std::any::Any;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::byteswap::sys_isbigendian;
use crate::error::{Result, SoundFileError};
use crate::formats::{Endian, FormatRegistry, HEADER_BUF_SIZE};
use crate::rawio::{fd_read, fd_write};

/// A metadata atom passed between a format plugin and the host's output
/// mechanism. Content semantics are entirely per plugin.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    Float(f64),
    Symbol(String),
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Symbol(v.to_string())
    }
}

/// Where a format plugin sends metadata read from a file header.
pub trait MetaSink {
    fn post(&mut self, selector: &str, args: &[MetaValue]);
}

/// A sink that simply collects posted messages.
#[derive(Debug, Default)]
pub struct MetaList {
    pub messages: Vec<(String, Vec<MetaValue>)>,
}

impl MetaSink for MetaList {
    fn post(&mut self, selector: &str, args: &[MetaValue]) {
        self.messages.push((selector.to_string(), args.to_vec()));
    }
}

/// Requested parameters for creating a soundfile for writing.
#[derive(Clone, Debug)]
pub struct WriteSpec {
    pub samplerate: u32,
    pub nchannels: u16,
    /// 2, 3, or 4 bytes per sample (16/24 bit int, 32 bit word).
    pub bytespersample: u16,
    /// Requested sample endianness; `None` lets the format pick.
    pub endianness: Option<Endian>,
    /// Frame count for the header, 0 for unknown (streaming header,
    /// finalized later via `update_header`).
    pub nframes: u64,
}

/// An open (or cleared) soundfile handle.
///
/// Carries the open file, the bound format implementation, and the
/// format parameters discovered from (or destined for) the file header.
/// A handle is owned by a single logical caller at a time; it is `Send`
/// so a background worker thread can service it, but nothing here locks,
/// so concurrent operations on one handle must be serialized externally.
pub struct SoundFile {
    file: Option<File>,
    format: Option<Arc<dyn SoundFormat>>,
    /// Implementation-private data, owned by the bound format.
    data: Option<Box<dyn Any + Send>>,
    samplerate: u32,
    nchannels: u16,
    /// 2: 16 bit, 3: 24 bit, 4: 32 bit (int or float, per format).
    bytespersample: u16,
    /// Byte offset of the first sample frame; `None` until discovered.
    headersize: Option<u64>,
    bigendian: bool,
    /// Always `nchannels * bytespersample`.
    bytesperframe: usize,
    /// Sound data bytes remaining to read, or write quota remaining;
    /// `None` means unbounded.
    bytelimit: Option<u64>,
    /// Absolute byte offset of the next sample transfer.
    cursor: u64,
}

impl Default for SoundFile {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundFile {
    /// A cleared handle: no file, no bound format, format info at
    /// defaults.
    pub fn new() -> Self {
        SoundFile {
            file: None,
            format: None,
            data: None,
            samplerate: 0,
            nchannels: 0,
            bytespersample: 0,
            headersize: None,
            bigendian: false,
            bytesperframe: 0,
            bytelimit: None,
            cursor: 0,
        }
    }

    /// Reset everything to the cleared state. An open file is dropped
    /// (and thereby closed) without running the format's close hook.
    pub fn clear(&mut self) {
        *self = SoundFile::new();
    }

    /// Reset format info to defaults, keeping the file and bound format.
    pub fn clear_info(&mut self) {
        self.samplerate = 0;
        self.nchannels = 0;
        self.bytespersample = 0;
        self.headersize = None;
        self.bigendian = false;
        self.bytesperframe = 0;
        self.bytelimit = None;
        self.cursor = 0;
    }

    /// Copy format parameters from another handle. The file, bound
    /// format, and private data are not touched.
    pub fn copy_format_from(&mut self, src: &SoundFile) {
        self.samplerate = src.samplerate;
        self.nchannels = src.nchannels;
        self.bytespersample = src.bytespersample;
        self.headersize = src.headersize;
        self.bigendian = src.bigendian;
        self.bytesperframe = src.bytesperframe;
        self.bytelimit = src.bytelimit;
        self.cursor = src.cursor;
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn format(&self) -> Option<&Arc<dyn SoundFormat>> {
        self.format.as_ref()
    }

    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }

    pub fn nchannels(&self) -> u16 {
        self.nchannels
    }

    pub fn bytespersample(&self) -> u16 {
        self.bytespersample
    }

    pub fn headersize(&self) -> Option<u64> {
        self.headersize
    }

    pub fn bigendian(&self) -> bool {
        self.bigendian
    }

    pub fn bytesperframe(&self) -> usize {
        self.bytesperframe
    }

    pub fn bytelimit(&self) -> Option<u64> {
        self.bytelimit
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Whole frames left to read within the byte limit, if bounded.
    pub fn frames_remaining(&self) -> Option<u64> {
        match (self.bytelimit, self.bytesperframe) {
            (Some(limit), bpf) if bpf > 0 => Some(limit / bpf as u64),
            _ => None,
        }
    }

    /// Returns true if sample words need swapping between the file's
    /// byte order and the host's.
    pub fn needs_byteswap(&self) -> bool {
        self.bigendian != sys_isbigendian()
    }

    /// Log the current format info at debug level.
    pub fn print_info(&self) {
        debug!(
            format = self.format.as_ref().map(|t| t.name()).unwrap_or("none"),
            samplerate = self.samplerate,
            nchannels = self.nchannels,
            bytespersample = self.bytespersample,
            headersize = ?self.headersize,
            bigendian = self.bigendian,
            bytesperframe = self.bytesperframe,
            bytelimit = ?self.bytelimit,
            "soundfile info"
        );
    }

    // ----- plugin-facing mutators -----
    //
    // Format hooks receive `&mut SoundFile` and maintain the handle's
    // fields through these; `set_format` is the single place the
    // bytesperframe invariant is enforced.

    /// Set the discovered or requested sample format. Validates that the
    /// rate and channel count are positive and the sample width is one
    /// of 2, 3, or 4 bytes, and derives bytes per frame.
    pub fn set_format(
        &mut self,
        samplerate: u32,
        nchannels: u16,
        bytespersample: u16,
        bigendian: bool,
    ) -> Result<()> {
        if samplerate == 0 || nchannels == 0 || !(2..=4).contains(&bytespersample) {
            return Err(SoundFileError::SampleFormat);
        }
        self.samplerate = samplerate;
        self.nchannels = nchannels;
        self.bytespersample = bytespersample;
        self.bigendian = bigendian;
        self.bytesperframe = nchannels as usize * bytespersample as usize;
        Ok(())
    }

    /// Assign the open file into the handle (open hooks only).
    pub fn set_file(&mut self, file: File) {
        self.file = Some(file);
    }

    /// Take the file out of the handle (close hooks only). Dropping the
    /// returned value closes the descriptor.
    pub fn take_file(&mut self) -> Option<File> {
        self.file.take()
    }

    pub fn set_headersize(&mut self, headersize: Option<u64>) {
        self.headersize = headersize;
    }

    pub fn set_bytelimit(&mut self, bytelimit: Option<u64>) {
        self.bytelimit = bytelimit;
    }

    pub fn set_cursor(&mut self, cursor: u64) {
        self.cursor = cursor;
    }

    /// Advance the cursor after a successful transfer, consuming quota.
    pub fn advance(&mut self, nbytes: u64) {
        self.cursor += nbytes;
        if let Some(limit) = self.bytelimit.as_mut() {
            *limit = limit.saturating_sub(nbytes);
        }
    }

    /// Store implementation-private data (open hooks only).
    pub fn set_data(&mut self, data: Box<dyn Any + Send>) {
        self.data = Some(data);
    }

    /// Take the private data out of the handle (close hooks only).
    pub fn take_data(&mut self) -> Option<Box<dyn Any + Send>> {
        self.data.take()
    }

    /// Borrow the private data downcast to the plugin's type.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_ref().and_then(|d| d.downcast_ref())
    }

    pub fn data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data.as_mut().and_then(|d| d.downcast_mut())
    }

    /// Positioned read on the handle's file, for header parsers.
    pub fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<usize> {
        let file = self.file.as_ref().ok_or(SoundFileError::Closed)?;
        Ok(fd_read(file, offset, dst)?)
    }

    /// Positioned write on the handle's file, for header writers.
    pub fn write_at(&self, offset: u64, src: &[u8]) -> Result<usize> {
        let file = self.file.as_ref().ok_or(SoundFileError::Closed)?;
        Ok(fd_write(file, offset, src)?)
    }

    // ----- dispatched lifecycle -----

    /// Bind `format` and run its open hook over `file`. On failure the
    /// handle is left cleared.
    pub fn open(&mut self, file: File, format: Arc<dyn SoundFormat>) -> Result<()> {
        if self.is_open() {
            self.close()?;
        }
        self.format = Some(format.clone());
        match format.open(self, file) {
            Ok(()) => {
                debug!(format = format.name(), "soundfile open");
                Ok(())
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Read format info from the file's own header via the bound format.
    pub fn read_header(&mut self) -> Result<()> {
        let format = self.bound_format()?;
        format.read_header(self)
    }

    /// Write a complete header for `nframes` frames (0 = unknown) at the
    /// start of the file. Returns header bytes written.
    pub fn write_header(&mut self, nframes: u64) -> Result<usize> {
        let format = self.bound_format()?;
        format.write_header(self, nframes)
    }

    /// Rewrite the size-dependent header fields for `nframes` frames.
    /// Idempotent for equal frame counts.
    pub fn update_header(&mut self, nframes: u64) -> Result<()> {
        let format = self.bound_format()?;
        format.update_header(self, nframes)
    }

    /// Reposition the sample cursor to `frame`.
    pub fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        let format = self.bound_format()?;
        format.seek_to_frame(self, frame)
    }

    /// Read interleaved sample bytes at the cursor. Transfers whole
    /// frames only; the count returned is short at end of data.
    pub fn read_samples(&mut self, dst: &mut [u8]) -> Result<usize> {
        let format = self.bound_format()?;
        format.read_samples(self, dst)
    }

    /// Write interleaved sample bytes at the cursor. Transfers whole
    /// frames only.
    pub fn write_samples(&mut self, src: &[u8]) -> Result<usize> {
        let format = self.bound_format()?;
        format.write_samples(self, src)
    }

    /// Pass metadata from the file header to `sink`.
    pub fn read_meta(&mut self, sink: &mut dyn MetaSink) -> Result<()> {
        let format = self.bound_format()?;
        format.read_meta(self, sink)
    }

    /// Pass metadata atoms to the file header.
    pub fn write_meta(&mut self, args: &[MetaValue]) -> Result<()> {
        let format = self.bound_format()?;
        format.write_meta(self, args)
    }

    /// Run the bound format's close hook. Safe to call on an already
    /// closed handle (no-op success); never leaks the file or private
    /// data.
    pub fn close(&mut self) -> Result<()> {
        let Some(format) = self.format.clone() else {
            self.file = None;
            self.data = None;
            return Ok(());
        };
        if self.file.is_none() {
            self.data = None;
            self.format = None;
            return Ok(());
        }
        let res = format.close(self);
        debug!(format = format.name(), "soundfile closed");
        self.format = None;
        res
    }

    fn bound_format(&self) -> Result<Arc<dyn SoundFormat>> {
        if !self.is_open() {
            return Err(SoundFileError::Closed);
        }
        self.format.clone().ok_or(SoundFileError::Closed)
    }

    // ----- host conveniences -----

    /// Open `path` for reading: sniff the header, ask `registry` which
    /// format claims it, then open and read the header through that
    /// format.
    pub fn open_read(path: impl AsRef<Path>, registry: &FormatRegistry) -> Result<SoundFile> {
        let file = File::open(path.as_ref())?;
        let mut buf = [0u8; HEADER_BUF_SIZE];
        let n = fd_read(&file, 0, &mut buf)?;
        let format = registry
            .detect(&buf[..n])
            .ok_or(SoundFileError::UnknownFormat)?;
        let mut sf = SoundFile::new();
        sf.open(file, format)?;
        sf.read_header()?;
        sf.print_info();
        Ok(sf)
    }

    /// Create `path` for writing with `format`, resolving the requested
    /// endianness through the format's preference hook and writing an
    /// initial header for `spec.nframes` frames.
    pub fn open_write(
        path: impl AsRef<Path>,
        format: Arc<dyn SoundFormat>,
        spec: &WriteSpec,
    ) -> Result<SoundFile> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let bigendian = format.endianness(spec.endianness) == Endian::Big;
        let mut sf = SoundFile::new();
        sf.open(file, format)?;
        sf.set_format(spec.samplerate, spec.nchannels, spec.bytespersample, bigendian)?;
        sf.write_header(spec.nframes)?;
        Ok(sf)
    }
}

/// The capability table a format implementation fills in.
///
/// One implementing type per format, registered once into a
/// [`FormatRegistry`] and dispatched through a `SoundFile`'s binding.
/// Hooks taking a handle may be called from a background (non-realtime)
/// thread; that is a permission, not a thread-safety guarantee — all
/// hooks on one handle must come from a single logical owner at a time.
///
/// The provided bodies of `open`, `close`, `seek_to_frame`,
/// `read_samples`, and `write_samples` are the reusable default
/// implementations; a plugin delegates to them by simply not overriding.
pub trait SoundFormat: Send + Sync {
    /// Unique name, without whitespace.
    fn name(&self) -> &'static str;

    /// Minimum valid header size; detection is gated on at least this
    /// many sniffed bytes.
    fn min_header_size(&self) -> usize;

    /// Returns true if `buf` is the beginning of a supported file
    /// header. `buf` holds at least `min_header_size` bytes.
    fn is_header(&self, buf: &[u8]) -> bool;

    /// Take ownership of an already opened file and allocate any
    /// implementation-private data. On failure the caller clears the
    /// handle.
    fn open(&self, sf: &mut SoundFile, file: File) -> Result<()> {
        sf.set_file(file);
        Ok(())
    }

    /// Release the file and private data. The default drops both, which
    /// closes the descriptor.
    fn close(&self, sf: &mut SoundFile) -> Result<()> {
        sf.take_data();
        sf.take_file();
        Ok(())
    }

    /// Read format info from the file's header into the handle: sample
    /// rate, channels, sample width, endianness, header size, byte
    /// limit, and cursor at the first frame.
    fn read_header(&self, sf: &mut SoundFile) -> Result<()>;

    /// Write a complete header for `nframes` frames (0 = unknown) at
    /// the start of the file. Returns header bytes written.
    fn write_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<usize>;

    /// Rewrite the header's size-dependent fields for `nframes` frames.
    /// Must be idempotent for equal frame counts.
    fn update_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<()>;

    /// Returns true if `filename` carries one of this format's file
    /// extensions.
    fn has_extension(&self, filename: &str) -> bool;

    /// Append this format's default extension to `filename`.
    fn add_extension(&self, filename: &str) -> String;

    /// The format's preferred sample endianness given the requested one
    /// (`None` = unspecified).
    fn endianness(&self, requested: Option<Endian>) -> Endian;

    /// Reposition the sample cursor to `frame`, bounds-checked against
    /// the sound data.
    fn seek_to_frame(&self, sf: &mut SoundFile, frame: u64) -> Result<()> {
        let bpf = sf.bytesperframe() as u64;
        let headersize = sf.headersize().ok_or(SoundFileError::NoFormat)?;
        if bpf == 0 {
            return Err(SoundFileError::NoFormat);
        }
        let offset = frame
            .checked_mul(bpf)
            .and_then(|b| headersize.checked_add(b))
            .ok_or(SoundFileError::OutOfRange)?;
        if let Some(limit) = sf.bytelimit() {
            let end = sf.cursor() + limit;
            if offset > end {
                return Err(SoundFileError::OutOfRange);
            }
            sf.set_bytelimit(Some(end - offset));
        }
        sf.set_cursor(offset);
        Ok(())
    }

    /// Read interleaved sample bytes at the cursor, whole frames only,
    /// clamped to the byte limit. Short counts mean end of data. The
    /// cursor does not move on failure.
    fn read_samples(&self, sf: &mut SoundFile, dst: &mut [u8]) -> Result<usize> {
        let bpf = sf.bytesperframe();
        if bpf == 0 {
            return Err(SoundFileError::NoFormat);
        }
        let mut want = dst.len() - dst.len() % bpf;
        if let Some(limit) = sf.bytelimit() {
            want = want.min(usize::try_from(limit).unwrap_or(usize::MAX));
            want -= want % bpf;
        }
        if want == 0 {
            return Ok(0);
        }
        let got = {
            let file = sf.file().ok_or(SoundFileError::Closed)?;
            fd_read(file, sf.cursor(), &mut dst[..want])?
        };
        let got = got - got % bpf;
        sf.advance(got as u64);
        Ok(got)
    }

    /// Write interleaved sample bytes at the cursor, whole frames only,
    /// clamped to the remaining write quota. Writing to an exhausted
    /// quota is an error. The cursor does not move on failure.
    fn write_samples(&self, sf: &mut SoundFile, src: &[u8]) -> Result<usize> {
        let bpf = sf.bytesperframe();
        if bpf == 0 {
            return Err(SoundFileError::NoFormat);
        }
        let mut want = src.len() - src.len() % bpf;
        if let Some(limit) = sf.bytelimit() {
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            if limit < bpf && want > 0 {
                return Err(SoundFileError::OutOfRange);
            }
            want = want.min(limit);
            want -= want % bpf;
        }
        if want == 0 {
            return Ok(0);
        }
        let put = {
            let file = sf.file().ok_or(SoundFileError::Closed)?;
            fd_write(file, sf.cursor(), &src[..want])?
        };
        sf.advance(put as u64);
        Ok(put)
    }

    /// Pass metadata from the file header to `sink`. Formats without
    /// metadata support leave the default, which reports unsupported.
    fn read_meta(&self, _sf: &mut SoundFile, _sink: &mut dyn MetaSink) -> Result<()> {
        Err(SoundFileError::Unsupported("read_meta"))
    }

    /// Write metadata atoms into the file header.
    fn write_meta(&self, _sf: &mut SoundFile, _args: &[MetaValue]) -> Result<()> {
        Err(SoundFileError::Unsupported("write_meta"))
    }

    /// Describe a format-private error code from `-1..=-999`, if this
    /// format defines it.
    fn strerror(&self, _errnum: i32) -> Option<&'static str> {
        None
    }
}
