//! Format registry and the built-in format implementations.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::SoundFormat;
use crate::byteswap::sys_isbigendian;

mod aiff;
mod wav;
pub use aiff::AiffFormat;
pub use wav::WavFormat;

/// Maximum number of registered formats.
pub const MAX_FORMATS: usize = 8;

/// Sniff buffer size; large enough for every built-in format's minimum
/// header size.
pub const HEADER_BUF_SIZE: usize = 128;

/// Sample byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// The host's native byte order.
    pub fn native() -> Endian {
        if sys_isbigendian() {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    pub fn is_big(self) -> bool {
        self == Endian::Big
    }
}

/// A bounded, append-only collection of format implementations.
///
/// Registration order is the detection priority order: `detect` returns
/// the first registered format whose sniff hook claims the buffer, so
/// formats with overlapping header signatures must be registered
/// most-specific-first. Populate the registry once at startup; shared
/// references afterwards read without locking.
pub struct FormatRegistry {
    formats: Vec<Arc<dyn SoundFormat>>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        FormatRegistry {
            formats: Vec::with_capacity(MAX_FORMATS),
        }
    }

    /// A registry with the built-in formats registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WavFormat));
        registry.register(Arc::new(AiffFormat));
        registry
    }

    /// Add a format implementation. Returns false, leaving the registry
    /// unchanged, if the maximum has been reached. Name uniqueness is
    /// the caller's responsibility.
    pub fn register(&mut self, format: Arc<dyn SoundFormat>) -> bool {
        if self.formats.len() >= MAX_FORMATS {
            warn!(
                name = format.name(),
                max = MAX_FORMATS,
                "soundfile format registry full"
            );
            return false;
        }
        debug!(name = format.name(), "registered soundfile format");
        self.formats.push(format);
        true
    }

    /// Return the first registered format claiming `buf` as the start of
    /// one of its headers. Formats whose minimum header size exceeds the
    /// buffer are not asked.
    pub fn detect(&self, buf: &[u8]) -> Option<Arc<dyn SoundFormat>> {
        self.formats
            .iter()
            .find(|t| buf.len() >= t.min_header_size() && t.is_header(buf))
            .cloned()
    }

    /// Look up a format by its registered name.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn SoundFormat>> {
        self.formats.iter().find(|t| t.name() == name).cloned()
    }

    /// Return the first registered format claiming `filename`'s
    /// extension, for choosing a write format from a file name.
    pub fn find_by_filename(&self, filename: &str) -> Option<Arc<dyn SoundFormat>> {
        self.formats
            .iter()
            .find(|t| t.has_extension(filename))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SoundFormat>> {
        self.formats.iter()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}
