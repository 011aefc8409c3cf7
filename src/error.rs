//! Error taxonomy shared by the dispatch core and every format plugin.
//!
//! Generic codes occupy the range at and below [`SOUNDFILE_ERR_SAMPLEFMT`];
//! format plugins are free to define their own descriptive codes in
//! `-1..=-999` and resolve them through their `strerror` hook. Ordinary
//! OS error numbers are non-negative and fall through to the platform's
//! standard error strings, so every layer can report through one call.

use std::io;

use thiserror::Error;

use crate::SoundFile;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SoundFileError>;

/// Generic soundfile error code. Format-private codes start above this,
/// ie. -1, -2, etc.
pub const SOUNDFILE_ERR_SAMPLEFMT: i32 = -1000;

#[derive(Debug, Error)]
pub enum SoundFileError {
    /// The file's sample format is not one the plugin can transfer
    /// (eg. an 8 bit or compressed encoding).
    #[error("unsupported sample format")]
    SampleFormat,

    /// No registered format claimed the file's header.
    #[error("unrecognized soundfile format")]
    UnknownFormat,

    /// Operation on a closed handle.
    #[error("soundfile is closed")]
    Closed,

    /// Operation needs format info that has not been read or set yet.
    #[error("sound format not set")]
    NoFormat,

    /// Seek or transfer past the end of the sound data, or an offset
    /// computation overflowed.
    #[error("out of range of sound data")]
    OutOfRange,

    /// The bound format does not implement this hook.
    #[error("{0} not supported by this soundfile format")]
    Unsupported(&'static str),

    /// A format-private error raised while parsing or writing a header.
    /// `code` is in the plugin range `-1..=-999` and can be resolved
    /// against the bound format via [`strerror`].
    #[error("{message}")]
    Format { code: i32, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SoundFileError {
    /// Build a format-private error from a plugin code and message.
    pub fn format(code: i32, message: impl Into<String>) -> Self {
        SoundFileError::Format {
            code,
            message: message.into(),
        }
    }

    /// The errno-style code for this error: a generic code at or below
    /// -1000, a format-private code in -1..=-999, or a non-negative OS
    /// error number. Errors with no meaningful number report -1.
    pub fn code(&self) -> i32 {
        match self {
            SoundFileError::SampleFormat => SOUNDFILE_ERR_SAMPLEFMT,
            SoundFileError::Format { code, .. } => *code,
            SoundFileError::Io(e) => e.raw_os_error().unwrap_or(-1),
            _ => -1,
        }
    }
}

/// Returns an error string for `errnum`. A code in the format-private
/// range is resolved through the bound format of `sf` when one is set
/// and defines a describe hook; a generic code resolves against the
/// taxonomy above; a non-negative code falls through to the platform's
/// standard error string.
pub fn strerror(errnum: i32, sf: Option<&SoundFile>) -> String {
    if errnum < 0 && errnum > SOUNDFILE_ERR_SAMPLEFMT {
        if let Some(format) = sf.and_then(|sf| sf.format()) {
            if let Some(msg) = format.strerror(errnum) {
                return msg.to_string();
            }
        }
    }
    match errnum {
        SOUNDFILE_ERR_SAMPLEFMT => "unsupported sample format".to_string(),
        n if n >= 0 => io::Error::from_raw_os_error(n).to_string(),
        n => format!("unknown soundfile error ({n})"),
    }
}
