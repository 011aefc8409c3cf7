pub use crate::byteswap::{
    swap2, swap4, swap4s, swap8, swap8s, swapstring4, swapstring8, sys_isbigendian,
};
pub use crate::error::{Result, SOUNDFILE_ERR_SAMPLEFMT, SoundFileError, strerror};
pub use crate::formats::{
    AiffFormat, Endian, FormatRegistry, HEADER_BUF_SIZE, MAX_FORMATS, WavFormat,
};
pub use crate::rawio::{fd_read, fd_write};
pub use crate::{MetaList, MetaSink, MetaValue, SoundFile, SoundFormat, WriteSpec};

pub use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
