use std::fmt;

use thiserror::Error;

/// A failed operation. The message namespace ("base:", "gif:", "lzw:")
/// identifies which layer produced the failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("base: bad receiver")]
    BadReceiver,

    #[error("base: bad sizeof receiver")]
    BadSizeofReceiver,

    #[error("base: bad version")]
    BadVersion,

    #[error("base: version check missing")]
    VersionCheckMissing,

    #[error("base: bad call sequence")]
    BadCallSequence,

    #[error("gif: bad header")]
    BadHeader,

    #[error("gif: bad scratch length")]
    BadScratchLength,

    #[error("lzw: bad code")]
    BadCode,
}

/// The outcome of a decoder call.
///
/// Suspensions (`ShortRead`, `ShortWrite`) are recoverable: supply more
/// input or space and repeat the same call. `EndOfData` is the normal,
/// stable way a frame sequence ends. Only `Error` values are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    ShortRead,
    ShortWrite,
    EndOfData,
    Error(Error),
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    pub fn is_suspension(self) -> bool {
        matches!(self, Status::ShortRead | Status::ShortWrite)
    }

    pub fn is_warning(self) -> bool {
        self == Status::EndOfData
    }

    pub fn is_error(self) -> bool {
        matches!(self, Status::Error(_))
    }
}

impl From<Error> for Status {
    fn from(e: Error) -> Self {
        Status::Error(e)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::ShortRead => write!(f, "base: short read"),
            Status::ShortWrite => write!(f, "base: short write"),
            Status::EndOfData => write!(f, "base: end of data"),
            Status::Error(e) => fmt::Display::fmt(e, f),
        }
    }
}
