mod decoder;
mod lzw;

pub use decoder::Decoder;

/// What the caller should do with a frame's pixels before the next frame is
/// drawn. The decoder only reports this; applying it is the caller's job.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalMethod {
    DoNotDispose = 1,
    RestoreToBackgroundColor = 2,
    RestoreToPrevious = 3,
}

impl DisposalMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(DisposalMethod::DoNotDispose),
            2 => Some(DisposalMethod::RestoreToBackgroundColor),
            3 => Some(DisposalMethod::RestoreToPrevious),
            _ => None,
        }
    }
}

/// Placeholder options argument for `Decoder::decode_frame`; there are no
/// tunables yet, but the parameter keeps the signature stable when some
/// arrive.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeFrameOptions {}
