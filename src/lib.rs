//! A streaming, resumable GIF decoder.
//!
//! Input can arrive in chunks of any size: whenever a call runs out of
//! bytes it returns a `ShortRead` suspension, and calling the same
//! operation again with more input picks up exactly where parsing stopped.
//! All buffers — the input window, the pixel destination, the scratch
//! space — are caller-owned and only borrowed for a single call; the
//! decoder itself never allocates.
//!
//! Call order is `decode_image_config`, then `decode_frame_config` /
//! `decode_frame` once per frame until the `EndOfData` warning, with
//! `restart_frame` available to jump back to any frame boundary already
//! seen.

pub mod decode;
pub mod io;
pub mod pixel;
pub mod status;

pub use decode::{DecodeFrameOptions, Decoder, DisposalMethod};
pub use io::IoCursor;
pub use pixel::{
    FrameConfig, ImageConfig, PixelBuffer, PixelConfig, PixelFormat, RangeIncl, Rect, PALETTE_LEN,
};
pub use status::{Error, Status};

/// Bumped whenever the decoder's state layout changes; `Decoder::validate`
/// refuses anything else.
pub const VERSION: u32 = 2;
