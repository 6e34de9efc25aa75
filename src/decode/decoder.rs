use std::mem;

use log::debug;

use super::lzw::Lzw;
use super::{DecodeFrameOptions, DisposalMethod};
use crate::io::IoCursor;
use crate::pixel::{
    FrameConfig, ImageConfig, PixelBuffer, PixelConfig, PixelFormat, RangeIncl, Rect, PALETTE_LEN,
};
use crate::status::{Error, Status};

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR_LABEL: u8 = 0x2c;
const TRAILER_LABEL: u8 = 0x3b;

// Extension labels
const APPLICATION_EXTENSION: u8 = 0xff;
const GRAPHIC_CONTROL_EXTENSION: u8 = 0xf9;

/// Written by a successful `validate` call, checked by every other entry
/// point. Catches use of an unvalidated or trampled decoder.
const MAGIC: u32 = 0x6a5f_19c3;

/// Where the decode session is in the image-config → (frame-config →
/// frame-pixels)* progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Start,
    AwaitFrameConfig,
    AwaitFrame,
    End,
}

/// Which entry point owns an in-flight suspension. A suspended operation
/// must be resumed by the same entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    None,
    ImageConfig,
    FrameConfig,
    Frame,
}

/// The resumable micro-state. Progress through a multi-byte field lives in
/// the staging accumulator, not on the call stack, so a short read is just
/// an early return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Signature,
    ScreenDescriptor,
    GlobalColorTable,
    BlockIntro,
    GraphicControl,
    ApplicationHeader,
    LoopCount,
    SkipSubBlocks,
    ImageDescriptor,
    LocalColorTable,
    LiteralWidth,
    PixelData,
    SkipLiteralWidth,
}

enum Scan {
    ConfigReady,
    Trailer,
}

/// One GIF decode session.
///
/// Everything lives inline: palettes, LZW tables, staging bytes. The
/// decoder never allocates and never keeps references to caller buffers
/// across calls, so the caller decides where both the decoder and every
/// buffer live.
pub struct Decoder {
    magic: u32,
    call: Call,
    op: Op,
    state: State,

    image_config_done: bool,
    width: u32,
    height: u32,
    num_loops: u32,
    first_frame_is_opaque: bool,

    // 256 BGRA entries each; raw RGB triples are staged in the low bytes
    // while a color table streams in, then expanded in place.
    global_palette: [u8; PALETTE_LEN],
    local_palette: [u8; PALETTE_LEN],

    // staging for fixed-size fields, large enough for the biggest one (the
    // application extension's 12-byte header block)
    acc: [u8; 12],
    acc_len: u8,
    table_fill: usize,
    table_len: usize,
    skip_block_rem: u8,
    block_pos: u64,

    frame_index: u64,
    num_decoded_frame_configs: u64,
    num_decoded_frames: u64,

    // graphic-control values collected for the frame being parsed
    gce_disposal: u8,
    gce_duration_millis: u32,
    gce_transparent: Option<u8>,
    marker_recorded: bool,
    marker_pos: u64,

    // the most recently parsed frame config
    frame: FrameConfig,
    frame_interlaced: bool,
    frame_has_local_palette: bool,
    frame_transparent: Option<u8>,
    /// The first frame's config is parsed while producing the image config;
    /// this flags it as parsed-but-not-yet-returned.
    frame0_ready: bool,

    frame_total: u64,
    frame_clip_empty: bool,
    emitted: u64,

    lzw: Lzw,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder {
            magic: 0,
            call: Call::Start,
            op: Op::None,
            state: State::Signature,
            image_config_done: false,
            width: 0,
            height: 0,
            num_loops: 1,
            first_frame_is_opaque: false,
            global_palette: [0; PALETTE_LEN],
            local_palette: [0; PALETTE_LEN],
            acc: [0; 12],
            acc_len: 0,
            table_fill: 0,
            table_len: 0,
            skip_block_rem: 0,
            block_pos: 0,
            frame_index: 0,
            num_decoded_frame_configs: 0,
            num_decoded_frames: 0,
            gce_disposal: 0,
            gce_duration_millis: 0,
            gce_transparent: None,
            marker_recorded: false,
            marker_pos: 0,
            frame: FrameConfig::default(),
            frame_interlaced: false,
            frame_has_local_palette: false,
            frame_transparent: None,
            frame0_ready: false,
            frame_total: 0,
            frame_clip_empty: false,
            emitted: 0,
            lzw: Lzw::default(),
        }
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-time handshake. `sizeof_receiver` must be the caller's idea of
    /// this struct's size and `version` the crate's `VERSION`; a mismatch
    /// on either means caller and decoder were built against different
    /// definitions and nothing else is safe to call.
    pub fn validate(&mut self, sizeof_receiver: usize, version: u32) -> Status {
        if sizeof_receiver != mem::size_of::<Decoder>() {
            return Error::BadSizeofReceiver.into();
        }
        if version != crate::VERSION {
            return Error::BadVersion.into();
        }
        self.magic = MAGIC;
        Status::Ok
    }

    /// Successful `decode_frame_config` calls so far.
    pub fn num_decoded_frame_configs(&self) -> u64 {
        self.num_decoded_frame_configs
    }

    /// Successful `decode_frame` calls so far.
    pub fn num_decoded_frames(&self) -> u64 {
        self.num_decoded_frames
    }

    /// Parse everything up to the first frame's pixel data and describe the
    /// overall image. Valid once per session, as the first decode call.
    pub fn decode_image_config(
        &mut self,
        dst: Option<&mut ImageConfig>,
        cur: &mut IoCursor<'_>,
    ) -> Status {
        if self.magic != MAGIC {
            return Error::VersionCheckMissing.into();
        }
        match self.op {
            Op::FrameConfig | Op::Frame => return Error::BadCallSequence.into(),
            Op::ImageConfig => {}
            Op::None => {
                if self.call != Call::Start {
                    return Error::BadCallSequence.into();
                }
                self.state = State::Signature;
                self.op = Op::ImageConfig;
            }
        }
        let r = self.run_image_config(cur);
        if r.is_ok() {
            if let Some(d) = dst {
                *d = self.image_config();
            }
        }
        self.wrap(r)
    }

    /// Parse the next frame's header blocks. Skips the previous frame's
    /// pixel data if it was never decoded; on a fresh decoder, parses the
    /// image header first.
    pub fn decode_frame_config(
        &mut self,
        dst: Option<&mut FrameConfig>,
        cur: &mut IoCursor<'_>,
    ) -> Status {
        if self.magic != MAGIC {
            return Error::VersionCheckMissing.into();
        }
        match self.op {
            Op::ImageConfig | Op::Frame => return Error::BadCallSequence.into(),
            Op::FrameConfig => {}
            Op::None => {
                match self.call {
                    Call::End => return Status::EndOfData,
                    Call::Start => self.state = State::Signature,
                    Call::AwaitFrameConfig => {}
                    Call::AwaitFrame => self.state = State::SkipLiteralWidth,
                }
                self.op = Op::FrameConfig;
            }
        }
        let r = self.ensure_frame_config(cur, dst);
        self.wrap(r)
    }

    /// Decompress the current frame's pixels into `pb`, clipped to the
    /// canvas. `scratch` must be at least as long as the image config's
    /// reported bound.
    pub fn decode_frame(
        &mut self,
        pb: &mut PixelBuffer<'_>,
        cur: &mut IoCursor<'_>,
        scratch: &mut [u8],
        _options: Option<&DecodeFrameOptions>,
    ) -> Status {
        if self.magic != MAGIC {
            return Error::VersionCheckMissing.into();
        }
        match self.op {
            Op::ImageConfig | Op::FrameConfig => return Error::BadCallSequence.into(),
            Op::Frame => {}
            Op::None => {
                match self.call {
                    Call::End => return Status::EndOfData,
                    Call::Start => self.state = State::Signature,
                    Call::AwaitFrameConfig | Call::AwaitFrame => {}
                }
                self.op = Op::Frame;
            }
        }
        let r = self.run_frame(pb, cur, scratch);
        self.wrap(r)
    }

    /// Re-arm the frame-header parser at a frame boundary seen earlier, so
    /// the next `decode_frame_config` continues as a forward decode would
    /// have from there. The caller must reposition the cursor's read index
    /// to `io_position` (a value previously returned in a `FrameConfig`).
    pub fn restart_frame(&mut self, index: u64, io_position: u64) -> Status {
        if self.magic != MAGIC {
            return Error::VersionCheckMissing.into();
        }
        if !self.image_config_done {
            return Error::BadCallSequence.into();
        }
        debug!("restart to frame #{index} at stream position {io_position}");
        self.op = Op::None;
        self.call = Call::AwaitFrameConfig;
        self.state = State::BlockIntro;
        self.frame0_ready = false;
        self.frame_index = index;
        self.acc_len = 0;
        self.skip_block_rem = 0;
        self.marker_recorded = false;
        self.gce_disposal = 0;
        self.gce_duration_millis = 0;
        self.gce_transparent = None;
        Status::Ok
    }

    fn wrap(&mut self, r: Result<(), Status>) -> Status {
        match r {
            Ok(()) => {
                self.op = Op::None;
                Status::Ok
            }
            Err(s) if s.is_suspension() => s,
            Err(s) => {
                self.op = Op::None;
                s
            }
        }
    }

    fn fill(&mut self, cur: &mut IoCursor<'_>, n: usize) -> Result<(), Status> {
        while usize::from(self.acc_len) < n {
            match cur.read_u8() {
                None => return Err(Status::ShortRead),
                Some(b) => {
                    self.acc[usize::from(self.acc_len)] = b;
                    self.acc_len += 1;
                }
            }
        }
        Ok(())
    }

    fn acc_reset(&mut self) {
        self.acc_len = 0;
    }

    fn image_config(&self) -> ImageConfig {
        let w = u64::from(self.width);
        ImageConfig::new(
            PixelConfig::new(PixelFormat::IndexedBgraNonpremul, self.width, self.height),
            RangeIncl {
                min_incl: w,
                max_incl: w,
            },
            self.num_loops,
            self.first_frame_is_opaque,
        )
    }

    fn finish_image_config(&mut self, has_first_frame: bool) {
        let b = self.frame.bounds();
        self.first_frame_is_opaque = has_first_frame
            && b.min_incl_x == 0
            && b.min_incl_y == 0
            && b.max_excl_x >= self.width
            && b.max_excl_y >= self.height
            && self.frame_transparent.is_none();
        self.image_config_done = true;
        debug!(
            "image config: {}x{} loops={} first_frame_is_opaque={}",
            self.width, self.height, self.num_loops, self.first_frame_is_opaque
        );
    }

    fn publish_frame_config(&mut self, dst: Option<&mut FrameConfig>) {
        if let Some(d) = dst {
            *d = self.frame;
        }
        self.num_decoded_frame_configs += 1;
        self.frame_index = self.frame.index() + 1;
        self.call = Call::AwaitFrame;
        debug!(
            "frame config #{}: bounds ({},{})-({},{}) at {}",
            self.frame.index(),
            self.frame.bounds().min_incl_x,
            self.frame.bounds().min_incl_y,
            self.frame.bounds().max_excl_x,
            self.frame.bounds().max_excl_y,
            self.frame.io_position()
        );
    }

    fn run_image_config(&mut self, cur: &mut IoCursor<'_>) -> Result<(), Status> {
        self.run_image_header(cur)?;
        match self.run_frame_scan(cur)? {
            Scan::ConfigReady => {
                self.frame0_ready = true;
                self.finish_image_config(true);
                self.call = Call::AwaitFrameConfig;
            }
            Scan::Trailer => {
                self.finish_image_config(false);
                self.call = Call::End;
            }
        }
        Ok(())
    }

    /// Advance until the next frame config has been produced and handed to
    /// `dst`, running any pending image-header parse or frame skip first.
    /// Leaves the decoder ready to read that frame's pixel data.
    fn ensure_frame_config(
        &mut self,
        cur: &mut IoCursor<'_>,
        dst: Option<&mut FrameConfig>,
    ) -> Result<(), Status> {
        if matches!(
            self.state,
            State::Signature | State::ScreenDescriptor | State::GlobalColorTable
        ) {
            self.run_image_header(cur)?;
        }
        if self.frame0_ready {
            self.frame0_ready = false;
            self.publish_frame_config(dst);
            return Ok(());
        }
        if self.state == State::SkipLiteralWidth {
            self.fill(cur, 1)?;
            self.acc_reset();
            self.skip_block_rem = 0;
            self.state = State::SkipSubBlocks;
        }
        if matches!(
            self.state,
            State::BlockIntro
                | State::GraphicControl
                | State::ApplicationHeader
                | State::LoopCount
                | State::SkipSubBlocks
                | State::ImageDescriptor
                | State::LocalColorTable
        ) {
            match self.run_frame_scan(cur)? {
                Scan::ConfigReady => {
                    if !self.image_config_done {
                        self.finish_image_config(true);
                    }
                    self.publish_frame_config(dst);
                }
                Scan::Trailer => {
                    if !self.image_config_done {
                        self.finish_image_config(false);
                    }
                    self.call = Call::End;
                    return Err(Status::EndOfData);
                }
            }
        }
        Ok(())
    }

    fn run_frame(
        &mut self,
        pb: &mut PixelBuffer<'_>,
        cur: &mut IoCursor<'_>,
        scratch: &mut [u8],
    ) -> Result<(), Status> {
        self.ensure_frame_config(cur, None)?;
        loop {
            match self.state {
                State::LiteralWidth => {
                    self.fill(cur, 1)?;
                    let lw = self.acc[0];
                    self.acc_reset();
                    if !(2..=8).contains(&lw) {
                        return Err(Error::BadHeader.into());
                    }
                    self.lzw.restart(lw);
                    self.emitted = 0;
                    let b = self.frame.bounds();
                    self.frame_total = u64::from(b.width()) * u64::from(b.height());
                    let canvas = Rect::new(0, 0, self.width, self.height);
                    self.frame_clip_empty = b.intersect(&canvas).is_empty();
                    self.state = State::PixelData;
                }
                State::PixelData => {
                    if scratch.len() < self.width as usize {
                        return Err(Error::BadScratchLength.into());
                    }
                    self.write_palette(pb);
                    loop {
                        if self.frame_clip_empty || self.emitted >= self.frame_total {
                            self.lzw.finish(cur)?;
                            break;
                        }
                        let mut wi = 0;
                        let r = self.lzw.decode(cur, scratch, &mut wi);
                        self.flush_pixels(&scratch[..wi], pb);
                        match r {
                            Ok(()) => break,
                            Err(Status::ShortWrite) => {}
                            Err(s) => return Err(s),
                        }
                    }
                    self.num_decoded_frames += 1;
                    self.call = Call::AwaitFrameConfig;
                    self.state = State::BlockIntro;
                    debug!("frame #{} pixels decoded", self.num_decoded_frames - 1);
                    return Ok(());
                }
                _ => unreachable!("pixel decoding entered in state {:?}", self.state),
            }
        }
    }

    fn run_image_header(&mut self, cur: &mut IoCursor<'_>) -> Result<(), Status> {
        loop {
            match self.state {
                State::Signature => {
                    self.fill(cur, 6)?;
                    let ok = &self.acc[..3] == b"GIF"
                        && (&self.acc[3..6] == b"87a" || &self.acc[3..6] == b"89a");
                    self.acc_reset();
                    if !ok {
                        return Err(Error::BadHeader.into());
                    }
                    self.state = State::ScreenDescriptor;
                }
                State::ScreenDescriptor => {
                    self.fill(cur, 7)?;
                    self.width = u32::from(u16::from_le_bytes([self.acc[0], self.acc[1]]));
                    self.height = u32::from(u16::from_le_bytes([self.acc[2], self.acc[3]]));
                    let packed = self.acc[4];
                    // acc[5] (background color index) and acc[6] (pixel
                    // aspect ratio) only matter to compositors
                    let has_gct = packed & 0b1000_0000 != 0;
                    let gct_entries = 1usize << ((packed & 0b0000_0111) + 1);
                    self.acc_reset();
                    debug!(
                        "logical screen {}x{}, global color table: {}",
                        self.width,
                        self.height,
                        if has_gct { gct_entries } else { 0 }
                    );
                    if has_gct {
                        self.table_fill = 0;
                        self.table_len = 3 * gct_entries;
                        self.state = State::GlobalColorTable;
                    } else {
                        self.state = State::BlockIntro;
                    }
                }
                State::GlobalColorTable => {
                    Self::read_color_table(
                        &mut self.global_palette,
                        &mut self.table_fill,
                        self.table_len,
                        cur,
                    )?;
                    self.state = State::BlockIntro;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Scan blocks until a frame's header (graphic control + image
    /// descriptor + local color table) is assembled or the trailer is hit.
    fn run_frame_scan(&mut self, cur: &mut IoCursor<'_>) -> Result<Scan, Status> {
        loop {
            match self.state {
                State::BlockIntro => {
                    if self.acc_len == 0 {
                        // a closed stream with no trailer still ends cleanly
                        // at a block boundary
                        if cur.available() == 0 && cur.closed {
                            return Ok(Scan::Trailer);
                        }
                        self.block_pos = cur.reader_position();
                    }
                    self.fill(cur, 1)?;
                    match self.acc[0] {
                        EXTENSION_INTRODUCER => {
                            self.fill(cur, 2)?;
                            let label = self.acc[1];
                            self.acc_reset();
                            match label {
                                GRAPHIC_CONTROL_EXTENSION => {
                                    if !self.marker_recorded {
                                        self.marker_recorded = true;
                                        self.marker_pos = self.block_pos;
                                    }
                                    self.state = State::GraphicControl;
                                }
                                APPLICATION_EXTENSION => self.state = State::ApplicationHeader,
                                // comments, plain text, anything unknown:
                                // the payload is plain sub-block framing
                                _ => {
                                    self.skip_block_rem = 0;
                                    self.state = State::SkipSubBlocks;
                                }
                            }
                        }
                        IMAGE_DESCRIPTOR_LABEL => {
                            self.acc_reset();
                            if !self.marker_recorded {
                                self.marker_recorded = true;
                                self.marker_pos = self.block_pos;
                            }
                            self.state = State::ImageDescriptor;
                        }
                        TRAILER_LABEL => {
                            self.acc_reset();
                            return Ok(Scan::Trailer);
                        }
                        _ => return Err(Error::BadHeader.into()),
                    }
                }
                State::GraphicControl => {
                    self.fill(cur, 1)?;
                    let size = self.acc[0];
                    if size != 4 {
                        self.acc_reset();
                        self.skip_block_rem = size;
                        self.state = State::SkipSubBlocks;
                        continue;
                    }
                    self.fill(cur, 6)?;
                    let packed = self.acc[1];
                    self.gce_disposal = (packed >> 2) & 0b0000_0111;
                    let transparent = packed & 0b0000_0001 != 0;
                    let delay = u16::from_le_bytes([self.acc[2], self.acc[3]]);
                    self.gce_duration_millis = u32::from(delay) * 10;
                    self.gce_transparent = transparent.then_some(self.acc[4]);
                    let terminator = self.acc[5];
                    self.acc_reset();
                    if terminator == 0 {
                        self.state = State::BlockIntro;
                    } else {
                        self.skip_block_rem = terminator;
                        self.state = State::SkipSubBlocks;
                    }
                }
                State::ApplicationHeader => {
                    self.fill(cur, 1)?;
                    let size = self.acc[0];
                    if size != 11 {
                        self.acc_reset();
                        self.skip_block_rem = size;
                        self.state = State::SkipSubBlocks;
                        continue;
                    }
                    self.fill(cur, 12)?;
                    let is_netscape = &self.acc[1..12] == b"NETSCAPE2.0";
                    self.acc_reset();
                    if is_netscape {
                        self.state = State::LoopCount;
                    } else {
                        self.skip_block_rem = 0;
                        self.state = State::SkipSubBlocks;
                    }
                }
                State::LoopCount => {
                    self.fill(cur, 1)?;
                    let len = self.acc[0];
                    if len == 0 {
                        self.acc_reset();
                        self.state = State::BlockIntro;
                    } else if len == 3 {
                        self.fill(cur, 4)?;
                        if self.acc[1] == 1 {
                            let wire = u16::from_le_bytes([self.acc[2], self.acc[3]]);
                            // 0 on the wire is "forever"; N means N more
                            // plays after the first
                            self.num_loops = if wire == 0 { 0 } else { u32::from(wire) + 1 };
                            debug!("loop count: wire {} -> {}", wire, self.num_loops);
                        }
                        self.acc_reset();
                        self.skip_block_rem = 0;
                        self.state = State::SkipSubBlocks;
                    } else {
                        self.acc_reset();
                        self.skip_block_rem = len;
                        self.state = State::SkipSubBlocks;
                    }
                }
                State::SkipSubBlocks => loop {
                    if self.skip_block_rem > 0 {
                        let n = usize::from(self.skip_block_rem).min(cur.available());
                        cur.ri += n;
                        self.skip_block_rem -= n as u8;
                        if self.skip_block_rem > 0 {
                            return Err(Status::ShortRead);
                        }
                    }
                    match cur.read_u8() {
                        None => return Err(Status::ShortRead),
                        Some(0) => {
                            self.state = State::BlockIntro;
                            break;
                        }
                        Some(len) => self.skip_block_rem = len,
                    }
                },
                State::ImageDescriptor => {
                    self.fill(cur, 9)?;
                    let left = u32::from(u16::from_le_bytes([self.acc[0], self.acc[1]]));
                    let top = u32::from(u16::from_le_bytes([self.acc[2], self.acc[3]]));
                    let fw = u32::from(u16::from_le_bytes([self.acc[4], self.acc[5]]));
                    let fh = u32::from(u16::from_le_bytes([self.acc[6], self.acc[7]]));
                    let packed = self.acc[8];
                    self.acc_reset();

                    let has_lct = packed & 0b1000_0000 != 0;
                    self.frame_interlaced = packed & 0b0100_0000 != 0;
                    let lct_entries = 1usize << ((packed & 0b0000_0111) + 1);

                    let bounds = Rect::new(left, top, left + fw, top + fh);
                    // only the first frame may stretch the canvas
                    if !self.image_config_done {
                        self.width = self.width.max(bounds.max_excl_x);
                        self.height = self.height.max(bounds.max_excl_y);
                    }
                    self.frame = FrameConfig::new(
                        self.frame_index,
                        bounds,
                        self.gce_duration_millis,
                        DisposalMethod::from_u8(self.gce_disposal),
                        self.marker_pos,
                    );
                    self.frame_transparent = self.gce_transparent;
                    self.frame_has_local_palette = has_lct;
                    self.gce_disposal = 0;
                    self.gce_duration_millis = 0;
                    self.gce_transparent = None;
                    self.marker_recorded = false;

                    if has_lct {
                        self.table_fill = 0;
                        self.table_len = 3 * lct_entries;
                        self.state = State::LocalColorTable;
                    } else {
                        self.state = State::LiteralWidth;
                        return Ok(Scan::ConfigReady);
                    }
                }
                State::LocalColorTable => {
                    Self::read_color_table(
                        &mut self.local_palette,
                        &mut self.table_fill,
                        self.table_len,
                        cur,
                    )?;
                    self.state = State::LiteralWidth;
                    return Ok(Scan::ConfigReady);
                }
                _ => unreachable!("block scan entered in state {:?}", self.state),
            }
        }
    }

    fn read_color_table(
        palette: &mut [u8; PALETTE_LEN],
        fill: &mut usize,
        len: usize,
        cur: &mut IoCursor<'_>,
    ) -> Result<(), Status> {
        while *fill < len {
            let avail = cur.available();
            if avail == 0 {
                return Err(Status::ShortRead);
            }
            let n = (len - *fill).min(avail);
            palette[*fill..*fill + n].copy_from_slice(&cur.data[cur.ri..cur.ri + n]);
            cur.ri += n;
            *fill += n;
        }
        expand_palette(palette, len / 3);
        Ok(())
    }

    fn write_palette(&self, pb: &mut PixelBuffer<'_>) {
        let src = if self.frame_has_local_palette {
            &self.local_palette
        } else {
            &self.global_palette
        };
        let pal = pb.palette_mut();
        pal[..PALETTE_LEN].copy_from_slice(src);
        if let Some(t) = self.frame_transparent {
            let i = usize::from(t) * 4;
            pal[i..i + 4].copy_from_slice(&[0, 0, 0, 0]);
        }
    }

    /// Place a batch of decompressed indices, clipping to the intersection
    /// of frame bounds, canvas and destination, de-interlacing on the way.
    /// `emitted` tracks position within the frame across suspensions.
    fn flush_pixels(&mut self, batch: &[u8], pb: &mut PixelBuffer<'_>) {
        let fb = self.frame.bounds();
        let fw = u64::from(fb.width());
        let fh = fb.height();
        if fw == 0 {
            self.emitted += batch.len() as u64;
            return;
        }
        let clip_w = fb.max_excl_x.min(self.width).min(pb.pixel_config().width());
        let clip_h = fb
            .max_excl_y
            .min(self.height)
            .min(pb.pixel_config().height());
        let stride = pb.stride();
        let plane = pb.plane_mut();

        let mut n = self.emitted;
        let mut off = 0usize;
        while off < batch.len() {
            let row = (n / fw) as u32;
            let col = (n % fw) as u32;
            if row >= fh {
                // surplus compressed data past the frame's pixel count
                n += (batch.len() - off) as u64;
                break;
            }
            let run = ((fw - u64::from(col)) as usize).min(batch.len() - off);
            let dy = fb.min_incl_y
                + if self.frame_interlaced {
                    interlaced_row(fh, row)
                } else {
                    row
                };
            if dy < clip_h {
                let dx0 = fb.min_incl_x + col;
                if dx0 < clip_w {
                    let count = run.min((clip_w - dx0) as usize);
                    let dst0 = dy as usize * stride + dx0 as usize;
                    plane[dst0..dst0 + count].copy_from_slice(&batch[off..off + count]);
                }
            }
            off += run;
            n += run as u64;
        }
        self.emitted = n;
    }
}

/// Expand `entries` RGB triples sitting at the front of `palette` into
/// 4-byte BGRA values, zeroing the unused tail. Walking highest entry first
/// keeps each triple intact until it is read: the writes for entry j only
/// touch bytes at 4j and up, past the triple of any i < j.
fn expand_palette(palette: &mut [u8; PALETTE_LEN], entries: usize) {
    let mut i = entries;
    while i > 0 {
        i -= 1;
        let r = palette[3 * i];
        let g = palette[3 * i + 1];
        let b = palette[3 * i + 2];
        palette[4 * i] = b;
        palette[4 * i + 1] = g;
        palette[4 * i + 2] = r;
        palette[4 * i + 3] = 0xff;
    }
    for byte in &mut palette[4 * entries..] {
        *byte = 0;
    }
}

/// Destination row for the `r`-th stored row of an interlaced frame of
/// height `h`. The four passes cover rows 0,8,16,..., then 4,12,..., then
/// 2,6,10,..., then 1,3,5,...
fn interlaced_row(h: u32, r: u32) -> u32 {
    let pass0 = (h + 7) / 8;
    let pass1 = (h + 3) / 8;
    let pass2 = (h + 1) / 4;
    if r < pass0 {
        return 8 * r;
    }
    let r = r - pass0;
    if r < pass1 {
        return 8 * r + 4;
    }
    let r = r - pass1;
    if r < pass2 {
        return 4 * r + 2;
    }
    let r = r - pass2;
    2 * r + 1
}
