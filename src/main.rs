use std::env;
use std::fs::{self, File};
use std::io::Read;
use std::mem;

use anyhow::{bail, Context, Result};
use log::info;

use trickle::{
    Decoder, FrameConfig, ImageConfig, IoCursor, PixelBuffer, Status, PALETTE_LEN, VERSION,
};

mod ppm_writer;

/// The input never sits in memory whole; it streams through this window.
const WINDOW_LEN: usize = 1 << 16;

fn refill(cur: &mut IoCursor<'_>, file: &mut File) -> Result<()> {
    if cur.closed {
        bail!("input ended mid-stream");
    }
    cur.compact();
    let n = file.read(&mut cur.data[cur.wi..])?;
    cur.wi += n;
    if n == 0 {
        cur.closed = true;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let path = args.next().context("usage: trickle <file.gif> [out-dir]")?;
    let out_dir = args.next().unwrap_or_else(|| String::from("frames"));
    fs::create_dir_all(&out_dir)?;

    let mut file = File::open(&path).with_context(|| format!("opening {path}"))?;
    let mut window = vec![0u8; WINDOW_LEN];
    let mut cur = IoCursor::new(&mut window);

    let mut dec = Box::new(Decoder::new());
    let status = dec.validate(mem::size_of::<Decoder>(), VERSION);
    if !status.is_ok() {
        bail!("validate: {status}");
    }

    let mut config = ImageConfig::default();
    loop {
        match dec.decode_image_config(Some(&mut config), &mut cur) {
            Status::Ok => break,
            Status::ShortRead => refill(&mut cur, &mut file)?,
            status => bail!("decode_image_config: {status}"),
        }
    }

    let width = config.pixel_config().width();
    let height = config.pixel_config().height();
    info!("{path}: {width}x{height}, loop count {}", config.num_loops());

    let mut palette = vec![0u8; PALETTE_LEN];
    let mut plane = vec![0u8; width as usize * height as usize];
    let mut scratch = vec![0u8; config.workbuf_len().max_incl as usize];

    let mut written = 0usize;
    'frames: loop {
        let mut fc = FrameConfig::default();
        loop {
            match dec.decode_frame_config(Some(&mut fc), &mut cur) {
                Status::Ok => break,
                Status::ShortRead => refill(&mut cur, &mut file)?,
                Status::EndOfData => break 'frames,
                status => bail!("decode_frame_config: {status}"),
            }
        }

        loop {
            let mut pb = PixelBuffer::from_slices(
                *config.pixel_config(),
                &mut palette,
                &mut plane,
                width as usize,
            )
            .context("pixel buffer layout")?;
            match dec.decode_frame(&mut pb, &mut cur, &mut scratch, None) {
                Status::Ok => break,
                Status::ShortRead => refill(&mut cur, &mut file)?,
                status => bail!("decode_frame #{}: {status}", fc.index()),
            }
        }

        ppm_writer::write_ppm(
            &format!("{out_dir}/frame_{}.ppm", fc.index()),
            width,
            height,
            &plane,
            &palette,
        )?;
        written += 1;
    }

    info!(
        "decoded {} frames, wrote {written} files",
        dec.num_decoded_frames()
    );
    Ok(())
}
