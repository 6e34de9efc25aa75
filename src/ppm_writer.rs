use std::fs::File;
use std::io::{prelude::*, BufWriter};

use anyhow::Result;

const MAGIC_NUMBER: &[u8] = b"P3";

/// Dump one decoded canvas as a plain-text PPM, resolving each index
/// through a BGRA palette (4 bytes per entry).
pub fn write_ppm(
    filename: &str,
    width: u32,
    height: u32,
    indexes: &[u8],
    palette: &[u8],
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }

    let file = File::create(filename)?;
    let mut writer = BufWriter::new(&file);

    writer.write_all(MAGIC_NUMBER)?;
    writer.write_all(b"\n")?;
    writer.write_all(format!("{} {}", width, height).as_bytes())?;
    writer.write_all(b" 255")?;
    writer.write_all(b"\n")?;

    for index_row in indexes.chunks(width as usize).take(height as usize) {
        for (i, idx) in index_row.iter().enumerate() {
            let entry = usize::from(*idx) * 4;
            let blue = palette[entry];
            let green = palette[entry + 1];
            let red = palette[entry + 2];

            writer.write_all(format!("{: >3} {: >3} {: >3}", red, green, blue).as_bytes())?;
            if i != (width - 1) as usize {
                writer.write_all(b" ")?;
            }
        }
        writer.write_all(b"\n")?;
    }

    Ok(())
}
