//! Result reporting: summary lines, small-image snippets and PGM export.

use crate::error::Result;
use crate::image::GlobalImage;
use crate::topology::ProcessGrid;
use std::io::Write;

/// Largest image for which a snippet is printed.
pub const SNIPPET_MAX_N: usize = 16;

/// Snippets show at most this many rows and columns.
const SNIPPET_SIDE: usize = 8;

/// Write the completion line of a 2D run.
///
/// ```text
/// MPI 2D Sobel completed: N=16 using 2x2 grid (time_ms=0.042)
/// ```
pub fn write_summary<W: Write>(
    writer: &mut W,
    n: usize,
    grid: ProcessGrid,
    time_ms: f64,
) -> Result<()> {
    writeln!(
        writer,
        "MPI 2D Sobel completed: N={} using {}x{} grid (time_ms={})",
        n,
        grid.rows(),
        grid.cols(),
        time_ms
    )?;
    Ok(())
}

/// Write the top-left corner of `image` (up to 8×8), one row per line,
/// when the image is small enough to be worth looking at.
pub fn write_snippet<W: Write>(writer: &mut W, image: &GlobalImage) -> Result<()> {
    if image.n() > SNIPPET_MAX_N {
        return Ok(());
    }
    let side = image.n().min(SNIPPET_SIDE);
    for row in 0..side {
        let line: Vec<String> = image.row(row)[..side].iter().map(|v| v.to_string()).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

/// Write `image` as a binary (P5) PGM.
pub fn write_pgm<W: Write>(writer: &mut W, image: &GlobalImage) -> Result<()> {
    write!(writer, "P5\n{} {}\n255\n", image.n(), image.n())?;
    writer.write_all(image.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_format() {
        let mut buf = Vec::new();
        write_summary(&mut buf, 16, ProcessGrid::new(2, 2).unwrap(), 1.5).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "MPI 2D Sobel completed: N=16 using 2x2 grid (time_ms=1.5)\n"
        );
    }

    #[test]
    fn snippet_is_capped_at_eight() {
        let image = GlobalImage::from_fn(12, |r, c| (r * 12 + c) as u8);
        let mut buf = Vec::new();
        write_snippet(&mut buf, &image).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "0 1 2 3 4 5 6 7");
        assert_eq!(lines[1].split(' ').count(), 8);
    }

    #[test]
    fn large_images_get_no_snippet() {
        let mut buf = Vec::new();
        write_snippet(&mut buf, &GlobalImage::zeroed(17)).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn pgm_header_and_payload() {
        let image = GlobalImage::from_fn(2, |r, c| (r * 2 + c) as u8 * 50);
        let mut buf = Vec::new();
        write_pgm(&mut buf, &image).unwrap();
        let header = b"P5\n2 2\n255\n";
        assert_eq!(&buf[..header.len()], header);
        assert_eq!(&buf[header.len()..], &[0, 50, 100, 150]);
    }
}
