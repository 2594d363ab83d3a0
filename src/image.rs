//! Square row-major intensity images.

use crate::error::{Result, SobelError};
use std::ops::{Index, IndexMut};

/// An N×N grid of 8-bit intensities, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalImage {
    n: usize,
    pixels: Vec<u8>,
}

impl GlobalImage {
    /// All-zero N×N image.
    pub fn zeroed(n: usize) -> Self {
        Self {
            n,
            pixels: vec![0; n * n],
        }
    }

    /// Build an image from `f(row, col)`.
    pub fn from_fn(n: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut pixels = Vec::with_capacity(n * n);
        for row in 0..n {
            for col in 0..n {
                pixels.push(f(row, col));
            }
        }
        Self { n, pixels }
    }

    /// The deterministic test pattern `(31*row + 17*col) mod 256`.
    pub fn synthetic(n: usize) -> Self {
        Self::from_fn(n, |row, col| ((row * 31 + col * 17) % 256) as u8)
    }

    /// Wrap an existing row-major buffer.
    pub fn from_pixels(n: usize, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != n * n {
            return Err(SobelError::Configuration(format!(
                "image buffer has {} pixels, expected {n}x{n}",
                pixels.len()
            )));
        }
        Ok(Self { n, pixels })
    }

    /// Side length.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        (row < self.n && col < self.n).then(|| self.pixels[row * self.n + col])
    }

    /// One full row.
    pub fn row(&self, row: usize) -> &[u8] {
        assert!(row < self.n, "row {row} out of bounds for {}x{} image", self.n, self.n);
        &self.pixels[row * self.n..(row + 1) * self.n]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [u8] {
        assert!(row < self.n, "row {row} out of bounds for {}x{} image", self.n, self.n);
        &mut self.pixels[row * self.n..(row + 1) * self.n]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.pixels
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// 3×3 neighborhood centred on `(row, col)`; the centre must not touch the border.
    pub fn window(&self, row: usize, col: usize) -> [[u8; 3]; 3] {
        assert!(
            row >= 1 && col >= 1 && row + 1 < self.n && col + 1 < self.n,
            "window at ({row}, {col}) leaves the {}x{} image",
            self.n,
            self.n
        );
        let mut window = [[0u8; 3]; 3];
        for (dr, line) in window.iter_mut().enumerate() {
            line.copy_from_slice(&self.row(row + dr - 1)[col - 1..col + 2]);
        }
        window
    }
}

impl Index<(usize, usize)> for GlobalImage {
    type Output = u8;

    fn index(&self, (row, col): (usize, usize)) -> &u8 {
        assert!(
            row < self.n && col < self.n,
            "pixel ({row}, {col}) out of bounds for {}x{} image",
            self.n,
            self.n
        );
        &self.pixels[row * self.n + col]
    }
}

impl IndexMut<(usize, usize)> for GlobalImage {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut u8 {
        assert!(
            row < self.n && col < self.n,
            "pixel ({row}, {col}) out of bounds for {}x{} image",
            self.n,
            self.n
        );
        &mut self.pixels[row * self.n + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_pattern_wraps_at_256() {
        let img = GlobalImage::synthetic(16);
        assert_eq!(img[(0, 0)], 0);
        assert_eq!(img[(1, 2)], 31 + 34);
        // 31*8 + 17*1 = 265 -> 9
        assert_eq!(img[(8, 1)], 9);
    }

    #[test]
    fn window_reads_the_neighborhood() {
        let img = GlobalImage::synthetic(8);
        let w = img.window(1, 1);
        assert_eq!(w, [[0, 17, 34], [31, 48, 65], [62, 79, 96]]);
    }

    #[test]
    fn get_is_bounds_checked() {
        let img = GlobalImage::zeroed(4);
        assert_eq!(img.get(3, 3), Some(0));
        assert_eq!(img.get(4, 0), None);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn index_panics_outside_the_image() {
        let img = GlobalImage::zeroed(4);
        let _ = img[(0, 4)];
    }

    #[test]
    fn from_pixels_checks_length() {
        assert!(GlobalImage::from_pixels(3, vec![0; 9]).is_ok());
        assert!(matches!(
            GlobalImage::from_pixels(3, vec![0; 8]),
            Err(SobelError::Configuration(_))
        ));
    }
}
