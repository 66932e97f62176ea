//! 64-bit perceptual hashes.
//!
//! - **average**: 8×8 grayscale thumbnail, bit set where a pixel is above the mean.
//! - **difference**: 9×8 grayscale thumbnail, bit set where a pixel is darker than its
//!   right neighbour.
//! - **perception**: 64×64 grayscale thumbnail, 2-D DCT, bit set where a
//!   low-frequency coefficient (top-left 8×8) is above their median.
//!
//! Similar images produce hashes with a small Hamming distance.

use std::f64::consts::PI;
use std::fmt;
use std::sync::OnceLock;

use image::DynamicImage;
use image::imageops::FilterType;

use crate::error::ReplayError;

const DCT_SIZE: usize = 64;
const LOW_FREQ: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Average,
    Difference,
    Perception,
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHash {
    kind: HashKind,
    bits: u64,
}

impl ImageHash {
    pub fn new(kind: HashKind, bits: u64) -> Self {
        Self { kind, bits }
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Hamming distance to a hash of the same kind.
    pub fn distance(&self, other: &ImageHash) -> Result<u32, ReplayError> {
        if self.kind != other.kind {
            return Err(ReplayError::Other(format!(
                "cannot compare {} hash with {} hash",
                self.kind, other.kind
            )));
        }
        Ok((self.bits ^ other.bits).count_ones())
    }

    pub fn average(img: &DynamicImage) -> Self {
        let pixels = grayscale(img, LOW_FREQ as u32, LOW_FREQ as u32);
        let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
        Self::new(HashKind::Average, pack_bits(pixels.iter().map(|&p| p > mean)))
    }

    pub fn difference(img: &DynamicImage) -> Self {
        let w = LOW_FREQ + 1;
        let pixels = grayscale(img, w as u32, LOW_FREQ as u32);
        let bits = (0..LOW_FREQ).flat_map(|y| {
            let row = &pixels[y * w..(y + 1) * w];
            (0..LOW_FREQ).map(move |x| row[x] < row[x + 1])
        });
        Self::new(HashKind::Difference, pack_bits(bits))
    }

    pub fn perception(img: &DynamicImage) -> Self {
        let pixels = grayscale(img, DCT_SIZE as u32, DCT_SIZE as u32);
        let coeffs = dct_2d(&pixels);

        let low: Vec<f64> = (0..LOW_FREQ)
            .flat_map(|y| (0..LOW_FREQ).map(move |x| (x, y)))
            .map(|(x, y)| coeffs[y * DCT_SIZE + x])
            .collect();
        let median = median(&mut low.clone());
        Self::new(HashKind::Perception, pack_bits(low.iter().map(|&c| c > median)))
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:016x}", self.kind, self.bits)
    }
}

// ── Internal ─────────────────────────────────────────────────────

/// Resize to `w × h` and return row-major luma values.
fn grayscale(img: &DynamicImage, w: u32, h: u32) -> Vec<f64> {
    if img.width() == 0 || img.height() == 0 {
        return vec![0.0; (w * h) as usize];
    }
    img.resize_exact(w, h, FilterType::Triangle)
        .to_luma8()
        .pixels()
        .map(|p| p.0[0] as f64)
        .collect()
}

/// First bit is the most significant.
fn pack_bits(bits: impl Iterator<Item = bool>) -> u64 {
    bits.take(64).fold(0u64, |acc, bit| (acc << 1) | bit as u64)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn cos_table() -> &'static [f64] {
    static TABLE: OnceLock<Vec<f64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let n = DCT_SIZE as f64;
        (0..DCT_SIZE)
            .flat_map(|k| (0..DCT_SIZE).map(move |i| (k, i)))
            .map(|(k, i)| (PI / n * (i as f64 + 0.5) * k as f64).cos())
            .collect()
    })
}

fn dct_1d(input: &[f64], out: &mut [f64]) {
    let table = cos_table();
    for (k, slot) in out.iter_mut().enumerate() {
        let basis = &table[k * DCT_SIZE..(k + 1) * DCT_SIZE];
        *slot = input.iter().zip(basis).map(|(x, c)| x * c).sum();
    }
}

/// Unnormalised DCT-II on a `DCT_SIZE × DCT_SIZE` block, rows then columns.
fn dct_2d(pixels: &[f64]) -> Vec<f64> {
    let mut rows = vec![0.0; DCT_SIZE * DCT_SIZE];
    for y in 0..DCT_SIZE {
        let range = y * DCT_SIZE..(y + 1) * DCT_SIZE;
        dct_1d(&pixels[range.clone()], &mut rows[range]);
    }

    let mut out = vec![0.0; DCT_SIZE * DCT_SIZE];
    let mut column = [0.0; DCT_SIZE];
    let mut transformed = [0.0; DCT_SIZE];
    for x in 0..DCT_SIZE {
        for y in 0..DCT_SIZE {
            column[y] = rows[y * DCT_SIZE + x];
        }
        dct_1d(&column, &mut transformed);
        for y in 0..DCT_SIZE {
            out[y * DCT_SIZE + x] = transformed[y];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(w: u32, h: u32, invert: bool) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, _| {
            let v = (x * 255 / w.max(1)) as u8;
            let v = if invert { 255 - v } else { v };
            Rgb([v, v, v])
        }))
    }

    #[test]
    fn identical_images_have_zero_distance() {
        let a = gradient(100, 100, false);
        let b = gradient(100, 100, false);
        assert_eq!(ImageHash::average(&a).distance(&ImageHash::average(&b)).unwrap(), 0);
        assert_eq!(
            ImageHash::difference(&a).distance(&ImageHash::difference(&b)).unwrap(),
            0
        );
        assert_eq!(
            ImageHash::perception(&a).distance(&ImageHash::perception(&b)).unwrap(),
            0
        );
    }

    #[test]
    fn inverted_gradient_is_far_apart() {
        let a = gradient(64, 64, false);
        let b = gradient(64, 64, true);
        assert!(ImageHash::average(&a).distance(&ImageHash::average(&b)).unwrap() > 16);
        assert_eq!(
            ImageHash::difference(&a).distance(&ImageHash::difference(&b)).unwrap(),
            64
        );
    }

    #[test]
    fn mismatched_kinds_cannot_be_compared() {
        let a = ImageHash::new(HashKind::Average, 0);
        let b = ImageHash::new(HashKind::Perception, 0);
        assert!(a.distance(&b).is_err());
    }

    #[test]
    fn pack_bits_is_msb_first() {
        assert_eq!(pack_bits([true, false, true].into_iter()), 0b101);
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
