//! Pixel-level primitives used by grid detection.
//!
//! Everything here works on owned 8-bit single-channel buffers
//! ([`GrayImage`]) and returns a new buffer; inputs are never modified. A
//! pixel value of `255` is foreground ("ink" once inverted), `0` is
//! background.

use image::{GrayImage, Luma};

/// Adaptive mean threshold.
///
/// A pixel becomes `255` when it is brighter than the mean of its
/// `block × block` neighbourhood minus `offset`, otherwise `0`. Borders
/// replicate the edge pixels. Table borders and glyphs come out as `0`
/// regardless of how bright the surrounding region is.
pub fn adaptive_threshold(gray: &GrayImage, block: u32, offset: i32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let r = (block / 2) as i64;
    let integral = ReplicatedIntegral::new(gray, r as usize);
    let area = ((2 * r + 1) * (2 * r + 1)) as u64;

    for y in 0..h {
        for x in 0..w {
            let sum = integral.window_sum(x as usize, y as usize);
            // Rounded integer mean, compared the way OpenCV's mean method does.
            let mean = ((sum + area / 2) / area) as i32;
            let v = gray.get_pixel(x, y)[0] as i32;
            let bin = if v > mean - offset { 255 } else { 0 };
            out.put_pixel(x, y, Luma([bin]));
        }
    }
    out
}

/// Summed-area table over an edge-replicated copy of the image.
struct ReplicatedIntegral {
    /// Width of the padded image plus one.
    stride: usize,
    radius: usize,
    sums: Vec<u64>,
}

impl ReplicatedIntegral {
    fn new(gray: &GrayImage, radius: usize) -> Self {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let pw = w + 2 * radius;
        let ph = h + 2 * radius;
        let stride = pw + 1;
        let mut sums = vec![0u64; stride * (ph + 1)];

        for py in 0..ph {
            let sy = py.saturating_sub(radius).min(h - 1);
            let mut row_sum = 0u64;
            for px in 0..pw {
                let sx = px.saturating_sub(radius).min(w - 1);
                row_sum += gray.get_pixel(sx as u32, sy as u32)[0] as u64;
                sums[(py + 1) * stride + px + 1] = sums[py * stride + px + 1] + row_sum;
            }
        }

        Self {
            stride,
            radius,
            sums,
        }
    }

    /// Sum of the `(2r+1)²` window centred on unpadded pixel `(x, y)`.
    fn window_sum(&self, x: usize, y: usize) -> u64 {
        // In padded coordinates the window spans [x, x + 2r] × [y, y + 2r].
        let x0 = x;
        let y0 = y;
        let x1 = x + 2 * self.radius + 1;
        let y1 = y + 2 * self.radius + 1;
        let at = |xx: usize, yy: usize| self.sums[yy * self.stride + xx];
        at(x1, y1) + at(x0, y0) - at(x0, y1) - at(x1, y0)
    }
}

/// Swap foreground and background.
pub fn invert(bin: &GrayImage) -> GrayImage {
    let mut out = bin.clone();
    for p in out.pixels_mut() {
        p[0] = 255 - p[0];
    }
    out
}

/// Morphological opening with a `1 × len` vertical structuring element.
///
/// Erosion keeps a pixel only when the whole vertical window around it is
/// foreground; the following dilation grows the survivors back to their
/// original extent. Anything shorter than `len` rows (text strokes,
/// horizontal rules) disappears, long vertical runs survive.
pub fn open_vertical(bin: &GrayImage, len: u32) -> GrayImage {
    let eroded = vertical_filter(bin, len, Morph::Erode);
    vertical_filter(&eroded, len, Morph::Dilate)
}

#[derive(Clone, Copy)]
enum Morph {
    Erode,
    Dilate,
}

fn vertical_filter(bin: &GrayImage, len: u32, op: Morph) -> GrayImage {
    let (w, h) = bin.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let len = len.max(1) as usize;
    let above = len / 2;
    let below = len - 1 - above;
    let h = h as usize;

    // Per-column prefix count of foreground pixels; reused across columns.
    let mut prefix = vec![0usize; h + 1];
    for x in 0..w {
        for y in 0..h {
            let fg = (bin.get_pixel(x, y as u32)[0] != 0) as usize;
            prefix[y + 1] = prefix[y] + fg;
        }
        for y in 0..h {
            // Out-of-image rows never veto erosion nor trigger dilation.
            let lo = y.saturating_sub(above);
            let hi = (y + below).min(h - 1);
            let count = prefix[hi + 1] - prefix[lo];
            let keep = match op {
                Morph::Erode => count == hi + 1 - lo,
                Morph::Dilate => count > 0,
            };
            if keep {
                out.put_pixel(x, y as u32, Luma([255]));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    #[test]
    fn threshold_marks_dark_line_as_background() {
        let mut g = white(40, 40);
        for y in 0..40 {
            g.put_pixel(20, y, Luma([120]));
        }
        let bin = adaptive_threshold(&g, 11, 2);
        assert_eq!(bin.get_pixel(20, 10)[0], 0);
        assert_eq!(bin.get_pixel(21, 10)[0], 255);
        assert_eq!(bin.get_pixel(5, 5)[0], 255);
    }

    #[test]
    fn threshold_tolerates_uneven_brightness() {
        // Left half is much darker than the right half; a line on each side
        // must still be picked out.
        let mut g = GrayImage::new(60, 30);
        for (x, _, p) in g.enumerate_pixels_mut() {
            p[0] = if x < 30 { 110 } else { 250 };
        }
        for y in 0..30 {
            g.put_pixel(10, y, Luma([40]));
            g.put_pixel(50, y, Luma([150]));
        }
        let bin = adaptive_threshold(&g, 11, 2);
        assert_eq!(bin.get_pixel(10, 15)[0], 0);
        assert_eq!(bin.get_pixel(50, 15)[0], 0);
        assert_eq!(bin.get_pixel(5, 15)[0], 255);
        assert_eq!(bin.get_pixel(55, 15)[0], 255);
    }

    #[test]
    fn opening_keeps_long_vertical_runs_only() {
        let mut ink = GrayImage::new(20, 100);
        for y in 0..100 {
            ink.put_pixel(3, y, Luma([255]));
        }
        // short glyph stroke
        for y in 40..52 {
            ink.put_pixel(10, y, Luma([255]));
        }
        // horizontal rule
        for x in 0..20 {
            ink.put_pixel(x, 70, Luma([255]));
        }
        let mask = open_vertical(&ink, 30);
        assert!((0..100).all(|y| mask.get_pixel(3, y)[0] == 255));
        assert!((0..100).all(|y| mask.get_pixel(10, y)[0] == 0));
        assert_eq!(mask.get_pixel(15, 70)[0], 0);
    }

    #[test]
    fn invert_swaps_values() {
        let bin = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        assert_eq!(invert(&bin).into_raw(), vec![255, 0]);
    }
}
