//! Frequency-domain fingerprint extraction.
//!
//! Generative models leave periodic artifacts in the frequency spectrum that
//! are hard to see in pixel space. This module converts an image into a
//! fixed-size fingerprint: grayscale intensities → 2D DFT → zero-frequency
//! shift to center → `ln(1 + magnitude)` → bilinear resize to 32×32 →
//! row-major flatten. The pipeline is pure and deterministic; identical
//! pixels always produce an identical fingerprint.

use authentrace_core::{AuthentraceError, Result};
use image::DynamicImage;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Side length of the resized spectrum grid.
pub const FINGERPRINT_SIDE: usize = 32;

/// Length of the flattened fingerprint vector.
pub const FINGERPRINT_DIM: usize = FINGERPRINT_SIDE * FINGERPRINT_SIDE;

/// Extract the frequency fingerprint of an image.
///
/// The returned vector always has exactly [`FINGERPRINT_DIM`] entries,
/// regardless of the input image size.
///
/// # Errors
///
/// Returns [`AuthentraceError::Input`] for an empty image and
/// [`AuthentraceError::Computation`] if the transform produces non-finite
/// values.
pub fn extract(image: &DynamicImage) -> Result<Vec<f32>> {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(AuthentraceError::input(
            "cannot extract frequency fingerprint of an empty image",
        ));
    }
    let (w, h) = (width as usize, height as usize);

    // Row-major complex buffer of raw 0-255 intensities.
    let mut buf: Vec<Complex<f32>> = gray
        .pixels()
        .map(|p| Complex::new(f32::from(p.0[0]), 0.0))
        .collect();

    // 2D DFT as a row pass followed by a column pass.
    let mut planner = FftPlanner::<f32>::new();
    let row_fft = planner.plan_fft_forward(w);
    for row in buf.chunks_exact_mut(w) {
        row_fft.process(row);
    }
    let col_fft = planner.plan_fft_forward(h);
    let mut column = vec![Complex::new(0.0, 0.0); h];
    for x in 0..w {
        for (y, slot) in column.iter_mut().enumerate() {
            *slot = buf[y * w + x];
        }
        col_fft.process(&mut column);
        for (y, value) in column.iter().enumerate() {
            buf[y * w + x] = *value;
        }
    }

    // Shift the zero-frequency component to the center, then compress the
    // dynamic range with ln(1 + |F|). The shift comes first so the grid is
    // the conventional centered spectrum before any rescaling.
    let mut magnitude = vec![0.0_f32; w * h];
    for y in 0..h {
        let shifted_y = (y + h / 2) % h;
        for x in 0..w {
            let shifted_x = (x + w / 2) % w;
            magnitude[shifted_y * w + shifted_x] = buf[y * w + x].norm().ln_1p();
        }
    }

    let fingerprint = resize_bilinear(&magnitude, w, h, FINGERPRINT_SIDE);
    debug_assert_eq!(fingerprint.len(), FINGERPRINT_DIM);

    if fingerprint.iter().any(|v| !v.is_finite()) {
        return Err(AuthentraceError::computation(
            "frequency",
            format!("non-finite value in {w}x{h} magnitude spectrum"),
        ));
    }
    Ok(fingerprint)
}

/// Bilinear resampling of a row-major grid onto a `side`×`side` grid.
fn resize_bilinear(src: &[f32], w: usize, h: usize, side: usize) -> Vec<f32> {
    let mut out = vec![0.0_f32; side * side];
    let scale_x = w as f32 / side as f32;
    let scale_y = h as f32 / side as f32;
    for oy in 0..side {
        let fy = ((oy as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (h - 1) as f32);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(h - 1);
        let ty = fy - y0 as f32;
        for ox in 0..side {
            let fx = ((ox as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (w - 1) as f32);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);
            let tx = fx - x0 as f32;

            let top = src[y0 * w + x0] * (1.0 - tx) + src[y0 * w + x1] * tx;
            let bottom = src[y1 * w + x0] * (1.0 - tx) + src[y1 * w + x1] * tx;
            out[oy * side + ox] = top * (1.0 - ty) + bottom * ty;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_fingerprint_length_is_fixed() {
        for (w, h) in [(8, 8), (31, 17), (224, 224), (640, 480)] {
            let fp = extract(&gradient_image(w, h)).unwrap();
            assert_eq!(fp.len(), FINGERPRINT_DIM, "size {w}x{h}");
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let img = gradient_image(64, 48);
        let a = extract(&img).unwrap();
        let b = extract(&img).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_black_image_has_zero_spectrum() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(224, 224, Luma([0])));
        let fp = extract(&img).unwrap();
        assert!(fp.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_constant_image_concentrates_dc_term() {
        // A constant image has all its energy in the zero-frequency bin,
        // which the shift places at the center of the grid.
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([200])));
        let fp = extract(&img).unwrap();
        let center = fp[(FINGERPRINT_SIDE / 2) * FINGERPRINT_SIDE + FINGERPRINT_SIDE / 2];
        let max = fp.iter().cloned().fold(0.0_f32, f32::max);
        assert!(center > 0.0);
        assert_eq!(center, max);
    }

    #[test]
    fn test_color_input_matches_grayscale_conversion() {
        let rgb = RgbImage::from_fn(32, 32, |x, y| {
            image::Rgb([(x * 8) as u8, (y * 8) as u8, 128])
        });
        let color = DynamicImage::ImageRgb8(rgb);
        let gray = DynamicImage::ImageLuma8(color.to_luma8());
        assert_eq!(extract(&color).unwrap(), extract(&gray).unwrap());
    }

    #[test]
    fn test_tiny_image_still_produces_full_fingerprint() {
        let fp = extract(&gradient_image(2, 3)).unwrap();
        assert_eq!(fp.len(), FINGERPRINT_DIM);
        assert!(fp.iter().all(|v| v.is_finite()));
    }
}
