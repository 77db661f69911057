//! Structural checks applied to every fetched image before it is kept.
use image::ImageError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_MIN_SIZE: usize = 1000;

/// Rejects empty or placeholder responses, and optionally dark or flat images.
///
/// Brightness and contrast thresholds are on the 0-255 luma scale and are off
/// when unset. Setting both to exactly zero turns the gate off entirely. An image
/// that cannot be decoded for the brightness check is accepted.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct QualityGate {
    pub min_size: usize,
    pub min_brightness: Option<f64>,
    pub min_std_dev: Option<f64>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            min_brightness: None,
            min_std_dev: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LumaStats {
    mean: f64,
    std_dev: f64,
}

impl QualityGate {
    pub fn new(min_size: usize, min_brightness: Option<f64>, min_std_dev: Option<f64>) -> Self {
        Self {
            min_size,
            min_brightness,
            min_std_dev,
        }
    }

    fn bypassed(&self) -> bool {
        self.min_brightness == Some(0.0) && self.min_std_dev == Some(0.0)
    }

    fn checks_pixels(&self) -> bool {
        let active = |t: Option<f64>| t.is_some_and(|v| v > 0.0);
        active(self.min_brightness) || active(self.min_std_dev)
    }

    pub fn accepts(&self, bytes: &[u8]) -> bool {
        if self.bypassed() {
            return true;
        }
        if bytes.len() < self.min_size {
            warn!("Image too small - size: {} bytes", bytes.len());
            return false;
        }
        if !self.checks_pixels() {
            return true;
        }

        match luma_stats(bytes) {
            Ok(stats) => {
                debug!(
                    "Image brightness {:.1}, std dev {:.1}",
                    stats.mean, stats.std_dev
                );
                let bright_enough = self.min_brightness.map_or(true, |min| stats.mean >= min);
                let contrast_enough = self.min_std_dev.map_or(true, |min| stats.std_dev >= min);
                if !bright_enough || !contrast_enough {
                    warn!(
                        "Image failed quality check (brightness {:.1}, std dev {:.1})",
                        stats.mean, stats.std_dev
                    );
                }
                bright_enough && contrast_enough
            }
            Err(e) => {
                warn!("Unable to validate image, accepting it: {e}");
                true
            }
        }
    }
}

fn luma_stats(bytes: &[u8]) -> Result<LumaStats, ImageError> {
    let luma = image::load_from_memory(bytes)?.to_luma8();
    let count = luma.as_raw().len();
    if count == 0 {
        return Ok(LumaStats {
            mean: 0.0,
            std_dev: 0.0,
        });
    }
    let mean = luma.as_raw().iter().map(|&p| f64::from(p)).sum::<f64>() / count as f64;
    let variance = luma
        .as_raw()
        .iter()
        .map(|&p| (f64::from(p) - mean).powi(2))
        .sum::<f64>()
        / count as f64;
    Ok(LumaStats {
        mean,
        std_dev: variance.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, RgbImage};
    use std::io::Cursor;

    fn png(img: image::DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(vec![]);
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn noisy_png() -> Vec<u8> {
        // Pseudo-random pixels so the PNG stays above the size threshold
        let mut state: u32 = 0x1234_5678;
        let img = RgbImage::from_fn(64, 64, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            image::Rgb([r, g, b])
        });
        png(image::DynamicImage::ImageRgb8(img))
    }

    #[test]
    fn test_small_buffer_rejected() {
        assert!(!QualityGate::default().accepts(&[7u8; 500]));
    }

    #[test]
    fn test_large_buffer_accepted() {
        assert!(QualityGate::default().accepts(&[7u8; 5000]));
    }

    #[test]
    fn test_zero_thresholds_bypass() {
        let gate = QualityGate::new(DEFAULT_MIN_SIZE, Some(0.0), Some(0.0));
        assert!(gate.accepts(&[7u8; 10]));
        assert!(gate.accepts(&[]));
    }

    #[test]
    fn test_undecodable_image_fails_open() {
        let gate = QualityGate::new(DEFAULT_MIN_SIZE, Some(40.0), Some(10.0));
        assert!(gate.accepts(&[7u8; 5000]));
    }

    #[test]
    fn test_dark_image_rejected() {
        let img = image::GrayImage::from_pixel(200, 200, Luma([3u8]));
        let bytes = png(image::DynamicImage::ImageLuma8(img));
        let gate = QualityGate::new(0, Some(40.0), None);
        assert!(!gate.accepts(&bytes));
    }

    #[test]
    fn test_flat_image_rejected_on_contrast() {
        let img = image::GrayImage::from_pixel(200, 200, Luma([128u8]));
        let bytes = png(image::DynamicImage::ImageLuma8(img));
        let gate = QualityGate::new(0, None, Some(5.0));
        assert!(!gate.accepts(&bytes));
    }

    #[test]
    fn test_textured_image_accepted() {
        let bytes = noisy_png();
        assert!(bytes.len() > DEFAULT_MIN_SIZE);
        let gate = QualityGate::new(DEFAULT_MIN_SIZE, Some(40.0), Some(10.0));
        assert!(gate.accepts(&bytes));
    }
}
