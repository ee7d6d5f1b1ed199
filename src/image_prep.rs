use image::{DynamicImage, GrayImage};
use tracing::debug;

use crate::errors::RecognizeResult;

/// Rough class of the captured image, driving the preprocessing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageClass {
    /// Clean print or dark ink on a plain background.
    HighContrastPrint,
    /// Handwriting on squared/ruled paper with faint grid lines.
    GriddedPaper,
    /// Heavy color cast, filters, or sensor noise.
    FilteredOrNoisy,
}

impl ImageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageClass::HighContrastPrint => "high-contrast-print",
            ImageClass::GriddedPaper => "gridded-paper",
            ImageClass::FilteredOrNoisy => "filtered-or-noisy",
        }
    }
}

/// The preprocessed image handed to recognition providers.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub image: GrayImage,
    pub class: ImageClass,
}

impl NormalizedImage {
    /// Encodes the processed image as PNG for provider upload.
    pub fn to_png_bytes(&self) -> RecognizeResult<Vec<u8>> {
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(self.image.clone()).write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )?;
        Ok(bytes)
    }
}

// Per-pixel color variance above this marks a filtered/noisy capture.
const NOISY_CHANNEL_VARIANCE: f32 = 450.0;
// Background brightness required before grid detection applies.
const BRIGHT_BACKGROUND_LUMA: f32 = 170.0;
// Fraction of sampled rows that must look like faint lines.
const GRID_ROW_DENSITY: f32 = 0.10;
// Row-mean band (relative to overall mean) that counts as a faint line.
const GRID_BAND_LOW: f32 = 0.60;
const GRID_BAND_HIGH: f32 = 0.97;
// Brightness cutoff separating ink from grid lines on gridded paper.
const GRID_INK_CUTOFF: u8 = 160;

/// Decodes, classifies, and preprocesses a captured image.
///
/// Fails only when the image cannot be decoded; every classification
/// falls through to [`ImageClass::HighContrastPrint`] with a mild
/// contrast stretch.
pub fn normalize(bytes: &[u8]) -> RecognizeResult<NormalizedImage> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    let stats = sample_stats(&rgb);
    let luma = decoded.to_luma8();

    let (class, image) = if stats.channel_variance > NOISY_CHANNEL_VARIANCE {
        (ImageClass::FilteredOrNoisy, stretch_midtones(&luma))
    } else if stats.mean_luma > BRIGHT_BACKGROUND_LUMA && stats.grid_density > GRID_ROW_DENSITY {
        (ImageClass::GriddedPaper, suppress_grid(&luma))
    } else {
        (ImageClass::HighContrastPrint, contrast_stretch(&luma))
    };

    debug!(
        class = class.as_str(),
        mean_luma = stats.mean_luma,
        channel_variance = stats.channel_variance,
        grid_density = stats.grid_density,
        "image normalized"
    );

    Ok(NormalizedImage { image, class })
}

struct SampleStats {
    mean_luma: f32,
    channel_variance: f32,
    grid_density: f32,
}

/// Samples the image on a coarse grid: global brightness, average
/// per-pixel color spread, and the fraction of rows whose mean sits in
/// the faint-line band below the background.
fn sample_stats(image: &image::RgbImage) -> SampleStats {
    let (width, height) = image.dimensions();
    let x_step = (width / 64).max(1);
    let y_step = (height / 64).max(1);

    let mut luma_sum = 0.0f64;
    let mut variance_sum = 0.0f64;
    let mut samples = 0u64;
    let mut row_means = Vec::new();

    let mut y = 0;
    while y < height {
        let mut row_sum = 0.0f64;
        let mut row_samples = 0u64;
        let mut x = 0;
        while x < width {
            let [r, g, b] = image.get_pixel(x, y).0;
            let (r, g, b) = (r as f32, g as f32, b as f32);
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            let mean = (r + g + b) / 3.0;
            let variance =
                ((r - mean).powi(2) + (g - mean).powi(2) + (b - mean).powi(2)) / 3.0;
            luma_sum += luma as f64;
            variance_sum += variance as f64;
            row_sum += luma as f64;
            samples += 1;
            row_samples += 1;
            x += x_step;
        }
        if row_samples > 0 {
            row_means.push((row_sum / row_samples as f64) as f32);
        }
        y += y_step;
    }

    if samples == 0 {
        return SampleStats {
            mean_luma: 0.0,
            channel_variance: 0.0,
            grid_density: 0.0,
        };
    }

    let mean_luma = (luma_sum / samples as f64) as f32;
    let band_low = mean_luma * GRID_BAND_LOW;
    let band_high = mean_luma * GRID_BAND_HIGH;
    let grid_rows = row_means
        .iter()
        .filter(|mean| **mean >= band_low && **mean <= band_high)
        .count();

    SampleStats {
        mean_luma,
        channel_variance: (variance_sum / samples as f64) as f32,
        grid_density: grid_rows as f32 / row_means.len().max(1) as f32,
    }
}

/// Symmetric contrast stretch pulling mid-tones toward the extremes;
/// used for filtered/noisy captures.
fn stretch_midtones(image: &GrayImage) -> GrayImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        let value = pixel[0] as f32;
        let stretched = 128.0 + (value - 128.0) * 1.8;
        pixel[0] = stretched.clamp(0.0, 255.0) as u8;
    }
    output
}

/// Grid-paper suppression: anything brighter than the ink cutoff becomes
/// paper white (erasing faint lines), anything below is darkened further
/// so strokes survive downstream thresholding.
fn suppress_grid(image: &GrayImage) -> GrayImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        let value = pixel[0];
        pixel[0] = if value >= GRID_INK_CUTOFF {
            255
        } else {
            value / 2
        };
    }
    output
}

/// Mild min/max contrast stretch for clean captures.
fn contrast_stretch(image: &GrayImage) -> GrayImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in image.pixels() {
        let value = pixel[0];
        min = min.min(value);
        max = max.max(value);
    }
    if max <= min {
        return image.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        let value = pixel[0];
        pixel[0] = ((value.saturating_sub(min)) as f32 * scale).round() as u8;
    }
    output
}
