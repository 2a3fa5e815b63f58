use crate::error::{NdviError, Result};
use crate::io::GeoRaster;
use image::RgbaImage;
use log::info;
use ndarray::{Array2, ArrayView2};
use std::path::Path;

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Brown -> yellow -> green ramp over normalized NDVI in [0, 1]
const NDVI_STOPS: [(f32, [u8; 3]); 5] = [
    (0.0, [120, 70, 20]),
    (0.3, [200, 170, 60]),
    (0.5, [240, 230, 100]),
    (0.7, [100, 180, 50]),
    (1.0, [10, 100, 20]),
];

const CLASS_PALETTE: [[u8; 4]; 5] = [
    TRANSPARENT,
    [50, 110, 200, 255],
    [190, 160, 110, 255],
    [170, 210, 90, 255],
    [20, 120, 40, 255],
];

fn lerp_color(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
}

/// Colour for an NDVI value in [-1, 1]
pub fn ndvi_color(value: f32) -> [u8; 4] {
    if value.is_nan() {
        return TRANSPARENT;
    }
    let t = ((value + 1.0) / 2.0).clamp(0.0, 1.0);

    let mut rgb = NDVI_STOPS[NDVI_STOPS.len() - 1].1;
    for pair in NDVI_STOPS.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            rgb = lerp_color(c0, c1, (t - t0) / (t1 - t0));
            break;
        }
    }
    [rgb[0], rgb[1], rgb[2], 255]
}

/// Value at the given percentile (0..=100) of the finite values, by rank
pub fn percentile(values: &mut [f32], pct: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let rank = ((pct / 100.0) * (values.len() - 1) as f32).round() as usize;
    Some(values[rank.min(values.len() - 1)])
}

/// 2-98 percentile stretch of a band to 0..=255; NaN stays NaN
fn stretch(band: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut finite: Vec<f32> = band.iter().copied().filter(|v| v.is_finite()).collect();
    let low = percentile(&mut finite, 2.0).unwrap_or(0.0);
    let high = percentile(&mut finite, 98.0).unwrap_or(1.0);
    let range = if high > low { high - low } else { 1.0 };

    band.mapv(|v| {
        if v.is_nan() {
            f32::NAN
        } else {
            ((v - low) / range * 255.0).clamp(0.0, 255.0)
        }
    })
}

fn save_rgba(path: &Path, width: usize, height: usize, pixels: Vec<u8>) -> Result<()> {
    let img = RgbaImage::from_raw(width as u32, height as u32, pixels)
        .ok_or(NdviError::InvalidDimensions(width, height))?;
    img.save(path)?;
    info!("Wrote preview {}", path.display());
    Ok(())
}

/// True- or false-colour composite from three 1-based band indices
pub fn write_rgb_preview(path: &Path, raster: &GeoRaster, bands: [usize; 3]) -> Result<()> {
    let channels = [
        stretch(raster.band(bands[0])?),
        stretch(raster.band(bands[1])?),
        stretch(raster.band(bands[2])?),
    ];
    let (height, width) = channels[0].dim();

    let mut pixels = Vec::with_capacity(width * height * 4);
    for ((r, g), b) in channels[0]
        .iter()
        .zip(channels[1].iter())
        .zip(channels[2].iter())
    {
        if r.is_nan() || g.is_nan() || b.is_nan() {
            pixels.extend_from_slice(&TRANSPARENT);
        } else {
            pixels.extend_from_slice(&[*r as u8, *g as u8, *b as u8, 255]);
        }
    }

    save_rgba(path, width, height, pixels)
}

pub fn write_ndvi_preview(path: &Path, ndvi: &GeoRaster) -> Result<()> {
    let band = ndvi.band(1)?;
    let (height, width) = band.dim();
    let pixels: Vec<u8> = band.iter().flat_map(|&v| ndvi_color(v)).collect();
    save_rgba(path, width, height, pixels)
}

pub fn write_class_preview(path: &Path, classes: &Array2<u8>) -> Result<()> {
    let (height, width) = classes.dim();
    let pixels: Vec<u8> = classes
        .iter()
        .flat_map(|&c| CLASS_PALETTE.get(c as usize).copied().unwrap_or(TRANSPARENT))
        .collect();
    save_rgba(path, width, height, pixels)
}
