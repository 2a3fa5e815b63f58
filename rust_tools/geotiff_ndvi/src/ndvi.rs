use crate::error::{NdviError, Result};
use crate::io::GeoRaster;
use log::{debug, info};
use ndarray::{Array2, Zip};
use serde::Serialize;
use std::str::FromStr;

pub const CLASS_NODATA: u8 = 0;
pub const CLASS_WATER: u8 = 1;
pub const CLASS_BARE_SOIL: u8 = 2;
pub const CLASS_SPARSE_VEGETATION: u8 = 3;
pub const CLASS_DENSE_VEGETATION: u8 = 4;

pub const CLASS_NAMES: [&str; 5] = [
    "nodata",
    "water",
    "bare_soil",
    "sparse_vegetation",
    "dense_vegetation",
];

/// Upper bounds (exclusive) of the first three NDVI classes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NdviThresholds {
    pub water: f32,
    pub bare_soil: f32,
    pub sparse: f32,
}

impl Default for NdviThresholds {
    fn default() -> Self {
        Self {
            water: 0.0,
            bare_soil: 0.2,
            sparse: 0.5,
        }
    }
}

impl NdviThresholds {
    pub fn new(water: f32, bare_soil: f32, sparse: f32) -> Result<Self> {
        let breaks = [water, bare_soil, sparse];
        if breaks.iter().any(|b| !(-1.0..=1.0).contains(b)) {
            return Err(NdviError::InvalidThresholds(format!(
                "{:?} must lie within [-1, 1]",
                breaks
            )));
        }
        if !(water < bare_soil && bare_soil < sparse) {
            return Err(NdviError::InvalidThresholds(format!(
                "{:?} must be strictly increasing",
                breaks
            )));
        }
        Ok(Self {
            water,
            bare_soil,
            sparse,
        })
    }

    pub fn classify_value(&self, value: f32) -> u8 {
        if value.is_nan() {
            CLASS_NODATA
        } else if value < self.water {
            CLASS_WATER
        } else if value < self.bare_soil {
            CLASS_BARE_SOIL
        } else if value < self.sparse {
            CLASS_SPARSE_VEGETATION
        } else {
            CLASS_DENSE_VEGETATION
        }
    }
}

impl FromStr for NdviThresholds {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<f32> = s
            .split(',')
            .map(|p| p.trim().parse::<f32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| format!("threshold parse error: {e}"))?;

        if parts.len() != 3 {
            return Err("Expected 'water,bare_soil,sparse'".into());
        }
        NdviThresholds::new(parts[0], parts[1], parts[2]).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NdviStats {
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub valid_pixels: usize,
    pub total_pixels: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassCount {
    pub class: u8,
    pub name: &'static str,
    pub pixels: usize,
    /// Share of valid (non-nodata) pixels
    pub fraction: f64,
}

/// Per-pixel NDVI for one red/NIR pair, clamped to [-1, 1]
pub fn ndvi_value(red: f32, nir: f32) -> f32 {
    if red.is_nan() || nir.is_nan() {
        return f32::NAN;
    }
    let sum = nir as f64 + red as f64;
    if sum.abs() < 1e-10 {
        return f32::NAN;
    }
    (((nir as f64 - red as f64) / sum) as f32).clamp(-1.0, 1.0)
}

/// Compute NDVI = (NIR - Red) / (NIR + Red) from 1-based band indices
pub fn compute_ndvi(raster: &GeoRaster, red_band: usize, nir_band: usize) -> Result<GeoRaster> {
    let red = raster.band(red_band)?;
    let nir = raster.band(nir_band)?;
    let (rows, cols) = red.dim();

    info!(
        "Computing NDVI from red band {} and NIR band {}",
        red_band, nir_band
    );

    let mut ndvi = Array2::<f32>::zeros((rows, cols));
    Zip::from(&mut ndvi)
        .and(&red)
        .and(&nir)
        .par_for_each(|out, &r, &n| *out = ndvi_value(r, n));

    let data = ndvi.into_shape((1, rows, cols))?;
    let mut metadata = raster.metadata.clone();
    metadata.band_count = 1;
    metadata.band_descriptions = vec!["NDVI".to_string()];

    GeoRaster::new(data, metadata)
}

/// Assign each NDVI pixel a vegetation class; NaN becomes CLASS_NODATA
pub fn classify(ndvi: &GeoRaster, thresholds: &NdviThresholds) -> Result<Array2<u8>> {
    let band = ndvi.band(1)?;
    let mut classes = Array2::<u8>::zeros(band.dim());
    Zip::from(&mut classes)
        .and(&band)
        .par_for_each(|class, &value| *class = thresholds.classify_value(value));

    debug!("Classified NDVI with thresholds {:?}", thresholds);
    Ok(classes)
}

pub fn ndvi_stats(ndvi: &GeoRaster) -> Result<NdviStats> {
    let band = ndvi.band(1)?;
    let total_pixels = band.len();

    let valid: Vec<f64> = band
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| v as f64)
        .collect();

    if valid.is_empty() {
        return Ok(NdviStats {
            min: None,
            max: None,
            mean: None,
            std_dev: None,
            valid_pixels: 0,
            total_pixels,
        });
    }

    let n = valid.len() as f64;
    let mean = valid.iter().sum::<f64>() / n;
    let variance = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
    let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Ok(NdviStats {
        min: Some(min as f32),
        max: Some(max as f32),
        mean: Some(mean),
        std_dev: Some(variance.sqrt()),
        valid_pixels: valid.len(),
        total_pixels,
    })
}

/// Pixel count and share per vegetation class (nodata excluded from shares)
pub fn class_summary(classes: &Array2<u8>) -> Vec<ClassCount> {
    let mut counts = [0usize; 5];
    for &class in classes.iter() {
        if let Some(slot) = counts.get_mut(class as usize) {
            *slot += 1;
        }
    }

    let valid: usize = counts[1..].iter().sum();
    (CLASS_WATER..=CLASS_DENSE_VEGETATION)
        .map(|class| {
            let pixels = counts[class as usize];
            ClassCount {
                class,
                name: CLASS_NAMES[class as usize],
                pixels,
                fraction: if valid > 0 {
                    pixels as f64 / valid as f64
                } else {
                    0.0
                },
            }
        })
        .collect()
}
