use crate::error::{NdviError, Result};
use crate::io::GeoRaster;
use clap::ValueEnum;
use log::{debug, info};
use ndarray::{Array3, ArrayView2, Axis};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    Nearest,
    Bilinear,
    Average,
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResampleMethod::Nearest => "nearest",
            ResampleMethod::Bilinear => "bilinear",
            ResampleMethod::Average => "average",
        };
        f.write_str(name)
    }
}

/// Sample a band at fractional pixel coordinates, where pixel centers sit at .5
///
/// Returns NaN outside the band. Bilinear falls back to nearest when any of
/// the four neighbours is nodata.
pub fn sample(band: &ArrayView2<'_, f32>, col: f64, row: f64, method: ResampleMethod) -> f32 {
    let (nrows, ncols) = band.dim();
    if !col.is_finite() || !row.is_finite() {
        return f32::NAN;
    }
    if col < 0.0 || row < 0.0 || col >= ncols as f64 || row >= nrows as f64 {
        return f32::NAN;
    }

    let nearest = || band[[row.floor() as usize, col.floor() as usize]];

    match method {
        ResampleMethod::Nearest | ResampleMethod::Average => nearest(),
        ResampleMethod::Bilinear => {
            let x = (col - 0.5).clamp(0.0, (ncols - 1) as f64);
            let y = (row - 0.5).clamp(0.0, (nrows - 1) as f64);
            let c0 = x.floor() as usize;
            let r0 = y.floor() as usize;
            let c1 = (c0 + 1).min(ncols - 1);
            let r1 = (r0 + 1).min(nrows - 1);
            let dx = x - c0 as f64;
            let dy = y - r0 as f64;

            let v00 = band[[r0, c0]];
            let v01 = band[[r0, c1]];
            let v10 = band[[r1, c0]];
            let v11 = band[[r1, c1]];
            if v00.is_nan() || v01.is_nan() || v10.is_nan() || v11.is_nan() {
                return nearest();
            }

            let top = v00 as f64 * (1.0 - dx) + v01 as f64 * dx;
            let bottom = v10 as f64 * (1.0 - dx) + v11 as f64 * dx;
            (top * (1.0 - dy) + bottom * dy) as f32
        }
    }
}

/// Mean of valid source pixels covered by [col_min, col_max) x [row_min, row_max)
fn footprint_mean(
    band: &ArrayView2<'_, f32>,
    col_min: f64,
    col_max: f64,
    row_min: f64,
    row_max: f64,
) -> f32 {
    let (nrows, ncols) = band.dim();
    let c0 = (col_min.floor().max(0.0) as usize).min(ncols - 1);
    let r0 = (row_min.floor().max(0.0) as usize).min(nrows - 1);
    let c1 = (col_max.ceil() as usize).clamp(c0 + 1, ncols);
    let r1 = (row_max.ceil() as usize).clamp(r0 + 1, nrows);

    let mut sum = 0.0f64;
    let mut count = 0u32;
    for r in r0..r1 {
        for c in c0..c1 {
            let v = band[[r, c]];
            if !v.is_nan() {
                sum += v as f64;
                count += 1;
            }
        }
    }

    if count > 0 {
        (sum / count as f64) as f32
    } else {
        f32::NAN
    }
}

/// Resample every band by `scale` while keeping the raster extent
pub fn resample(raster: &GeoRaster, scale: f64, method: ResampleMethod) -> Result<GeoRaster> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(NdviError::InvalidScale(scale));
    }

    let metadata = &raster.metadata;
    let out_width = ((metadata.width as f64 * scale).round() as usize).max(1);
    let out_height = ((metadata.height as f64 * scale).round() as usize).max(1);

    // Exact per-axis ratios so the extent is preserved after rounding
    let ratio_x = metadata.width as f64 / out_width as f64;
    let ratio_y = metadata.height as f64 / out_height as f64;

    info!(
        "Resampling {}x{} -> {}x{} ({})",
        metadata.width, metadata.height, out_width, out_height, method
    );

    let bands: Vec<Vec<f32>> = raster
        .data
        .axis_iter(Axis(0))
        .map(|band| {
            (0..out_height)
                .into_par_iter()
                .flat_map_iter(|row| {
                    let band = band.view();
                    (0..out_width).map(move |col| {
                        if method == ResampleMethod::Average {
                            footprint_mean(
                                &band,
                                col as f64 * ratio_x,
                                (col + 1) as f64 * ratio_x,
                                row as f64 * ratio_y,
                                (row + 1) as f64 * ratio_y,
                            )
                        } else {
                            sample(
                                &band,
                                (col as f64 + 0.5) * ratio_x,
                                (row as f64 + 0.5) * ratio_y,
                                method,
                            )
                        }
                    })
                })
                .collect()
        })
        .collect();

    let values: Vec<f32> = bands.into_iter().flatten().collect();
    let data = Array3::from_shape_vec((metadata.band_count, out_height, out_width), values)?;

    let mut geotransform = metadata.geotransform;
    geotransform[1] *= ratio_x;
    geotransform[2] *= ratio_y;
    geotransform[4] *= ratio_x;
    geotransform[5] *= ratio_y;
    debug!("Resampled geotransform: {:?}", geotransform);

    GeoRaster::new(data, metadata.with_grid(out_width, out_height, geotransform))
}
