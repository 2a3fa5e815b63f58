use crate::crs::{describe_crs, raster_crs, same_crs, transform_bounds};
use crate::error::{NdviError, Result};
use crate::io::GeoRaster;
use crate::resample::{sample, ResampleMethod};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use log::{debug, info, warn};
use ndarray::{Array3, Axis};
use rayon::prelude::*;

/// Destination pixel size that keeps the pixel count along the raster
/// diagonal, the same heuristic gdalwarp uses when no resolution is given.
pub fn default_resolution(width: usize, height: usize, dst_bounds: &[f64; 4]) -> f64 {
    let src_diagonal_pixels = ((width * width + height * height) as f64).sqrt();
    let dst_diagonal = (dst_bounds[2] - dst_bounds[0]).hypot(dst_bounds[3] - dst_bounds[1]);
    dst_diagonal / src_diagonal_pixels
}

/// Fractional source (col, row) for every destination pixel center, row-major
fn source_pixel_coords(
    inverse: &CoordTransform,
    dst_geotransform: &[f64; 6],
    src_geotransform: &[f64; 6],
    width: usize,
    height: usize,
) -> Vec<(f64, f64)> {
    let mut coords = Vec::with_capacity(width * height);
    let mut failed_rows = 0usize;

    for row in 0..height {
        let y = dst_geotransform[3] + (row as f64 + 0.5) * dst_geotransform[5];
        let mut xs: Vec<f64> = (0..width)
            .map(|col| dst_geotransform[0] + (col as f64 + 0.5) * dst_geotransform[1])
            .collect();
        let mut ys = vec![y; width];
        let mut zs = vec![0.0; width];

        if inverse.transform_coords(&mut xs, &mut ys, &mut zs).is_err() {
            // Some points in this row fall outside the projection's domain
            failed_rows += 1;
            for col in 0..width {
                let mut x = [dst_geotransform[0] + (col as f64 + 0.5) * dst_geotransform[1]];
                let mut y1 = [y];
                let mut z = [0.0];
                if inverse.transform_coords(&mut x, &mut y1, &mut z).is_ok() {
                    xs[col] = x[0];
                    ys[col] = y1[0];
                } else {
                    xs[col] = f64::NAN;
                    ys[col] = f64::NAN;
                }
            }
        }

        coords.extend(xs.iter().zip(&ys).map(|(&x, &y)| {
            (
                (x - src_geotransform[0]) / src_geotransform[1],
                (y - src_geotransform[3]) / src_geotransform[5],
            )
        }));
    }

    if failed_rows > 0 {
        warn!(
            "{} destination rows contained points outside the source CRS domain",
            failed_rows
        );
    }
    coords
}

/// Warp a raster into `dst_crs`.
///
/// The destination grid is north-up and covers the transformed source bounds.
/// Destination pixels that map outside the source are NaN.
pub fn reproject(
    raster: &GeoRaster,
    dst_crs: &SpatialRef,
    resolution: Option<f64>,
    method: ResampleMethod,
) -> Result<GeoRaster> {
    if method == ResampleMethod::Average {
        return Err(NdviError::UnsupportedResampling(
            method.to_string(),
            "reprojection",
        ));
    }

    let metadata = &raster.metadata;
    if !metadata.is_north_up() {
        return Err(NdviError::RotatedGeotransform(metadata.geotransform));
    }

    if let Some(r) = resolution {
        if !r.is_finite() || r <= 0.0 {
            return Err(NdviError::InvalidResolution(r));
        }
    }

    let src_crs = raster_crs(metadata)?;
    if same_crs(&src_crs, dst_crs) {
        let keeps_grid = resolution.map_or(true, |r| {
            (r - metadata.pixel_width).abs() < 1e-9 * r
                && (r - metadata.pixel_height).abs() < 1e-9 * r
        });
        if keeps_grid {
            info!(
                "Raster already in {}, skipping reprojection",
                describe_crs(dst_crs)
            );
            return Ok(raster.clone());
        }
        info!(
            "Raster already in {}, regridding to pixel size {}",
            describe_crs(dst_crs),
            resolution.unwrap_or(metadata.pixel_width)
        );
    }

    let dst_bounds = transform_bounds(metadata.bounds(), &src_crs, dst_crs)?;
    let res = resolution
        .unwrap_or_else(|| default_resolution(metadata.width, metadata.height, &dst_bounds));

    let width = (((dst_bounds[2] - dst_bounds[0]) / res).ceil() as usize).max(1);
    let height = (((dst_bounds[3] - dst_bounds[1]) / res).ceil() as usize).max(1);
    let dst_geotransform = [dst_bounds[0], res, 0.0, dst_bounds[3], 0.0, -res];

    info!(
        "Reprojecting {} -> {}: {}x{} -> {}x{} (pixel size {:.6}, {})",
        describe_crs(&src_crs),
        describe_crs(dst_crs),
        metadata.width,
        metadata.height,
        width,
        height,
        res,
        method
    );
    debug!("Destination bounds: {:?}", dst_bounds);

    let inverse = CoordTransform::new(dst_crs, &src_crs)?;
    let coords = source_pixel_coords(
        &inverse,
        &dst_geotransform,
        &metadata.geotransform,
        width,
        height,
    );

    let values: Vec<f32> = raster
        .data
        .axis_iter(Axis(0))
        .flat_map(|band| {
            coords
                .par_iter()
                .map(|&(col, row)| sample(&band, col, row, method))
                .collect::<Vec<f32>>()
        })
        .collect();

    let data = Array3::from_shape_vec((metadata.band_count, height, width), values)?;
    let mut dst_metadata = metadata.with_grid(width, height, dst_geotransform);
    dst_metadata.projection = dst_crs.to_wkt()?;

    GeoRaster::new(data, dst_metadata)
}
