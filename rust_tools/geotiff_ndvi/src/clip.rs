use crate::crs::{raster_crs, transform_bounds};
use crate::error::{NdviError, Result};
use crate::io::GeoRaster;
use gdal::spatial_ref::SpatialRef;
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use log::{debug, info};
use ndarray::{s, Axis};
use rayon::prelude::*;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let all_finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
        if !all_finite || min_x >= max_x || min_y >= max_y {
            return Err(NdviError::InvalidBbox(format!(
                "{},{},{},{} (need min < max on both axes)",
                min_x, min_y, max_x, max_y
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

impl FromStr for BoundingBox {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| format!("bbox parse error: {e}"))?;

        if parts.len() != 4 {
            return Err("Expected 'min_x,min_y,max_x,max_y'".into());
        }
        BoundingBox::new(parts[0], parts[1], parts[2], parts[3]).map_err(|e| e.to_string())
    }
}

/// Pixel window (col_min, row_min, col_max, row_max) covering `bounds`, rounded
/// outward and clamped to the raster. None when there is no overlap.
fn pixel_window(raster: &GeoRaster, bounds: &[f64; 4]) -> Option<(usize, usize, usize, usize)> {
    let metadata = &raster.metadata;
    let gt = &metadata.geotransform;

    let col_a = (bounds[0] - gt[0]) / gt[1];
    let col_b = (bounds[2] - gt[0]) / gt[1];
    let row_a = (bounds[3] - gt[3]) / gt[5];
    let row_b = (bounds[1] - gt[3]) / gt[5];

    let col_min = col_a.min(col_b).floor().max(0.0);
    let col_max = col_a.max(col_b).ceil().min(metadata.width as f64);
    let row_min = row_a.min(row_b).floor().max(0.0);
    let row_max = row_a.max(row_b).ceil().min(metadata.height as f64);

    if col_min >= col_max || row_min >= row_max {
        return None;
    }
    Some((
        col_min as usize,
        row_min as usize,
        col_max as usize,
        row_max as usize,
    ))
}

/// Subset all bands to a pixel window and shift the origin accordingly
fn crop(raster: &GeoRaster, window: (usize, usize, usize, usize)) -> Result<GeoRaster> {
    let (col_min, row_min, col_max, row_max) = window;
    let metadata = &raster.metadata;
    let data = raster
        .data
        .slice(s![.., row_min..row_max, col_min..col_max])
        .to_owned();

    let mut geotransform = metadata.geotransform;
    geotransform[0] += col_min as f64 * geotransform[1];
    geotransform[3] += row_min as f64 * geotransform[5];

    debug!(
        "Crop window cols {}..{} rows {}..{}",
        col_min, col_max, row_min, row_max
    );
    GeoRaster::new(
        data,
        metadata.with_grid(col_max - col_min, row_max - row_min, geotransform),
    )
}

/// Clip a raster to a bounding box, given in `bbox_crs` or the raster CRS
pub fn clip_to_bbox(
    raster: &GeoRaster,
    bbox: &BoundingBox,
    bbox_crs: Option<&SpatialRef>,
) -> Result<GeoRaster> {
    if !raster.metadata.is_north_up() {
        return Err(NdviError::RotatedGeotransform(raster.metadata.geotransform));
    }

    let bounds = match bbox_crs {
        Some(from) => {
            let to = raster_crs(&raster.metadata)?;
            transform_bounds(bbox.as_array(), from, &to)?
        }
        None => bbox.as_array(),
    };

    let window = pixel_window(raster, &bounds).ok_or(NdviError::NoOverlap)?;
    let clipped = crop(raster, window)?;
    info!(
        "Clipped to bbox {:?}: {}x{} -> {}x{}",
        bounds,
        raster.metadata.width,
        raster.metadata.height,
        clipped.metadata.width,
        clipped.metadata.height
    );
    Ok(clipped)
}

/// Crop to the boundary envelope and blank pixels whose center lies outside
/// every polygon. The boundary must already be in the raster CRS.
pub fn clip_to_boundary(raster: &GeoRaster, boundary: &MultiPolygon<f64>) -> Result<GeoRaster> {
    if !raster.metadata.is_north_up() {
        return Err(NdviError::RotatedGeotransform(raster.metadata.geotransform));
    }

    let envelope = boundary
        .bounding_rect()
        .ok_or_else(|| NdviError::EmptyBoundary("boundary has no coordinates".to_string()))?;
    let bounds = [
        envelope.min().x,
        envelope.min().y,
        envelope.max().x,
        envelope.max().y,
    ];

    let window = pixel_window(raster, &bounds).ok_or(NdviError::NoOverlap)?;
    let mut clipped = crop(raster, window)?;

    let (width, height) = (clipped.metadata.width, clipped.metadata.height);
    let gt = clipped.metadata.geotransform;

    let inside: Vec<bool> = (0..height)
        .into_par_iter()
        .flat_map_iter(|row| {
            let y = gt[3] + (row as f64 + 0.5) * gt[5];
            (0..width).map(move |col| {
                let x = gt[0] + (col as f64 + 0.5) * gt[1];
                boundary.contains(&Point::new(x, y))
            })
        })
        .collect();

    let masked = inside.iter().filter(|&&keep| !keep).count();
    for mut band in clipped.data.axis_iter_mut(Axis(0)) {
        for (value, &keep) in band.iter_mut().zip(&inside) {
            if !keep {
                *value = f32::NAN;
            }
        }
    }

    info!(
        "Clipped to boundary: {}x{} window, {} of {} pixels outside polygons",
        width,
        height,
        masked,
        width * height
    );
    Ok(clipped)
}
