use crate::error::{NdviError, Result};
use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalType, RasterBand};
use gdal::{Dataset, DriverManager, Metadata};
use log::{debug, info};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub nodata: Option<f64>,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub band_descriptions: Vec<String>,
}

impl RasterMetadata {
    /// Same georeferencing with a new grid size and transform.
    pub fn with_grid(&self, width: usize, height: usize, geotransform: [f64; 6]) -> Self {
        Self {
            width,
            height,
            geotransform,
            pixel_width: geotransform[1].abs(),
            pixel_height: geotransform[5].abs(),
            ..self.clone()
        }
    }

    /// (min_x, min_y, max_x, max_y) of the raster footprint
    pub fn bounds(&self) -> [f64; 4] {
        let gt = &self.geotransform;
        let corners = [
            (0.0, 0.0),
            (self.width as f64, 0.0),
            (0.0, self.height as f64),
            (self.width as f64, self.height as f64),
        ];

        let mut bounds = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        for (col, row) in corners {
            let x = gt[0] + col * gt[1] + row * gt[2];
            let y = gt[3] + col * gt[4] + row * gt[5];
            bounds[0] = bounds[0].min(x);
            bounds[1] = bounds[1].min(y);
            bounds[2] = bounds[2].max(x);
            bounds[3] = bounds[3].max(y);
        }
        bounds
    }

    pub fn is_north_up(&self) -> bool {
        self.geotransform[2] == 0.0 && self.geotransform[4] == 0.0
    }
}

/// Multi-band raster held as (band, row, col) with nodata stored as NaN.
#[derive(Debug, Clone)]
pub struct GeoRaster {
    pub data: Array3<f32>,
    pub metadata: RasterMetadata,
}

impl GeoRaster {
    pub fn new(data: Array3<f32>, metadata: RasterMetadata) -> Result<Self> {
        let (bands, rows, cols) = data.dim();
        if bands != metadata.band_count || rows != metadata.height || cols != metadata.width {
            return Err(NdviError::InvalidDimensions(cols, rows));
        }
        if metadata.band_descriptions.len() != bands {
            return Err(NdviError::BandDescriptionCount {
                descriptions: metadata.band_descriptions.len(),
                bands,
            });
        }
        Ok(Self { data, metadata })
    }

    /// 1-based band view
    pub fn band(&self, index: usize) -> Result<ArrayView2<'_, f32>> {
        if index == 0 || index > self.metadata.band_count {
            return Err(NdviError::BandOutOfRange {
                band: index,
                count: self.metadata.band_count,
            });
        }
        Ok(self.data.index_axis(Axis(0), index - 1))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BandStats {
    pub band: usize,
    pub description: String,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
    pub valid_pixels: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RasterInfo {
    pub source: String,
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub crs: Option<String>,
    pub geotransform: [f64; 6],
    pub bounds: [f64; 4],
    pub pixel_size: (f64, f64),
    pub nodata: Option<f64>,
    pub bands: Vec<BandStats>,
}

/// Map http(s) sources onto GDAL's virtual file systems.
pub fn resolve_source(source: &str) -> String {
    let is_remote = source.starts_with("http://") || source.starts_with("https://");
    if !is_remote {
        return source.to_string();
    }

    let path = source.split(['?', '#']).next().unwrap_or(source);
    if path.to_ascii_lowercase().ends_with(".zip") {
        format!("/vsizip//vsicurl/{}", source)
    } else {
        format!("/vsicurl/{}", source)
    }
}

pub fn open_dataset(source: &str) -> Result<Dataset> {
    let resolved = resolve_source(source);
    if resolved != source {
        debug!("Resolved {} -> {}", source, resolved);
    }
    info!("Opening dataset: {}", source);
    Ok(Dataset::open(Path::new(&resolved))?)
}

/// Extract metadata from a dataset without reading pixel data
pub fn extract_metadata(dataset: &Dataset) -> Result<RasterMetadata> {
    let (width, height) = dataset.raster_size();
    let width = width as usize;
    let height = height as usize;
    let band_count = dataset.raster_count() as usize;

    if width == 0 || height == 0 || band_count == 0 {
        return Err(NdviError::InvalidDimensions(width, height));
    }

    let first: RasterBand = dataset.rasterband(1)?;
    let nodata = first.no_data_value();

    let geotransform = dataset.geo_transform()?;
    let pixel_width = geotransform[1].abs();
    let pixel_height = geotransform[5].abs();

    if pixel_width <= 0.0 {
        return Err(NdviError::InvalidPixelSize(pixel_width));
    }
    if pixel_height <= 0.0 {
        return Err(NdviError::InvalidPixelSize(pixel_height));
    }

    let mut band_descriptions = Vec::with_capacity(band_count);
    for index in 1..=band_count {
        let band = dataset.rasterband(index)?;
        let description = band.description().unwrap_or_default();
        band_descriptions.push(if description.is_empty() {
            format!("band_{}", index)
        } else {
            description
        });
    }

    debug!("Raster dimensions: {}x{} ({} bands)", width, height, band_count);
    debug!("Pixel size: {:.6} x {:.6}", pixel_width, pixel_height);

    Ok(RasterMetadata {
        width,
        height,
        band_count,
        geotransform,
        projection: dataset.projection(),
        nodata,
        pixel_width,
        pixel_height,
        band_descriptions,
    })
}

/// Read every band of a raster as f32, replacing the nodata sentinel with NaN
pub fn read_raster(source: &str) -> Result<GeoRaster> {
    let dataset = open_dataset(source)?;
    let metadata = extract_metadata(&dataset)?;
    let (width, height) = (metadata.width, metadata.height);

    let mut values: Vec<f32> = Vec::with_capacity(metadata.band_count * width * height);
    for index in 1..=metadata.band_count {
        let band = dataset.rasterband(index)?;
        let band_nodata = band.no_data_value().or(metadata.nodata);
        let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        values.extend(buffer.data().iter().map(|&v| match band_nodata {
            Some(nd) if is_nodata(v, nd) => f32::NAN,
            _ => v,
        }));
        debug!("Read band {} ({})", index, metadata.band_descriptions[index - 1]);
    }

    let data = Array3::from_shape_vec((metadata.band_count, height, width), values)?;
    info!(
        "Loaded {}x{} raster with {} bands",
        width, height, metadata.band_count
    );
    GeoRaster::new(data, metadata)
}

fn is_nodata(value: f32, nodata: f64) -> bool {
    if nodata.is_nan() {
        value.is_nan()
    } else {
        (value as f64 - nodata).abs() < f64::EPSILON.max(nodata.abs() * 1e-7)
    }
}

/// Summarise a raster for the `info` command
pub fn describe(source: &str, raster: &GeoRaster) -> RasterInfo {
    let metadata = &raster.metadata;
    let bands = raster
        .data
        .outer_iter()
        .enumerate()
        .map(|(i, band)| {
            let description = metadata.band_descriptions.get(i).map_or("", String::as_str);
            band_stats(i + 1, description, band)
        })
        .collect();

    RasterInfo {
        source: source.to_string(),
        width: metadata.width,
        height: metadata.height,
        band_count: metadata.band_count,
        crs: crate::crs::raster_crs(metadata)
            .ok()
            .map(|srs| crate::crs::describe_crs(&srs)),
        geotransform: metadata.geotransform,
        bounds: metadata.bounds(),
        pixel_size: (metadata.pixel_width, metadata.pixel_height),
        nodata: metadata.nodata,
        bands,
    }
}

fn band_stats(band: usize, description: &str, data: ArrayView2<'_, f32>) -> BandStats {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut sum = 0.0f64;
    let mut valid_pixels = 0usize;

    for &v in data.iter().filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
        sum += v as f64;
        valid_pixels += 1;
    }

    let has_data = valid_pixels > 0;
    BandStats {
        band,
        description: description.to_string(),
        min: has_data.then_some(min),
        max: has_data.then_some(max),
        mean: has_data.then(|| sum / valid_pixels as f64),
        valid_pixels,
    }
}

/// Create a GeoTIFF dataset with the given creation options
pub fn create_output_dataset<T: GdalType>(
    path: &Path,
    metadata: &RasterMetadata,
    num_bands: usize,
    options: &[String],
) -> Result<Dataset> {
    info!("Creating output dataset: {}", path.display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let dataset = if options.is_empty() {
        driver.create_with_band_type::<T, _>(path, metadata.width, metadata.height, num_bands)?
    } else {
        let mut gdal_options = CslStringList::new();
        for opt in options {
            gdal_options.add_string(opt)?;
        }

        driver.create_with_band_type_with_options::<T, _>(
            path,
            metadata.width,
            metadata.height,
            num_bands,
            &gdal_options,
        )?
    };

    Ok(dataset)
}

/// Copy georeferencing and pixel data of every band into an open dataset
pub fn fill_dataset(dataset: &mut Dataset, raster: &GeoRaster) -> Result<()> {
    let metadata = &raster.metadata;
    dataset.set_geo_transform(&metadata.geotransform)?;
    if !metadata.projection.is_empty() {
        dataset.set_projection(&metadata.projection)?;
    }

    for (i, band_data) in raster.data.outer_iter().enumerate() {
        let band_index = i + 1;
        let mut raster_band = dataset.rasterband(band_index)?;

        // GDAL expects row-major data, which is how outer_iter views are laid out
        let values: Vec<f32> = band_data.iter().copied().collect();
        let mut buffer = Buffer::new((metadata.width, metadata.height), values);
        raster_band.write((0, 0), (metadata.width, metadata.height), &mut buffer)?;

        if let Some(description) = metadata.band_descriptions.get(i) {
            raster_band.set_description(description)?;
        }
        raster_band.set_no_data_value(Some(f64::NAN))?;
        debug!("Wrote band {}", band_index);
    }

    Ok(())
}

/// Write a multi-band f32 GeoTIFF
pub fn write_geotiff(path: &Path, raster: &GeoRaster, options: &[String]) -> Result<()> {
    let mut dataset =
        create_output_dataset::<f32>(path, &raster.metadata, raster.metadata.band_count, options)?;
    fill_dataset(&mut dataset, raster)?;
    info!(
        "Successfully wrote {} bands to {}",
        raster.metadata.band_count,
        path.display()
    );
    Ok(())
}

/// Write a single-band u8 class raster with nodata 0
pub fn write_class_raster(
    path: &Path,
    classes: &Array2<u8>,
    metadata: &RasterMetadata,
    options: &[String],
) -> Result<()> {
    let (rows, cols) = classes.dim();
    if rows != metadata.height || cols != metadata.width {
        return Err(NdviError::InvalidDimensions(cols, rows));
    }

    let mut dataset = create_output_dataset::<u8>(path, metadata, 1, options)?;
    dataset.set_geo_transform(&metadata.geotransform)?;
    if !metadata.projection.is_empty() {
        dataset.set_projection(&metadata.projection)?;
    }

    let mut raster_band = dataset.rasterband(1)?;
    let values: Vec<u8> = classes.iter().copied().collect();
    let mut buffer = Buffer::new((cols, rows), values);
    raster_band.write((0, 0), (cols, rows), &mut buffer)?;
    raster_band.set_description("ndvi_class")?;
    raster_band.set_no_data_value(Some(0.0))?;

    info!("Successfully wrote class raster to {}", path.display());
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use tempfile::TempDir;

    const UTM33N_EPSG: u32 = 32633;

    pub(crate) fn test_metadata(width: usize, height: usize, bands: usize) -> RasterMetadata {
        let projection = gdal::spatial_ref::SpatialRef::from_epsg(UTM33N_EPSG)
            .and_then(|srs| srs.to_wkt())
            .unwrap_or_default();
        RasterMetadata {
            width,
            height,
            band_count: bands,
            geotransform: [500_000.0, 10.0, 0.0, 4_000_000.0, 0.0, -10.0],
            projection,
            nodata: None,
            pixel_width: 10.0,
            pixel_height: 10.0,
            band_descriptions: (1..=bands).map(|b| format!("band_{}", b)).collect(),
        }
    }

    pub(crate) fn test_raster(width: usize, height: usize, bands: usize) -> GeoRaster {
        let data = Array3::from_shape_fn((bands, height, width), |(b, r, c)| {
            (b * 1000 + r * width + c) as f32
        });
        GeoRaster::new(data, test_metadata(width, height, bands)).unwrap()
    }

    #[test]
    fn test_resolve_source_local() {
        assert_eq!(resolve_source("data/scene.tif"), "data/scene.tif");
        assert_eq!(resolve_source("/vsis3/bucket/a.tif"), "/vsis3/bucket/a.tif");
    }

    #[test]
    fn test_resolve_source_remote() {
        assert_eq!(
            resolve_source("https://example.com/scene.tif"),
            "/vsicurl/https://example.com/scene.tif"
        );
        assert_eq!(
            resolve_source("http://example.com/boundary.ZIP?raw=1"),
            "/vsizip//vsicurl/http://example.com/boundary.ZIP?raw=1"
        );
    }

    #[test]
    fn test_bounds_north_up() {
        let metadata = test_metadata(100, 50, 1);
        let bounds = metadata.bounds();
        assert_relative_eq!(bounds[0], 500_000.0);
        assert_relative_eq!(bounds[1], 3_999_500.0);
        assert_relative_eq!(bounds[2], 501_000.0);
        assert_relative_eq!(bounds[3], 4_000_000.0);
        assert!(metadata.is_north_up());
    }

    #[test]
    fn test_band_out_of_range() {
        let raster = test_raster(4, 3, 2);
        assert!(raster.band(0).is_err());
        assert!(raster.band(3).is_err());
        assert_eq!(raster.band(2).unwrap()[[0, 1]], 1001.0);
    }

    #[test]
    fn test_new_rejects_shape_mismatch() {
        let data = Array3::<f32>::zeros((1, 3, 3));
        assert!(GeoRaster::new(data, test_metadata(4, 3, 1)).is_err());
    }

    #[test]
    fn test_new_rejects_missing_band_descriptions() {
        let mut metadata = test_metadata(3, 3, 2);
        metadata.band_descriptions.pop();
        let data = Array3::<f32>::zeros((2, 3, 3));
        assert!(matches!(
            GeoRaster::new(data, metadata),
            Err(NdviError::BandDescriptionCount {
                descriptions: 1,
                bands: 2
            })
        ));
    }

    #[test]
    fn test_band_stats_skip_nan() {
        let mut raster = test_raster(2, 2, 1);
        raster.data[[0, 0, 0]] = f32::NAN;
        let info = describe("mem", &raster);
        let stats = &info.bands[0];
        assert_eq!(stats.valid_pixels, 3);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(3.0));
        assert_relative_eq!(stats.mean.unwrap(), 2.0);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roundtrip.tif");

        let mut raster = test_raster(20, 10, 3);
        raster.data[[1, 2, 3]] = f32::NAN;
        raster.metadata.band_descriptions[0] = "blue".to_string();
        write_geotiff(&path, &raster, &[]).unwrap();

        let loaded = read_raster(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.data.dim(), (3, 10, 20));
        assert_eq!(loaded.metadata.geotransform, raster.metadata.geotransform);
        assert!(loaded.data[[1, 2, 3]].is_nan());
        assert_eq!(loaded.data[[2, 9, 19]], raster.data[[2, 9, 19]]);
        assert_eq!(loaded.metadata.band_descriptions[0], "blue");
        assert_eq!(loaded.metadata.band_descriptions[1], "band_2");
    }

    #[test]
    fn test_write_class_raster() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("classes.tif");
        let metadata = test_metadata(3, 2, 1);
        let classes = ndarray::arr2(&[[0u8, 1, 2], [3, 4, 4]]);

        write_class_raster(&path, &classes, &metadata, &[]).unwrap();

        let dataset = Dataset::open(&path).unwrap();
        let band = dataset.rasterband(1).unwrap();
        assert_eq!(band.no_data_value(), Some(0.0));
        assert_eq!(band.description().unwrap(), "ndvi_class");
        let buffer = band.read_as::<u8>((0, 0), (3, 2), (3, 2), None).unwrap();
        assert_eq!(buffer.data(), &[0, 1, 2, 3, 4, 4]);
    }
}
