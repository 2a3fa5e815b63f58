use crate::cli::ProcessArgs;
use crate::clip::{clip_to_bbox, clip_to_boundary, BoundingBox};
use crate::cog::{validate_compression, validate_tile_size, write_cog, write_tiled_geotiff};
use crate::crs::{describe_crs, log_crs_units, parse_crs, raster_crs};
use crate::error::{NdviError, Result};
use crate::io::{read_raster, write_class_raster, GeoRaster};
use crate::ndvi::{class_summary, classify, compute_ndvi, ndvi_stats, ClassCount, NdviStats, NdviThresholds};
use crate::preview::{write_class_preview, write_ndvi_preview, write_rgb_preview};
use crate::reproject::reproject;
use crate::resample::{resample, ResampleMethod};
use crate::vector::load_boundary;
use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub input: String,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub dst_crs: Option<String>,
    pub resolution: Option<f64>,
    pub bbox: Option<BoundingBox>,
    pub bbox_crs: Option<String>,
    pub boundary: Option<String>,
    pub scale: Option<f64>,
    pub resampling: ResampleMethod,
    pub red_band: usize,
    pub nir_band: usize,
    pub rgb_bands: [usize; 3],
    pub thresholds: NdviThresholds,
    pub compression: String,
    pub tile_size: usize,
    pub cog: bool,
    pub preview: bool,
}

impl ProcessConfig {
    pub fn new(input: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            prefix: "scene".to_string(),
            dst_crs: None,
            resolution: None,
            bbox: None,
            bbox_crs: None,
            boundary: None,
            scale: None,
            resampling: ResampleMethod::Bilinear,
            red_band: 3,
            nir_band: 4,
            rgb_bands: [3, 2, 1],
            thresholds: NdviThresholds::default(),
            compression: "DEFLATE".to_string(),
            tile_size: 512,
            cog: true,
            preview: false,
        }
    }

    fn output_path(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}", self.prefix, suffix))
    }
}

impl TryFrom<ProcessArgs> for ProcessConfig {
    type Error = NdviError;

    fn try_from(args: ProcessArgs) -> Result<Self> {
        let rgb_bands: [usize; 3] = args
            .rgb_bands
            .as_slice()
            .try_into()
            .map_err(|_| NdviError::RgbBandCount(args.rgb_bands.len()))?;

        Ok(Self {
            input: args.input,
            output_dir: args.output_dir,
            prefix: args.prefix,
            dst_crs: args.dst_crs,
            resolution: args.resolution,
            bbox: args.bbox,
            bbox_crs: args.bbox_crs,
            boundary: args.boundary,
            scale: args.scale,
            resampling: args.resampling,
            red_band: args.red_band,
            nir_band: args.nir_band,
            rgb_bands,
            thresholds: args.thresholds,
            compression: args.compression.to_ascii_uppercase(),
            tile_size: args.tile_size,
            cog: !args.no_cog,
            preview: args.preview,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub input: String,
    pub steps: Vec<String>,
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub crs: Option<String>,
    pub geotransform: [f64; 6],
    pub ndvi: NdviStats,
    pub classes: Vec<ClassCount>,
    pub outputs: Vec<PathBuf>,
}

fn log_step(steps: &mut Vec<String>, raster: &GeoRaster, step: String) {
    info!(
        "{} -> {}x{} ({} bands)",
        step, raster.metadata.width, raster.metadata.height, raster.metadata.band_count
    );
    debug!("Bounds after {}: {:?}", step, raster.metadata.bounds());
    steps.push(step);
}

/// Band indices are checked up front since no step changes the band count
fn check_bands(raster: &GeoRaster, config: &ProcessConfig) -> Result<()> {
    raster.band(config.red_band)?;
    raster.band(config.nir_band)?;
    if config.preview {
        for &band in &config.rgb_bands {
            raster.band(band)?;
        }
    }
    Ok(())
}

fn write_report(path: &Path, report: &PipelineReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)?;
    info!("Wrote report {}", path.display());
    Ok(())
}

/// Run the full workflow and write all outputs into `config.output_dir`
pub fn run(config: &ProcessConfig) -> Result<PipelineReport> {
    validate_compression(&config.compression)?;
    validate_tile_size(config.tile_size)?;
    fs::create_dir_all(&config.output_dir)?;

    let mut steps = Vec::new();
    let mut outputs = Vec::new();

    // Load and inspect
    let mut raster = read_raster(&config.input)?;
    check_bands(&raster, config)?;
    match raster_crs(&raster.metadata) {
        Ok(srs) => log_crs_units(&srs),
        Err(_) => info!("Input has no CRS; reprojection and CRS-tagged clipping are unavailable"),
    }
    log_step(&mut steps, &raster, format!("load {}", config.input));

    if let Some(definition) = &config.dst_crs {
        let dst = parse_crs(definition)?;
        raster = reproject(&raster, &dst, config.resolution, config.resampling)?;
        log_step(&mut steps, &raster, format!("reproject to {}", describe_crs(&dst)));
    }

    if let Some(bbox) = &config.bbox {
        let bbox_crs = config.bbox_crs.as_deref().map(parse_crs).transpose()?;
        raster = clip_to_bbox(&raster, bbox, bbox_crs.as_ref())?;
        log_step(&mut steps, &raster, format!("clip to bbox {:?}", bbox.as_array()));
    }

    if let Some(source) = &config.boundary {
        let target = raster_crs(&raster.metadata)?;
        let boundary = load_boundary(source, &target)?;
        raster = clip_to_boundary(&raster, &boundary)?;
        log_step(&mut steps, &raster, format!("clip to boundary {}", source));
    }

    if let Some(scale) = config.scale {
        raster = resample(&raster, scale, config.resampling)?;
        log_step(&mut steps, &raster, format!("resample x{} ({})", scale, config.resampling));
    }

    // Processed multi-band raster as a plain tiled GeoTIFF
    let processed_path = config.output_path("processed.tif");
    write_tiled_geotiff(&processed_path, &raster, &config.compression, config.tile_size)?;
    outputs.push(processed_path);

    if config.preview {
        let path = config.output_path("rgb.png");
        write_rgb_preview(&path, &raster, config.rgb_bands)?;
        outputs.push(path);
    }

    let ndvi = compute_ndvi(&raster, config.red_band, config.nir_band)?;
    let stats = ndvi_stats(&ndvi)?;
    log_step(&mut steps, &ndvi, "ndvi".to_string());
    if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
        info!("NDVI range [{:.3}, {:.3}], mean {:.3}", min, max, mean);
    }

    let classes = classify(&ndvi, &config.thresholds)?;
    let summary = class_summary(&classes);
    for class in &summary {
        info!(
            "Class {} ({}): {} pixels ({:.1}%)",
            class.class,
            class.name,
            class.pixels,
            class.fraction * 100.0
        );
    }
    steps.push("classify".to_string());

    let ndvi_path = if config.cog {
        let path = config.output_path("ndvi_cog.tif");
        write_cog(&path, &ndvi, &config.compression, config.tile_size)?;
        path
    } else {
        let path = config.output_path("ndvi.tif");
        write_tiled_geotiff(&path, &ndvi, &config.compression, config.tile_size)?;
        path
    };
    outputs.push(ndvi_path);

    let classes_path = config.output_path("classes.tif");
    let class_options = crate::cog::create_dataset_options(&config.compression, config.tile_size);
    write_class_raster(&classes_path, &classes, &ndvi.metadata, &class_options)?;
    outputs.push(classes_path);

    if config.preview {
        let path = config.output_path("ndvi.png");
        write_ndvi_preview(&path, &ndvi)?;
        outputs.push(path);

        let path = config.output_path("classes.png");
        write_class_preview(&path, &classes)?;
        outputs.push(path);
    }

    let report_path = config.output_path("report.json");
    outputs.push(report_path.clone());

    let report = PipelineReport {
        input: config.input.clone(),
        steps,
        width: raster.metadata.width,
        height: raster.metadata.height,
        band_count: raster.metadata.band_count,
        crs: raster_crs(&raster.metadata).ok().map(|srs| describe_crs(&srs)),
        geotransform: raster.metadata.geotransform,
        ndvi: stats,
        classes: summary,
        outputs,
    };
    write_report(&report_path, &report)?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::tests::test_metadata;
    use crate::io::write_geotiff;
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use tempfile::TempDir;

    /// 4-band scene: left half vegetated, right half water
    fn write_scene(dir: &Path) -> String {
        let (width, height) = (64, 48);
        let data = Array3::from_shape_fn((4, height, width), |(b, _r, c)| {
            let vegetated = c < width / 2;
            match (b, vegetated) {
                (2, true) => 0.05,
                (3, true) => 0.45,
                (2, false) => 0.08,
                (3, false) => 0.02,
                _ => 0.1,
            }
        });
        let raster = GeoRaster::new(data, test_metadata(width, height, 4)).unwrap();
        let path = dir.join("scene.tif");
        write_geotiff(&path, &raster, &[]).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_run_minimal() {
        let dir = TempDir::new().unwrap();
        let input = write_scene(dir.path());
        let mut config = ProcessConfig::new(input, dir.path().join("out"));
        config.tile_size = 256;
        config.preview = true;

        let report = run(&config).unwrap();

        assert_eq!((report.width, report.height), (64, 48));
        assert_eq!(report.ndvi.valid_pixels, 64 * 48);
        let dense = report.classes.iter().find(|c| c.name == "dense_vegetation").unwrap();
        let water = report.classes.iter().find(|c| c.name == "water").unwrap();
        assert_eq!(dense.pixels, 32 * 48);
        assert_eq!(water.pixels, 32 * 48);

        for output in &report.outputs {
            assert!(output.exists(), "missing {}", output.display());
        }
        assert!(dir.path().join("out/scene_ndvi_cog.tif").exists());
        assert!(dir.path().join("out/scene_report.json").exists());
    }

    #[test]
    fn test_run_clip_and_resample() {
        let dir = TempDir::new().unwrap();
        let input = write_scene(dir.path());
        let mut config = ProcessConfig::new(input, dir.path().join("out"));
        config.tile_size = 256;
        config.cog = false;
        // Left 20 columns and top 10 rows of the 10 m grid
        config.bbox = Some(BoundingBox::new(500_000.0, 3_999_900.0, 500_200.0, 4_000_000.0).unwrap());
        config.scale = Some(0.5);
        config.resampling = ResampleMethod::Average;

        let report = run(&config).unwrap();

        assert_eq!((report.width, report.height), (10, 5));
        assert_eq!(report.steps.len(), 5);
        let dense = report.classes.iter().find(|c| c.name == "dense_vegetation").unwrap();
        assert_eq!(dense.pixels, 50);
        assert!(dir.path().join("out/scene_ndvi.tif").exists());
    }

    fn class_pixels(report: &PipelineReport, name: &str) -> usize {
        report
            .classes
            .iter()
            .find(|c| c.name == name)
            .map_or(0, |c| c.pixels)
    }

    #[test]
    fn test_run_reproject() {
        let dir = TempDir::new().unwrap();
        let input = write_scene(dir.path());
        let mut config = ProcessConfig::new(input, dir.path().join("out"));
        config.tile_size = 256;
        config.dst_crs = Some("EPSG:32632".to_string());
        config.resolution = Some(10.0);
        config.resampling = ResampleMethod::Nearest;

        let report = run(&config).unwrap();

        assert_eq!(report.crs.as_deref(), Some("EPSG:32632"));
        assert!(report.steps.iter().any(|s| s.starts_with("reproject to EPSG:32632")));
        assert_relative_eq!(report.geotransform[1], 10.0);

        // The zone 33N grid is rotated in zone 32N, so the corners are empty
        assert!(report.ndvi.valid_pixels < report.ndvi.total_pixels);
        assert!(class_pixels(&report, "water") > 0);
        assert!(class_pixels(&report, "dense_vegetation") > 0);
        // Nearest sampling keeps the two pure NDVI values
        assert_eq!(class_pixels(&report, "bare_soil"), 0);
        assert_eq!(class_pixels(&report, "sparse_vegetation"), 0);
    }

    #[test]
    fn test_run_bbox_in_geographic_crs() {
        let dir = TempDir::new().unwrap();
        let input = write_scene(dir.path());

        // Left 30 columns of the scene, expressed in lon/lat
        let utm = parse_crs("EPSG:32633").unwrap();
        let wgs84 = parse_crs("EPSG:4326").unwrap();
        let lon_lat = crate::crs::transform_bounds(
            [500_000.0, 3_999_520.0, 500_300.0, 4_000_000.0],
            &utm,
            &wgs84,
        )
        .unwrap();

        let mut config = ProcessConfig::new(input, dir.path().join("out"));
        config.tile_size = 256;
        config.bbox = Some(BoundingBox::new(lon_lat[0], lon_lat[1], lon_lat[2], lon_lat[3]).unwrap());
        config.bbox_crs = Some("EPSG:4326".to_string());

        let report = run(&config).unwrap();

        assert_eq!(report.height, 48);
        assert!((30..=31).contains(&report.width), "width {}", report.width);
        assert_eq!(class_pixels(&report, "water"), 0);
        assert_eq!(
            class_pixels(&report, "dense_vegetation"),
            report.width * report.height
        );
    }

    #[test]
    fn test_run_boundary() {
        let dir = TempDir::new().unwrap();
        let input = write_scene(dir.path());

        // Triangle over the vegetated columns 0..16, in the scene CRS
        let boundary = dir.path().join("boundary.geojson");
        fs::write(
            &boundary,
            r#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32633"}},
  "features": [
    {
      "type": "Feature",
      "properties": {},
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[500000, 4000000], [500160, 4000000], [500000, 3999520], [500000, 4000000]]]
      }
    }
  ]
}"#,
        )
        .unwrap();

        let mut config = ProcessConfig::new(input, dir.path().join("out"));
        config.tile_size = 256;
        config.boundary = Some(boundary.to_str().unwrap().to_string());

        let report = run(&config).unwrap();

        assert_eq!((report.width, report.height), (16, 48));
        let valid = report.ndvi.valid_pixels;
        assert!(valid > 0 && valid < report.ndvi.total_pixels);
        // Roughly half of the window lies inside the triangle
        assert!(valid > 16 * 48 / 3 && valid < 16 * 48 * 2 / 3, "valid {}", valid);
        assert_eq!(class_pixels(&report, "water"), 0);
        assert_eq!(class_pixels(&report, "dense_vegetation"), valid);
    }

    #[test]
    fn test_run_rejects_bad_band() {
        let dir = TempDir::new().unwrap();
        let input = write_scene(dir.path());
        let mut config = ProcessConfig::new(input, dir.path().join("out"));
        config.nir_band = 7;
        assert!(matches!(
            run(&config),
            Err(NdviError::BandOutOfRange { band: 7, count: 4 })
        ));
        assert!(!dir.path().join("out/scene_processed.tif").exists());

        config.nir_band = 4;
        config.preview = true;
        config.rgb_bands = [5, 2, 1];
        assert!(matches!(
            run(&config),
            Err(NdviError::BandOutOfRange { band: 5, count: 4 })
        ));
        assert!(!dir.path().join("out/scene_processed.tif").exists());
    }

    #[test]
    fn test_config_from_args_requires_three_rgb_bands() {
        let args = ProcessArgs {
            input: "a.tif".to_string(),
            output_dir: PathBuf::from("out"),
            prefix: "scene".to_string(),
            dst_crs: None,
            resolution: None,
            bbox: None,
            bbox_crs: None,
            boundary: None,
            scale: None,
            resampling: ResampleMethod::Nearest,
            red_band: 3,
            nir_band: 4,
            rgb_bands: vec![3, 2],
            thresholds: NdviThresholds::default(),
            compression: "lzw".to_string(),
            tile_size: 256,
            no_cog: false,
            preview: false,
        };
        assert!(matches!(
            ProcessConfig::try_from(args.clone()),
            Err(NdviError::RgbBandCount(2))
        ));

        let config = ProcessConfig::try_from(ProcessArgs {
            rgb_bands: vec![4, 3, 2],
            ..args
        })
        .unwrap();
        assert_eq!(config.rgb_bands, [4, 3, 2]);
        assert_eq!(config.compression, "LZW");
        assert!(config.cog);
    }
}
