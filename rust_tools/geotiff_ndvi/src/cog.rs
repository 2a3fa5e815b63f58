use crate::error::{NdviError, Result};
use crate::io::{create_output_dataset, fill_dataset, GeoRaster};
use gdal::cpl::CslStringList;
use gdal::{Dataset, DriverManager};
use log::{debug, info, warn};
use std::path::Path;

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
    if !valid_types.contains(&compression) {
        return Err(NdviError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Validate tile size (must be multiple of 16)
pub fn validate_tile_size(tile_size: usize) -> Result<()> {
    if tile_size == 0 || tile_size % 16 != 0 {
        return Err(NdviError::InvalidTileSize(tile_size));
    }
    Ok(())
}

/// Creation options for a plain tiled GeoTIFF
pub fn create_dataset_options(compression: &str, tile_size: usize) -> Vec<String> {
    vec![
        format!("COMPRESS={}", compression),
        "TILED=YES".to_string(),
        format!("BLOCKXSIZE={}", tile_size),
        format!("BLOCKYSIZE={}", tile_size),
        "BIGTIFF=IF_SAFER".to_string(),
    ]
}

/// Creation options for GDAL's COG driver
pub fn cog_options(compression: &str, tile_size: usize) -> Vec<String> {
    vec![
        format!("COMPRESS={}", compression),
        format!("BLOCKSIZE={}", tile_size),
        "BIGTIFF=IF_SAFER".to_string(),
        "OVERVIEW_RESAMPLING=AVERAGE".to_string(),
    ]
}

fn to_csl(options: &[String]) -> Result<CslStringList> {
    let mut list = CslStringList::new();
    for opt in options {
        list.add_string(opt)?;
    }
    Ok(list)
}

/// Power-of-two overview levels until the smaller side drops below 256
pub fn overview_levels(width: usize, height: usize) -> Vec<i32> {
    let min_dim = width.min(height);
    let mut levels = Vec::new();
    let mut level = 2;

    while (min_dim / level) >= 256 {
        levels.push(level as i32);
        level *= 2;
    }
    levels
}

/// Build overviews using GDAL's internal overview generation
pub fn build_overviews(dataset: &mut Dataset) -> Result<()> {
    let (width, height) = dataset.raster_size();
    let levels = overview_levels(width as usize, height as usize);

    if levels.is_empty() {
        debug!("Raster too small for overviews ({}x{}), skipping", width, height);
        return Ok(());
    }

    info!("Creating {} overview levels: {:?}", levels.len(), levels);

    // AVERAGE suits continuous data such as NDVI; empty band list means all bands
    dataset
        .build_overviews("AVERAGE", &levels, &[])
        .map_err(|e| NdviError::CogCreationFailed(format!("Failed to build overviews: {}", e)))?;

    Ok(())
}

/// Validate that output is tiled rather than scanline-organised
pub fn validate_cog_structure(dataset: &Dataset) -> Result<()> {
    let (width, _height) = dataset.raster_size();

    let rasterband = dataset.rasterband(1)?;
    let block_size = rasterband.block_size();

    if block_size.0 == width as usize && block_size.1 == 1 {
        return Err(NdviError::CogCreationFailed(
            "Output is not tiled (scanline format detected)".to_string(),
        ));
    }

    debug!("COG validation: tiled=yes, block_size={}x{}", block_size.0, block_size.1);
    Ok(())
}

/// Write a tiled, compressed GeoTIFF with internal overviews
pub fn write_tiled_geotiff(
    path: &Path,
    raster: &GeoRaster,
    compression: &str,
    tile_size: usize,
) -> Result<()> {
    validate_compression(compression)?;
    validate_tile_size(tile_size)?;

    let options = create_dataset_options(compression, tile_size);
    let mut dataset = create_output_dataset::<f32>(
        path,
        &raster.metadata,
        raster.metadata.band_count,
        &options,
    )?;
    fill_dataset(&mut dataset, raster)?;
    build_overviews(&mut dataset)?;
    validate_cog_structure(&dataset)?;

    info!("Wrote tiled GeoTIFF {}", path.display());
    Ok(())
}

/// Write a Cloud-Optimized GeoTIFF.
///
/// The raster is staged in a MEM dataset and copied through the COG driver.
/// When the driver is missing (GDAL < 3.1) the GTiff driver is used with
/// precomputed overviews and COPY_SRC_OVERVIEWS, which yields the same layout.
pub fn write_cog(path: &Path, raster: &GeoRaster, compression: &str, tile_size: usize) -> Result<()> {
    validate_compression(compression)?;
    validate_tile_size(tile_size)?;

    let metadata = &raster.metadata;
    let mem_driver = DriverManager::get_driver_by_name("MEM")?;
    let mut staged = mem_driver.create_with_band_type::<f32, _>(
        "",
        metadata.width,
        metadata.height,
        metadata.band_count,
    )?;
    fill_dataset(&mut staged, raster)?;

    let output = match DriverManager::get_driver_by_name("COG") {
        Ok(cog_driver) => {
            info!("Converting to Cloud-Optimized GeoTIFF with the COG driver...");
            let options = to_csl(&cog_options(compression, tile_size))?;
            staged.create_copy(&cog_driver, path, &options)
        }
        Err(e) => {
            warn!("COG driver unavailable ({}), using GTiff with copied overviews", e);
            build_overviews(&mut staged)?;
            let gtiff_driver = DriverManager::get_driver_by_name("GTiff")?;
            let mut options = create_dataset_options(compression, tile_size);
            options.push("COPY_SRC_OVERVIEWS=YES".to_string());
            let options = to_csl(&options)?;
            staged.create_copy(&gtiff_driver, path, &options)
        }
    };

    let dataset = output.map_err(|e| {
        NdviError::CogCreationFailed(format!("{}: {}", path.display(), e))
    })?;
    validate_cog_structure(&dataset)?;

    info!("COG conversion successful: {}", path.display());
    Ok(())
}
