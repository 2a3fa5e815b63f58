use crate::clip::BoundingBox;
use crate::ndvi::NdviThresholds;
use crate::resample::ResampleMethod;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "geotiff-ndvi")]
#[command(about = "Reproject, clip, resample and compute NDVI for multi-band GeoTIFF imagery")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print raster metadata and per-band statistics
    Info {
        /// Input raster path or http(s) URL
        #[arg(short, long, value_name = "FILE|URL")]
        input: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run the reproject / clip / resample / NDVI workflow
    Process(ProcessArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Input raster path or http(s) URL (multi-band)
    #[arg(short, long, value_name = "FILE|URL")]
    pub input: String,

    /// Directory for all outputs (created if missing)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// File name prefix for outputs
    #[arg(long, default_value = "scene")]
    pub prefix: String,

    /// Reproject to this CRS (e.g. EPSG:32633, WKT or PROJ string)
    #[arg(long, value_name = "CRS")]
    pub dst_crs: Option<String>,

    /// Target pixel size in destination CRS units (default: keep pixel count)
    #[arg(long, value_name = "UNITS", requires = "dst_crs")]
    pub resolution: Option<f64>,

    /// Clip to "min_x,min_y,max_x,max_y"
    #[arg(long, value_name = "MINX,MINY,MAXX,MAXY", allow_hyphen_values = true)]
    pub bbox: Option<BoundingBox>,

    /// CRS of --bbox (default: raster CRS after reprojection)
    #[arg(long, value_name = "CRS", requires = "bbox")]
    pub bbox_crs: Option<String>,

    /// Clip to polygons from a vector file or URL (GeoJSON, Shapefile, zip)
    #[arg(long, value_name = "FILE|URL")]
    pub boundary: Option<String>,

    /// Resample by this factor (0.5 halves the pixel count per axis)
    #[arg(long, value_name = "FACTOR")]
    pub scale: Option<f64>,

    /// Resampling kernel for reprojection and rescaling
    #[arg(long, value_enum, default_value_t = ResampleMethod::Bilinear)]
    pub resampling: ResampleMethod,

    /// Red band index (1-based)
    #[arg(long, default_value_t = 3)]
    pub red_band: usize,

    /// Near-infrared band index (1-based)
    #[arg(long, default_value_t = 4)]
    pub nir_band: usize,

    /// Bands used for the true-colour preview, "r,g,b" (1-based)
    #[arg(long, value_delimiter = ',', default_values_t = [3, 2, 1])]
    pub rgb_bands: Vec<usize>,

    /// NDVI class breaks "water,bare_soil,sparse"
    #[arg(long, default_value = "0.0,0.2,0.5", allow_hyphen_values = true)]
    pub thresholds: NdviThresholds,

    /// Compression type (DEFLATE, LZW, ZSTD, NONE)
    #[arg(long, default_value = "DEFLATE")]
    pub compression: String,

    /// Tile size in pixels (multiple of 16)
    #[arg(long, default_value_t = 512)]
    pub tile_size: usize,

    /// Write NDVI as a plain tiled GeoTIFF instead of a COG
    #[arg(long)]
    pub no_cog: bool,

    /// Write PNG previews (true colour, NDVI, classes)
    #[arg(long)]
    pub preview: bool,
}
