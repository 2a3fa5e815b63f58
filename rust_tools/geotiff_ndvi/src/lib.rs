// Library exports for testing and reuse

pub mod cli;
pub mod clip;
pub mod cog;
pub mod crs;
pub mod error;
pub mod io;
pub mod ndvi;
pub mod pipeline;
pub mod preview;
pub mod reproject;
pub mod resample;
pub mod vector;

// Re-export commonly used types
pub use clip::{clip_to_bbox, clip_to_boundary, BoundingBox};
pub use error::{NdviError, Result};
pub use io::{read_raster, GeoRaster, RasterMetadata};
pub use ndvi::{classify, compute_ndvi, NdviThresholds};
pub use pipeline::{run, PipelineReport, ProcessConfig};
pub use reproject::reproject;
pub use resample::{resample, ResampleMethod};
