use thiserror::Error;

#[derive(Error, Debug)]
pub enum NdviError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Input raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Pixel size is non-positive: {0}")]
    InvalidPixelSize(f64),

    #[error("Band {band} out of range (raster has {count} bands)")]
    BandOutOfRange { band: usize, count: usize },

    #[error("{descriptions} band descriptions for {bands} bands")]
    BandDescriptionCount { descriptions: usize, bands: usize },

    #[error("Expected 3 RGB preview bands, got {0}")]
    RgbBandCount(usize),

    #[error("Rotated geotransforms are not supported: {0:?}")]
    RotatedGeotransform([f64; 6]),

    #[error("Raster has no coordinate reference system")]
    MissingCrs,

    #[error("CRS error: {0}")]
    CrsError(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Clip region does not overlap the raster")]
    NoOverlap,

    #[error("No polygon geometries found in boundary: {0}")]
    EmptyBoundary(String),

    #[error("Invalid scale factor: {0} (must be positive)")]
    InvalidScale(f64),

    #[error("Invalid resolution: {0} (must be positive)")]
    InvalidResolution(f64),

    #[error("Resampling method {0} is not supported for {1}")]
    UnsupportedResampling(String, &'static str),

    #[error("Invalid NDVI thresholds: {0}")]
    InvalidThresholds(String),

    #[error("COG creation failed: {0}")]
    CogCreationFailed(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid tile size: {0} (must be multiple of 16)")]
    InvalidTileSize(usize),
}

pub type Result<T> = std::result::Result<T, NdviError>;
