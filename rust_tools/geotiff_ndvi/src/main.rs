use clap::Parser;
use env_logger::Env;
use log::info;

use geotiff_ndvi::cli::{Cli, Command};
use geotiff_ndvi::error::Result;
use geotiff_ndvi::io::{describe, read_raster, RasterInfo};
use geotiff_ndvi::pipeline::{self, ProcessConfig};

fn print_info(info: &RasterInfo) {
    println!("Source:      {}", info.source);
    println!("Size:        {} x {} ({} bands)", info.width, info.height, info.band_count);
    println!("CRS:         {}", info.crs.as_deref().unwrap_or("none"));
    println!("Pixel size:  {:.6} x {:.6}", info.pixel_size.0, info.pixel_size.1);
    println!(
        "Bounds:      [{:.6}, {:.6}, {:.6}, {:.6}]",
        info.bounds[0], info.bounds[1], info.bounds[2], info.bounds[3]
    );
    match info.nodata {
        Some(nd) => println!("Nodata:      {}", nd),
        None => println!("Nodata:      none"),
    }
    for band in &info.bands {
        let fmt = |v: Option<f32>| v.map_or("-".to_string(), |v| format!("{:.4}", v));
        println!(
            "Band {:>2} {:<12} min {} max {} mean {} valid {}",
            band.band,
            band.description,
            fmt(band.min),
            fmt(band.max),
            band.mean.map_or("-".to_string(), |v| format!("{:.4}", v)),
            band.valid_pixels
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Set thread pool size if specified
    if let Some(n_threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()?;
        info!("Using {} threads", n_threads);
    } else {
        info!("Using all available threads");
    }

    match cli.command {
        Command::Info { input, json } => {
            let raster = read_raster(&input)?;
            let summary = describe(&input, &raster);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_info(&summary);
            }
        }
        Command::Process(args) => {
            info!("=== GeoTIFF NDVI workflow ===");
            let config = ProcessConfig::try_from(args)?;
            let report = pipeline::run(&config)?;
            for output in &report.outputs {
                info!("Output: {}", output.display());
            }
            info!("=== Done! ===");
        }
    }

    Ok(())
}
