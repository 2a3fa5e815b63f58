use crate::error::{NdviError, Result};
use crate::io::RasterMetadata;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use log::{debug, info, warn};

/// Parse a CRS definition (EPSG:xxxx, WKT or PROJ string) in x/y axis order
pub fn parse_crs(definition: &str) -> Result<SpatialRef> {
    let mut srs = SpatialRef::from_definition(definition)
        .map_err(|e| NdviError::CrsError(format!("cannot parse '{}': {}", definition, e)))?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// CRS of a raster, from its WKT projection
pub fn raster_crs(metadata: &RasterMetadata) -> Result<SpatialRef> {
    if metadata.projection.trim().is_empty() {
        return Err(NdviError::MissingCrs);
    }
    let mut srs = SpatialRef::from_wkt(&metadata.projection)
        .map_err(|e| NdviError::CrsError(format!("invalid raster WKT: {}", e)))?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// Short label such as "EPSG:32633"
pub fn describe_crs(srs: &SpatialRef) -> String {
    match (srs.auth_name(), srs.auth_code()) {
        (Ok(name), Ok(code)) => format!("{}:{}", name, code),
        _ => "custom".to_string(),
    }
}

/// Log what kind of CRS this is and which linear units it uses
pub fn log_crs_units(srs: &SpatialRef) {
    let label = describe_crs(srs);

    if srs.is_geographic() {
        info!("{}: geographic CRS (degrees)", label);
        return;
    }

    if srs.is_projected() {
        let linear_units = srs.linear_units();
        if (linear_units - 1.0).abs() < 0.01 {
            info!("{}: projected CRS with meter units", label);
        } else {
            warn!(
                "{}: projected CRS with non-meter units (units={:.6})",
                label, linear_units
            );
        }
        return;
    }

    warn!("{}: unknown CRS type", label);
}

pub fn same_crs(a: &SpatialRef, b: &SpatialRef) -> bool {
    match (a.auth_code(), b.auth_code()) {
        (Ok(code_a), Ok(code_b)) => {
            code_a == code_b && a.auth_name().ok() == b.auth_name().ok()
        }
        _ => match (a.to_wkt(), b.to_wkt()) {
            (Ok(wkt_a), Ok(wkt_b)) => wkt_a == wkt_b,
            _ => false,
        },
    }
}

/// Transform [min_x, min_y, max_x, max_y] between CRSs, densifying the edges
pub fn transform_bounds(bounds: [f64; 4], from: &SpatialRef, to: &SpatialRef) -> Result<[f64; 4]> {
    if same_crs(from, to) {
        return Ok(bounds);
    }

    let transform = CoordTransform::new(from, to)?;
    let out = transform.transform_bounds(&bounds, 21)?;
    debug!(
        "Transformed bounds {:?} ({}) -> {:?} ({})",
        bounds,
        describe_crs(from),
        out,
        describe_crs(to)
    );

    if out.iter().any(|v| !v.is_finite()) {
        return Err(NdviError::CrsError(format!(
            "bounds {:?} cannot be expressed in {}",
            bounds,
            describe_crs(to)
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::tests::test_metadata;

    #[test]
    fn test_parse_epsg() {
        let srs = parse_crs("EPSG:4326").unwrap();
        assert!(srs.is_geographic());
        assert_eq!(describe_crs(&srs), "EPSG:4326");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_crs("not a crs").is_err());
    }

    #[test]
    fn test_missing_crs() {
        let mut metadata = test_metadata(2, 2, 1);
        metadata.projection = String::new();
        assert!(matches!(raster_crs(&metadata), Err(NdviError::MissingCrs)));
    }

    #[test]
    fn test_same_crs() {
        let metadata = test_metadata(2, 2, 1);
        let a = raster_crs(&metadata).unwrap();
        let b = parse_crs("EPSG:32633").unwrap();
        let c = parse_crs("EPSG:4326").unwrap();
        assert!(same_crs(&a, &b));
        assert!(!same_crs(&a, &c));
    }

    #[test]
    fn test_transform_bounds_lon_lat_order() {
        let wgs84 = parse_crs("EPSG:4326").unwrap();
        let utm = parse_crs("EPSG:32633").unwrap();

        // Around the zone 33N central meridian (15E)
        let out = transform_bounds([14.9, 45.0, 15.1, 45.1], &wgs84, &utm).unwrap();
        assert!(out[0] > 490_000.0 && out[0] < 500_000.0);
        assert!(out[2] > 500_000.0 && out[2] < 510_000.0);
        assert!(out[1] > 4_980_000.0 && out[3] < 5_000_000.0);
    }
}
