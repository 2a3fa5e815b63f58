use crate::crs::{describe_crs, same_crs};
use crate::error::{NdviError, Result};
use crate::io::open_dataset;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::LayerAccess;
use geo::{Geometry, MultiPolygon, Polygon};
use log::{debug, info, warn};

/// Collect polygons from a geo geometry, dropping everything else
fn collect_polygons(geometry: Geometry<f64>, polygons: &mut Vec<Polygon<f64>>) -> usize {
    match geometry {
        Geometry::Polygon(polygon) => {
            polygons.push(polygon);
            0
        }
        Geometry::MultiPolygon(multi) => {
            polygons.extend(multi.0);
            0
        }
        Geometry::GeometryCollection(collection) => collection
            .0
            .into_iter()
            .map(|g| collect_polygons(g, polygons))
            .sum(),
        _ => 1,
    }
}

/// Load every polygon of the first layer of a vector source, in `target_crs`
pub fn load_boundary(source: &str, target_crs: &SpatialRef) -> Result<MultiPolygon<f64>> {
    let dataset = open_dataset(source)?;
    if dataset.layer_count() as usize == 0 {
        return Err(NdviError::EmptyBoundary(source.to_string()));
    }

    let mut layer = dataset.layer(0)?;
    let transform = match layer.spatial_ref() {
        Some(mut layer_crs) => {
            layer_crs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
            if same_crs(&layer_crs, target_crs) {
                None
            } else {
                info!(
                    "Transforming boundary {} -> {}",
                    describe_crs(&layer_crs),
                    describe_crs(target_crs)
                );
                Some(CoordTransform::new(&layer_crs, target_crs)?)
            }
        }
        None => {
            warn!(
                "Boundary layer has no CRS, assuming {}",
                describe_crs(target_crs)
            );
            None
        }
    };

    let mut polygons = Vec::new();
    let mut skipped = 0usize;
    for feature in layer.features() {
        let Some(geometry) = feature.geometry() else {
            skipped += 1;
            continue;
        };

        let geometry = match &transform {
            Some(t) => geometry.transform(t)?.to_geo()?,
            None => geometry.to_geo()?,
        };
        skipped += collect_polygons(geometry, &mut polygons);
    }

    if skipped > 0 {
        debug!("Skipped {} non-polygon features", skipped);
    }
    if polygons.is_empty() {
        return Err(NdviError::EmptyBoundary(source.to_string()));
    }

    info!("Loaded {} boundary polygons from {}", polygons.len(), source);
    Ok(MultiPolygon(polygons))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::parse_crs;
    use geo::{polygon, point, Contains, GeometryCollection, LineString};
    use std::fs;
    use tempfile::TempDir;

    const SQUARE_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": {"name": "square"},
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[14.9, 36.0], [15.1, 36.0], [15.1, 36.2], [14.9, 36.2], [14.9, 36.0]]]
      }
    },
    {
      "type": "Feature",
      "properties": {"name": "road"},
      "geometry": {"type": "LineString", "coordinates": [[14.9, 36.0], [15.1, 36.2]]}
    }
  ]
}"#;

    #[test]
    fn test_collect_polygons() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        let line: LineString<f64> = vec![(0.0, 0.0), (1.0, 1.0)].into();
        let collection = Geometry::GeometryCollection(GeometryCollection(vec![
            Geometry::Polygon(square.clone()),
            Geometry::LineString(line),
        ]));

        let mut polygons = Vec::new();
        let skipped = collect_polygons(collection, &mut polygons);
        assert_eq!(skipped, 1);
        assert_eq!(polygons, vec![square]);
    }

    #[test]
    fn test_load_boundary_reprojects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("boundary.geojson");
        fs::write(&path, SQUARE_GEOJSON).unwrap();

        let utm = parse_crs("EPSG:32633").unwrap();
        let boundary = load_boundary(path.to_str().unwrap(), &utm).unwrap();

        assert_eq!(boundary.0.len(), 1);
        // 15E, 36.1N lies on the zone's central meridian
        assert!(boundary.contains(&point!(x: 500_000.0, y: 3_995_000.0)));
        assert!(!boundary.contains(&point!(x: 530_000.0, y: 3_995_000.0)));
    }

    #[test]
    fn test_load_boundary_without_layer_crs() {
        // The CSV driver reads the WKT column as a geometry with no CRS
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("boundary.csv");
        fs::write(
            &path,
            "id,WKT\n1,\"POLYGON ((500000 4000000,500040 4000000,500040 3999960,500000 3999960,500000 4000000))\"\n",
        )
        .unwrap();

        let utm = parse_crs("EPSG:32633").unwrap();
        let boundary = load_boundary(path.to_str().unwrap(), &utm).unwrap();

        // Coordinates are taken as-is in the target CRS
        assert_eq!(boundary.0.len(), 1);
        assert!(boundary.contains(&point!(x: 500_020.0, y: 3_999_980.0)));
        assert!(!boundary.contains(&point!(x: 500_060.0, y: 3_999_980.0)));
    }

    #[test]
    fn test_load_boundary_without_polygons() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lines.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},
            "geometry":{"type":"LineString","coordinates":[[0,0],[1,1]]}}]}"#,
        )
        .unwrap();

        let wgs84 = parse_crs("EPSG:4326").unwrap();
        assert!(matches!(
            load_boundary(path.to_str().unwrap(), &wgs84),
            Err(NdviError::EmptyBoundary(_))
        ));
    }
}
