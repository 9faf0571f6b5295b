// 🗺️ Boundary Index - district name → representative coordinate
//
// Built once per aggregation run from a GeoJSON FeatureCollection. Each
// district gets one interior point; the override table then replaces the
// points known to render badly. Lookups never fail: a miss is None.

use crate::config::{CoordinateOverride, GeoConfig};
use crate::error::BoundaryError;
use crate::geometry::{interior_point, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl From<Point> for Coordinate {
    fn from(p: Point) -> Self {
        Coordinate { lat: p.y, lon: p.x }
    }
}

/// Geometry of one district as read from the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPolygon {
    pub district: String,
    pub polygons: Vec<Polygon>,
}

// ============================================================================
// GEOJSON SOURCE
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
    geometry: Option<RawGeometry>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

/// Which features to read and which property names the district
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundarySource {
    pub district_field: String,
    /// Only features whose property equals this value are kept
    pub region_filter: Option<(String, String)>,
}

impl BoundarySource {
    pub fn from_config(geo: &GeoConfig) -> Self {
        BoundarySource {
            district_field: geo.district_field.clone(),
            region_filter: geo.region_field.clone().zip(geo.region_value.clone()),
        }
    }

    /// Parse GeoJSON text into district geometries.
    ///
    /// Features sharing a district name are merged into one multi-polygon, in
    /// first-seen order. Features without the district property or with a
    /// non-areal geometry are skipped. A source that yields no district at
    /// all is an error: every row would end up without a coordinate.
    pub fn parse(&self, geojson: &str) -> Result<Vec<BoundaryPolygon>, BoundaryError> {
        let collection: FeatureCollection =
            serde_json::from_str(geojson).map_err(|e| BoundaryError::InvalidGeoJson {
                reason: e.to_string(),
            })?;

        let mut order: Vec<String> = Vec::new();
        let mut by_district: HashMap<String, Vec<Polygon>> = HashMap::new();
        let mut skipped = 0usize;
        let mut outside_region = 0usize;
        let features = collection.features.len();

        for feature in collection.features {
            if let Some((field, value)) = &self.region_filter {
                if feature.properties.get(field).and_then(|v| v.as_str()) != Some(value.as_str()) {
                    outside_region += 1;
                    continue;
                }
            }

            let district = match feature.properties.get(&self.district_field).and_then(|v| v.as_str()) {
                Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => {
                    skipped += 1;
                    continue;
                }
            };

            let polygons = match feature.geometry.as_ref().map(parse_geometry) {
                Some(polygons) if !polygons.is_empty() => polygons,
                _ => {
                    tracing::warn!(%district, "boundary feature has no areal geometry, skipped");
                    skipped += 1;
                    continue;
                }
            };

            by_district
                .entry(district.clone())
                .or_insert_with(|| {
                    order.push(district);
                    Vec::new()
                })
                .extend(polygons);
        }

        if skipped > 0 {
            tracing::warn!(skipped, "boundary features skipped");
        }
        if outside_region > 0 {
            tracing::debug!(outside_region, "boundary features outside the region filter");
        }
        if order.is_empty() {
            return Err(BoundaryError::NoDistricts {
                features,
                outside_region,
                skipped,
            });
        }

        Ok(order
            .into_iter()
            .map(|district| {
                let polygons = by_district.remove(&district).unwrap_or_default();
                BoundaryPolygon { district, polygons }
            })
            .collect())
    }

    pub fn read(&self, path: &Path) -> Result<Vec<BoundaryPolygon>, BoundaryError> {
        let text = std::fs::read_to_string(path).map_err(|e| BoundaryError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.parse(&text)
    }
}

fn parse_geometry(geometry: &RawGeometry) -> Vec<Polygon> {
    match geometry.kind.as_str() {
        "Polygon" => serde_json::from_value::<Vec<Vec<Vec<f64>>>>(geometry.coordinates.clone())
            .map(|rings| polygon_from_rings(&rings).into_iter().collect())
            .unwrap_or_default(),
        "MultiPolygon" => {
            serde_json::from_value::<Vec<Vec<Vec<Vec<f64>>>>>(geometry.coordinates.clone())
                .map(|polys| polys.iter().filter_map(|rings| polygon_from_rings(rings)).collect())
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Option<Polygon> {
    let mut rings = rings.iter().map(|ring| {
        ring.iter()
            .filter(|pos| pos.len() >= 2)
            .map(|pos| Point::new(pos[0], pos[1]))
            .collect::<Vec<_>>()
    });

    let exterior = rings.next().filter(|r| !r.is_empty())?;
    Some(Polygon::new(exterior, rings.filter(|r| !r.is_empty()).collect()))
}

// ============================================================================
// BOUNDARY INDEX
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryIndex {
    coordinates: HashMap<String, Coordinate>,
}

impl BoundaryIndex {
    /// Compute one interior point per district, then apply the override table
    pub fn build(boundaries: &[BoundaryPolygon], overrides: &[CoordinateOverride]) -> Self {
        let mut coordinates = HashMap::new();

        for boundary in boundaries {
            match interior_point(&boundary.polygons) {
                Some(point) => {
                    coordinates.insert(boundary.district.clone(), Coordinate::from(point));
                }
                None => {
                    tracing::warn!(district = %boundary.district, "no interior point, district not indexed");
                }
            }
        }

        BoundaryIndex { coordinates }.with_overrides(overrides)
    }

    /// Replace (or add) coordinates for the listed districts
    pub fn with_overrides(mut self, overrides: &[CoordinateOverride]) -> Self {
        for o in overrides {
            self.coordinates.insert(
                o.district.clone(),
                Coordinate {
                    lat: o.lat,
                    lon: o.lon,
                },
            );
        }
        self
    }

    /// Read and index the boundary file named in the config
    pub fn load(geo: &GeoConfig) -> Result<Self, BoundaryError> {
        let boundaries = BoundarySource::from_config(geo).read(&geo.boundary_path)?;
        let index = BoundaryIndex::build(&boundaries, &geo.overrides);
        tracing::info!(districts = index.len(), "boundary index built");
        Ok(index)
    }

    pub fn lookup(&self, district: &str) -> Option<Coordinate> {
        self.coordinates.get(district).copied()
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::contains;

    pub(crate) const SEOUL_GEOJSON: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "properties": {"sidonm": "서울특별시", "sggnm": "강남구", "adm_nm": "역삼1동"},
          "geometry": {"type": "Polygon", "coordinates": [[[127.0, 37.0], [127.2, 37.0], [127.2, 37.2], [127.0, 37.2], [127.0, 37.0]]]}
        },
        {
          "type": "Feature",
          "properties": {"sidonm": "서울특별시", "sggnm": "강남구", "adm_nm": "삼성1동"},
          "geometry": {"type": "Polygon", "coordinates": [[[127.3, 37.0], [127.35, 37.0], [127.35, 37.05], [127.3, 37.05], [127.3, 37.0]]]}
        },
        {
          "type": "Feature",
          "properties": {"sidonm": "서울특별시", "sggnm": "마포구"},
          "geometry": {"type": "MultiPolygon", "coordinates": [[[[126.8, 37.5, 0.0], [126.9, 37.5, 0.0], [126.9, 37.6, 0.0], [126.8, 37.6, 0.0], [126.8, 37.5, 0.0]]]]}
        },
        {
          "type": "Feature",
          "properties": {"sidonm": "서울특별시", "sggnm": "중구"},
          "geometry": {"type": "Polygon", "coordinates": [[[126.0, 36.0], [126.1, 36.0], [126.1, 36.1], [126.0, 36.1], [126.0, 36.0]]]}
        },
        {
          "type": "Feature",
          "properties": {"sidonm": "부산광역시", "sggnm": "해운대구"},
          "geometry": {"type": "Polygon", "coordinates": [[[129.1, 35.1], [129.2, 35.1], [129.2, 35.2], [129.1, 35.2], [129.1, 35.1]]]}
        },
        {
          "type": "Feature",
          "properties": {"sidonm": "서울특별시"},
          "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]}
        },
        {
          "type": "Feature",
          "properties": {"sidonm": "서울특별시", "sggnm": "종로구"},
          "geometry": {"type": "Point", "coordinates": [126.98, 37.57]}
        }
      ]
    }"#;

    pub(crate) fn seoul_source() -> BoundarySource {
        BoundarySource {
            district_field: "sggnm".to_string(),
            region_filter: Some(("sidonm".to_string(), "서울특별시".to_string())),
        }
    }

    pub(crate) fn seoul_index(overrides: &[CoordinateOverride]) -> BoundaryIndex {
        let boundaries = seoul_source().parse(SEOUL_GEOJSON).unwrap();
        BoundaryIndex::build(&boundaries, overrides)
    }

    #[test]
    fn test_parse_groups_features_by_district() {
        let boundaries = seoul_source().parse(SEOUL_GEOJSON).unwrap();
        let names: Vec<&str> = boundaries.iter().map(|b| b.district.as_str()).collect();

        assert_eq!(names, vec!["강남구", "마포구", "중구"]);
        assert_eq!(boundaries[0].polygons.len(), 2);
    }

    #[test]
    fn test_region_filter_is_optional() {
        let source = BoundarySource {
            district_field: "sggnm".to_string(),
            region_filter: None,
        };
        let boundaries = source.parse(SEOUL_GEOJSON).unwrap();

        assert!(boundaries.iter().any(|b| b.district == "해운대구"));
    }

    #[test]
    fn test_index_points_lie_inside_geometry() {
        let boundaries = seoul_source().parse(SEOUL_GEOJSON).unwrap();
        let index = BoundaryIndex::build(&boundaries, &[]);

        for boundary in &boundaries {
            let c = index.lookup(&boundary.district).unwrap();
            let p = Point::new(c.lon, c.lat);
            assert!(
                boundary.polygons.iter().any(|poly| contains(poly, p)),
                "{} point {:?} outside its geometry",
                boundary.district,
                c
            );
        }

        // Widest member polygon (역삼1동) carries the 강남구 point
        let gangnam = index.lookup("강남구").unwrap();
        assert!(gangnam.lon < 127.2);
    }

    #[test]
    fn test_override_always_wins() {
        let overrides = vec![CoordinateOverride {
            district: "중구".to_string(),
            lat: 37.5637,
            lon: 126.9970,
        }];
        let index = seoul_index(&overrides);

        assert_eq!(
            index.lookup("중구"),
            Some(Coordinate {
                lat: 37.5637,
                lon: 126.9970
            })
        );
    }

    #[test]
    fn test_override_adds_missing_district() {
        let overrides = vec![CoordinateOverride {
            district: "강서구".to_string(),
            lat: 37.5510,
            lon: 126.8495,
        }];
        let index = seoul_index(&overrides);

        assert_eq!(index.lookup("강서구").map(|c| c.lat), Some(37.5510));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_lookup_miss_is_none() {
        let index = seoul_index(&[]);
        assert_eq!(index.lookup("없는구"), None);
        assert_eq!(index.lookup("종로구"), None);
    }

    #[test]
    fn test_invalid_geojson_is_an_error() {
        let err = seoul_source().parse("{\"type\": \"Feature\"}").unwrap_err();
        assert!(matches!(err, BoundaryError::InvalidGeoJson { .. }));
    }

    #[test]
    fn test_region_filter_removing_everything_is_an_error() {
        let geojson = r#"{
          "type": "FeatureCollection",
          "features": [
            {
              "type": "Feature",
              "properties": {"sggnm": "강남구"},
              "geometry": {"type": "Polygon", "coordinates": [[[127.0, 37.0], [127.2, 37.0], [127.2, 37.2], [127.0, 37.0]]]}
            }
          ]
        }"#;

        let err = seoul_source().parse(geojson).unwrap_err();
        assert_eq!(
            err,
            BoundaryError::NoDistricts {
                features: 1,
                outside_region: 1,
                skipped: 0
            }
        );
        assert!(err.to_string().contains("1 outside the region filter"));

        let unfiltered = BoundarySource {
            district_field: "sggnm".to_string(),
            region_filter: None,
        };
        assert_eq!(unfiltered.parse(geojson).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_collection_is_an_error() {
        let err = seoul_source()
            .parse(r#"{"type": "FeatureCollection", "features": []}"#)
            .unwrap_err();
        assert!(matches!(err, BoundaryError::NoDistricts { features: 0, .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundaries.geojson");
        std::fs::write(&path, SEOUL_GEOJSON).unwrap();

        let geo = GeoConfig {
            boundary_path: path,
            ..GeoConfig::default()
        };
        let index = BoundaryIndex::load(&geo).unwrap();

        // Default overrides: 중구 replaced, 강서구 added
        assert_eq!(index.lookup("중구").map(|c| c.lon), Some(126.9970));
        assert!(index.lookup("강서구").is_some());
        assert!(index.lookup("마포구").is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let geo = GeoConfig {
            boundary_path: "/no/such/file.geojson".into(),
            ..GeoConfig::default()
        };
        assert!(matches!(
            BoundaryIndex::load(&geo),
            Err(BoundaryError::Unreadable { .. })
        ));
    }
}
