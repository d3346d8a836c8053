//! Jeu de données local chargé en mémoire
//!
//! Un répertoire contient:
//! - `buildings.geojson`: FeatureCollection de polygones avec les propriétés
//!   `confidence`, `area_in_meters` (optionnelle) et `id` (optionnelle)
//! - `heights.json`: scènes horodatées de hauteurs
//!
//! ```json
//! {"scenes": [{"epoch_s": 1688108400, "band": "building_height",
//!   "tiles": [{"west": 73.85, "north": 18.53, "pixel_size": 0.0001,
//!              "width": 100, "height": 100, "values": [4.2, null]}]}]}
//! ```

use std::path::Path;

use bgfa::resolver::DEFAULT_HEIGHT_BAND;
use bgfa::service::{HeightTile, Scene};
use bgfa::{BgfaError, Building, MemoryQueryService};
use geo::Geometry;
use geojson::{feature::Id, Feature, GeoJson};
use serde::Deserialize;
use tracing::{debug, info, warn};

pub const BUILDINGS_FILE: &str = "buildings.geojson";
pub const HEIGHTS_FILE: &str = "heights.json";

#[derive(Debug, Deserialize)]
struct HeightsFile {
    scenes: Vec<SceneEntry>,
}

#[derive(Debug, Deserialize)]
struct SceneEntry {
    epoch_s: i64,
    #[serde(default = "default_band")]
    band: String,
    tiles: Vec<TileEntry>,
}

#[derive(Debug, Deserialize)]
struct TileEntry {
    west: f64,
    north: f64,
    pixel_size: f64,
    width: usize,
    height: usize,
    values: Vec<Option<f64>>,
}

fn default_band() -> String {
    DEFAULT_HEIGHT_BAND.to_string()
}

/// Charge un répertoire de données dans un service en mémoire
///
/// Les bâtiments sont enregistrés sous `buildings_dataset`, les scènes sous
/// `heights_dataset`.
pub fn load_dataset(
    dir: &Path,
    buildings_dataset: &str,
    heights_dataset: &str,
) -> Result<MemoryQueryService, BgfaError> {
    let buildings = read_buildings(&dir.join(BUILDINGS_FILE))?;
    let scenes = read_scenes(&dir.join(HEIGHTS_FILE))?;

    info!(
        dir = %dir.display(),
        buildings = buildings.len(),
        scenes = scenes.len(),
        "Loaded local dataset"
    );

    Ok(MemoryQueryService::new()
        .with_buildings(buildings_dataset, buildings)
        .with_scenes(heights_dataset, scenes))
}

/// Lit les emprises de bâtiments
pub fn read_buildings(path: &Path) -> Result<Vec<Building>, BgfaError> {
    let file = path.display().to_string();
    let content = std::fs::read_to_string(path)
        .map_err(|e| BgfaError::dataset(&file, e.to_string()))?;
    let geojson: GeoJson = content
        .parse()
        .map_err(|e: geojson::Error| BgfaError::dataset(&file, e.to_string()))?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(BgfaError::dataset(&file, "expected a FeatureCollection"));
    };

    let mut buildings = Vec::with_capacity(collection.features.len());
    let mut skipped = 0usize;
    for (index, feature) in collection.features.into_iter().enumerate() {
        match to_building(index, feature) {
            Ok(building) => buildings.push(building),
            Err(reason) => {
                warn!(file = %file, feature = index, reason = %reason, "Skipping building");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        debug!(file = %file, skipped, "Buildings skipped while loading");
    }

    Ok(buildings)
}

fn to_building(index: usize, feature: Feature) -> Result<Building, String> {
    let id = match &feature.id {
        Some(Id::String(s)) => s.clone(),
        Some(Id::Number(n)) => n.to_string(),
        None => feature
            .property("id")
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| format!("feature_{}", index)),
    };

    let confidence = feature
        .property("confidence")
        .and_then(serde_json::Value::as_f64)
        .ok_or("missing numeric confidence")?;
    let area_m2 = feature
        .property("area_in_meters")
        .and_then(serde_json::Value::as_f64);

    let geometry = feature.geometry.ok_or("missing geometry")?;
    let geometry: Geometry<f64> = geometry
        .try_into()
        .map_err(|e: geojson::Error| e.to_string())?;

    // Une emprise multiple est réduite à son premier polygone
    let footprint = match geometry {
        Geometry::Polygon(p) => p,
        Geometry::MultiPolygon(mp) => mp.0.into_iter().next().ok_or("empty MultiPolygon")?,
        _ => return Err("geometry is not a polygon".to_string()),
    };

    Ok(Building {
        id,
        footprint,
        confidence,
        area_m2,
    })
}

/// Lit les scènes de hauteurs
pub fn read_scenes(path: &Path) -> Result<Vec<Scene>, BgfaError> {
    let file = path.display().to_string();
    let content = std::fs::read_to_string(path)
        .map_err(|e| BgfaError::dataset(&file, e.to_string()))?;
    let parsed: HeightsFile =
        serde_json::from_str(&content).map_err(|e| BgfaError::dataset(&file, e.to_string()))?;

    parsed
        .scenes
        .into_iter()
        .map(|scene| {
            let tiles = scene
                .tiles
                .into_iter()
                .map(|t| {
                    if t.values.len() != t.width * t.height {
                        return Err(BgfaError::dataset(
                            &file,
                            format!(
                                "scene {}: tile has {} values for {}x{} pixels",
                                scene.epoch_s,
                                t.values.len(),
                                t.width,
                                t.height
                            ),
                        ));
                    }
                    if t.pixel_size.is_nan() || t.pixel_size <= 0.0 {
                        return Err(BgfaError::dataset(
                            &file,
                            format!("scene {}: pixel_size must be positive", scene.epoch_s),
                        ));
                    }
                    Ok(HeightTile {
                        west: t.west,
                        north: t.north,
                        pixel_size: t.pixel_size,
                        width: t.width,
                        height: t.height,
                        values: t.values,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Scene {
                epoch_seconds: scene.epoch_s,
                band: scene.band,
                tiles,
            })
        })
        .collect()
}
