//! Traitement d'une tuile: bâtiments → enregistrements retenus
//!
//! Chaque bâtiment est dérivé indépendamment. Un échec reste isolé au
//! bâtiment concerné et n'interrompt pas les autres.

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::aggregate::retain_valid;
use crate::metrics::{centroid, derive_record, DeriveOptions};
use crate::region::Tile;
use crate::resolver::SurfaceSet;
use crate::service::{BuildingQuery, QueryService};
use crate::types::BuildingRecord;
use crate::BgfaError;

/// Jeu de bâtiments par défaut
pub const DEFAULT_BUILDINGS_DATASET: &str = "GOOGLE/Research/open-buildings/v3/polygons";

/// Seuil de confiance par défaut
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// Paramètres du traitement
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParams {
    pub buildings_dataset: String,
    pub min_confidence: f64,
    pub derive: DeriveOptions,
    /// Nombre de bâtiments dérivés simultanément
    pub concurrency: usize,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            buildings_dataset: DEFAULT_BUILDINGS_DATASET.to_string(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            derive: DeriveOptions::default(),
            concurrency: 16,
        }
    }
}

/// Résultat du traitement d'une tuile
#[derive(Debug)]
pub struct TileOutcome {
    pub tile: Tile,
    /// Bâtiments renvoyés par le service
    pub fetched: usize,
    /// Écartés: confiance sous le seuil
    pub below_confidence: usize,
    /// Écartés: centroïde hors de la tuile
    pub outside_tile: usize,
    /// Enregistrements construits (avant filtre de validité)
    pub derived: usize,
    /// Enregistrements retenus, dans l'ordre du service
    pub records: Vec<BuildingRecord>,
    /// Bâtiments en échec
    pub failures: Vec<BgfaError>,
}

impl TileOutcome {
    fn empty(tile: Tile) -> Self {
        Self {
            tile,
            fetched: 0,
            below_confidence: 0,
            outside_tile: 0,
            derived: 0,
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Enregistrements écartés faute de hauteur
    pub fn without_height(&self) -> usize {
        self.derived - self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Traite une tuile
///
/// Seule la récupération de la liste de bâtiments peut échouer globalement.
/// Les surfaces doivent déjà être résolues.
pub async fn run_tile<S: QueryService + ?Sized>(
    service: &S,
    params: &PipelineParams,
    tile: &Tile,
    surfaces: &SurfaceSet,
) -> Result<TileOutcome, BgfaError> {
    let query = BuildingQuery {
        dataset: params.buildings_dataset.clone(),
        region: tile.region,
        min_confidence: params.min_confidence,
    };

    let buildings = service.buildings(&query).await?;
    let mut outcome = TileOutcome::empty(*tile);
    outcome.fetched = buildings.len();

    if buildings.is_empty() {
        debug!(tile = tile.index, "No building in tile");
        return Ok(outcome);
    }

    // Le service filtre déjà; on revérifie le seuil et on attribue chaque
    // bâtiment à la tuile qui possède son centroïde
    let mut selected = Vec::with_capacity(buildings.len());
    for building in buildings {
        if building.confidence < params.min_confidence {
            outcome.below_confidence += 1;
            continue;
        }
        match centroid(&building) {
            Ok(point) if tile.owns(point) => selected.push(building),
            Ok(_) => outcome.outside_tile += 1,
            Err(e) => outcome.failures.push(e),
        }
    }

    let results: Vec<Result<BuildingRecord, BgfaError>> = stream::iter(selected.iter())
        .map(|building| derive_record(service, building, surfaces, &params.derive))
        .buffered(params.concurrency.max(1))
        .collect()
        .await;

    let mut records = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(tile = tile.index, error = %e, "Building derivation failed");
                outcome.failures.push(e);
            }
        }
    }

    outcome.derived = records.len();
    outcome.records = retain_valid(records);

    info!(
        tile = tile.index,
        fetched = outcome.fetched,
        derived = outcome.derived,
        retained = outcome.records.len(),
        failures = outcome.failures.len(),
        "Tile processed"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use crate::resolver::{HeightSource, TemporalResolver};
    use crate::service::{HeightTile, MemoryQueryService, Scene, SceneHandle, SurfaceQuery};
    use crate::types::Building;
    use crate::YearRange;
    use geo::{polygon, LineString, Point, Polygon};

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]
    }

    fn building(id: &str, x: f64, y: f64, confidence: f64) -> Building {
        Building {
            id: id.to_string(),
            footprint: square(x, y, 0.02),
            confidence,
            area_m2: Some(20.0),
        }
    }

    async fn fixture(buildings: Vec<Building>) -> (MemoryQueryService, SurfaceSet, Region) {
        let region = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let source = HeightSource::default();
        let epoch = source.epoch.epoch_seconds(2020).unwrap();

        // Moitié ouest à 6 m, moitié est masquée
        let service = MemoryQueryService::new()
            .with_buildings(DEFAULT_BUILDINGS_DATASET, buildings)
            .with_scenes(
                &source.dataset,
                vec![Scene {
                    epoch_seconds: epoch,
                    band: source.band.clone(),
                    tiles: vec![HeightTile {
                        west: 0.0,
                        north: 1.0,
                        pixel_size: 0.5,
                        width: 2,
                        height: 2,
                        values: vec![Some(6.0), None, Some(6.0), None],
                    }],
                }],
            );

        let years = YearRange::inclusive(2019, 2020).unwrap();
        let surfaces = TemporalResolver::new(source, region)
            .resolve_all(&service, &years)
            .await;

        (service, surfaces, region)
    }

    #[tokio::test]
    async fn test_run_tile_filters_and_retains() {
        let (service, surfaces, region) = fixture(vec![
            building("west", 0.1, 0.1, 0.9),
            building("east", 0.7, 0.1, 0.9),
            building("low", 0.2, 0.2, 0.6),
            building("far", 3.0, 3.0, 0.9),
        ])
        .await;

        let outcome = run_tile(
            &service,
            &PipelineParams::default(),
            &Tile::whole(region),
            &surfaces,
        )
        .await
        .unwrap();

        // "low" et "far" sont filtrés par le service
        assert_eq!(outcome.fetched, 2);
        assert_eq!(outcome.derived, 2);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.without_height(), 1);

        let record = &outcome.records[0];
        assert_eq!(record.building_id, "west");
        assert_eq!(record.height(2019), None);
        assert_eq!(record.bgfa(2019), Some(20.0));
        assert_eq!(record.height(2020), Some(6.0));
        assert_eq!(record.bgfa(2020), Some(40.0));
        assert!(region.contains(geo::Point::new(record.longitude, record.latitude)));
        assert!(record.confidence >= DEFAULT_MIN_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_straddling_building_owned_by_one_tile() {
        // Emprise à cheval sur la ligne x = 0.5, centroïde à l'ouest
        let (service, surfaces, region) =
            fixture(vec![building("edge", 0.485, 0.1, 0.9)]).await;
        let tiles = region.split(2, 1).unwrap();

        let mut owners = 0;
        for tile in &tiles {
            let outcome = run_tile(&service, &PipelineParams::default(), tile, &surfaces)
                .await
                .unwrap();
            assert_eq!(outcome.fetched, 1);
            owners += outcome.derived;
        }
        assert_eq!(owners, 1);
    }

    /// Service renvoyant une liste fixe de bâtiments, scènes déléguées
    struct FixedBuildings {
        buildings: Vec<Building>,
        scenes: MemoryQueryService,
    }

    #[async_trait::async_trait]
    impl QueryService for FixedBuildings {
        async fn buildings(&self, _query: &BuildingQuery) -> Result<Vec<Building>, BgfaError> {
            Ok(self.buildings.clone())
        }

        async fn find_scene(
            &self,
            query: &SurfaceQuery,
        ) -> Result<Option<SceneHandle>, BgfaError> {
            self.scenes.find_scene(query).await
        }

        async fn sample(
            &self,
            scene: &SceneHandle,
            point: Point,
            scale_m: f64,
        ) -> Result<Option<f64>, BgfaError> {
            self.scenes.sample(scene, point, scale_m).await
        }
    }

    #[tokio::test]
    async fn test_invalid_geometry_isolated() {
        let broken = Building {
            id: "broken".to_string(),
            footprint: Polygon::new(LineString::new(vec![]), vec![]),
            confidence: 0.9,
            area_m2: Some(5.0),
        };
        let (scenes, surfaces, region) = fixture(vec![]).await;
        let service = FixedBuildings {
            buildings: vec![broken, building("ok", 0.1, 0.1, 0.9)],
            scenes,
        };

        let outcome = run_tile(
            &service,
            &PipelineParams::default(),
            &Tile::whole(region),
            &surfaces,
        )
        .await
        .unwrap();

        assert_eq!(outcome.fetched, 2);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].building_id, "ok");
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            BgfaError::InvalidGeometry { building_id, .. } if building_id == "broken"
        ));
    }

    #[tokio::test]
    async fn test_empty_tile() {
        let (service, surfaces, _) = fixture(vec![]).await;
        let tile = Tile::whole(Region::new(0.0, 0.0, 0.1, 0.1).unwrap());
        let outcome = run_tile(&service, &PipelineParams::default(), &tile, &surfaces)
            .await
            .unwrap();
        assert!(outcome.is_empty());
        assert_eq!(outcome.fetched, 0);
    }

    #[tokio::test]
    async fn test_unknown_dataset_is_error() {
        let (service, surfaces, region) = fixture(vec![]).await;
        let params = PipelineParams {
            buildings_dataset: "missing".to_string(),
            ..Default::default()
        };
        let result = run_tile(&service, &params, &Tile::whole(region), &surfaces).await;
        assert!(result.is_err());
    }
}
