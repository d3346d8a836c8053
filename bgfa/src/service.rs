//! Interface avec le service de requêtes distant
//!
//! Toute lecture d'une valeur calculée (liste de bâtiments, scène, hauteur
//! échantillonnée) est un point de suspension: le service est asynchrone.
//! Construire une requête reste synchrone et ne coûte rien.
//!
//! [`MemoryQueryService`] implémente le contrat en mémoire (tests, données locales).

use std::collections::HashMap;

use async_trait::async_trait;
use geo::{BoundingRect, Point};
use tracing::trace;

use crate::region::Region;
use crate::types::Building;
use crate::BgfaError;

/// Requête de bâtiments: filtre spatial et filtre d'attribut
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingQuery {
    /// Identifiant du jeu de bâtiments
    pub dataset: String,
    /// Les bâtiments dont l'emprise touche cette zone sont renvoyés
    pub region: Region,
    /// Seuil inclusif sur le score de confiance
    pub min_confidence: f64,
}

/// Description paresseuse d'une surface de hauteur pour une année
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceQuery {
    /// Identifiant de la collection de scènes
    pub dataset: String,
    /// Bande conservée après mosaïquage
    pub band: String,
    /// Propriété portant l'horodatage de la scène
    pub epoch_property: String,
    /// Horodatage exact recherché (secondes Unix)
    pub epoch_seconds: i64,
    /// Découpage spatial de la mosaïque
    pub region: Region,
}

/// Référence vers une mosaïque résolue, lisible par échantillonnage
#[derive(Debug, Clone, PartialEq)]
pub struct SceneHandle {
    pub dataset: String,
    pub band: String,
    pub epoch_seconds: i64,
    pub region: Region,
}

/// Service de requêtes géospatiales (exécution déportée)
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Bâtiments touchant la zone avec une confiance >= seuil
    async fn buildings(&self, query: &BuildingQuery) -> Result<Vec<Building>, BgfaError>;

    /// Mosaïque de la scène dont l'horodatage vaut exactement celui demandé
    ///
    /// `Ok(None)` si aucune scène ne correspond: ce n'est pas une erreur.
    async fn find_scene(&self, query: &SurfaceQuery) -> Result<Option<SceneHandle>, BgfaError>;

    /// Valeur ponctuelle de la mosaïque à l'échelle `scale_m` (mètres)
    ///
    /// `Ok(None)` si la mosaïque n'a pas de valeur en ce point.
    async fn sample(
        &self,
        scene: &SceneHandle,
        point: Point,
        scale_m: f64,
    ) -> Result<Option<f64>, BgfaError>;
}

/// Tuile raster d'une scène (grille régulière en degrés, rangée par lignes depuis le nord)
#[derive(Debug, Clone, PartialEq)]
pub struct HeightTile {
    /// Longitude du bord ouest
    pub west: f64,
    /// Latitude du bord nord
    pub north: f64,
    /// Taille d'un pixel en degrés
    pub pixel_size: f64,
    pub width: usize,
    pub height: usize,
    /// `width * height` valeurs, `None` pour un pixel masqué
    pub values: Vec<Option<f64>>,
}

impl HeightTile {
    pub fn east(&self) -> f64 {
        self.west + self.width as f64 * self.pixel_size
    }

    pub fn south(&self) -> f64 {
        self.north - self.height as f64 * self.pixel_size
    }

    fn intersects(&self, region: &Region) -> bool {
        self.west <= region.max_lon()
            && region.min_lon() <= self.east()
            && self.south() <= region.max_lat()
            && region.min_lat() <= self.north
    }

    /// Valeur du pixel contenant le point
    pub fn value_at(&self, point: Point) -> Option<f64> {
        if self.pixel_size <= 0.0 {
            return None;
        }
        let col = ((point.x() - self.west) / self.pixel_size).floor();
        let row = ((self.north - point.y()) / self.pixel_size).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        self.values.get(row * self.width + col).copied().flatten()
    }
}

/// Scène horodatée d'une collection de hauteurs
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub epoch_seconds: i64,
    pub band: String,
    /// Tuiles dans l'ordre de composition (la dernière recouvre les précédentes)
    pub tiles: Vec<HeightTile>,
}

/// Service en mémoire: collections de bâtiments et de scènes par identifiant
#[derive(Debug, Default)]
pub struct MemoryQueryService {
    buildings: HashMap<String, Vec<Building>>,
    scenes: HashMap<String, Vec<Scene>>,
}

impl MemoryQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute des bâtiments à un jeu de données
    pub fn with_buildings(mut self, dataset: &str, buildings: Vec<Building>) -> Self {
        self.buildings
            .entry(dataset.to_string())
            .or_default()
            .extend(buildings);
        self
    }

    /// Ajoute des scènes à une collection
    pub fn with_scenes(mut self, dataset: &str, scenes: Vec<Scene>) -> Self {
        self.scenes
            .entry(dataset.to_string())
            .or_default()
            .extend(scenes);
        self
    }

    pub fn building_count(&self) -> usize {
        self.buildings.values().map(Vec::len).sum()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.values().map(Vec::len).sum()
    }

    fn collection(&self, dataset: &str) -> Result<&[Scene], BgfaError> {
        self.scenes
            .get(dataset)
            .map(Vec::as_slice)
            .ok_or_else(|| BgfaError::query("scene lookup", format!("unknown dataset {}", dataset)))
    }

    /// Tuiles composant la mosaïque, dans l'ordre de composition
    fn mosaic_tiles<'a>(
        scenes: &'a [Scene],
        band: &'a str,
        epoch_seconds: i64,
        region: &'a Region,
    ) -> impl Iterator<Item = &'a HeightTile> + 'a {
        scenes
            .iter()
            .filter(move |s| s.epoch_seconds == epoch_seconds && s.band == band)
            .flat_map(|s| s.tiles.iter())
            .filter(move |t| t.intersects(region))
    }
}

#[async_trait]
impl QueryService for MemoryQueryService {
    async fn buildings(&self, query: &BuildingQuery) -> Result<Vec<Building>, BgfaError> {
        let all = self.buildings.get(&query.dataset).ok_or_else(|| {
            BgfaError::query("buildings", format!("unknown dataset {}", query.dataset))
        })?;

        let selected: Vec<Building> = all
            .iter()
            .filter(|b| b.confidence >= query.min_confidence)
            .filter(|b| {
                b.footprint
                    .bounding_rect()
                    .map_or(false, |rect| query.region.intersects_rect(&rect))
            })
            .cloned()
            .collect();

        trace!(
            dataset = %query.dataset,
            total = all.len(),
            selected = selected.len(),
            "Filtered buildings"
        );

        Ok(selected)
    }

    async fn find_scene(&self, query: &SurfaceQuery) -> Result<Option<SceneHandle>, BgfaError> {
        let scenes = self.collection(&query.dataset)?;
        let found =
            Self::mosaic_tiles(scenes, &query.band, query.epoch_seconds, &query.region).count();

        if found == 0 {
            return Ok(None);
        }

        Ok(Some(SceneHandle {
            dataset: query.dataset.clone(),
            band: query.band.clone(),
            epoch_seconds: query.epoch_seconds,
            region: query.region,
        }))
    }

    /// Lecture à la taille de pixel native du raster en mémoire: `scale_m`
    /// est seulement validé, pas appliqué.
    async fn sample(
        &self,
        scene: &SceneHandle,
        point: Point,
        scale_m: f64,
    ) -> Result<Option<f64>, BgfaError> {
        if scale_m.is_nan() || scale_m <= 0.0 {
            return Err(BgfaError::query(
                "sample",
                format!("invalid scale {} m", scale_m),
            ));
        }

        // Mosaïque découpée sur l'emprise: rien en dehors
        if !scene.region.contains(point) {
            return Ok(None);
        }

        let scenes = self.collection(&scene.dataset)?;
        let value = Self::mosaic_tiles(scenes, &scene.band, scene.epoch_seconds, &scene.region)
            .filter_map(|t| t.value_at(point))
            .last();

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Polygon};

    fn region() -> Region {
        Region::new(0.0, 0.0, 1.0, 1.0).unwrap()
    }

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]
    }

    fn tile(value: Option<f64>) -> HeightTile {
        // 2x2 pixels de 0.5° couvrant [0,1]x[0,1]
        HeightTile {
            west: 0.0,
            north: 1.0,
            pixel_size: 0.5,
            width: 2,
            height: 2,
            values: vec![value, Some(1.0), Some(2.0), Some(3.0)],
        }
    }

    fn surface_query(epoch: i64) -> SurfaceQuery {
        SurfaceQuery {
            dataset: "heights".to_string(),
            band: "building_height".to_string(),
            epoch_property: "inference_time_epoch_s".to_string(),
            epoch_seconds: epoch,
            region: region(),
        }
    }

    #[test]
    fn test_tile_value_at() {
        let t = tile(Some(7.0));
        assert_eq!(t.value_at(Point::new(0.25, 0.75)), Some(7.0));
        assert_eq!(t.value_at(Point::new(0.75, 0.75)), Some(1.0));
        assert_eq!(t.value_at(Point::new(0.25, 0.25)), Some(2.0));
        assert_eq!(t.value_at(Point::new(1.5, 0.25)), None);
        assert_eq!(tile(None).value_at(Point::new(0.25, 0.75)), None);
    }

    #[tokio::test]
    async fn test_buildings_filters() {
        let service = MemoryQueryService::new().with_buildings(
            "b",
            vec![
                Building {
                    id: "in".into(),
                    footprint: square(0.1, 0.1, 0.01),
                    confidence: 0.8,
                    area_m2: None,
                },
                Building {
                    id: "low".into(),
                    footprint: square(0.2, 0.2, 0.01),
                    confidence: 0.5,
                    area_m2: None,
                },
                Building {
                    id: "out".into(),
                    footprint: square(5.0, 5.0, 0.01),
                    confidence: 0.9,
                    area_m2: None,
                },
            ],
        );

        let query = BuildingQuery {
            dataset: "b".into(),
            region: region(),
            min_confidence: 0.7,
        };
        let found = service.buildings(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "in");

        let unknown = BuildingQuery {
            dataset: "nope".into(),
            ..query
        };
        assert!(service.buildings(&unknown).await.is_err());
    }

    #[tokio::test]
    async fn test_exact_epoch_match() {
        let service = MemoryQueryService::new().with_scenes(
            "heights",
            vec![Scene {
                epoch_seconds: 100,
                band: "building_height".into(),
                tiles: vec![tile(Some(4.0))],
            }],
        );

        assert!(service
            .find_scene(&surface_query(100))
            .await
            .unwrap()
            .is_some());
        assert!(service
            .find_scene(&surface_query(101))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins_mosaic() {
        let mut top = tile(Some(9.0));
        top.values[1] = None;

        let service = MemoryQueryService::new().with_scenes(
            "heights",
            vec![Scene {
                epoch_seconds: 100,
                band: "building_height".into(),
                tiles: vec![tile(Some(4.0)), top],
            }],
        );
        let handle = service
            .find_scene(&surface_query(100))
            .await
            .unwrap()
            .unwrap();

        // La dernière tuile recouvre la première
        let v = service
            .sample(&handle, Point::new(0.25, 0.75), 10.0)
            .await
            .unwrap();
        assert_eq!(v, Some(9.0));

        // Pixel masqué dans le dernier: la valeur du dessous reste visible
        let v = service
            .sample(&handle, Point::new(0.75, 0.75), 10.0)
            .await
            .unwrap();
        assert_eq!(v, Some(1.0));
    }

    #[tokio::test]
    async fn test_sample_clipped_to_region() {
        let service = MemoryQueryService::new().with_scenes(
            "heights",
            vec![Scene {
                epoch_seconds: 100,
                band: "building_height".into(),
                tiles: vec![tile(Some(4.0))],
            }],
        );
        let mut query = surface_query(100);
        query.region = Region::new(0.0, 0.5, 0.5, 1.0).unwrap();
        let handle = service.find_scene(&query).await.unwrap().unwrap();

        assert_eq!(
            service
                .sample(&handle, Point::new(0.25, 0.75), 10.0)
                .await
                .unwrap(),
            Some(4.0)
        );
        assert_eq!(
            service
                .sample(&handle, Point::new(0.75, 0.25), 10.0)
                .await
                .unwrap(),
            None
        );
        assert!(service
            .sample(&handle, Point::new(0.25, 0.75), 0.0)
            .await
            .is_err());
    }
}
