//! Dérivation des métriques par bâtiment
//!
//! Centroïde, hauteur par année (lecture ponctuelle), nombre d'étages et
//! surface de plancher (BGFA).

use futures::future::join_all;
use geo::{Centroid, GeodesicArea, Point};
use tracing::{trace, warn};

use crate::resolver::SurfaceSet;
use crate::service::QueryService;
use crate::types::{Building, BuildingRecord, YearMetrics};
use crate::BgfaError;

/// Hauteur d'un étage en mètres
pub const FLOOR_HEIGHT_M: f64 = 3.0;

/// Résolution de lecture des surfaces en mètres
pub const SAMPLING_SCALE_M: f64 = 10.0;

/// Nombre d'étages: `ceil(height / floor_height)`
///
/// Les hauteurs négatives ou non finies donnent 0 étage.
pub fn floors(height: f64, floor_height: f64) -> u32 {
    let raw = (height / floor_height).ceil();
    if raw.is_finite() && raw > 0.0 {
        raw as u32
    } else {
        0
    }
}

/// Surface de plancher: surface au sol × étages
///
/// Sans hauteur, le bâtiment compte pour un seul niveau.
pub fn compute_bgfa(area_m2: f64, height: Option<f64>, floor_height: f64) -> f64 {
    match height {
        Some(h) => area_m2 * floors(h, floor_height) as f64,
        None => area_m2,
    }
}

/// Paramètres de dérivation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeriveOptions {
    /// Hauteur d'un étage (m)
    pub floor_height: f64,
    /// Échelle de lecture des surfaces (m)
    pub sampling_scale: f64,
    /// Facteur appliqué aux valeurs brutes pour obtenir des mètres
    pub height_unit_scale: f64,
    /// Variante surface + BGFA; sinon hauteurs seules
    pub with_area: bool,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            floor_height: FLOOR_HEIGHT_M,
            sampling_scale: SAMPLING_SCALE_M,
            height_unit_scale: 1.0,
            with_area: true,
        }
    }
}

/// Surface au sol en m²: valeur de la source, sinon aire géodésique de l'emprise
pub fn footprint_area(building: &Building) -> f64 {
    building
        .area_m2
        .unwrap_or_else(|| building.footprint.geodesic_area_unsigned())
}

/// Centroïde de l'emprise
pub fn centroid(building: &Building) -> Result<Point, BgfaError> {
    building
        .footprint
        .centroid()
        .ok_or_else(|| BgfaError::invalid_geometry(&building.id, "footprint has no centroid"))
}

/// Construit l'enregistrement d'un bâtiment
///
/// Les années sont lues en parallèle. Une lecture en échec devient une hauteur
/// manquante: l'enregistrement n'est jamais partiel.
pub async fn derive_record<S: QueryService + ?Sized>(
    service: &S,
    building: &Building,
    surfaces: &SurfaceSet,
    options: &DeriveOptions,
) -> Result<BuildingRecord, BgfaError> {
    let point = centroid(building)?;
    let area = options.with_area.then(|| footprint_area(building));

    let samples = join_all(surfaces.iter().map(|surface| async move {
        let year = surface.year();
        match surface.sample(service, point, options.sampling_scale).await {
            Ok(value) => (year, value),
            Err(e) => {
                warn!(
                    building = %building.id,
                    year,
                    error = %e,
                    "Height sample failed, treated as missing"
                );
                (year, None)
            }
        }
    }))
    .await;

    let years = samples
        .into_iter()
        .map(|(year, raw)| {
            let height = raw.map(|h| h * options.height_unit_scale);
            YearMetrics {
                year,
                height,
                bgfa: area.map(|a| compute_bgfa(a, height, options.floor_height)),
            }
        })
        .collect();

    trace!(building = %building.id, x = point.x(), y = point.y(), "Derived record");

    Ok(BuildingRecord {
        building_id: building.id.clone(),
        longitude: point.x(),
        latitude: point.y(),
        confidence: building.confidence,
        area_m2: area,
        years,
    })
}
