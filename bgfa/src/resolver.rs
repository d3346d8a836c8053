//! Résolution des surfaces de hauteur annuelles
//!
//! Pour chaque année, une seule scène est retenue: celle dont l'horodatage vaut
//! exactement l'horodatage de référence de l'année (jour, heure et fuseau fixes).
//! La mosaïque est découpée sur l'emprise et réduite à la bande de hauteur.
//!
//! Une année sans scène, ou dont la résolution échoue, devient une surface
//! entièrement manquante: le pipeline continue.

use chrono::{FixedOffset, NaiveDate, TimeZone};
use futures::future::join_all;
use geo::Point;
use tracing::{debug, warn};

use crate::region::Region;
use crate::service::{QueryService, SceneHandle, SurfaceQuery};
use crate::{BgfaError, YearRange};

/// Collection de hauteurs par défaut
pub const DEFAULT_HEIGHTS_DATASET: &str = "GOOGLE/Research/open-buildings-temporal/v1";

/// Bande de hauteur des bâtiments
pub const DEFAULT_HEIGHT_BAND: &str = "building_height";

/// Propriété d'horodatage des scènes
pub const DEFAULT_EPOCH_PROPERTY: &str = "inference_time_epoch_s";

/// Instant de référence d'une année: jour, heure et décalage horaire fixes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceEpoch {
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    /// Décalage par rapport à UTC, en minutes
    pub utc_offset_minutes: i32,
}

impl Default for ReferenceEpoch {
    /// 30 juin, minuit, UTC-07:00
    fn default() -> Self {
        Self {
            month: 6,
            day: 30,
            hour: 0,
            utc_offset_minutes: -7 * 60,
        }
    }
}

impl ReferenceEpoch {
    /// Horodatage Unix (secondes) de l'instant de référence pour `year`
    pub fn epoch_seconds(&self, year: i32) -> Result<i64, BgfaError> {
        let invalid = |reason: String| BgfaError::InvalidTimestamp { year, reason };

        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| invalid(format!("offset {} min", self.utc_offset_minutes)))?;
        let naive = NaiveDate::from_ymd_opt(year, self.month, self.day)
            .and_then(|d| d.and_hms_opt(self.hour, 0, 0))
            .ok_or_else(|| {
                invalid(format!(
                    "{:02}-{:02} {:02}:00 does not exist",
                    self.month, self.day, self.hour
                ))
            })?;

        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| invalid("ambiguous local time".into()))
    }
}

/// Paramètres de la collection de hauteurs
#[derive(Debug, Clone, PartialEq)]
pub struct HeightSource {
    pub dataset: String,
    pub band: String,
    pub epoch_property: String,
    pub epoch: ReferenceEpoch,
}

impl Default for HeightSource {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_HEIGHTS_DATASET.to_string(),
            band: DEFAULT_HEIGHT_BAND.to_string(),
            epoch_property: DEFAULT_EPOCH_PROPERTY.to_string(),
            epoch: ReferenceEpoch::default(),
        }
    }
}

/// Surface de hauteur d'une année, lisible en lecture seule
#[derive(Debug, Clone, PartialEq)]
pub enum HeightSurface {
    /// Mosaïque résolue
    Available { year: i32, scene: SceneHandle },
    /// Aucune donnée pour l'année: toutes les lectures sont manquantes
    Missing { year: i32 },
}

impl HeightSurface {
    pub fn year(&self) -> i32 {
        match self {
            HeightSurface::Available { year, .. } | HeightSurface::Missing { year } => *year,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, HeightSurface::Available { .. })
    }

    /// Lit la hauteur au point donné
    ///
    /// Une surface manquante ne fait aucun aller-retour vers le service.
    pub async fn sample<S: QueryService + ?Sized>(
        &self,
        service: &S,
        point: Point,
        scale_m: f64,
    ) -> Result<Option<f64>, BgfaError> {
        match self {
            HeightSurface::Available { scene, .. } => service.sample(scene, point, scale_m).await,
            HeightSurface::Missing { .. } => Ok(None),
        }
    }
}

/// Surfaces de toutes les années, ordonnées comme la `YearRange`
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSet {
    surfaces: Vec<HeightSurface>,
}

impl SurfaceSet {
    pub fn new(surfaces: Vec<HeightSurface>) -> Self {
        Self { surfaces }
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeightSurface> {
        self.surfaces.iter()
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn get(&self, year: i32) -> Option<&HeightSurface> {
        self.surfaces.iter().find(|s| s.year() == year)
    }

    /// Années sans surface disponible
    pub fn missing_years(&self) -> Vec<i32> {
        self.surfaces
            .iter()
            .filter(|s| !s.is_available())
            .map(HeightSurface::year)
            .collect()
    }
}

/// Construit et résout les surfaces annuelles sur une emprise
#[derive(Debug, Clone)]
pub struct TemporalResolver {
    source: HeightSource,
    region: Region,
}

impl TemporalResolver {
    pub fn new(source: HeightSource, region: Region) -> Self {
        Self { source, region }
    }

    /// Description de la requête pour une année (synchrone, sans appel distant)
    pub fn query_for(&self, year: i32) -> Result<SurfaceQuery, BgfaError> {
        Ok(SurfaceQuery {
            dataset: self.source.dataset.clone(),
            band: self.source.band.clone(),
            epoch_property: self.source.epoch_property.clone(),
            epoch_seconds: self.source.epoch.epoch_seconds(year)?,
            region: self.region,
        })
    }

    /// Résout la surface d'une année
    ///
    /// Ne renvoie jamais d'erreur: toute défaillance dégrade l'année en `Missing`.
    pub async fn resolve<S: QueryService + ?Sized>(&self, service: &S, year: i32) -> HeightSurface {
        let query = match self.query_for(year) {
            Ok(q) => q,
            Err(e) => {
                warn!(year, error = %e, "Cannot build surface query, year degraded to missing");
                return HeightSurface::Missing { year };
            }
        };

        match service.find_scene(&query).await {
            Ok(Some(scene)) => {
                debug!(year, epoch = query.epoch_seconds, "Resolved height surface");
                HeightSurface::Available { year, scene }
            }
            Ok(None) => {
                debug!(
                    year,
                    epoch = query.epoch_seconds,
                    "No scene matches reference timestamp"
                );
                HeightSurface::Missing { year }
            }
            Err(e) => {
                warn!(year, error = %e, "Surface resolution failed, year degraded to missing");
                HeightSurface::Missing { year }
            }
        }
    }

    /// Résout toutes les années en parallèle
    pub async fn resolve_all<S: QueryService + ?Sized>(
        &self,
        service: &S,
        years: &YearRange,
    ) -> SurfaceSet {
        let surfaces = join_all(years.iter().map(|year| self.resolve(service, year))).await;
        SurfaceSet::new(surfaces)
    }
}
