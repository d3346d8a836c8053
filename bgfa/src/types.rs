//! Types de données pour le crate bgfa

use std::fmt;
use std::str::FromStr;

use geo::Polygon;

use crate::YearRange;

/// Bâtiment en entrée, tel que renvoyé par le service de requêtes
#[derive(Debug, Clone)]
pub struct Building {
    /// Identifiant stable de la source (ordre de sortie, messages d'erreur)
    pub id: String,

    /// Emprise au sol (degrés WGS84)
    pub footprint: Polygon,

    /// Score de confiance de la détection (0.0 à 1.0)
    pub confidence: f64,

    /// Surface fournie par la source, en m²
    pub area_m2: Option<f64>,
}

/// Métriques d'un bâtiment pour une année
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearMetrics {
    pub year: i32,

    /// Hauteur en mètres, `None` si la surface n'a pas de valeur au centroïde
    pub height: Option<f64>,

    /// Surface de plancher en m², `None` seulement sans surface au sol
    pub bgfa: Option<f64>,
}

/// Enregistrement de sortie: un par bâtiment retenu
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingRecord {
    pub building_id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub confidence: f64,
    /// Absent dans la variante « hauteurs seules »
    pub area_m2: Option<f64>,
    /// Une entrée par année, dans l'ordre de la `YearRange`
    pub years: Vec<YearMetrics>,
}

impl BuildingRecord {
    pub fn metrics(&self, year: i32) -> Option<&YearMetrics> {
        self.years.iter().find(|m| m.year == year)
    }

    pub fn height(&self, year: i32) -> Option<f64> {
        self.metrics(year).and_then(|m| m.height)
    }

    pub fn bgfa(&self, year: i32) -> Option<f64> {
        self.metrics(year).and_then(|m| m.bgfa)
    }

    /// Vrai si au moins une année porte une hauteur
    pub fn has_any_height(&self) -> bool {
        self.years.iter().any(|m| m.height.is_some())
    }

    /// Valeur numérique d'un champ d'export
    pub fn value(&self, field: &Field) -> Option<f64> {
        match field {
            Field::Longitude => Some(self.longitude),
            Field::Latitude => Some(self.latitude),
            Field::Confidence => Some(self.confidence),
            Field::Area => self.area_m2,
            Field::Height(year) => self.height(*year),
            Field::Bgfa(year) => self.bgfa(*year),
        }
    }
}

/// Champ sélectionnable pour l'export tabulaire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Longitude,
    Latitude,
    Confidence,
    Area,
    Height(i32),
    Bgfa(i32),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Longitude => f.write_str("longitude"),
            Field::Latitude => f.write_str("latitude"),
            Field::Confidence => f.write_str("confidence"),
            Field::Area => f.write_str("area_m2"),
            Field::Height(year) => write!(f, "height_{}", year),
            Field::Bgfa(year) => write!(f, "bgfa_{}", year),
        }
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_year = |raw: &str| {
            raw.parse::<i32>()
                .map_err(|_| format!("Invalid year in field name: {}", s))
        };

        match s.trim() {
            "longitude" => Ok(Field::Longitude),
            "latitude" => Ok(Field::Latitude),
            "confidence" => Ok(Field::Confidence),
            "area_m2" => Ok(Field::Area),
            other => {
                if let Some(year) = other.strip_prefix("height_") {
                    Ok(Field::Height(parse_year(year)?))
                } else if let Some(year) = other.strip_prefix("bgfa_") {
                    Ok(Field::Bgfa(parse_year(year)?))
                } else {
                    Err(format!(
                        "Unknown field: {}. Use: longitude, latitude, confidence, area_m2, height_<year>, bgfa_<year>",
                        s
                    ))
                }
            }
        }
    }
}

/// Sélection par défaut: position, confiance, surface, puis hauteurs et BGFA par année
pub fn default_fields(years: &YearRange, with_area: bool) -> Vec<Field> {
    let mut fields = vec![Field::Longitude, Field::Latitude, Field::Confidence];
    if with_area {
        fields.push(Field::Area);
    }
    fields.extend(years.iter().map(Field::Height));
    if with_area {
        fields.extend(years.iter().map(Field::Bgfa));
    }
    fields
}
