//! Types d'erreurs pour le crate bgfa

use thiserror::Error;

/// Erreurs pouvant survenir pendant la dérivation des métriques
///
/// Une hauteur absente n'est jamais une erreur: elle est portée par `None`
/// dans les enregistrements.
#[derive(Debug, Error)]
pub enum BgfaError {
    /// Liste d'années vide ou non strictement croissante
    #[error("Malformed year range: {0}")]
    MalformedYearRange(String),

    /// Emprise géographique invalide
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Géométrie de bâtiment inexploitable
    #[error("Invalid geometry for {building_id}: {reason}")]
    InvalidGeometry { building_id: String, reason: String },

    /// Horodatage de référence impossible à construire
    #[error("Invalid reference timestamp for year {year}: {reason}")]
    InvalidTimestamp { year: i32, reason: String },

    /// Échec d'un appel au service de requêtes
    #[error("Query failed ({operation}): {reason}")]
    Query { operation: String, reason: String },

    /// Erreur d'I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Jeu de données local illisible
    #[error("Invalid dataset file {file}: {reason}")]
    Dataset { file: String, reason: String },
}

impl BgfaError {
    /// Crée une erreur de requête avec contexte
    pub fn query(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Query {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(building_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            building_id: building_id.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de fichier de données
    pub fn dataset(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dataset {
            file: file.into(),
            reason: reason.into(),
        }
    }
}
