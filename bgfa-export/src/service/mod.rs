//! Configuration d'exécution et jeu de données local

pub mod local;

use std::path::PathBuf;
use std::time::Duration;

pub use local::load_dataset;

/// Configuration d'exécution lue depuis l'environnement
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Répertoire contenant `buildings.geojson` et `heights.json`
    pub dataset_dir: Option<PathBuf>,
    /// Racine des exports
    pub output_dir: PathBuf,
    /// Bâtiments dérivés simultanément par tuile
    pub concurrency: usize,
    /// Intervalle de suivi des tâches d'export
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dataset_dir: None,
            output_dir: PathBuf::from("output"),
            concurrency: 16,
            poll_interval: Duration::from_secs(30),
        }
    }
}

impl ServiceConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            dataset_dir: get("BGFA_DATASET_DIR").map(PathBuf::from),
            output_dir: get("BGFA_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            concurrency: get("BGFA_CONCURRENCY")
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.concurrency),
            poll_interval: get("BGFA_POLL_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
        }
    }
}
