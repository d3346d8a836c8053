//! # bgfa-export
//!
//! Analyse temporelle des hauteurs et surfaces de plancher (BGFA) par bâtiment,
//! avec export CSV par tuile.
//!
//! ## Features
//!
//! - Configuration par preset (`pune`, `pune-heights`) ou fichier JSON
//! - Découpage de l'emprise en tuiles traitées en parallèle
//! - Une tâche d'export par tuile non vide, avec suivi jusqu'à la fin
//! - Statistiques annuelles et histogrammes (JSON)
//! - Rapport d'exécution
//!
//! ## Usage CLI
//!
//! ```bash
//! # Analyse complète de Pune, 4x4 tuiles
//! bgfa-export run --dataset ./data/pune --output ./output --charts
//!
//! # Statistiques seules, sans export
//! bgfa-export stats --config ./my-region.json --dataset ./data/region
//! ```

pub mod config;
pub mod export;
pub mod report;
pub mod run;
pub mod service;

pub use config::Config;
pub use export::{ExportSink, LocalCsvSink, TaskState, TaskStatus};
pub use report::{RunReport, RunStatus};
pub use run::{run, RunOptions, RunOutput};
pub use service::{load_dataset, ServiceConfig};
