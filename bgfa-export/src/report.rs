//! Rapport d'exécution avec dégradation gracieuse
//!
//! Collecte les compteurs par tuile, les échecs isolés, l'état des tâches
//! d'export et les statistiques annuelles.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use bgfa::{BuildingRecord, Metric, TileOutcome, YearlyStatistic};
use serde::Serialize;

use crate::export::{TaskState, TaskStatus};

/// Statut global de l'exécution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Exécution complète sans erreur
    Success,
    /// Des bâtiments, tuiles ou exports ont échoué
    PartialSuccess,
    /// Rien n'a pu être produit
    Failed,
}

/// Niveau de sévérité
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorLevel {
    /// Erreur fatale: exécution abandonnée
    Fatal,
    /// Erreur: élément perdu
    Error,
    /// Warning: donnée dégradée
    Warning,
}

/// Problème rencontré, avec son contexte
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub level: ErrorLevel,
    /// Index de la tuile (optionnel)
    pub tile: Option<usize>,
    /// Identifiant du bâtiment (optionnel)
    pub building_id: Option<String>,
    pub message: String,
}

/// Résultat d'une tâche d'export
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub description: String,
    pub state: TaskState,
    pub rows: Option<u64>,
}

/// Statistique annuelle sérialisable
#[derive(Debug, Clone, Serialize)]
pub struct StatisticReport {
    pub year: i32,
    pub metric: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl From<&YearlyStatistic> for StatisticReport {
    fn from(stat: &YearlyStatistic) -> Self {
        Self {
            year: stat.year,
            metric: stat.metric.to_string(),
            count: stat.count,
            mean: stat.mean,
            min: stat.min,
            max: stat.max,
        }
    }
}

/// Rapport complet d'exécution
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Preset ou fichier de configuration
    pub config: String,
    pub duration_secs: f64,
    pub status: RunStatus,

    /// Tuiles traitées (y compris en échec)
    pub tiles_processed: usize,
    pub tiles_failed: usize,
    /// Bâtiments renvoyés par le service
    pub buildings_fetched: usize,
    /// Bâtiments écartés (confiance, tuile voisine)
    pub buildings_skipped: usize,
    /// Enregistrements construits
    pub buildings_derived: usize,
    /// Enregistrements retenus (au moins une hauteur)
    pub records_retained: usize,
    /// Enregistrements écartés faute de hauteur
    pub records_without_height: usize,

    /// Années sans surface de hauteur
    pub missing_years: Vec<i32>,

    pub tasks: Vec<TaskReport>,
    pub statistics: Vec<StatisticReport>,

    /// Empreinte blake3 des enregistrements retenus
    pub records_digest: Option<String>,

    pub errors: Vec<RunError>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            config: String::new(),
            duration_secs: 0.0,
            status: RunStatus::Success,
            tiles_processed: 0,
            tiles_failed: 0,
            buildings_fetched: 0,
            buildings_skipped: 0,
            buildings_derived: 0,
            records_retained: 0,
            records_without_height: 0,
            missing_years: Vec::new(),
            tasks: Vec::new(),
            statistics: Vec::new(),
            records_digest: None,
            errors: Vec::new(),
        }
    }
}

impl RunReport {
    pub fn new(config: &str) -> Self {
        Self {
            config: config.to_string(),
            ..Default::default()
        }
    }

    /// Enregistre le résultat d'une tuile
    pub fn record_tile(&mut self, outcome: &TileOutcome) {
        self.tiles_processed += 1;
        self.buildings_fetched += outcome.fetched;
        self.buildings_skipped += outcome.below_confidence + outcome.outside_tile;
        self.buildings_derived += outcome.derived;
        self.records_retained += outcome.records.len();
        self.records_without_height += outcome.without_height();

        for failure in &outcome.failures {
            let building_id = match failure {
                bgfa::BgfaError::InvalidGeometry { building_id, .. } => Some(building_id.clone()),
                _ => None,
            };
            self.errors.push(RunError {
                level: ErrorLevel::Error,
                tile: Some(outcome.tile.index),
                building_id,
                message: failure.to_string(),
            });
        }
    }

    /// Enregistre une tuile en échec
    pub fn record_tile_failure(&mut self, tile: usize, message: &str) {
        self.tiles_processed += 1;
        self.tiles_failed += 1;
        self.errors.push(RunError {
            level: ErrorLevel::Error,
            tile: Some(tile),
            building_id: None,
            message: message.to_string(),
        });
    }

    /// Enregistre une sortie non produite (export, histogrammes)
    pub fn record_output_failure(&mut self, tile: Option<usize>, message: &str) {
        self.errors.push(RunError {
            level: ErrorLevel::Error,
            tile,
            building_id: None,
            message: message.to_string(),
        });
    }

    /// Enregistre une année sans surface de hauteur
    pub fn record_missing_year(&mut self, year: i32) {
        self.missing_years.push(year);
        self.errors.push(RunError {
            level: ErrorLevel::Warning,
            tile: None,
            building_id: None,
            message: format!("No height surface for {}, all heights missing", year),
        });
    }

    /// Enregistre l'état final d'une tâche d'export
    pub fn record_task(&mut self, status: &TaskStatus) {
        match &status.state {
            TaskState::Failed(reason) => self.errors.push(RunError {
                level: ErrorLevel::Error,
                tile: None,
                building_id: None,
                message: format!("Export {} failed: {}", status.description, reason),
            }),
            TaskState::Cancelled => self.errors.push(RunError {
                level: ErrorLevel::Error,
                tile: None,
                building_id: None,
                message: format!("Export {} cancelled", status.description),
            }),
            _ => {}
        }
        self.tasks.push(TaskReport {
            description: status.description.clone(),
            state: status.state.clone(),
            rows: status.rows,
        });
    }

    /// Enregistre une erreur fatale
    pub fn record_fatal(&mut self, message: &str) {
        self.errors.push(RunError {
            level: ErrorLevel::Fatal,
            tile: None,
            building_id: None,
            message: message.to_string(),
        });
    }

    pub fn set_statistics(&mut self, stats: &[YearlyStatistic]) {
        self.statistics = stats.iter().map(StatisticReport::from).collect();
    }

    pub fn set_digest(&mut self, records: &[BuildingRecord]) {
        self.records_digest = Some(records_digest(records));
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    ///
    /// Les warnings (années manquantes) n'altèrent pas le statut.
    pub fn finalize(&mut self) {
        let has_fatal = self.errors.iter().any(|e| e.level == ErrorLevel::Fatal);
        let has_errors = self.errors.iter().any(|e| e.level == ErrorLevel::Error);
        let has_success = self.tiles_processed > self.tiles_failed;

        self.status = if has_fatal {
            RunStatus::Failed
        } else if has_errors && has_success {
            RunStatus::PartialSuccess
        } else if has_errors {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
    }

    /// Statistiques d'une grandeur, dans l'ordre des années
    pub fn statistics_for(&self, metric: Metric) -> impl Iterator<Item = &StatisticReport> {
        let name = metric.to_string();
        self.statistics.iter().filter(move |s| s.metric == name)
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("RUN REPORT - {}", self.config);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Tiles: {} processed, {} failed",
            self.tiles_processed, self.tiles_failed
        );
        println!(
            "Buildings: {} fetched, {} skipped, {} derived",
            self.buildings_fetched, self.buildings_skipped, self.buildings_derived
        );
        println!(
            "Records: {} retained, {} without any height",
            self.records_retained, self.records_without_height
        );
        if !self.missing_years.is_empty() {
            println!("Years without height data: {:?}", self.missing_years);
        }
        if let Some(digest) = &self.records_digest {
            println!("Records digest: {}", digest);
        }

        if !self.statistics.is_empty() {
            println!("\n--- STATISTICS ---");
            for s in &self.statistics {
                match (s.mean, s.min, s.max) {
                    (Some(mean), Some(min), Some(max)) => println!(
                        "  {}_{}: n={} mean={:.2} min={:.2} max={:.2}",
                        s.metric, s.year, s.count, mean, min, max
                    ),
                    _ => println!("  {}_{}: n=0", s.metric, s.year),
                }
            }
        }

        if !self.tasks.is_empty() {
            println!("\n--- EXPORTS ({}) ---", self.tasks.len());
            for t in &self.tasks {
                match t.rows {
                    Some(rows) => println!("  {}: {} ({} rows)", t.description, t.state, rows),
                    None => println!("  {}: {}", t.description, t.state),
                }
            }
        }

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for e in self.errors.iter().take(20) {
                let location = match (&e.tile, &e.building_id) {
                    (Some(t), Some(id)) => format!("[tile {}:{}]", t, id),
                    (Some(t), None) => format!("[tile {}]", t),
                    (None, Some(id)) => format!("[{}]", id),
                    _ => String::new(),
                };
                println!("  {:?} {} {}", e.level, location, e.message);
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} tiles, {} records retained, {} exports, {} errors",
            self.config,
            self.tiles_processed,
            self.records_retained,
            self.tasks.len(),
            self.errors
                .iter()
                .filter(|e| e.level != ErrorLevel::Warning)
                .count()
        )
    }
}

/// Empreinte stable d'une suite d'enregistrements (ordre compris)
pub fn records_digest(records: &[BuildingRecord]) -> String {
    let mut hasher = blake3::Hasher::new();

    for record in records {
        hasher.update(b"REC");
        hasher.update(record.building_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(&record.longitude.to_le_bytes());
        hasher.update(&record.latitude.to_le_bytes());
        hasher.update(&record.confidence.to_le_bytes());
        hash_optional(&mut hasher, record.area_m2);
        for m in &record.years {
            hasher.update(&m.year.to_le_bytes());
            hash_optional(&mut hasher, m.height);
            hash_optional(&mut hasher, m.bgfa);
        }
    }

    hex::encode(hasher.finalize().as_bytes())
}

fn hash_optional(hasher: &mut blake3::Hasher, value: Option<f64>) {
    match value {
        Some(v) => {
            hasher.update(&[1]);
            hasher.update(&v.to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgfa::{Region, Tile, YearMetrics};

    fn record(id: &str, height: Option<f64>) -> BuildingRecord {
        BuildingRecord {
            building_id: id.to_string(),
            longitude: 73.855,
            latitude: 18.525,
            confidence: 0.9,
            area_m2: Some(30.0),
            years: vec![YearMetrics {
                year: 2023,
                height,
                bgfa: Some(bgfa::compute_bgfa(30.0, height, 3.0)),
            }],
        }
    }

    fn outcome(records: Vec<BuildingRecord>, derived: usize) -> TileOutcome {
        TileOutcome {
            tile: Tile::whole(Region::new(0.0, 0.0, 1.0, 1.0).unwrap()),
            fetched: derived + 2,
            below_confidence: 1,
            outside_tile: 1,
            derived,
            records,
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_run_report_default() {
        let report = RunReport::default();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.tiles_processed, 0);
        assert_eq!(report.records_digest, None);
    }

    #[test]
    fn test_record_tile() {
        let mut report = RunReport::new("pune");
        report.record_tile(&outcome(vec![record("a", Some(9.0))], 2));
        report.record_tile(&outcome(vec![], 0));

        assert_eq!(report.tiles_processed, 2);
        assert_eq!(report.buildings_fetched, 6);
        assert_eq!(report.buildings_skipped, 4);
        assert_eq!(report.buildings_derived, 2);
        assert_eq!(report.records_retained, 1);
        assert_eq!(report.records_without_height, 1);
    }

    #[test]
    fn test_building_failure_is_partial_success() {
        let mut report = RunReport::new("pune");
        let mut o = outcome(vec![record("a", Some(9.0))], 1);
        o.failures
            .push(bgfa::BgfaError::invalid_geometry("broken", "no centroid"));
        report.record_tile(&o);
        report.finalize();

        assert_eq!(report.status, RunStatus::PartialSuccess);
        assert_eq!(report.errors[0].building_id.as_deref(), Some("broken"));
    }

    #[test]
    fn test_missing_year_is_warning_only() {
        let mut report = RunReport::new("pune");
        report.record_tile(&outcome(vec![], 0));
        report.record_missing_year(2016);
        report.finalize();

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.missing_years, vec![2016]);
    }

    #[test]
    fn test_all_tiles_failed() {
        let mut report = RunReport::new("pune");
        report.record_tile_failure(0, "service unavailable");
        report.record_tile_failure(1, "service unavailable");
        report.finalize();
        assert_eq!(report.status, RunStatus::Failed);

        let mut report = RunReport::new("pune");
        report.record_tile(&outcome(vec![], 0));
        report.record_fatal("output directory not writable");
        report.finalize();
        assert_eq!(report.status, RunStatus::Failed);
    }

    #[test]
    fn test_failed_task_recorded() {
        let mut report = RunReport::new("pune");
        report.record_tile(&outcome(vec![record("a", Some(3.0))], 1));
        report.record_task(&TaskStatus {
            id: crate::export::TaskId(1),
            description: "pune_buildings_part_0".into(),
            state: TaskState::Failed("disk full".into()),
            rows: None,
        });
        report.finalize();

        assert_eq!(report.status, RunStatus::PartialSuccess);
        assert_eq!(report.tasks.len(), 1);
        assert!(report.errors[0].message.contains("disk full"));
    }

    #[test]
    fn test_statistics_and_summary() {
        let mut report = RunReport::new("pune");
        let records = vec![record("a", Some(3.0)), record("b", Some(9.0))];
        let years = bgfa::YearRange::inclusive(2023, 2023).unwrap();
        report.set_statistics(&bgfa::summarize(&records, &years, Metric::Height));
        report.records_retained = 2;

        let heights: Vec<_> = report.statistics_for(Metric::Height).collect();
        assert_eq!(heights.len(), 1);
        assert_eq!(heights[0].mean, Some(6.0));
        assert_eq!(report.statistics_for(Metric::Bgfa).count(), 0);

        let summary = report.summary();
        assert!(summary.contains("pune"));
        assert!(summary.contains("2 records retained"));
    }

    #[test]
    fn test_records_digest() {
        let a = vec![record("a", Some(9.0)), record("b", None)];
        let b = vec![record("a", Some(9.0)), record("b", None)];
        let c = vec![record("b", None), record("a", Some(9.0))];
        let d = vec![record("a", Some(9.0)), record("b", Some(0.0))];

        assert_eq!(records_digest(&a), records_digest(&b));
        assert_ne!(records_digest(&a), records_digest(&c));
        assert_ne!(records_digest(&a), records_digest(&d));
        assert_eq!(records_digest(&a).len(), 64);
    }

    #[test]
    fn test_save_to_file() {
        let path = std::env::temp_dir().join(format!("bgfa_report_{}.json", std::process::id()));
        let mut report = RunReport::new("pune");
        report.set_digest(&[record("a", Some(9.0))]);
        report.save_to_file(&path).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["config"], "pune");
        assert_eq!(parsed["status"], "Success");

        let _ = std::fs::remove_file(&path);
    }
}
