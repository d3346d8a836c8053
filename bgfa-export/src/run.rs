//! Exécution complète: tuiles concurrentes, exports, statistiques
//!
//! Les surfaces de hauteur sont résolues une seule fois pour toute l'emprise,
//! puis partagées par toutes les tuiles.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bgfa::aggregate::yearly_statistic;
use bgfa::{
    run_tile, BgfaError, BuildingRecord, Metric, QueryService, TemporalResolver, TileOutcome,
    YearlyStatistic,
};
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::Config;
use crate::export::{
    chart_for, monitor_tasks, write_charts, ChartDescription, ExportRequest, ExportSink,
};
use crate::report::RunReport;

/// Options d'exécution
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Nom affiché dans le rapport
    pub label: String,
    /// Tuiles traitées simultanément
    pub jobs: usize,
    /// Bâtiments dérivés simultanément par tuile
    pub concurrency: usize,
    /// Intervalle de suivi des exports
    pub poll_interval: Duration,
    /// Écrit `charts.json` dans ce répertoire
    pub charts_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            label: String::new(),
            jobs: 4,
            concurrency: 16,
            poll_interval: Duration::from_secs(30),
            charts_dir: None,
        }
    }
}

/// Résultat d'une exécution
#[derive(Debug)]
pub struct RunOutput {
    pub report: RunReport,
    /// Enregistrements retenus, dans l'ordre des tuiles
    pub records: Vec<BuildingRecord>,
    pub statistics: Vec<YearlyStatistic>,
    pub charts: Vec<ChartDescription>,
}

/// Statistiques annuelles de chaque grandeur, années calculées en parallèle
pub fn yearly_statistics(
    records: &[BuildingRecord],
    years: &[i32],
    metrics: &[Metric],
) -> Vec<YearlyStatistic> {
    metrics
        .iter()
        .flat_map(|&metric| {
            years
                .par_iter()
                .map(|&year| yearly_statistic(records, year, metric))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Lance l'analyse complète
///
/// Sans `sink`, aucun export n'est soumis (statistiques seules).
pub async fn run<S, E>(
    config: &Config,
    service: &S,
    sink: Option<&E>,
    options: &RunOptions,
) -> Result<RunOutput>
where
    S: QueryService + ?Sized,
    E: ExportSink + ?Sized,
{
    let started_at = Instant::now();
    config.validate()?;

    let region = config.region()?;
    let years = config.year_range()?;
    let tiles = region
        .split(config.tiling.splits_x, config.tiling.splits_y)
        .context("Failed to split region")?;
    let params = config.pipeline_params(options.concurrency);
    let fields = config.fields()?;

    let mut report = RunReport::new(&options.label);

    info!(
        tiles = tiles.len(),
        years = years.len(),
        first_year = years.first(),
        last_year = years.last(),
        "Starting analysis"
    );

    let surfaces = TemporalResolver::new(config.height_source(), region)
        .resolve_all(service, &years)
        .await;
    let missing = surfaces.missing_years();
    for &year in &missing {
        warn!(year, "No height surface, year exported as missing");
        report.record_missing_year(year);
    }
    if missing.len() == years.len() {
        report.record_fatal("No height surface for any year, no building can be retained");
    }

    let results: Mutex<Vec<(usize, Result<TileOutcome, BgfaError>)>> =
        Mutex::new(Vec::with_capacity(tiles.len()));

    stream::iter(tiles.iter())
        .for_each_concurrent(options.jobs.max(1), |tile| {
            let params = &params;
            let surfaces = &surfaces;
            let results = &results;
            async move {
                let outcome = run_tile(service, params, tile, surfaces).await;
                results
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push((tile.index, outcome));
            }
        })
        .await;

    let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
    results.sort_by_key(|(index, _)| *index);

    let mut records = Vec::new();
    let mut tasks = Vec::new();

    for (index, result) in results {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(tile = index, error = %e, "Tile failed");
                report.record_tile_failure(index, &e.to_string());
                continue;
            }
        };
        report.record_tile(&outcome);

        if outcome.is_empty() {
            info!(tile = index, "No valid building in tile, nothing to export");
            continue;
        }

        if let Some(sink) = sink {
            let request = ExportRequest {
                description: format!("{}_{}", config.export.prefix, index),
                folder: config.export.folder.clone(),
                format: config.export.format,
                fields: fields.clone(),
            };
            match sink.submit(request, outcome.records.clone()).await {
                Ok(id) => {
                    info!(tile = index, task = %id, "Started export task");
                    tasks.push(id);
                }
                Err(e) => {
                    warn!(tile = index, error = %e, "Cannot start export task");
                    report.record_output_failure(
                        Some(index),
                        &format!("export not started: {:#}", e),
                    );
                }
            }
        }

        records.extend(outcome.records);
    }

    if let Some(sink) = sink {
        if !tasks.is_empty() {
            info!(tasks = tasks.len(), "Monitoring export tasks");
        }
        for status in monitor_tasks(sink, &tasks, options.poll_interval).await {
            report.record_task(&status);
        }
    }

    let metrics: &[Metric] = if config.derivation.with_area {
        &[Metric::Height, Metric::Bgfa]
    } else {
        &[Metric::Height]
    };
    let statistics = yearly_statistics(&records, years.as_slice(), metrics);
    report.set_statistics(&statistics);

    let mut charts = Vec::new();
    if let Some(dir) = &options.charts_dir {
        let histogram = config.histogram();
        for &metric in metrics {
            for year in years.iter() {
                charts.push(chart_for(&records, year, metric, &histogram));
            }
        }
        if let Err(e) = write_charts(dir, &charts) {
            warn!(error = %e, "Cannot write charts");
            report.record_output_failure(None, &format!("charts not written: {:#}", e));
        }
    }

    report.set_digest(&records);
    report.set_duration(started_at.elapsed());
    report.finalize();

    info!(
        records = records.len(),
        status = ?report.status,
        "Analysis complete"
    );

    Ok(RunOutput {
        report,
        records,
        statistics,
        charts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgfa::YearMetrics;

    fn record(heights: &[(i32, Option<f64>)]) -> BuildingRecord {
        BuildingRecord {
            building_id: "b".into(),
            longitude: 0.0,
            latitude: 0.0,
            confidence: 0.9,
            area_m2: Some(10.0),
            years: heights
                .iter()
                .map(|&(year, height)| YearMetrics {
                    year,
                    height,
                    bgfa: Some(bgfa::compute_bgfa(10.0, height, 3.0)),
                })
                .collect(),
        }
    }

    #[test]
    fn test_yearly_statistics_order() {
        let records = vec![
            record(&[(2020, Some(3.0)), (2021, None)]),
            record(&[(2020, Some(9.0)), (2021, Some(6.0))]),
        ];
        let stats = yearly_statistics(&records, &[2020, 2021], &[Metric::Height, Metric::Bgfa]);

        let keys: Vec<(Metric, i32)> = stats.iter().map(|s| (s.metric, s.year)).collect();
        assert_eq!(
            keys,
            vec![
                (Metric::Height, 2020),
                (Metric::Height, 2021),
                (Metric::Bgfa, 2020),
                (Metric::Bgfa, 2021),
            ]
        );
        assert_eq!(stats[0].mean, Some(6.0));
        assert_eq!(stats[1].count, 1);
        assert_eq!(stats[3].mean, Some(20.0));
    }
}
