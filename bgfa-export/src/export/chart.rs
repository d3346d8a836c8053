//! Descriptions d'histogrammes pour la présentation
//!
//! Seules les données sont produites (JSON). Le rendu est laissé à l'outil
//! de visualisation.

use std::path::Path;

use anyhow::{Context, Result};
use bgfa::aggregate::{histogram, values_for, HistogramConfig, Metric};
use bgfa::BuildingRecord;
use serde::Serialize;

/// Nom du fichier de sortie
pub const CHARTS_FILE: &str = "charts.json";

/// Classe d'un histogramme
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Histogramme d'une grandeur pour une année
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDescription {
    pub title: String,
    /// Propriété représentée (`height_2023`, `bgfa_2023`)
    pub property: String,
    pub year: i32,
    pub bucket_width: f64,
    /// Taille de la population représentée
    pub count: u64,
    pub buckets: Vec<ChartBucket>,
}

fn title(metric: Metric, year: i32) -> String {
    match metric {
        Metric::Height => format!("Building Height Distribution ({})", year),
        Metric::Bgfa => format!("Built-up Gross Floor Area Distribution ({})", year),
    }
}

/// Construit l'histogramme d'une grandeur sur les bâtiments ayant une hauteur cette année
pub fn chart_for(
    records: &[BuildingRecord],
    year: i32,
    metric: Metric,
    config: &HistogramConfig,
) -> ChartDescription {
    let values = values_for(records, year, metric);
    let hist = histogram(&values, config);

    ChartDescription {
        title: title(metric, year),
        property: metric.property(year),
        year,
        bucket_width: hist.bucket_width,
        count: hist.total(),
        buckets: hist
            .buckets()
            .map(|(lower, upper, count)| ChartBucket {
                lower,
                upper,
                count,
            })
            .collect(),
    }
}

/// Écrit les descriptions dans `<output>/charts.json`
pub fn write_charts(output_dir: &Path, charts: &[ChartDescription]) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory {}", output_dir.display()))?;
    let path = output_dir.join(CHARTS_FILE);
    let json = serde_json::to_string_pretty(charts)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgfa::YearMetrics;

    fn record(height: Option<f64>) -> BuildingRecord {
        BuildingRecord {
            building_id: "b".into(),
            longitude: 0.0,
            latitude: 0.0,
            confidence: 0.9,
            area_m2: Some(10.0),
            years: vec![YearMetrics {
                year: 2023,
                height,
                bgfa: Some(bgfa::compute_bgfa(10.0, height, 3.0)),
            }],
        }
    }

    #[test]
    fn test_chart_for_heights() {
        let records = vec![record(Some(3.0)), record(Some(12.0)), record(None)];
        let chart = chart_for(&records, 2023, Metric::Height, &HistogramConfig::default());

        assert_eq!(chart.property, "height_2023");
        assert_eq!(chart.count, 2);
        assert_eq!(chart.bucket_width, 1.0);
        assert_eq!(chart.buckets.len(), 9);
        assert_eq!(chart.buckets[0].lower, 3.0);
        assert_eq!(chart.buckets[8].count, 1);
    }

    #[test]
    fn test_chart_empty_year() {
        let chart = chart_for(&[record(None)], 2023, Metric::Bgfa, &HistogramConfig::default());
        assert_eq!(chart.count, 0);
        assert!(chart.buckets.is_empty());
    }

    #[test]
    fn test_write_charts() {
        let dir = std::env::temp_dir().join(format!("bgfa_charts_{}", std::process::id()));
        let config = HistogramConfig::default();
        let chart = chart_for(&[record(Some(6.0))], 2023, Metric::Bgfa, &config);
        write_charts(&dir, &[chart]).unwrap();

        let content = std::fs::read_to_string(dir.join(CHARTS_FILE)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed[0]["property"], "bgfa_2023");
        assert_eq!(parsed[0]["count"], 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
