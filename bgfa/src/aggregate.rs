//! Filtre de validité et statistiques annuelles

use std::fmt;

use crate::types::BuildingRecord;
use crate::YearRange;

/// Ne conserve que les enregistrements ayant au moins une hauteur
pub fn retain_valid(records: Vec<BuildingRecord>) -> Vec<BuildingRecord> {
    records.into_iter().filter(|r| r.has_any_height()).collect()
}

/// Grandeur agrégée
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Height,
    Bgfa,
}

impl Metric {
    /// Nom de la propriété pour une année (`height_2020`, `bgfa_2020`)
    pub fn property(&self, year: i32) -> String {
        format!("{}_{}", self, year)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Height => f.write_str("height"),
            Metric::Bgfa => f.write_str("bgfa"),
        }
    }
}

/// Statistiques descriptives d'une année
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearlyStatistic {
    pub year: i32,
    pub metric: Metric,
    /// Taille de la sous-population ayant une hauteur cette année
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Valeurs d'une année sur la sous-population ayant une hauteur cette année
pub fn values_for(records: &[BuildingRecord], year: i32, metric: Metric) -> Vec<f64> {
    records
        .iter()
        .filter(|r| r.height(year).is_some())
        .filter_map(|r| match metric {
            Metric::Height => r.height(year),
            Metric::Bgfa => r.bgfa(year),
        })
        .collect()
}

/// Statistique d'une année
///
/// Une population vide donne `count = 0` et des agrégats absents.
pub fn yearly_statistic(records: &[BuildingRecord], year: i32, metric: Metric) -> YearlyStatistic {
    let values = values_for(records, year, metric);

    let count = values.len();
    let (min, max, sum) = values.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(min, max, sum), &v| (min.min(v), max.max(v), sum + v),
    );

    if count == 0 {
        return YearlyStatistic {
            year,
            metric,
            count,
            mean: None,
            min: None,
            max: None,
        };
    }

    YearlyStatistic {
        year,
        metric,
        count,
        mean: Some(sum / count as f64),
        min: Some(min),
        max: Some(max),
    }
}

/// Statistiques de toutes les années, dans l'ordre de la `YearRange`
pub fn summarize(
    records: &[BuildingRecord],
    years: &YearRange,
    metric: Metric,
) -> Vec<YearlyStatistic> {
    years
        .iter()
        .map(|year| yearly_statistic(records, year, metric))
        .collect()
}

/// Paramètres de l'histogramme
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramConfig {
    /// Nombre maximal de classes
    pub max_buckets: usize,
    /// Largeur minimale d'une classe
    pub min_bucket_width: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            max_buckets: 30,
            min_bucket_width: 1.0,
        }
    }
}

/// Distribution par classes de largeur fixe
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Borne basse de la première classe
    pub start: f64,
    pub bucket_width: f64,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// `(borne basse, borne haute, effectif)` de chaque classe
    pub fn buckets(&self) -> impl Iterator<Item = (f64, f64, u64)> + '_ {
        self.counts.iter().enumerate().map(move |(i, &count)| {
            let lower = self.start + i as f64 * self.bucket_width;
            (lower, lower + self.bucket_width, count)
        })
    }
}

/// Histogramme des valeurs finies
///
/// Largeur = max(étendue / max_buckets, largeur minimale). La dernière classe
/// inclut le maximum.
pub fn histogram(values: &[f64], config: &HistogramConfig) -> Histogram {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let max_buckets = config.max_buckets.max(1);
    let min_width = if config.min_bucket_width > 0.0 {
        config.min_bucket_width
    } else {
        0.0
    };

    if finite.is_empty() {
        return Histogram {
            start: 0.0,
            bucket_width: if min_width > 0.0 { min_width } else { 1.0 },
            counts: Vec::new(),
        };
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    let mut width = (range / max_buckets as f64).max(min_width);
    if width <= 0.0 {
        width = 1.0;
    }

    let n = ((range / width).ceil() as usize).clamp(1, max_buckets);
    let mut counts = vec![0u64; n];
    for v in finite {
        let idx = (((v - min) / width).floor() as usize).min(n - 1);
        counts[idx] += 1;
    }

    Histogram {
        start: min,
        bucket_width: width,
        counts,
    }
}
