//! Configuration de l'analyse (emprise, années, jeux de données, export)

use serde::{Deserialize, Serialize};
use std::path::Path;

use anyhow::{Context, Result};
use bgfa::aggregate::HistogramConfig;
use bgfa::metrics::DeriveOptions;
use bgfa::pipeline::{PipelineParams, DEFAULT_BUILDINGS_DATASET, DEFAULT_MIN_CONFIDENCE};
use bgfa::resolver::{DEFAULT_EPOCH_PROPERTY, DEFAULT_HEIGHTS_DATASET, DEFAULT_HEIGHT_BAND};
use bgfa::{HeightSource, ReferenceEpoch, Region, YearRange};

/// Noms des presets embarqués
pub const PRESETS: [&str; 2] = ["pune", "pune-heights"];

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub region: RegionConfig,
    pub years: YearsConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub derivation: DerivationConfig,

    #[serde(default)]
    pub tiling: TilingConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub chart: ChartConfig,
}

/// Emprise en degrés WGS84
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RegionConfig {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

/// Années: intervalle inclusif ou liste explicite
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum YearsConfig {
    Range { first: i32, last: i32 },
    List(Vec<i32>),
}

/// Identifiants des collections interrogées
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    #[serde(default = "default_buildings")]
    pub buildings: String,

    #[serde(default = "default_heights")]
    pub heights: String,

    #[serde(default = "default_band")]
    pub band: String,

    #[serde(default = "default_epoch_property")]
    pub epoch_property: String,

    #[serde(default)]
    pub reference_epoch: EpochConfig,
}

/// Instant de référence annuel des scènes
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct EpochConfig {
    pub month: u32,
    pub day: u32,
    #[serde(default)]
    pub hour: u32,
    pub utc_offset_minutes: i32,
}

/// Paramètres de dérivation des métriques
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DerivationConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    #[serde(default = "default_floor_height")]
    pub floor_height: f64,

    #[serde(default = "default_sampling_scale")]
    pub sampling_scale: f64,

    /// Facteur vers les mètres des valeurs brutes de hauteur
    #[serde(default = "default_unit_scale")]
    pub height_unit_scale: f64,

    /// Surface au sol et BGFA (sinon hauteurs seules)
    #[serde(default = "default_true")]
    pub with_area: bool,
}

/// Découpage de l'emprise
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TilingConfig {
    pub splits_x: u32,
    pub splits_y: u32,
}

/// Format de fichier exporté
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    #[default]
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
        }
    }
}

/// Destination des exports
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_folder")]
    pub folder: String,

    /// Préfixe des descriptions de tâches (`<prefix>_<index>`)
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub format: ExportFormat,

    /// Colonnes exportées; par défaut toutes les colonnes de la variante
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

/// Paramètres des histogrammes
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ChartConfig {
    pub max_buckets: usize,
    pub min_bucket_width: f64,
}

fn default_buildings() -> String {
    DEFAULT_BUILDINGS_DATASET.to_string()
}

fn default_heights() -> String {
    DEFAULT_HEIGHTS_DATASET.to_string()
}

fn default_band() -> String {
    DEFAULT_HEIGHT_BAND.to_string()
}

fn default_epoch_property() -> String {
    DEFAULT_EPOCH_PROPERTY.to_string()
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_floor_height() -> f64 {
    bgfa::metrics::FLOOR_HEIGHT_M
}

fn default_sampling_scale() -> f64 {
    bgfa::metrics::SAMPLING_SCALE_M
}

fn default_unit_scale() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_folder() -> String {
    "Pune_Building_Analysis".to_string()
}

fn default_prefix() -> String {
    "pune_buildings_part".to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            buildings: default_buildings(),
            heights: default_heights(),
            band: default_band(),
            epoch_property: default_epoch_property(),
            reference_epoch: EpochConfig::default(),
        }
    }
}

impl Default for EpochConfig {
    fn default() -> Self {
        let epoch = ReferenceEpoch::default();
        Self {
            month: epoch.month,
            day: epoch.day,
            hour: epoch.hour,
            utc_offset_minutes: epoch.utc_offset_minutes,
        }
    }
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            floor_height: default_floor_height(),
            sampling_scale: default_sampling_scale(),
            height_unit_scale: default_unit_scale(),
            with_area: true,
        }
    }
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            splits_x: 1,
            splits_y: 1,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            prefix: default_prefix(),
            format: ExportFormat::default(),
            fields: None,
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        let histogram = HistogramConfig::default();
        Self {
            max_buckets: histogram.max_buckets,
            min_bucket_width: histogram.min_bucket_width,
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "pune" => Self::load_embedded(include_str!("presets/pune.json")),
            "pune-heights" => Self::load_embedded(include_str!("presets/pune-heights.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: {}", preset, PRESETS.join(", ")),
        }
    }

    /// Preset embarqué si le nom est connu, fichier JSON sinon
    pub fn resolve(spec: &str) -> Result<Self> {
        if PRESETS.contains(&spec) {
            Self::from_preset(spec)
        } else {
            Self::load(Path::new(spec))
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    /// Vérifie la cohérence de la configuration avant tout appel au service
    pub fn validate(&self) -> Result<()> {
        self.region()?;
        self.year_range()?;
        self.reference_epoch()
            .epoch_seconds(self.year_range()?.first())
            .context("Invalid reference epoch")?;

        let d = &self.derivation;
        if !(0.0..=1.0).contains(&d.min_confidence) {
            anyhow::bail!("min_confidence must lie in [0, 1], got {}", d.min_confidence);
        }
        if d.floor_height.is_nan() || d.floor_height <= 0.0 {
            anyhow::bail!("floor_height must be positive, got {}", d.floor_height);
        }
        if d.sampling_scale.is_nan() || d.sampling_scale <= 0.0 {
            anyhow::bail!("sampling_scale must be positive, got {}", d.sampling_scale);
        }
        if !d.height_unit_scale.is_finite() || d.height_unit_scale <= 0.0 {
            anyhow::bail!(
                "height_unit_scale must be positive, got {}",
                d.height_unit_scale
            );
        }
        if self.tiling.splits_x == 0 || self.tiling.splits_y == 0 {
            anyhow::bail!(
                "tiling must have at least one split per axis, got {}x{}",
                self.tiling.splits_x,
                self.tiling.splits_y
            );
        }
        if self.export.prefix.is_empty() || self.export.folder.is_empty() {
            anyhow::bail!("export folder and prefix cannot be empty");
        }
        self.fields()?;

        Ok(())
    }

    pub fn region(&self) -> Result<Region> {
        let r = &self.region;
        Region::new(r.min_lon, r.min_lat, r.max_lon, r.max_lat).context("Invalid region")
    }

    pub fn year_range(&self) -> Result<YearRange> {
        let range = match &self.years {
            YearsConfig::Range { first, last } => YearRange::inclusive(*first, *last),
            YearsConfig::List(years) => YearRange::new(years.clone()),
        };
        range.context("Invalid years")
    }

    pub fn reference_epoch(&self) -> ReferenceEpoch {
        let e = &self.dataset.reference_epoch;
        ReferenceEpoch {
            month: e.month,
            day: e.day,
            hour: e.hour,
            utc_offset_minutes: e.utc_offset_minutes,
        }
    }

    pub fn height_source(&self) -> HeightSource {
        HeightSource {
            dataset: self.dataset.heights.clone(),
            band: self.dataset.band.clone(),
            epoch_property: self.dataset.epoch_property.clone(),
            epoch: self.reference_epoch(),
        }
    }

    pub fn derive_options(&self) -> DeriveOptions {
        DeriveOptions {
            floor_height: self.derivation.floor_height,
            sampling_scale: self.derivation.sampling_scale,
            height_unit_scale: self.derivation.height_unit_scale,
            with_area: self.derivation.with_area,
        }
    }

    pub fn pipeline_params(&self, concurrency: usize) -> PipelineParams {
        PipelineParams {
            buildings_dataset: self.dataset.buildings.clone(),
            min_confidence: self.derivation.min_confidence,
            derive: self.derive_options(),
            concurrency,
        }
    }

    pub fn histogram(&self) -> HistogramConfig {
        HistogramConfig {
            max_buckets: self.chart.max_buckets,
            min_bucket_width: self.chart.min_bucket_width,
        }
    }

    /// Colonnes exportées, dans l'ordre
    ///
    /// Une colonne d'année hors de l'intervalle configuré est refusée.
    pub fn fields(&self) -> Result<Vec<bgfa::Field>> {
        let years = self.year_range()?;
        let Some(names) = &self.export.fields else {
            return Ok(bgfa::default_fields(&years, self.derivation.with_area));
        };

        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let field: bgfa::Field = name
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid export field {}", name))?;
            match field {
                bgfa::Field::Height(year) | bgfa::Field::Bgfa(year)
                    if years.position(year).is_none() =>
                {
                    anyhow::bail!("Export field {} is outside the configured years", name)
                }
                bgfa::Field::Area | bgfa::Field::Bgfa(_) if !self.derivation.with_area => {
                    anyhow::bail!("Export field {} requires with_area", name)
                }
                _ => fields.push(field),
            }
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_parse_and_validate() {
        for name in PRESETS {
            let config = Config::from_preset(name).unwrap();
            config.validate().unwrap();
        }
        assert!(Config::from_preset("paris").is_err());
    }

    #[test]
    fn test_pune_preset() {
        let config = Config::from_preset("pune").unwrap();
        let region = config.region().unwrap();
        assert_eq!(region.min_lon(), 73.85);
        assert_eq!(region.max_lat(), 18.53);

        let years = config.year_range().unwrap();
        assert_eq!(years.first(), 2016);
        assert_eq!(years.last(), 2023);

        assert_eq!((config.tiling.splits_x, config.tiling.splits_y), (4, 4));
        assert_eq!(config.export.folder, "Pune_Building_Analysis");
        assert_eq!(config.export.prefix, "pune_buildings_part");
        assert_eq!(config.derivation.min_confidence, 0.7);

        // longitude, latitude, confidence, area_m2 + 8 hauteurs + 8 BGFA
        let fields = config.fields().unwrap();
        assert_eq!(fields.len(), 20);
        assert_eq!(fields[3].to_string(), "area_m2");
        assert_eq!(fields[4].to_string(), "height_2016");
        assert_eq!(fields[19].to_string(), "bgfa_2023");
    }

    #[test]
    fn test_heights_preset_has_no_area() {
        let config = Config::from_preset("pune-heights").unwrap();
        assert!(!config.derivation.with_area);
        let fields = config.fields().unwrap();
        assert!(fields
            .iter()
            .all(|f| !matches!(f, bgfa::Field::Area | bgfa::Field::Bgfa(_))));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let json = r#"{
            "region": {"min_lon": 0.0, "min_lat": 0.0, "max_lon": 1.0, "max_lat": 1.0},
            "years": [2019, 2021]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.year_range().unwrap().as_slice(), &[2019, 2021]);
        assert_eq!(config.dataset.band, "building_height");
        assert_eq!(config.tiling.splits_x, 1);
        assert_eq!(config.export.format, ExportFormat::Csv);
        assert_eq!(config.reference_epoch(), ReferenceEpoch::default());
    }

    #[test]
    fn test_validate_rejects_malformed_input() {
        let mut config = Config::from_preset("pune").unwrap();
        config.years = YearsConfig::List(vec![2020, 2019]);
        assert!(config.validate().is_err());

        let mut config = Config::from_preset("pune").unwrap();
        config.region.max_lon = 73.0;
        assert!(config.validate().is_err());

        let mut config = Config::from_preset("pune").unwrap();
        config.derivation.floor_height = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::from_preset("pune").unwrap();
        config.export.fields = Some(vec!["height_2030".into()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_fields() {
        let mut config = Config::from_preset("pune").unwrap();
        config.export.fields = Some(vec!["latitude".into(), "bgfa_2020".into()]);
        let fields = config.fields().unwrap();
        assert_eq!(fields, vec![bgfa::Field::Latitude, bgfa::Field::Bgfa(2020)]);
    }
}
