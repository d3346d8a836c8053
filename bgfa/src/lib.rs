//! # bgfa
//!
//! Hauteur, nombre d'étages et surface de plancher (BGFA) des bâtiments
//! d'une zone, année par année.
//!
//! ## Features
//!
//! - Sélection d'une scène de hauteurs par année sur un horodatage exact
//! - Mosaïque « dernière écriture gagnante » découpée sur l'emprise
//! - Valeurs manquantes portées par `Option`, jamais par des sentinelles
//! - Découpage de l'emprise en tuiles sans double comptage
//! - Service de requêtes asynchrone derrière un trait (`QueryService`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bgfa::{run_tile, PipelineParams, Region, TemporalResolver, Tile, YearRange};
//!
//! let region = Region::new(73.85, 18.52, 73.86, 18.53)?;
//! let years = YearRange::inclusive(2016, 2023)?;
//!
//! let surfaces = TemporalResolver::new(Default::default(), region)
//!     .resolve_all(&service, &years)
//!     .await;
//!
//! let outcome = run_tile(&service, &PipelineParams::default(), &Tile::whole(region), &surfaces).await?;
//! for record in &outcome.records {
//!     println!("{}: {:?}", record.building_id, record.bgfa(2023));
//! }
//! ```

pub mod aggregate;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod region;
pub mod resolver;
pub mod service;
pub mod types;
pub mod years;

pub use aggregate::{
    histogram, retain_valid, summarize, Histogram, HistogramConfig, Metric, YearlyStatistic,
};
pub use error::BgfaError;
pub use metrics::{compute_bgfa, derive_record, floors, DeriveOptions};
pub use pipeline::{run_tile, PipelineParams, TileOutcome};
pub use region::{Region, Tile};
pub use resolver::{HeightSource, HeightSurface, ReferenceEpoch, SurfaceSet, TemporalResolver};
pub use service::{MemoryQueryService, QueryService};
pub use types::{default_fields, Building, BuildingRecord, Field, YearMetrics};
pub use years::YearRange;
