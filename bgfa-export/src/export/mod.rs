//! Modules d'export (CSV, suivi des tâches, histogrammes)

pub mod chart;
pub mod csv;
pub mod monitor;

pub use self::csv::{ExportRequest, ExportSink, LocalCsvSink, TaskId, TaskState, TaskStatus};
pub use chart::{chart_for, write_charts, ChartDescription};
pub use monitor::monitor_tasks;
