//! Export tabulaire des enregistrements (CSV)
//!
//! Une tâche d'export écrit `<output>/<folder>/<description>.csv` en tâche de fond.
//! Une valeur manquante donne une cellule vide.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bgfa::{BuildingRecord, Field};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ExportFormat;

/// Description d'une tâche d'export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    /// Nom de la tâche, sert aussi de nom de fichier
    pub description: String,
    /// Sous-répertoire de destination
    pub folder: String,
    pub format: ExportFormat,
    /// Colonnes, dans l'ordre
    pub fields: Vec<Field>,
}

/// Identifiant d'une tâche soumise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// État d'une tâche d'export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Ready,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl TaskState {
    /// Vrai si la tâche n'évoluera plus
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed(_) | TaskState::Cancelled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Ready => f.write_str("READY"),
            TaskState::Running => f.write_str("RUNNING"),
            TaskState::Completed => f.write_str("COMPLETED"),
            TaskState::Failed(reason) => write!(f, "FAILED ({})", reason),
            TaskState::Cancelled => f.write_str("CANCELLED"),
        }
    }
}

/// Statut courant d'une tâche
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub id: TaskId,
    pub description: String,
    pub state: TaskState,
    /// Lignes écrites (hors en-tête), connues à la fin de la tâche
    pub rows: Option<u64>,
}

/// Destination des exports
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Démarre une tâche d'export et rend la main immédiatement
    async fn submit(&self, request: ExportRequest, records: Vec<BuildingRecord>) -> Result<TaskId>;

    /// Statut courant d'une tâche
    async fn status(&self, task: TaskId) -> Result<TaskStatus>;
}

type TaskTable = Arc<Mutex<HashMap<TaskId, TaskStatus>>>;

/// Export CSV dans un répertoire local
pub struct LocalCsvSink {
    output_dir: PathBuf,
    next_id: AtomicU64,
    tasks: TaskTable,
}

impl LocalCsvSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Chemin du fichier produit pour une requête
    pub fn path_for(&self, request: &ExportRequest) -> PathBuf {
        self.output_dir.join(&request.folder).join(format!(
            "{}.{}",
            request.description,
            request.format.extension()
        ))
    }
}

fn update(tasks: &TaskTable, id: TaskId, apply: impl FnOnce(&mut TaskStatus)) {
    let mut guard = tasks.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(status) = guard.get_mut(&id) {
        apply(status);
    }
}

/// Reporte l'issue de l'écriture dans la table des tâches
///
/// Un écrivain interrompu (panique) termine la tâche en échec.
async fn supervise(tasks: TaskTable, id: TaskId, handle: JoinHandle<(PathBuf, Result<u64>)>) {
    match handle.await {
        Ok((path, Ok(rows))) => {
            debug!(task = %id, path = %path.display(), rows, "Export written");
            update(&tasks, id, |s| {
                s.rows = Some(rows);
                s.state = TaskState::Completed;
            });
        }
        Ok((path, Err(e))) => {
            warn!(task = %id, path = %path.display(), error = %e, "Export failed");
            update(&tasks, id, |s| s.state = TaskState::Failed(format!("{:#}", e)));
        }
        Err(e) => {
            warn!(task = %id, error = %e, "Export writer aborted");
            update(&tasks, id, |s| {
                s.state = TaskState::Failed(format!("writer aborted: {}", e))
            });
        }
    }
}

#[async_trait]
impl ExportSink for LocalCsvSink {
    async fn submit(&self, request: ExportRequest, records: Vec<BuildingRecord>) -> Result<TaskId> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let path = self.path_for(&request);

        {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            guard.insert(
                id,
                TaskStatus {
                    id,
                    description: request.description.clone(),
                    state: TaskState::Ready,
                    rows: None,
                },
            );
        }

        let tasks = Arc::clone(&self.tasks);
        let writer_tasks = Arc::clone(&self.tasks);
        let handle = tokio::task::spawn_blocking(move || {
            update(&writer_tasks, id, |s| s.state = TaskState::Running);
            let result = write_csv(&path, &request.fields, &records);
            (path, result)
        });

        tokio::spawn(supervise(tasks, id, handle));

        Ok(id)
    }

    async fn status(&self, task: TaskId) -> Result<TaskStatus> {
        let guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .get(&task)
            .cloned()
            .with_context(|| format!("Unknown export task {}", task))
    }
}

/// Écrit les enregistrements dans un fichier CSV, en-tête compris
///
/// Retourne le nombre de lignes de données.
pub fn write_csv(path: &Path, fields: &[Field], records: &[BuildingRecord]) -> Result<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;

    writer.write_record(fields.iter().map(Field::to_string))?;

    let mut rows = 0u64;
    for record in records {
        writer.write_record(fields.iter().map(|field| {
            record
                .value(field)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }))?;
        rows += 1;
    }

    writer.flush()?;
    Ok(rows)
}
