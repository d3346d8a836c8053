//! Suivi des tâches d'export jusqu'à leur terme

use std::time::Duration;

use tracing::{info, warn};

use super::csv::{ExportSink, TaskId, TaskState, TaskStatus};

/// Interroge les tâches jusqu'à ce qu'elles soient toutes terminées
///
/// Chaque état observé est journalisé. Une tâche dont le statut ne peut pas
/// être lu est considérée en échec. Les statuts finaux suivent l'ordre de `tasks`.
pub async fn monitor_tasks<S: ExportSink + ?Sized>(
    sink: &S,
    tasks: &[TaskId],
    poll_interval: Duration,
) -> Vec<TaskStatus> {
    let mut finals: Vec<Option<TaskStatus>> = vec![None; tasks.len()];
    let mut active: Vec<usize> = (0..tasks.len()).collect();

    while !active.is_empty() {
        let mut still_active = Vec::with_capacity(active.len());

        for &i in &active {
            let id = tasks[i];
            let status = match sink.status(id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(task = %id, error = %e, "Cannot read task status");
                    TaskStatus {
                        id,
                        description: id.to_string(),
                        state: TaskState::Failed(e.to_string()),
                        rows: None,
                    }
                }
            };

            info!(task = %status.description, state = %status.state, "Export task");

            if status.state.is_terminal() {
                finals[i] = Some(status);
            } else {
                still_active.push(i);
            }
        }

        active = still_active;
        if !active.is_empty() {
            tokio::time::sleep(poll_interval).await;
        }
    }

    finals.into_iter().flatten().collect()
}
