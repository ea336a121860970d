use crate::domain::sales_task::{
    SalesTaskProgress, SalesTaskStage, SalesTaskStageProgress, SalesTaskStatusLog,
};

/// Log entries in replay order: `created_at` ascending, then `sequence`, then
/// position in the slice.
pub fn ordered_logs(logs: &[SalesTaskStatusLog]) -> Vec<&SalesTaskStatusLog> {
    let mut ordered: Vec<&SalesTaskStatusLog> = logs.iter().collect();
    ordered.sort_by(|left, right| {
        left.created_at.cmp(&right.created_at).then(left.sequence.cmp(&right.sequence))
    });
    ordered
}

/// Folds the log into per-stage progress. The latest entry for a stage wins;
/// untouched stages stay pending.
pub fn project_progress(logs: &[SalesTaskStatusLog]) -> SalesTaskProgress {
    ordered_logs(logs).into_iter().fold(SalesTaskProgress::new(), |mut progress, entry| {
        progress.set(entry.status, SalesTaskStageProgress::from_entry(entry));
        progress
    })
}

/// Furthest completed stage in canonical order, or the first stage when
/// nothing is completed.
pub fn overall_status(progress: &SalesTaskProgress) -> SalesTaskStage {
    SalesTaskStage::ORDER
        .into_iter()
        .rev()
        .find(|stage| progress.is_completed(*stage))
        .unwrap_or_else(SalesTaskStage::first)
}
