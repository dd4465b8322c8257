//! Keeps a goal's status consistent with its roadmap's completion.

use crate::api::GoalApi;
use crate::model::{Goal, GoalStatus, Roadmap};
use crate::notify::Notifier;
use crate::orchestrator::Liveness;
use crate::progress::calculate_progress;
use crate::store::EntityStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No goal, no roadmap, or a roadmap without steps.
    Skipped,
    Unchanged,
    Updated { from: GoalStatus, to: GoalStatus },
    Failed(String),
}

/// Status the goal should move to, if any.
///
/// Only a roadmap with at least one step can drive the status: an empty
/// roadmap never completes a goal. A goal at 100% becomes completed; a
/// completed goal below 100% goes back to in-progress. Other statuses below
/// 100% are left alone.
pub fn evaluate(goal: &Goal, roadmap: Option<&Roadmap>) -> Option<GoalStatus> {
    let roadmap = roadmap.filter(|roadmap| !roadmap.steps.is_empty())?;
    let progress = calculate_progress(roadmap);
    match (progress, goal.status) {
        (100, GoalStatus::Completed) => None,
        (100, _) => Some(GoalStatus::Completed),
        (_, GoalStatus::Completed) => Some(GoalStatus::InProgress),
        _ => None,
    }
}

/// Re-evaluates one goal from the cached copies and issues at most one status
/// update. The cached goal is replaced only with the server's reply; failures
/// are reported through `notifier` and returned as [`SyncOutcome::Failed`].
pub async fn sync_status<A: GoalApi, N: Notifier>(
    api: &A,
    store: &mut EntityStore,
    notifier: &N,
    liveness: &Liveness,
    goal_id: i64,
) -> SyncOutcome {
    let Some(goal) = store.goal(goal_id) else {
        return SyncOutcome::Skipped;
    };
    let roadmap = store.roadmap_for_goal(goal_id);
    if roadmap.map_or(true, |roadmap| roadmap.steps.is_empty()) {
        return SyncOutcome::Skipped;
    }
    let from = goal.status;
    let Some(to) = evaluate(goal, roadmap) else {
        return SyncOutcome::Unchanged;
    };

    tracing::debug!(goal_id, from = from.as_str(), to = to.as_str(), "syncing goal status");
    match api.update_goal_status(goal_id, to).await {
        Ok(updated) => {
            if liveness.is_attached() {
                tracing::info!(goal_id, from = from.as_str(), to = to.as_str(), "goal status synced");
                store.replace_goal(updated);
                notifier.success(match to {
                    GoalStatus::Completed => "Goal marked as completed!",
                    _ => "Goal moved back to in progress",
                });
            }
            SyncOutcome::Updated { from, to }
        }
        Err(err) => {
            let message = failure_message(&err, "Failed to update status");
            tracing::debug!(goal_id, error = %err, "goal status sync failed");
            if liveness.is_attached() {
                notifier.error(message.clone());
            }
            SyncOutcome::Failed(message)
        }
    }
}

/// The server's message when it sent one, otherwise `fallback`.
pub fn failure_message(err: &crate::error::AppError, fallback: &str) -> String {
    let message = err.user_message();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
