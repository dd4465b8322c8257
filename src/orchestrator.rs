use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::{page_window, GoalApi};
use crate::error::AppError;
use crate::filter::project;
use crate::model::{
    Goal, GoalChanges, GoalFilters, GoalInput, GoalPage, GoalStats, GoalStatus, Roadmap,
    RoadmapChanges, RoadmapInput, Step, StepChanges, StepInput, StepOrder,
};
use crate::notify::Notifier;
use crate::store::EntityStore;
use crate::sync::{failure_message, sync_status, SyncOutcome};

const GOAL_NOT_FOUND: &str = "Goal not found";
const NO_ROADMAP: &str = "No roadmap for this goal";
const ROADMAP_NOT_FOUND: &str = "Roadmap not found";
const STEP_NOT_FOUND: &str = "Step not found";

/// Shared flag telling whether results may still be applied. Once detached,
/// requests already in flight complete and return their results, but the
/// store and the notifier are left alone.
#[derive(Clone, Debug)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn detach(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_attached(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs goal, roadmap and step mutations against the API and folds the
/// replies into the entity store.
///
/// The store only changes after the API confirms a mutation. Step mutations
/// that can move completion re-run the status synchronizer for the owning
/// goal.
pub struct Orchestrator<A, N> {
    api: A,
    notifier: N,
    store: EntityStore,
    liveness: Liveness,
}

impl<A: GoalApi, N: Notifier> Orchestrator<A, N> {
    pub fn new(api: A, notifier: N) -> Self {
        Self {
            api,
            notifier,
            store: EntityStore::new(),
            liveness: Liveness::new(),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    #[cfg(test)]
    pub fn api(&self) -> &A {
        &self.api
    }

    #[cfg(test)]
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Cached goals narrowed by `filters`.
    pub fn visible_goals(&self, filters: &GoalFilters) -> Vec<Goal> {
        project(self.store.goals(), filters)
    }

    pub async fn list_goals(&mut self, filters: &GoalFilters) -> Result<GoalPage, AppError> {
        page_window(filters)?;
        let result = self.api.list_goals(filters).await;
        let page = self.report(result, "Failed to fetch goals")?;
        if self.attached() {
            self.store.set_goals(page.data.clone());
        }
        Ok(page)
    }

    pub async fn get_goal(&mut self, id: i64) -> Result<Goal, AppError> {
        let result = self
            .api
            .get_goal(id)
            .await
            .map_err(|err| not_found_as(err, GOAL_NOT_FOUND));
        let goal = self.report(result, "Failed to fetch goal details")?;
        if self.attached() {
            self.store.insert_goal(goal.clone());
        }
        Ok(goal)
    }

    pub async fn create_goal(&mut self, input: &GoalInput) -> Result<Goal, AppError> {
        require_non_empty("goal title", &input.title)?;
        require_non_empty("goal category", &input.category)?;
        tracing::debug!(title = %input.title, "creating goal");
        let result = self.api.create_goal(input).await;
        let goal = self.report(result, "Failed to create goal")?;
        if self.attached() {
            tracing::info!(goal_id = goal.id, "goal created");
            self.store.insert_goal(goal.clone());
            self.notifier.success("Goal created successfully");
        }
        Ok(goal)
    }

    pub async fn update_goal(&mut self, id: i64, changes: &GoalChanges) -> Result<Goal, AppError> {
        if changes.is_empty() {
            return Err(AppError::InvalidInput("no changes provided".to_string()));
        }
        if let Some(title) = changes.title.as_deref() {
            require_non_empty("goal title", title)?;
        }
        if let Some(category) = changes.category.as_deref() {
            require_non_empty("goal category", category)?;
        }
        let result = self
            .api
            .update_goal(id, changes)
            .await
            .map_err(|err| not_found_as(err, GOAL_NOT_FOUND));
        let goal = self.report(result, "Failed to update goal")?;
        if self.attached() {
            tracing::info!(goal_id = id, "goal updated");
            self.store.insert_goal(goal.clone());
            self.notifier.success("Goal updated successfully");
        }
        Ok(goal)
    }

    pub async fn update_goal_status(
        &mut self,
        id: i64,
        status: GoalStatus,
    ) -> Result<Goal, AppError> {
        let result = self
            .api
            .update_goal_status(id, status)
            .await
            .map_err(|err| not_found_as(err, GOAL_NOT_FOUND));
        let goal = self.report(result, "Failed to update status")?;
        if self.attached() {
            tracing::info!(goal_id = id, status = status.as_str(), "goal status updated");
            self.store.insert_goal(goal.clone());
            self.notifier.success("Status updated successfully");
        }
        Ok(goal)
    }

    pub async fn delete_goal(&mut self, id: i64) -> Result<(), AppError> {
        let result = self
            .api
            .delete_goal(id)
            .await
            .map_err(|err| not_found_as(err, GOAL_NOT_FOUND));
        self.report(result, "Failed to delete goal")?;
        if self.attached() {
            tracing::info!(goal_id = id, "goal deleted");
            self.store.remove_goal(id);
            self.notifier.success("Goal deleted successfully");
        }
        Ok(())
    }

    pub async fn goal_stats(&mut self) -> Result<GoalStats, AppError> {
        let result = self.api.goal_stats().await;
        self.report(result, "Failed to fetch goal statistics")
    }

    pub async fn roadmap_for_goal(&mut self, goal_id: i64) -> Result<Roadmap, AppError> {
        let result = self
            .api
            .roadmap_for_goal(goal_id)
            .await
            .map_err(|err| not_found_as(err, NO_ROADMAP));
        let roadmap = self.report(result, "Failed to fetch roadmap")?;
        if self.attached() {
            self.store.put_roadmap(roadmap.clone());
        }
        Ok(roadmap)
    }

    /// Reloads the goal's roadmap from the API. A goal that no longer has
    /// one yields `None` and its cached roadmap is dropped.
    pub async fn refresh_roadmap(&mut self, goal_id: i64) -> Result<Option<Roadmap>, AppError> {
        match self.api.roadmap_for_goal(goal_id).await {
            Ok(roadmap) => {
                if self.attached() {
                    self.store.put_roadmap(roadmap.clone());
                }
                Ok(Some(roadmap))
            }
            Err(err) if err.is_not_found() => {
                if self.attached() {
                    if let Some(roadmap_id) = self.store.roadmap_for_goal(goal_id).map(|r| r.id) {
                        self.store.remove_roadmap(roadmap_id);
                    }
                }
                Ok(None)
            }
            Err(err) => self.report(Err(err), "Failed to fetch roadmap"),
        }
    }

    pub async fn create_roadmap(
        &mut self,
        goal_id: i64,
        input: &RoadmapInput,
    ) -> Result<(Roadmap, SyncOutcome), AppError> {
        require_non_empty("roadmap title", &input.title)?;
        for step in &input.steps {
            require_non_empty("step title", &step.title)?;
        }
        let result = self.load_goal(goal_id).await;
        self.report(result, "Failed to create roadmap")?;

        let result = self
            .api
            .create_roadmap(goal_id, input)
            .await
            .map_err(|err| not_found_as(err, GOAL_NOT_FOUND));
        let roadmap = self.report(result, "Failed to create roadmap")?;
        if !self.attached() {
            return Ok((roadmap, SyncOutcome::Skipped));
        }
        tracing::info!(goal_id, roadmap_id = roadmap.id, steps = roadmap.steps.len(), "roadmap created");
        self.store.put_roadmap(roadmap.clone());
        self.notifier.success("Roadmap created successfully");
        let outcome = if roadmap.steps.is_empty() {
            SyncOutcome::Skipped
        } else {
            self.sync(goal_id).await
        };
        Ok((roadmap, outcome))
    }

    pub async fn update_roadmap(
        &mut self,
        id: i64,
        changes: &RoadmapChanges,
    ) -> Result<Roadmap, AppError> {
        if changes == &RoadmapChanges::default() {
            return Err(AppError::InvalidInput("no changes provided".to_string()));
        }
        if let Some(title) = changes.title.as_deref() {
            require_non_empty("roadmap title", title)?;
        }
        let result = self
            .api
            .update_roadmap(id, changes)
            .await
            .map_err(|err| not_found_as(err, ROADMAP_NOT_FOUND));
        let roadmap = self.report(result, "Failed to update roadmap")?;
        if self.attached() {
            tracing::info!(roadmap_id = id, "roadmap updated");
            self.store.replace_roadmap_fields(roadmap.clone());
            self.notifier.success("Roadmap updated successfully");
        }
        Ok(roadmap)
    }

    /// Removes the roadmap and its steps; the goal stays and its status is
    /// not re-evaluated.
    pub async fn delete_roadmap(&mut self, id: i64) -> Result<(), AppError> {
        let result = self
            .api
            .delete_roadmap(id)
            .await
            .map_err(|err| not_found_as(err, ROADMAP_NOT_FOUND));
        self.report(result, "Failed to delete roadmap")?;
        if self.attached() {
            tracing::info!(roadmap_id = id, "roadmap deleted");
            self.store.remove_roadmap(id);
            self.notifier.success("Roadmap deleted successfully");
        }
        Ok(())
    }

    pub async fn create_step(
        &mut self,
        roadmap_id: i64,
        input: &StepInput,
    ) -> Result<(Step, SyncOutcome), AppError> {
        require_non_empty("step title", &input.title)?;
        if input.order_index.is_some_and(|index| index < 0) {
            return Err(AppError::InvalidInput(
                "order index cannot be negative".to_string(),
            ));
        }
        let result = self.load_roadmap(roadmap_id).await;
        self.report(result, "Failed to add step")?;

        let mut input = input.clone();
        if input.order_index.is_none() {
            let next = match self.store.roadmap(roadmap_id) {
                Some(roadmap) => roadmap.next_order_index()?,
                None => 0,
            };
            input.order_index = Some(next);
        }
        let result = self.api.create_step(roadmap_id, &input).await;
        let step = self.report(result, "Failed to add step")?;
        let outcome = self.apply_step(step.clone(), "Step added successfully", true).await;
        Ok((step, outcome))
    }

    pub async fn update_step(
        &mut self,
        id: i64,
        changes: &StepChanges,
    ) -> Result<(Step, SyncOutcome), AppError> {
        if changes == &StepChanges::default() {
            return Err(AppError::InvalidInput("no changes provided".to_string()));
        }
        if let Some(title) = changes.title.as_deref() {
            require_non_empty("step title", title)?;
        }
        if changes.order_index.is_some_and(|index| index < 0) {
            return Err(AppError::InvalidInput(
                "order index cannot be negative".to_string(),
            ));
        }
        let result = self.load_step(id).await;
        self.report(result, "Failed to update step")?;

        let result = self
            .api
            .update_step(id, changes)
            .await
            .map_err(|err| not_found_as(err, STEP_NOT_FOUND));
        let step = self.report(result, "Failed to update step")?;
        let outcome = self
            .apply_step(
                step.clone(),
                "Step updated successfully",
                changes.touches_completion(),
            )
            .await;
        Ok((step, outcome))
    }

    pub async fn toggle_step(&mut self, id: i64) -> Result<(Step, SyncOutcome), AppError> {
        let result = self.load_step(id).await;
        self.report(result, "Failed to update step")?;

        let result = self
            .api
            .toggle_step(id)
            .await
            .map_err(|err| not_found_as(err, STEP_NOT_FOUND));
        let step = self.report(result, "Failed to update step")?;
        let message = if step.is_completed {
            "Step marked as completed"
        } else {
            "Step marked as incomplete"
        };
        let outcome = self.apply_step(step.clone(), message, true).await;
        Ok((step, outcome))
    }

    /// Deletes the step without re-indexing its siblings.
    pub async fn delete_step(&mut self, id: i64) -> Result<SyncOutcome, AppError> {
        let result = self.load_step(id).await;
        self.report(result, "Failed to delete step")?;

        let result = self
            .api
            .delete_step(id)
            .await
            .map_err(|err| not_found_as(err, STEP_NOT_FOUND));
        self.report(result, "Failed to delete step")?;
        if !self.attached() {
            return Ok(SyncOutcome::Skipped);
        }
        tracing::info!(step_id = id, "step deleted");
        let removed = self.store.remove_step(id);
        self.notifier.success("Step deleted successfully");
        match removed {
            Some((goal_id, _)) => Ok(self.sync(goal_id).await),
            None => Ok(SyncOutcome::Skipped),
        }
    }

    pub async fn reorder_steps(
        &mut self,
        roadmap_id: i64,
        orders: &[StepOrder],
    ) -> Result<(), AppError> {
        if orders.is_empty() {
            return Err(AppError::InvalidInput("no step orders provided".to_string()));
        }
        if orders.iter().any(|order| order.order_index < 0) {
            return Err(AppError::InvalidInput(
                "order index cannot be negative".to_string(),
            ));
        }
        let result = self.load_roadmap(roadmap_id).await;
        self.report(result, "Failed to reorder steps")?;

        let result = self.api.reorder_steps(roadmap_id, orders).await;
        self.report(result, "Failed to reorder steps")?;
        if self.attached() {
            let pairs: Vec<(i64, i32)> = orders
                .iter()
                .map(|order| (order.id, order.order_index))
                .collect();
            self.store.reorder_steps(roadmap_id, &pairs);
            self.notifier.success("Steps reordered successfully");
        }
        Ok(())
    }

    async fn apply_step(&mut self, step: Step, message: &str, resync: bool) -> SyncOutcome {
        if !self.attached() {
            return SyncOutcome::Skipped;
        }
        let step_id = step.id;
        let owner = self.store.upsert_step(step);
        tracing::info!(step_id, "step saved");
        self.notifier.success(message);
        match owner {
            Some(goal_id) if resync => self.sync(goal_id).await,
            _ => SyncOutcome::Skipped,
        }
    }

    async fn sync(&mut self, goal_id: i64) -> SyncOutcome {
        sync_status(
            &self.api,
            &mut self.store,
            &self.notifier,
            &self.liveness,
            goal_id,
        )
        .await
    }

    async fn load_goal(&mut self, goal_id: i64) -> Result<(), AppError> {
        if self.store.goal(goal_id).is_some() {
            return Ok(());
        }
        let goal = self
            .api
            .get_goal(goal_id)
            .await
            .map_err(|err| not_found_as(err, GOAL_NOT_FOUND))?;
        if self.attached() {
            self.store.insert_goal(goal);
        }
        Ok(())
    }

    /// Makes sure the roadmap and its goal are cached; returns the goal id.
    async fn load_roadmap(&mut self, roadmap_id: i64) -> Result<i64, AppError> {
        let goal_id = match self.store.roadmap(roadmap_id) {
            Some(roadmap) => roadmap.goal_id,
            None => {
                let roadmap = self
                    .api
                    .get_roadmap(roadmap_id)
                    .await
                    .map_err(|err| not_found_as(err, ROADMAP_NOT_FOUND))?;
                let goal_id = roadmap.goal_id;
                if self.attached() {
                    self.store.put_roadmap(roadmap);
                }
                goal_id
            }
        };
        self.load_goal(goal_id).await?;
        Ok(goal_id)
    }

    async fn load_step(&mut self, step_id: i64) -> Result<i64, AppError> {
        if let Some((goal_id, _)) = self.store.locate_step(step_id) {
            self.load_goal(goal_id).await?;
            return Ok(goal_id);
        }
        let step = self
            .api
            .get_step(step_id)
            .await
            .map_err(|err| not_found_as(err, STEP_NOT_FOUND))?;
        self.load_roadmap(step.roadmap_id).await
    }

    fn attached(&self) -> bool {
        self.liveness.is_attached()
    }

    fn report<T>(&self, result: Result<T, AppError>, fallback: &str) -> Result<T, AppError> {
        if let Err(err) = &result {
            tracing::debug!(error = %err, status = ?err.status(), "{fallback}");
            if self.attached() {
                self.notifier.error(failure_message(err, fallback));
            }
        }
        result
    }
}

fn not_found_as(err: AppError, message: &str) -> AppError {
    if err.is_not_found() {
        AppError::NotFound(message.to_string())
    } else {
        err
    }
}

fn require_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::api::local::tests::{goal_input, setup_api, step_input};
    use crate::api::LocalApi;
    use crate::notify::{NoticeKind, RecordingNotifier};
    use tempfile::TempDir;

    /// Local backend that records calls and fails the ones it is told to.
    struct FlakyApi {
        inner: LocalApi,
        calls: RefCell<Vec<&'static str>>,
        failing: RefCell<Vec<&'static str>>,
    }

    impl FlakyApi {
        fn new(inner: LocalApi) -> Self {
            Self {
                inner,
                calls: RefCell::new(Vec::new()),
                failing: RefCell::new(Vec::new()),
            }
        }

        fn fail(&self, name: &'static str) {
            self.failing.borrow_mut().push(name);
        }

        fn calls_to(&self, name: &str) -> usize {
            self.calls.borrow().iter().filter(|call| **call == name).count()
        }

        fn reset_calls(&self) {
            self.calls.borrow_mut().clear();
        }

        fn enter(&self, name: &'static str) -> Result<(), AppError> {
            self.calls.borrow_mut().push(name);
            if self.failing.borrow().contains(&name) {
                return Err(AppError::Request {
                    message: format!("{name} unavailable"),
                    status: Some(503),
                    details: None,
                });
            }
            Ok(())
        }
    }

    impl GoalApi for FlakyApi {
        async fn list_goals(&self, filters: &GoalFilters) -> Result<GoalPage, AppError> {
            self.enter("list_goals")?;
            self.inner.list_goals(filters).await
        }
        async fn get_goal(&self, id: i64) -> Result<Goal, AppError> {
            self.enter("get_goal")?;
            self.inner.get_goal(id).await
        }
        async fn create_goal(&self, input: &GoalInput) -> Result<Goal, AppError> {
            self.enter("create_goal")?;
            self.inner.create_goal(input).await
        }
        async fn update_goal(&self, id: i64, changes: &GoalChanges) -> Result<Goal, AppError> {
            self.enter("update_goal")?;
            self.inner.update_goal(id, changes).await
        }
        async fn update_goal_status(&self, id: i64, status: GoalStatus) -> Result<Goal, AppError> {
            self.enter("update_goal_status")?;
            self.inner.update_goal_status(id, status).await
        }
        async fn delete_goal(&self, id: i64) -> Result<(), AppError> {
            self.enter("delete_goal")?;
            self.inner.delete_goal(id).await
        }
        async fn goal_stats(&self) -> Result<GoalStats, AppError> {
            self.enter("goal_stats")?;
            self.inner.goal_stats().await
        }
        async fn roadmap_for_goal(&self, goal_id: i64) -> Result<Roadmap, AppError> {
            self.enter("roadmap_for_goal")?;
            self.inner.roadmap_for_goal(goal_id).await
        }
        async fn get_roadmap(&self, id: i64) -> Result<Roadmap, AppError> {
            self.enter("get_roadmap")?;
            self.inner.get_roadmap(id).await
        }
        async fn create_roadmap(
            &self,
            goal_id: i64,
            input: &RoadmapInput,
        ) -> Result<Roadmap, AppError> {
            self.enter("create_roadmap")?;
            self.inner.create_roadmap(goal_id, input).await
        }
        async fn update_roadmap(
            &self,
            id: i64,
            changes: &RoadmapChanges,
        ) -> Result<Roadmap, AppError> {
            self.enter("update_roadmap")?;
            self.inner.update_roadmap(id, changes).await
        }
        async fn delete_roadmap(&self, id: i64) -> Result<(), AppError> {
            self.enter("delete_roadmap")?;
            self.inner.delete_roadmap(id).await
        }
        async fn get_step(&self, id: i64) -> Result<Step, AppError> {
            self.enter("get_step")?;
            self.inner.get_step(id).await
        }
        async fn create_step(&self, roadmap_id: i64, input: &StepInput) -> Result<Step, AppError> {
            self.enter("create_step")?;
            self.inner.create_step(roadmap_id, input).await
        }
        async fn update_step(&self, id: i64, changes: &StepChanges) -> Result<Step, AppError> {
            self.enter("update_step")?;
            self.inner.update_step(id, changes).await
        }
        async fn toggle_step(&self, id: i64) -> Result<Step, AppError> {
            self.enter("toggle_step")?;
            self.inner.toggle_step(id).await
        }
        async fn delete_step(&self, id: i64) -> Result<(), AppError> {
            self.enter("delete_step")?;
            self.inner.delete_step(id).await
        }
        async fn reorder_steps(
            &self,
            roadmap_id: i64,
            orders: &[StepOrder],
        ) -> Result<(), AppError> {
            self.enter("reorder_steps")?;
            self.inner.reorder_steps(roadmap_id, orders).await
        }
    }

    type TestOrchestrator = Orchestrator<FlakyApi, RecordingNotifier>;

    async fn setup() -> (TempDir, TestOrchestrator) {
        let (dir, api) = setup_api().await;
        let orchestrator = Orchestrator::new(FlakyApi::new(api), RecordingNotifier::default());
        (dir, orchestrator)
    }

    async fn goal_with_roadmap(
        orchestrator: &mut TestOrchestrator,
        steps: &[&str],
    ) -> (Goal, Roadmap) {
        let goal = orchestrator
            .create_goal(&goal_input("Learn Rust", "learning"))
            .await
            .expect("create goal");
        let (roadmap, _) = orchestrator
            .create_roadmap(
                goal.id,
                &RoadmapInput {
                    title: "Path".to_string(),
                    description: None,
                    steps: steps.iter().map(|title| step_input(title)).collect(),
                },
            )
            .await
            .expect("create roadmap");
        orchestrator.api().reset_calls();
        orchestrator.notifier().clear();
        (goal, roadmap)
    }

    fn cached_status(orchestrator: &TestOrchestrator, goal_id: i64) -> GoalStatus {
        orchestrator.store().goal(goal_id).expect("cached goal").status
    }

    #[tokio::test]
    async fn toggling_every_step_completes_goal_and_untoggling_reverts_it() {
        let (_dir, mut orchestrator) = setup().await;
        let (goal, roadmap) = goal_with_roadmap(&mut orchestrator, &["Read", "Write"]).await;

        let (step, outcome) = orchestrator
            .toggle_step(roadmap.steps[0].id)
            .await
            .expect("toggle first");
        assert!(step.is_completed);
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(cached_status(&orchestrator, goal.id), GoalStatus::InProgress);
        assert_eq!(orchestrator.api().calls_to("update_goal_status"), 0);

        let (_, outcome) = orchestrator
            .toggle_step(roadmap.steps[1].id)
            .await
            .expect("toggle second");
        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                from: GoalStatus::InProgress,
                to: GoalStatus::Completed,
            }
        );
        assert_eq!(cached_status(&orchestrator, goal.id), GoalStatus::Completed);
        assert_eq!(orchestrator.api().calls_to("update_goal_status"), 1);
        let server = orchestrator.api().inner.get_goal(goal.id).await.expect("goal");
        assert_eq!(server.status, GoalStatus::Completed);
        assert!(orchestrator
            .notifier()
            .messages(NoticeKind::Success)
            .contains(&"Goal marked as completed!".to_string()));

        let (_, outcome) = orchestrator
            .toggle_step(roadmap.steps[1].id)
            .await
            .expect("untoggle");
        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                from: GoalStatus::Completed,
                to: GoalStatus::InProgress,
            }
        );
        assert_eq!(cached_status(&orchestrator, goal.id), GoalStatus::InProgress);
        assert_eq!(orchestrator.api().calls_to("update_goal_status"), 2);
    }

    #[tokio::test]
    async fn deleting_the_only_step_keeps_completed_status() {
        let (_dir, mut orchestrator) = setup().await;
        let (goal, roadmap) = goal_with_roadmap(&mut orchestrator, &["Only"]).await;
        let step_id = roadmap.steps[0].id;

        orchestrator.toggle_step(step_id).await.expect("toggle");
        assert_eq!(cached_status(&orchestrator, goal.id), GoalStatus::Completed);
        orchestrator.api().reset_calls();

        let outcome = orchestrator.delete_step(step_id).await.expect("delete");
        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(cached_status(&orchestrator, goal.id), GoalStatus::Completed);
        assert_eq!(orchestrator.api().calls_to("update_goal_status"), 0);
        assert!(orchestrator
            .store()
            .roadmap_for_goal(goal.id)
            .expect("roadmap")
            .steps
            .is_empty());
    }

    #[tokio::test]
    async fn failed_status_sync_leaves_cached_goal_untouched() {
        let (_dir, mut orchestrator) = setup().await;
        let (goal, roadmap) = goal_with_roadmap(&mut orchestrator, &["Only"]).await;
        orchestrator.api().fail("update_goal_status");

        let (step, outcome) = orchestrator
            .toggle_step(roadmap.steps[0].id)
            .await
            .expect("toggle succeeds even when sync fails");
        assert!(step.is_completed);
        assert_eq!(
            outcome,
            SyncOutcome::Failed("update_goal_status unavailable".to_string())
        );
        assert_eq!(cached_status(&orchestrator, goal.id), GoalStatus::InProgress);
        assert!(orchestrator
            .store()
            .locate_step(step.id)
            .is_some_and(|(_, cached)| cached.is_completed));
        assert_eq!(
            orchestrator.notifier().messages(NoticeKind::Error),
            vec!["update_goal_status unavailable".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_update_keeps_store_and_reports_error() {
        let (_dir, mut orchestrator) = setup().await;
        let goal = orchestrator
            .create_goal(&goal_input("Original", "general"))
            .await
            .expect("create");
        let before = orchestrator.store().clone();
        orchestrator.notifier().clear();
        orchestrator.api().fail("update_goal");

        let err = orchestrator
            .update_goal(
                goal.id,
                &GoalChanges {
                    title: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(orchestrator.store(), &before);
        assert_eq!(
            orchestrator.notifier().messages(NoticeKind::Error),
            vec!["update_goal unavailable".to_string()]
        );
        assert!(orchestrator.notifier().messages(NoticeKind::Success).is_empty());
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_api() {
        let (_dir, mut orchestrator) = setup().await;
        let err = orchestrator
            .create_goal(&goal_input("   ", "general"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let filters = GoalFilters {
            page: Some(0),
            ..Default::default()
        };
        assert!(orchestrator.list_goals(&filters).await.is_err());
        assert!(orchestrator
            .update_step(1, &StepChanges::default())
            .await
            .is_err());
        assert!(orchestrator.api().calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn fresh_orchestrator_loads_missing_entities_on_demand() {
        let (_dir, api) = setup_api().await;
        let goal = api
            .create_goal(&goal_input("Cold start", "general"))
            .await
            .expect("goal");
        let roadmap = api
            .create_roadmap(
                goal.id,
                &RoadmapInput {
                    title: "Plan".to_string(),
                    description: None,
                    steps: vec![step_input("Only")],
                },
            )
            .await
            .expect("roadmap");

        let mut orchestrator = Orchestrator::new(FlakyApi::new(api), RecordingNotifier::default());
        let (_, outcome) = orchestrator
            .toggle_step(roadmap.steps[0].id)
            .await
            .expect("toggle");
        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                from: GoalStatus::InProgress,
                to: GoalStatus::Completed,
            }
        );
        assert_eq!(orchestrator.api().calls_to("get_step"), 1);
        assert_eq!(orchestrator.api().calls_to("get_roadmap"), 1);
        assert_eq!(orchestrator.api().calls_to("get_goal"), 1);
    }

    #[tokio::test]
    async fn not_found_is_reported_distinctly() {
        let (_dir, mut orchestrator) = setup().await;
        let goal = orchestrator
            .create_goal(&goal_input("No roadmap yet", "general"))
            .await
            .expect("create");

        let err = orchestrator.roadmap_for_goal(goal.id).await.unwrap_err();
        assert_eq!(err.user_message(), "No roadmap for this goal");
        let err = orchestrator.toggle_step(9999).await.unwrap_err();
        assert_eq!(err.user_message(), "Step not found");
        let err = orchestrator.get_goal(9999).await.unwrap_err();
        assert_eq!(err.user_message(), "Goal not found");
        assert_eq!(orchestrator.refresh_roadmap(goal.id).await.expect("refresh"), None);
    }

    #[tokio::test]
    async fn detached_orchestrator_returns_results_without_applying_them() {
        let (_dir, mut orchestrator) = setup().await;
        orchestrator.liveness().detach();
        let goal = orchestrator
            .create_goal(&goal_input("Late reply", "general"))
            .await
            .expect("create");
        assert!(goal.id > 0);
        assert!(orchestrator.store().goals().is_empty());
        assert!(orchestrator.notifier().notices().is_empty());
    }

    #[tokio::test]
    async fn roadmap_created_with_finished_steps_completes_goal() {
        let (_dir, mut orchestrator) = setup().await;
        let goal = orchestrator
            .create_goal(&goal_input("Imported", "general"))
            .await
            .expect("create");
        let mut done = step_input("Already done");
        done.is_completed = true;
        let (_, outcome) = orchestrator
            .create_roadmap(
                goal.id,
                &RoadmapInput {
                    title: "Imported plan".to_string(),
                    description: None,
                    steps: vec![done],
                },
            )
            .await
            .expect("roadmap");
        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                from: GoalStatus::InProgress,
                to: GoalStatus::Completed,
            }
        );
    }

    #[tokio::test]
    async fn title_only_step_edits_do_not_sync() {
        let (_dir, mut orchestrator) = setup().await;
        let (goal, roadmap) = goal_with_roadmap(&mut orchestrator, &["A", "B"]).await;
        orchestrator
            .update_goal_status(goal.id, GoalStatus::Completed)
            .await
            .expect("status");
        orchestrator.api().reset_calls();

        let (step, outcome) = orchestrator
            .update_step(
                roadmap.steps[0].id,
                &StepChanges {
                    title: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("rename");
        assert_eq!(step.title, "Renamed");
        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(orchestrator.api().calls_to("update_goal_status"), 0);
        assert_eq!(cached_status(&orchestrator, goal.id), GoalStatus::Completed);

        let (_, outcome) = orchestrator
            .update_step(
                roadmap.steps[0].id,
                &StepChanges {
                    is_completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .expect("complete");
        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                from: GoalStatus::Completed,
                to: GoalStatus::InProgress,
            }
        );
    }

    #[tokio::test]
    async fn new_steps_append_and_reorder_updates_cache() {
        let (_dir, mut orchestrator) = setup().await;
        let (goal, roadmap) = goal_with_roadmap(&mut orchestrator, &["A", "B"]).await;

        let (step, outcome) = orchestrator
            .create_step(roadmap.id, &step_input("C"))
            .await
            .expect("create step");
        assert_eq!(step.order_index, 2);
        assert_eq!(outcome, SyncOutcome::Unchanged);

        orchestrator
            .reorder_steps(
                roadmap.id,
                &[
                    StepOrder {
                        id: step.id,
                        order_index: 0,
                    },
                    StepOrder {
                        id: roadmap.steps[0].id,
                        order_index: 2,
                    },
                ],
            )
            .await
            .expect("reorder");
        let cached = orchestrator.store().roadmap_for_goal(goal.id).expect("roadmap");
        let titles: Vec<&str> = cached.steps.iter().map(|step| step.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn step_added_after_delete_takes_a_fresh_index() {
        let (_dir, mut orchestrator) = setup().await;
        let (goal, roadmap) = goal_with_roadmap(&mut orchestrator, &["A", "B", "C"]).await;
        orchestrator
            .delete_step(roadmap.steps[0].id)
            .await
            .expect("delete A");

        let (step, _) = orchestrator
            .create_step(roadmap.id, &step_input("D"))
            .await
            .expect("create D");
        assert_eq!(step.order_index, 3);

        let cached = orchestrator.store().roadmap_for_goal(goal.id).expect("roadmap");
        let orders: Vec<i32> = cached.steps.iter().map(|step| step.order_index).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn deleting_goal_clears_cached_roadmap() {
        let (_dir, mut orchestrator) = setup().await;
        let (goal, _) = goal_with_roadmap(&mut orchestrator, &["A"]).await;
        orchestrator.delete_goal(goal.id).await.expect("delete");
        assert!(orchestrator.store().goal(goal.id).is_none());
        assert!(orchestrator.store().roadmap_for_goal(goal.id).is_none());
        assert_eq!(
            orchestrator.notifier().messages(NoticeKind::Success),
            vec!["Goal deleted successfully".to_string()]
        );
    }

    #[tokio::test]
    async fn listing_replaces_cached_goals_and_projection_narrows_them() {
        let (_dir, mut orchestrator) = setup().await;
        orchestrator
            .create_goal(&goal_input("Swim", "fitness"))
            .await
            .expect("create");
        orchestrator
            .create_goal(&goal_input("Read", "learning"))
            .await
            .expect("create");
        let page = orchestrator
            .list_goals(&GoalFilters::default())
            .await
            .expect("list");
        assert_eq!(page.total, 2);
        assert_eq!(orchestrator.store().goals().len(), 2);
        let visible = orchestrator.visible_goals(&GoalFilters {
            category: Some("FIT".to_string()),
            ..Default::default()
        });
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Swim");
    }
}
