//! The request surface the orchestrator talks to.
//!
//! Implementations mirror the goal tracker's REST resources: they validate
//! and persist, and reply with the authoritative copy of whatever they
//! touched. Clients never assume a mutation succeeded until the reply
//! arrives.

mod http;
pub(crate) mod local;

pub use http::HttpApi;
pub use local::LocalApi;

use crate::error::AppError;
use crate::model::{
    Goal, GoalChanges, GoalFilters, GoalInput, GoalPage, GoalStats, GoalStatus, Roadmap,
    RoadmapChanges, RoadmapInput, Step, StepChanges, StepInput, StepOrder,
};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[allow(async_fn_in_trait)]
pub trait GoalApi {
    async fn list_goals(&self, filters: &GoalFilters) -> Result<GoalPage, AppError>;
    async fn get_goal(&self, id: i64) -> Result<Goal, AppError>;
    async fn create_goal(&self, input: &GoalInput) -> Result<Goal, AppError>;
    async fn update_goal(&self, id: i64, changes: &GoalChanges) -> Result<Goal, AppError>;
    async fn update_goal_status(&self, id: i64, status: GoalStatus) -> Result<Goal, AppError>;
    async fn delete_goal(&self, id: i64) -> Result<(), AppError>;
    async fn goal_stats(&self) -> Result<GoalStats, AppError>;

    async fn roadmap_for_goal(&self, goal_id: i64) -> Result<Roadmap, AppError>;
    async fn get_roadmap(&self, id: i64) -> Result<Roadmap, AppError>;
    async fn create_roadmap(&self, goal_id: i64, input: &RoadmapInput)
        -> Result<Roadmap, AppError>;
    async fn update_roadmap(&self, id: i64, changes: &RoadmapChanges)
        -> Result<Roadmap, AppError>;
    async fn delete_roadmap(&self, id: i64) -> Result<(), AppError>;

    async fn get_step(&self, id: i64) -> Result<Step, AppError>;
    async fn create_step(&self, roadmap_id: i64, input: &StepInput) -> Result<Step, AppError>;
    async fn update_step(&self, id: i64, changes: &StepChanges) -> Result<Step, AppError>;
    async fn toggle_step(&self, id: i64) -> Result<Step, AppError>;
    async fn delete_step(&self, id: i64) -> Result<(), AppError>;
    async fn reorder_steps(&self, roadmap_id: i64, orders: &[StepOrder]) -> Result<(), AppError>;
}

/// The backend picked at startup.
pub enum Backend {
    Local(LocalApi),
    Remote(HttpApi),
}

macro_rules! delegate {
    ($self:ident, $api:ident => $call:expr) => {
        match $self {
            Backend::Local($api) => $call.await,
            Backend::Remote($api) => $call.await,
        }
    };
}

impl GoalApi for Backend {
    async fn list_goals(&self, filters: &GoalFilters) -> Result<GoalPage, AppError> {
        delegate!(self, api => api.list_goals(filters))
    }

    async fn get_goal(&self, id: i64) -> Result<Goal, AppError> {
        delegate!(self, api => api.get_goal(id))
    }

    async fn create_goal(&self, input: &GoalInput) -> Result<Goal, AppError> {
        delegate!(self, api => api.create_goal(input))
    }

    async fn update_goal(&self, id: i64, changes: &GoalChanges) -> Result<Goal, AppError> {
        delegate!(self, api => api.update_goal(id, changes))
    }

    async fn update_goal_status(&self, id: i64, status: GoalStatus) -> Result<Goal, AppError> {
        delegate!(self, api => api.update_goal_status(id, status))
    }

    async fn delete_goal(&self, id: i64) -> Result<(), AppError> {
        delegate!(self, api => api.delete_goal(id))
    }

    async fn goal_stats(&self) -> Result<GoalStats, AppError> {
        delegate!(self, api => api.goal_stats())
    }

    async fn roadmap_for_goal(&self, goal_id: i64) -> Result<Roadmap, AppError> {
        delegate!(self, api => api.roadmap_for_goal(goal_id))
    }

    async fn get_roadmap(&self, id: i64) -> Result<Roadmap, AppError> {
        delegate!(self, api => api.get_roadmap(id))
    }

    async fn create_roadmap(
        &self,
        goal_id: i64,
        input: &RoadmapInput,
    ) -> Result<Roadmap, AppError> {
        delegate!(self, api => api.create_roadmap(goal_id, input))
    }

    async fn update_roadmap(
        &self,
        id: i64,
        changes: &RoadmapChanges,
    ) -> Result<Roadmap, AppError> {
        delegate!(self, api => api.update_roadmap(id, changes))
    }

    async fn delete_roadmap(&self, id: i64) -> Result<(), AppError> {
        delegate!(self, api => api.delete_roadmap(id))
    }

    async fn get_step(&self, id: i64) -> Result<Step, AppError> {
        delegate!(self, api => api.get_step(id))
    }

    async fn create_step(&self, roadmap_id: i64, input: &StepInput) -> Result<Step, AppError> {
        delegate!(self, api => api.create_step(roadmap_id, input))
    }

    async fn update_step(&self, id: i64, changes: &StepChanges) -> Result<Step, AppError> {
        delegate!(self, api => api.update_step(id, changes))
    }

    async fn toggle_step(&self, id: i64) -> Result<Step, AppError> {
        delegate!(self, api => api.toggle_step(id))
    }

    async fn delete_step(&self, id: i64) -> Result<(), AppError> {
        delegate!(self, api => api.delete_step(id))
    }

    async fn reorder_steps(&self, roadmap_id: i64, orders: &[StepOrder]) -> Result<(), AppError> {
        delegate!(self, api => api.reorder_steps(roadmap_id, orders))
    }
}

/// Resolves the page window, rejecting values the list resource refuses.
pub fn page_window(filters: &GoalFilters) -> Result<(u64, u64), AppError> {
    let page = filters.page.unwrap_or(1);
    let page_size = filters.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page == 0 {
        return Err(AppError::InvalidInput("page starts at 1".to_string()));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(AppError::InvalidInput(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok((page, page_size))
}

/// Non-blank filter text, trimmed.
pub fn filter_text(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}
