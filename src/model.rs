use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum GoalStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "on-track")]
    OnTrack,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "overdue")]
    Overdue,
    #[serde(rename = "paused")]
    Paused,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::OnTrack => "on-track",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
            Self::Paused => "paused",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "in-progress" => Ok(Self::InProgress),
            "on-track" => Ok(Self::OnTrack),
            "completed" => Ok(Self::Completed),
            "overdue" => Ok(Self::Overdue),
            "paused" => Ok(Self::Paused),
            other => Err(AppError::InvalidInput(format!("unknown goal status: {other}"))),
        }
    }
}

impl Default for GoalStatus {
    fn default() -> Self {
        Self::InProgress
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalPriority {
    Low,
    Medium,
    High,
}

impl GoalPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(AppError::InvalidInput(format!(
                "unknown goal priority: {other}"
            ))),
        }
    }
}

impl Default for GoalPriority {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: GoalStatus,
    pub category: String,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    pub priority: GoalPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub roadmap_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_completed: bool,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roadmap {
    pub id: i64,
    pub goal_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Display cache filled by the server; progress is always recomputed
    /// from `steps` before it is used for decisions.
    #[serde(default)]
    pub progress_percentage: f64,
    #[serde(default)]
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Roadmap {
    pub fn step(&self, step_id: i64) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    /// Sorts steps by `order_index`, breaking ties by id.
    pub fn sort_steps(&mut self) {
        self.steps
            .sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
    }

    /// Index for a step appended after every existing one.
    pub fn next_order_index(&self) -> Result<i32, AppError> {
        next_order_index(self.steps.iter().map(|step| step.order_index).max())
    }
}

/// `0` for an empty roadmap, otherwise one past the highest index.
pub fn next_order_index(highest: Option<i32>) -> Result<i32, AppError> {
    match highest {
        None => Ok(0),
        Some(highest) => highest.checked_add(1).ok_or_else(|| {
            AppError::InvalidInput("no order index left after the last step".to_string())
        }),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoalInput {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    pub priority: GoalPriority,
    pub status: GoalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<GoalPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GoalStatus>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    pub deadline: Option<Option<NaiveDate>>,
}

/// Keeps a present `null` apart from an absent field.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl GoalChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepInput {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    /// Appended after the existing steps when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i32>,
}

impl StepChanges {
    /// Whether applying these changes can move the completion ratio.
    pub fn touches_completion(&self) -> bool {
        self.is_completed.is_some()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StepOrder {
    pub id: i64,
    pub order_index: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoadmapInput {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepInput>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadmapChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GoalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<GoalPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalPage {
    pub data: Vec<Goal>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalStats {
    pub total_goals: u64,
    pub completed_goals: u64,
    pub in_progress_goals: u64,
    pub overdue_goals: u64,
}
