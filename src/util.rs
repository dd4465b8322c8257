use chrono::{DateTime, Utc};

use crate::model::{Goal, GoalStats, Roadmap};
use crate::progress::{calculate_progress, completed_count};

fn has_text(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_goal_detail(goal: &Goal, roadmap: Option<&Roadmap>) -> String {
    let mut output = String::new();
    output.push_str(&format!("Goal ID: {}\n", goal.id));
    output.push_str(&format!("Title: {}\n", goal.title));
    output.push_str(&format!("Status: {}\n", goal.status.as_str()));
    output.push_str(&format!("Priority: {}\n", goal.priority.as_str()));
    output.push_str(&format!("Category: {}\n", goal.category));
    if let Some(deadline) = goal.deadline {
        output.push_str(&format!("Deadline: {}\n", deadline.format("%Y-%m-%d")));
    }
    if has_text(&goal.description) {
        output.push_str(&format!(
            "Description: {}\n",
            goal.description.as_deref().unwrap_or("")
        ));
    }
    output.push_str(&format!("Created: {}\n", format_datetime(goal.created_at)));
    output.push_str(&format!("Updated: {}\n", format_datetime(goal.updated_at)));
    output.push('\n');
    match roadmap {
        Some(roadmap) => output.push_str(&format_roadmap_detail(roadmap)),
        None => output.push_str("Roadmap: (none)"),
    }
    output.trim_end().to_string()
}

pub fn format_roadmap_detail(roadmap: &Roadmap) -> String {
    let mut output = String::new();
    output.push_str(&format!("Roadmap ID: {}\n", roadmap.id));
    output.push_str(&format!("Roadmap: {}\n", roadmap.title));
    if has_text(&roadmap.description) {
        output.push_str(&format!(
            "Description: {}\n",
            roadmap.description.as_deref().unwrap_or("")
        ));
    }
    output.push_str(&format!(
        "Progress: {}% ({}/{} steps)\n",
        calculate_progress(roadmap),
        completed_count(&roadmap.steps),
        roadmap.steps.len()
    ));
    if roadmap.steps.is_empty() {
        output.push_str("Steps: (none)");
        return output;
    }
    output.push_str("Steps:\n");
    for (idx, step) in roadmap.steps.iter().enumerate() {
        let mark = if step.is_completed { "x" } else { " " };
        output.push_str(&format!(
            "{}. [{}] {} (step id {})\n",
            idx + 1,
            mark,
            step.title,
            step.id
        ));
        if has_text(&step.description) {
            output.push_str(&format!(
                "   {}\n",
                step.description.as_deref().unwrap_or("")
            ));
        }
    }
    output.trim_end().to_string()
}

pub fn format_goal_list(goals: &[Goal]) -> String {
    let mut output = format!(
        "{:<4} {:<12} {:<7} {:<12} {}\n",
        "ID", "STATUS", "PRIO", "CATEGORY", "TITLE"
    );
    for goal in goals {
        output.push_str(&format!(
            "{:<4} {:<12} {:<7} {:<12} {}\n",
            goal.id,
            goal.status.as_str(),
            goal.priority.as_str(),
            goal.category,
            goal.title
        ));
    }
    output.trim_end().to_string()
}

pub fn format_stats(stats: &GoalStats) -> String {
    format!(
        "Total: {}\nCompleted: {}\nIn progress: {}\nOverdue: {}",
        stats.total_goals, stats.completed_goals, stats.in_progress_goals, stats.overdue_goals
    )
}
