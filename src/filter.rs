use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::{filter_text, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::model::{Goal, GoalFilters};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Derives the visible goals without touching the source list.
///
/// Text criteria match case-insensitive substrings, enums match exactly, and
/// the input order is kept. Pagination applies only when a page or page size
/// is requested.
pub fn project(goals: &[Goal], filters: &GoalFilters) -> Vec<Goal> {
    let category = filter_text(&filters.category).map(str::to_lowercase);
    let search = filter_text(&filters.search).map(str::to_lowercase);

    let matched = goals.iter().filter(|goal| {
        if filters.status.is_some_and(|status| goal.status != status) {
            return false;
        }
        if filters.priority.is_some_and(|priority| goal.priority != priority) {
            return false;
        }
        if let Some(category) = &category {
            if !goal.category.to_lowercase().contains(category) {
                return false;
            }
        }
        match &search {
            Some(search) => search_matches(goal, search),
            None => true,
        }
    });

    if filters.page.is_none() && filters.page_size.is_none() {
        return matched.cloned().collect();
    }
    let page = filters.page.unwrap_or(1).max(1);
    let page_size = filters
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let skip = (page - 1).saturating_mul(page_size);
    matched
        .skip(usize::try_from(skip).unwrap_or(usize::MAX))
        .take(page_size as usize)
        .cloned()
        .collect()
}

fn search_matches(goal: &Goal, needle: &str) -> bool {
    goal.title.to_lowercase().contains(needle)
        || goal.category.to_lowercase().contains(needle)
        || goal
            .description
            .as_deref()
            .is_some_and(|description| description.to_lowercase().contains(needle))
}

/// Query pairs for the list request. Absent and blank values are omitted.
pub fn query_pairs(filters: &GoalFilters) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(page) = filters.page {
        pairs.push(("page", page.to_string()));
    }
    if let Some(page_size) = filters.page_size {
        pairs.push(("page_size", page_size.to_string()));
    }
    if let Some(category) = filter_text(&filters.category) {
        pairs.push(("category", category.to_string()));
    }
    if let Some(status) = filters.status {
        pairs.push(("status", status.as_str().to_string()));
    }
    if let Some(priority) = filters.priority {
        pairs.push(("priority", priority.as_str().to_string()));
    }
    if let Some(search) = filter_text(&filters.search) {
        pairs.push(("search", search.to_string()));
    }
    pairs
}

/// Coalesces bursts of values and yields the last one once input has been
/// quiet for the configured period.
pub struct Debouncer<T> {
    input: mpsc::Receiver<T>,
    quiet: Duration,
}

impl<T> Debouncer<T> {
    pub fn new(input: mpsc::Receiver<T>, quiet: Duration) -> Self {
        Self { input, quiet }
    }

    /// Waits for the next settled value. A value still pending when the
    /// input closes is flushed; after that `None` is returned.
    pub async fn next(&mut self) -> Option<T> {
        let mut pending = self.input.recv().await?;
        loop {
            match tokio::time::timeout(self.quiet, self.input.recv()).await {
                Ok(Some(value)) => pending = value,
                Ok(None) | Err(_) => return Some(pending),
            }
        }
    }
}
