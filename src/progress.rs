use crate::model::{Roadmap, Step};

/// Completion percentage of a roadmap, `0` when it has no steps.
pub fn calculate_progress(roadmap: &Roadmap) -> u8 {
    steps_progress(&roadmap.steps)
}

/// Rounds half up: 1 of 8 steps (12.5%) reports 13.
pub fn steps_progress(steps: &[Step]) -> u8 {
    let total = steps.len() as u64;
    if total == 0 {
        return 0;
    }
    let done = steps.iter().filter(|step| step.is_completed).count() as u64;
    ((200 * done + total) / (2 * total)) as u8
}

pub fn completed_count(steps: &[Step]) -> usize {
    steps.iter().filter(|step| step.is_completed).count()
}
