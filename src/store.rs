use std::collections::HashMap;

use crate::model::{Goal, Roadmap, Step};

/// Client-side cache of fetched goals and their roadmaps.
///
/// Goals keep the order the server returned them in; a newly created goal is
/// placed first. Roadmaps are keyed by goal id since a goal owns at most one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityStore {
    goals: Vec<Goal>,
    roadmaps: HashMap<i64, Roadmap>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn goal(&self, id: i64) -> Option<&Goal> {
        self.goals.iter().find(|goal| goal.id == id)
    }

    /// Replaces the goal list with a fresh server listing. Roadmaps of goals
    /// that are no longer listed stay cached.
    pub fn set_goals(&mut self, goals: Vec<Goal>) {
        self.goals = goals;
    }

    pub fn insert_goal(&mut self, goal: Goal) {
        if !self.replace_goal(goal.clone()) {
            self.goals.insert(0, goal);
        }
    }

    /// Returns false when no goal with that id is cached.
    pub fn replace_goal(&mut self, goal: Goal) -> bool {
        match self.goals.iter_mut().find(|item| item.id == goal.id) {
            Some(slot) => {
                *slot = goal;
                true
            }
            None => false,
        }
    }

    /// Removes the goal together with its roadmap and steps.
    pub fn remove_goal(&mut self, id: i64) -> Option<Goal> {
        self.roadmaps.remove(&id);
        let index = self.goals.iter().position(|goal| goal.id == id)?;
        Some(self.goals.remove(index))
    }

    pub fn roadmap_for_goal(&self, goal_id: i64) -> Option<&Roadmap> {
        self.roadmaps.get(&goal_id)
    }

    pub fn roadmap(&self, roadmap_id: i64) -> Option<&Roadmap> {
        self.roadmaps
            .values()
            .find(|roadmap| roadmap.id == roadmap_id)
    }

    pub fn put_roadmap(&mut self, mut roadmap: Roadmap) {
        roadmap.sort_steps();
        self.roadmaps.insert(roadmap.goal_id, roadmap);
    }

    /// Updates roadmap fields while keeping the cached steps when the
    /// incoming copy carries none.
    pub fn replace_roadmap_fields(&mut self, mut roadmap: Roadmap) {
        if roadmap.steps.is_empty() {
            if let Some(existing) = self.roadmaps.get(&roadmap.goal_id) {
                roadmap.steps = existing.steps.clone();
            }
        }
        self.put_roadmap(roadmap);
    }

    pub fn remove_roadmap(&mut self, roadmap_id: i64) -> Option<Roadmap> {
        let goal_id = self.roadmap(roadmap_id)?.goal_id;
        self.roadmaps.remove(&goal_id)
    }

    /// Finds the cached step and the goal whose roadmap holds it.
    pub fn locate_step(&self, step_id: i64) -> Option<(i64, &Step)> {
        self.roadmaps.values().find_map(|roadmap| {
            roadmap
                .step(step_id)
                .map(|step| (roadmap.goal_id, step))
        })
    }

    /// Inserts or replaces a step inside its cached roadmap. Returns the
    /// owning goal id, or `None` if the roadmap is not cached.
    pub fn upsert_step(&mut self, step: Step) -> Option<i64> {
        let roadmap = self
            .roadmaps
            .values_mut()
            .find(|roadmap| roadmap.id == step.roadmap_id)?;
        match roadmap.steps.iter_mut().find(|item| item.id == step.id) {
            Some(slot) => *slot = step,
            None => roadmap.steps.push(step),
        }
        roadmap.sort_steps();
        Some(roadmap.goal_id)
    }

    /// Removes a step from whichever cached roadmap holds it and returns the
    /// owning goal id with the removed step.
    pub fn remove_step(&mut self, step_id: i64) -> Option<(i64, Step)> {
        for roadmap in self.roadmaps.values_mut() {
            if let Some(index) = roadmap.steps.iter().position(|step| step.id == step_id) {
                let step = roadmap.steps.remove(index);
                return Some((roadmap.goal_id, step));
            }
        }
        None
    }

    pub fn reorder_steps(&mut self, roadmap_id: i64, orders: &[(i64, i32)]) -> Option<i64> {
        let roadmap = self
            .roadmaps
            .values_mut()
            .find(|roadmap| roadmap.id == roadmap_id)?;
        for (step_id, order_index) in orders {
            if let Some(step) = roadmap.steps.iter_mut().find(|step| step.id == *step_id) {
                step.order_index = *order_index;
            }
        }
        roadmap.sort_steps();
        Some(roadmap.goal_id)
    }
}
