use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::Condition;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::api::{filter_text, page_window, GoalApi};
use crate::entities::{goal, roadmap, step};
use crate::error::AppError;
use crate::model::{
    next_order_index, Goal, GoalChanges, GoalFilters, GoalInput, GoalPage, GoalPriority,
    GoalStats, GoalStatus, Roadmap, RoadmapChanges, RoadmapInput, Step, StepChanges, StepInput,
    StepOrder,
};
use crate::progress::steps_progress;

const TITLE_MAX_CHARS: usize = 200;
const CATEGORY_MAX_CHARS: usize = 50;

/// Embedded backend: the goal tracker's REST semantics over a SQLite file.
pub struct LocalApi {
    db: DatabaseConnection,
}

impl LocalApi {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_goal<C: ConnectionTrait>(&self, db: &C, id: i64) -> Result<goal::Model, AppError> {
        goal::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("goal id {id}")))
    }

    async fn find_roadmap<C: ConnectionTrait>(
        &self,
        db: &C,
        id: i64,
    ) -> Result<roadmap::Model, AppError> {
        roadmap::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("roadmap id {id}")))
    }

    async fn find_step<C: ConnectionTrait>(&self, db: &C, id: i64) -> Result<step::Model, AppError> {
        step::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("step id {id}")))
    }

    async fn steps_for_roadmap<C: ConnectionTrait>(
        &self,
        db: &C,
        roadmap_id: i64,
    ) -> Result<Vec<step::Model>, AppError> {
        Ok(step::Entity::find()
            .filter(step::Column::RoadmapId.eq(roadmap_id))
            .order_by_asc(step::Column::OrderIndex)
            .order_by_asc(step::Column::Id)
            .all(db)
            .await?)
    }

    async fn roadmap_with_steps<C: ConnectionTrait>(
        &self,
        db: &C,
        model: roadmap::Model,
    ) -> Result<Roadmap, AppError> {
        let steps = self.steps_for_roadmap(db, model.id).await?;
        Ok(roadmap_from_model(model, steps))
    }

    async fn touch_roadmap_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        roadmap_id: i64,
    ) -> Result<(), AppError> {
        let active = roadmap::ActiveModel {
            id: Set(roadmap_id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        match active.update(db).await {
            Ok(_) => Ok(()),
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::NotFound(format!("roadmap id {roadmap_id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn highest_order_index<C: ConnectionTrait>(
        &self,
        db: &C,
        roadmap_id: i64,
    ) -> Result<Option<i32>, AppError> {
        let highest = step::Entity::find()
            .select_only()
            .column_as(step::Column::OrderIndex.max(), "highest")
            .filter(step::Column::RoadmapId.eq(roadmap_id))
            .into_tuple::<Option<i32>>()
            .one(db)
            .await?;
        Ok(highest.flatten())
    }

    /// Fails when two steps of the roadmap share an `order_index`.
    async fn ensure_distinct_order<C: ConnectionTrait>(
        &self,
        db: &C,
        roadmap_id: i64,
    ) -> Result<(), AppError> {
        let steps = self.steps_for_roadmap(db, roadmap_id).await?;
        if let Some(pair) = steps
            .windows(2)
            .find(|pair| pair[0].order_index == pair[1].order_index)
        {
            return Err(AppError::InvalidInput(format!(
                "order index {} is already used in roadmap id {roadmap_id}",
                pair[1].order_index
            )));
        }
        Ok(())
    }

    async fn count_goals_with_status(&self, status: GoalStatus) -> Result<u64, AppError> {
        Ok(goal::Entity::find()
            .filter(goal::Column::Status.eq(status.as_str()))
            .count(&self.db)
            .await?)
    }
}

impl GoalApi for LocalApi {
    async fn list_goals(&self, filters: &GoalFilters) -> Result<GoalPage, AppError> {
        let (page, page_size) = page_window(filters)?;
        let mut select = goal::Entity::find();
        if let Some(status) = filters.status {
            select = select.filter(goal::Column::Status.eq(status.as_str()));
        }
        if let Some(priority) = filters.priority {
            select = select.filter(goal::Column::Priority.eq(priority.as_str()));
        }
        if let Some(category) = filter_text(&filters.category) {
            select = select.filter(goal::Column::Category.contains(category));
        }
        if let Some(search) = filter_text(&filters.search) {
            select = select.filter(
                Condition::any()
                    .add(goal::Column::Title.contains(search))
                    .add(goal::Column::Description.contains(search))
                    .add(goal::Column::Category.contains(search)),
            );
        }

        let total = select.clone().count(&self.db).await?;
        let models = select
            .order_by_desc(goal::Column::UpdatedAt)
            .order_by_desc(goal::Column::Id)
            .offset((page - 1) * page_size)
            .limit(page_size)
            .all(&self.db)
            .await?;
        let data = models
            .into_iter()
            .map(goal_from_model)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GoalPage {
            data,
            total,
            page,
            page_size,
        })
    }

    async fn get_goal(&self, id: i64) -> Result<Goal, AppError> {
        goal_from_model(self.find_goal(&self.db, id).await?)
    }

    async fn create_goal(&self, input: &GoalInput) -> Result<Goal, AppError> {
        ensure_text("goal title", &input.title, TITLE_MAX_CHARS)?;
        ensure_text("goal category", &input.category, CATEGORY_MAX_CHARS)?;
        let now = Utc::now();
        let active = goal::ActiveModel {
            title: Set(input.title.clone()),
            description: Set(input.description.clone()),
            status: Set(input.status.as_str().to_string()),
            category: Set(input.category.clone()),
            deadline: Set(input.deadline),
            priority: Set(input.priority.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let insert = goal::Entity::insert(active).exec(&self.db).await?;
        let created = goal::Entity::find_by_id(insert.last_insert_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("goal not found after insert".to_string()))?;
        goal_from_model(created)
    }

    async fn update_goal(&self, id: i64, changes: &GoalChanges) -> Result<Goal, AppError> {
        if let Some(title) = changes.title.as_deref() {
            ensure_text("goal title", title, TITLE_MAX_CHARS)?;
        }
        if let Some(category) = changes.category.as_deref() {
            ensure_text("goal category", category, CATEGORY_MAX_CHARS)?;
        }

        let mut active = goal::ActiveModel {
            id: Set(id),
            ..Default::default()
        };
        if let Some(title) = &changes.title {
            active.title = Set(title.clone());
        }
        if let Some(description) = &changes.description {
            active.description = Set(description.clone());
        }
        if let Some(category) = &changes.category {
            active.category = Set(category.clone());
        }
        if let Some(priority) = changes.priority {
            active.priority = Set(priority.as_str().to_string());
        }
        if let Some(status) = changes.status {
            active.status = Set(status.as_str().to_string());
        }
        if let Some(deadline) = changes.deadline {
            active.deadline = Set(deadline);
        }
        active.updated_at = Set(Utc::now());

        match active.update(&self.db).await {
            Ok(model) => goal_from_model(model),
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::NotFound(format!("goal id {id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_goal_status(&self, id: i64, status: GoalStatus) -> Result<Goal, AppError> {
        self.update_goal(
            id,
            &GoalChanges {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    async fn delete_goal(&self, id: i64) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<(), AppError> = async {
            if let Some(existing) = roadmap::Entity::find()
                .filter(roadmap::Column::GoalId.eq(id))
                .one(&txn)
                .await?
            {
                step::Entity::delete_many()
                    .filter(step::Column::RoadmapId.eq(existing.id))
                    .exec(&txn)
                    .await?;
                roadmap::Entity::delete_by_id(existing.id).exec(&txn).await?;
            }
            let result = goal::Entity::delete_by_id(id).exec(&txn).await?;
            if result.rows_affected == 0 {
                return Err(AppError::NotFound(format!("goal id {id}")));
            }
            Ok(())
        }
        .await;

        finalize_transaction(txn, result).await
    }

    async fn goal_stats(&self) -> Result<GoalStats, AppError> {
        Ok(GoalStats {
            total_goals: goal::Entity::find().count(&self.db).await?,
            completed_goals: self.count_goals_with_status(GoalStatus::Completed).await?,
            in_progress_goals: self.count_goals_with_status(GoalStatus::InProgress).await?,
            overdue_goals: self.count_goals_with_status(GoalStatus::Overdue).await?,
        })
    }

    async fn roadmap_for_goal(&self, goal_id: i64) -> Result<Roadmap, AppError> {
        let model = roadmap::Entity::find()
            .filter(roadmap::Column::GoalId.eq(goal_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("roadmap for goal id {goal_id}")))?;
        self.roadmap_with_steps(&self.db, model).await
    }

    async fn get_roadmap(&self, id: i64) -> Result<Roadmap, AppError> {
        let model = self.find_roadmap(&self.db, id).await?;
        self.roadmap_with_steps(&self.db, model).await
    }

    async fn create_roadmap(
        &self,
        goal_id: i64,
        input: &RoadmapInput,
    ) -> Result<Roadmap, AppError> {
        ensure_text("roadmap title", &input.title, TITLE_MAX_CHARS)?;
        for step_input in &input.steps {
            ensure_text("step title", &step_input.title, TITLE_MAX_CHARS)?;
        }

        let txn = self.db.begin().await?;
        let result: Result<Roadmap, AppError> = async {
            self.find_goal(&txn, goal_id).await?;
            let existing = roadmap::Entity::find()
                .filter(roadmap::Column::GoalId.eq(goal_id))
                .count(&txn)
                .await?;
            if existing > 0 {
                return Err(AppError::InvalidInput(format!(
                    "goal id {goal_id} already has a roadmap"
                )));
            }

            let now = Utc::now();
            let active = roadmap::ActiveModel {
                goal_id: Set(goal_id),
                title: Set(input.title.clone()),
                description: Set(input.description.clone()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = roadmap::Entity::insert(active).exec(&txn).await?;
            let model = roadmap::Entity::find_by_id(insert.last_insert_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound("roadmap not found after insert".to_string()))?;

            for (idx, step_input) in input.steps.iter().enumerate() {
                let step_active = step::ActiveModel {
                    roadmap_id: Set(model.id),
                    title: Set(step_input.title.clone()),
                    description: Set(step_input.description.clone()),
                    is_completed: Set(step_input.is_completed),
                    order_index: Set(idx as i32),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                step::Entity::insert(step_active).exec(&txn).await?;
            }

            self.roadmap_with_steps(&txn, model).await
        }
        .await;

        finalize_transaction(txn, result).await
    }

    async fn update_roadmap(
        &self,
        id: i64,
        changes: &RoadmapChanges,
    ) -> Result<Roadmap, AppError> {
        if let Some(title) = changes.title.as_deref() {
            ensure_text("roadmap title", title, TITLE_MAX_CHARS)?;
        }
        let mut active = roadmap::ActiveModel {
            id: Set(id),
            ..Default::default()
        };
        if let Some(title) = &changes.title {
            active.title = Set(title.clone());
        }
        if let Some(description) = &changes.description {
            active.description = Set(Some(description.clone()));
        }
        active.updated_at = Set(Utc::now());

        match active.update(&self.db).await {
            Ok(model) => self.roadmap_with_steps(&self.db, model).await,
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::NotFound(format!("roadmap id {id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_roadmap(&self, id: i64) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<(), AppError> = async {
            step::Entity::delete_many()
                .filter(step::Column::RoadmapId.eq(id))
                .exec(&txn)
                .await?;
            let result = roadmap::Entity::delete_by_id(id).exec(&txn).await?;
            if result.rows_affected == 0 {
                return Err(AppError::NotFound(format!("roadmap id {id}")));
            }
            Ok(())
        }
        .await;

        finalize_transaction(txn, result).await
    }

    async fn get_step(&self, id: i64) -> Result<Step, AppError> {
        Ok(step_from_model(self.find_step(&self.db, id).await?))
    }

    async fn create_step(&self, roadmap_id: i64, input: &StepInput) -> Result<Step, AppError> {
        ensure_text("step title", &input.title, TITLE_MAX_CHARS)?;
        if let Some(order_index) = input.order_index {
            ensure_order_index(order_index)?;
        }

        let txn = self.db.begin().await?;
        let result: Result<Step, AppError> = async {
            self.find_roadmap(&txn, roadmap_id).await?;
            let order_index = match input.order_index {
                Some(order_index) => order_index,
                None => next_order_index(self.highest_order_index(&txn, roadmap_id).await?)?,
            };
            let now = Utc::now();
            let active = step::ActiveModel {
                roadmap_id: Set(roadmap_id),
                title: Set(input.title.clone()),
                description: Set(input.description.clone()),
                is_completed: Set(input.is_completed),
                order_index: Set(order_index),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = step::Entity::insert(active).exec(&txn).await?;
            let model = step::Entity::find_by_id(insert.last_insert_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound("step not found after insert".to_string()))?;
            self.ensure_distinct_order(&txn, roadmap_id).await?;
            self.touch_roadmap_with_conn(&txn, roadmap_id).await?;
            Ok(step_from_model(model))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    async fn update_step(&self, id: i64, changes: &StepChanges) -> Result<Step, AppError> {
        if let Some(title) = changes.title.as_deref() {
            ensure_text("step title", title, TITLE_MAX_CHARS)?;
        }
        if let Some(order_index) = changes.order_index {
            ensure_order_index(order_index)?;
        }

        let txn = self.db.begin().await?;
        let result: Result<Step, AppError> = async {
            let current = self.find_step(&txn, id).await?;
            let roadmap_id = current.roadmap_id;
            let mut active: step::ActiveModel = current.into();
            if let Some(title) = &changes.title {
                active.title = Set(title.clone());
            }
            if let Some(description) = &changes.description {
                active.description = Set(Some(description.clone()));
            }
            if let Some(is_completed) = changes.is_completed {
                active.is_completed = Set(is_completed);
            }
            if let Some(order_index) = changes.order_index {
                active.order_index = Set(order_index);
            }
            active.updated_at = Set(Utc::now());
            let model = active.update(&txn).await?;
            if changes.order_index.is_some() {
                self.ensure_distinct_order(&txn, roadmap_id).await?;
            }
            Ok(step_from_model(model))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    async fn toggle_step(&self, id: i64) -> Result<Step, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<Step, AppError> = async {
            let current = self.find_step(&txn, id).await?;
            let mut active: step::ActiveModel = current.clone().into();
            active.is_completed = Set(!current.is_completed);
            active.updated_at = Set(Utc::now());
            let model = active.update(&txn).await?;
            Ok(step_from_model(model))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    async fn delete_step(&self, id: i64) -> Result<(), AppError> {
        let result = step::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("step id {id}")));
        }
        Ok(())
    }

    async fn reorder_steps(&self, roadmap_id: i64, orders: &[StepOrder]) -> Result<(), AppError> {
        for order in orders {
            ensure_order_index(order.order_index)?;
        }

        let txn = self.db.begin().await?;
        let result: Result<(), AppError> = async {
            self.find_roadmap(&txn, roadmap_id).await?;
            let steps: HashMap<i64, step::Model> = self
                .steps_for_roadmap(&txn, roadmap_id)
                .await?
                .into_iter()
                .map(|model| (model.id, model))
                .collect();
            let now = Utc::now();
            for order in orders {
                let Some(model) = steps.get(&order.id) else {
                    return Err(AppError::NotFound(format!(
                        "step id {} in roadmap id {roadmap_id}",
                        order.id
                    )));
                };
                if model.order_index == order.order_index {
                    continue;
                }
                let mut active: step::ActiveModel = model.clone().into();
                active.order_index = Set(order.order_index);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
            self.ensure_distinct_order(&txn, roadmap_id).await?;
            self.touch_roadmap_with_conn(&txn, roadmap_id).await
        }
        .await;

        finalize_transaction(txn, result).await
    }
}

fn goal_from_model(model: goal::Model) -> Result<Goal, AppError> {
    Ok(Goal {
        id: model.id,
        title: model.title,
        description: model.description,
        status: GoalStatus::parse(&model.status)?,
        category: model.category,
        deadline: model.deadline,
        priority: GoalPriority::parse(&model.priority)?,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn step_from_model(model: step::Model) -> Step {
    Step {
        id: model.id,
        roadmap_id: model.roadmap_id,
        title: model.title,
        description: model.description,
        is_completed: model.is_completed,
        order_index: model.order_index,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn roadmap_from_model(model: roadmap::Model, steps: Vec<step::Model>) -> Roadmap {
    let steps: Vec<Step> = steps.into_iter().map(step_from_model).collect();
    Roadmap {
        id: model.id,
        goal_id: model.goal_id,
        title: model.title,
        description: model.description,
        progress_percentage: f64::from(steps_progress(&steps)),
        steps,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn ensure_text(label: &str, value: &str, max_chars: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    if value.chars().count() > max_chars {
        return Err(AppError::InvalidInput(format!(
            "{label} must be at most {max_chars} characters"
        )));
    }
    Ok(())
}

fn ensure_order_index(order_index: i32) -> Result<(), AppError> {
    if order_index < 0 {
        return Err(AppError::InvalidInput(
            "order index cannot be negative".to_string(),
        ));
    }
    Ok(())
}
