use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{goal, roadmap, step};
use crate::error::AppError;

pub fn resolve_db_path(home: &Path) -> PathBuf {
    home.join("goalforge.db")
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Advisory lock serializing goalforge processes on one database.
pub type DbLock = fd_lock::RwLock<File>;

pub fn open_lock(path: &Path) -> Result<DbLock, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    tracing::debug!(url = %sqlite_url, "connecting to sqlite");
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut goal_stmt = schema.create_table_from_entity(goal::Entity);
    goal_stmt.if_not_exists();
    db.execute(builder.build(&goal_stmt)).await?;

    let mut roadmap_stmt = schema.create_table_from_entity(roadmap::Entity);
    roadmap_stmt.if_not_exists();
    db.execute(builder.build(&roadmap_stmt)).await?;

    let mut step_stmt = schema.create_table_from_entity(step::Entity);
    step_stmt.if_not_exists();
    db.execute(builder.build(&step_stmt)).await?;

    let mut goal_updated_index = Index::create()
        .name("idx_goals_updated")
        .table(goal::Entity)
        .col(goal::Column::UpdatedAt)
        .to_owned();
    goal_updated_index.if_not_exists();
    db.execute(builder.build(&goal_updated_index)).await?;

    let mut roadmap_goal_index = Index::create()
        .name("idx_roadmaps_goal")
        .table(roadmap::Entity)
        .col(roadmap::Column::GoalId)
        .unique()
        .to_owned();
    roadmap_goal_index.if_not_exists();
    db.execute(builder.build(&roadmap_goal_index)).await?;

    let mut step_order_index = Index::create()
        .name("idx_roadmap_steps_order")
        .table(step::Entity)
        .col(step::Column::RoadmapId)
        .col(step::Column::OrderIndex)
        .to_owned();
    step_order_index.if_not_exists();
    db.execute(builder.build(&step_order_index)).await?;

    Ok(())
}
