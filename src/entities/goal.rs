use sea_orm::entity::prelude::*;

use super::roadmap;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "goals")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub category: String,
    pub deadline: Option<Date>,
    pub priority: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Roadmap,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Roadmap => Entity::has_one(roadmap::Entity).into(),
        }
    }
}

impl Related<roadmap::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Roadmap.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
