use sea_orm::entity::prelude::*;

use super::roadmap;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "roadmap_steps")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub roadmap_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub order_index: i32,
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
            Self::Roadmap => Entity::belongs_to(roadmap::Entity)
                .from(Column::RoadmapId)
                .to(roadmap::Column::Id)
                .into(),
        }
    }
}

impl Related<roadmap::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Roadmap.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
