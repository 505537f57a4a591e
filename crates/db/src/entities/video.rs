//! Video entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::store::{CollectionName, Document};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "video")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The uploading user
    pub owner_id: String,

    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Media store URL of the video file
    pub video_file: String,

    /// Media store URL of the thumbnail
    pub thumbnail: String,

    pub duration_seconds: i64,

    /// View counter; only ever incremented.
    #[sea_orm(default_value = 0)]
    pub views: i64,

    #[sea_orm(default_value = true)]
    pub is_published: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id"
    )]
    Owner,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Document for Model {
    const COLLECTION: CollectionName = CollectionName::Videos;

    fn id(&self) -> &str {
        &self.id
    }

    fn stamp_created(&mut self, now: DateTimeWithTimeZone) {
        self.created_at = now;
        self.updated_at = now;
    }
}
