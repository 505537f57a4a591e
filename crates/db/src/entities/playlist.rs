//! Playlist entity - an ordered collection of videos curated by a user.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::IdList;
use crate::store::{CollectionName, Document};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "playlist")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// User who created the playlist.
    pub owner_id: String,

    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Video IDs in display order; no duplicates.
    #[sea_orm(column_type = "JsonBinary")]
    pub videos: IdList,

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
    const COLLECTION: CollectionName = CollectionName::Playlists;

    fn id(&self) -> &str {
        &self.id
    }

    fn stamp_created(&mut self, now: DateTimeWithTimeZone) {
        self.created_at = now;
        self.updated_at = now;
    }
}
