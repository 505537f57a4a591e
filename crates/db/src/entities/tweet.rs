//! Tweet entity (short text posts on a channel).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::store::{CollectionName, Document};

/// Maximum tweet length in characters.
pub const MAX_CONTENT_CHARS: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tweet")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub owner_id: String,

    #[sea_orm(column_type = "String(StringLen::N(2048))")]
    pub content: String,

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
    const COLLECTION: CollectionName = CollectionName::Tweets;

    fn id(&self) -> &str {
        &self.id
    }

    fn stamp_created(&mut self, now: DateTimeWithTimeZone) {
        self.created_at = now;
        self.updated_at = now;
    }
}
