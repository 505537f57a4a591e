//! Like entity.
//!
//! A like attaches to exactly one video, comment or tweet. The target is
//! stored as a `(target_type, target_id)` pair so "exactly one" holds by
//! construction.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::store::{CollectionName, Document, UniqueKey};

/// Kind of entity a like points at.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[sea_orm(string_value = "video")]
    Video,
    #[sea_orm(string_value = "comment")]
    Comment,
    #[sea_orm(string_value = "tweet")]
    Tweet,
}

impl TargetType {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Comment => "comment",
            Self::Tweet => "tweet",
        }
    }

    /// Collection holding targets of this type.
    #[must_use]
    pub const fn collection(self) -> CollectionName {
        match self {
            Self::Video => CollectionName::Videos,
            Self::Comment => CollectionName::Comments,
            Self::Tweet => CollectionName::Tweets,
        }
    }
}

/// Target selector: a reference to exactly one likeable entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LikeTarget {
    Video(String),
    Comment(String),
    Tweet(String),
}

impl LikeTarget {
    /// Kind of the target.
    #[must_use]
    pub const fn target_type(&self) -> TargetType {
        match self {
            Self::Video(_) => TargetType::Video,
            Self::Comment(_) => TargetType::Comment,
            Self::Tweet(_) => TargetType::Tweet,
        }
    }

    /// Identifier of the target.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Video(id) | Self::Comment(id) | Self::Tweet(id) => id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "like")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user who liked
    pub liked_by_id: String,

    pub target_type: TargetType,

    pub target_id: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// The target selector of this like.
    #[must_use]
    pub fn target(&self) -> LikeTarget {
        let id = self.target_id.clone();
        match self.target_type {
            TargetType::Video => LikeTarget::Video(id),
            TargetType::Comment => LikeTarget::Comment(id),
            TargetType::Tweet => LikeTarget::Tweet(id),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::LikedById",
        to = "super::user::Column::Id"
    )]
    LikedBy,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LikedBy.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Document for Model {
    const COLLECTION: CollectionName = CollectionName::Likes;

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new(
            "like_actor_target",
            [
                self.liked_by_id.as_str(),
                self.target_type.as_str(),
                self.target_id.as_str(),
            ],
        )]
    }

    fn stamp_created(&mut self, now: DateTimeWithTimeZone) {
        self.created_at = now;
        self.updated_at = now;
    }
}
