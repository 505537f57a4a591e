//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::IdList;
use crate::store::{CollectionName, Document, UniqueKey};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Lowercased handle, unique.
    #[sea_orm(unique)]
    pub username: String,

    /// Lowercased address, unique.
    #[sea_orm(unique)]
    pub email: String,

    /// Display name
    pub fullname: String,

    /// Avatar URL
    pub avatar: String,

    /// Cover image URL
    #[sea_orm(nullable)]
    pub cover_image: Option<String>,

    /// Watched videos, oldest first.
    #[sea_orm(column_type = "JsonBinary")]
    pub watch_history: IdList,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Document for Model {
    const COLLECTION: CollectionName = CollectionName::Users;

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![
            UniqueKey::new("user_username", [self.username.as_str()]),
            UniqueKey::new("user_email", [self.email.as_str()]),
        ]
    }

    fn stamp_created(&mut self, now: DateTimeWithTimeZone) {
        self.created_at = now;
        self.updated_at = now;
    }
}
