//! Subscription entity (a user subscribing to another user's channel).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::store::{CollectionName, Document, UniqueKey};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscription")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The subscribing user
    pub subscriber_id: String,

    /// The user whose channel is subscribed to
    pub channel_id: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::SubscriberId",
        to = "super::user::Column::Id"
    )]
    Subscriber,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ChannelId",
        to = "super::user::Column::Id"
    )]
    Channel,
}

impl ActiveModelBehavior for ActiveModel {}

impl Document for Model {
    const COLLECTION: CollectionName = CollectionName::Subscriptions;

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new(
            "subscription_pair",
            [self.subscriber_id.as_str(), self.channel_id.as_str()],
        )]
    }

    fn stamp_created(&mut self, now: DateTimeWithTimeZone) {
        self.created_at = now;
        self.updated_at = now;
    }
}
