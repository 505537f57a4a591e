//! Database entities.

#![allow(missing_docs)]

pub mod comment;
pub mod like;
pub mod playlist;
pub mod subscription;
pub mod tweet;
pub mod user;
pub mod video;

pub use comment::Entity as Comment;
pub use like::Entity as Like;
pub use playlist::Entity as Playlist;
pub use subscription::Entity as Subscription;
pub use tweet::Entity as Tweet;
pub use user::Entity as User;
pub use video::Entity as Video;

use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Ordered list of entity IDs stored in a JSON column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct IdList(pub Vec<String>);

impl IdList {
    /// Whether the list contains `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|item| item == id)
    }

    /// Number of IDs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the IDs in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for IdList {
    fn from(ids: Vec<String>) -> Self {
        Self(ids)
    }
}
