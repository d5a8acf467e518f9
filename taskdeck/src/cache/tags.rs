//! Tags, read-only.

use std::sync::Arc;

use taskdeck_proto::tag::{Tag, TagRef};

use super::ResourceCache;
use crate::api::{ApiClient, ApiError};

/// Mirror of `GET /tags`. No token is needed.
pub struct TagCache {
    api: Arc<ApiClient>,
    tags: ResourceCache<Tag>,
}

impl TagCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            tags: ResourceCache::new(),
        }
    }

    /// Current tags.
    #[must_use]
    pub fn tags(&self) -> Vec<Tag> {
        self.tags.items()
    }

    /// Display name for a task's tag reference, falling back to `#id`.
    #[must_use]
    pub fn label(&self, tag: &TagRef) -> String {
        self.tags.with_items(|tags| {
            tag.display_name(tags)
                .map_or_else(|| format!("#{}", tag.id), str::to_string)
        })
    }

    /// Whether a refresh is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.tags.is_loading()
    }

    /// Refetches the tags.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; cached tags are unchanged.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.tags.refresh_with(self.api.list_tags()).await.map(drop)
    }
}
