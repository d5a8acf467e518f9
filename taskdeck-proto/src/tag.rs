//! Tags. Read-only from the client's point of view.

use serde::Deserialize;

use crate::ids::TagId;

/// A tag as listed by `GET /tags`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tag {
    /// Tag identifier.
    pub id: TagId,
    /// Display name.
    pub name: String,
}

/// A tag as referenced from a task.
///
/// Depending on the backend revision a task carries a bare tag id or a
/// full tag object, so the name is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    /// Referenced tag.
    pub id: TagId,
    /// Tag name, when the server embedded it.
    pub name: Option<String>,
}

impl TagRef {
    /// A reference carrying only the id.
    #[must_use]
    pub const fn bare(id: TagId) -> Self {
        Self { id, name: None }
    }

    /// Resolves the display name, looking it up in `tags` when the
    /// server did not embed it.
    #[must_use]
    pub fn display_name<'a>(&'a self, tags: &'a [Tag]) -> Option<&'a str> {
        self.name.as_deref().or_else(|| {
            tags.iter()
                .find(|t| t.id == self.id)
                .map(|t| t.name.as_str())
        })
    }
}

impl From<&Tag> for TagRef {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: Some(tag.name.clone()),
        }
    }
}

/// Wire form of a tag reference: a bare id or an object.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum RawTagRef {
    Object {
        id: TagId,
        #[serde(default)]
        name: Option<String>,
    },
    Id(TagId),
}

impl From<RawTagRef> for TagRef {
    fn from(raw: RawTagRef) -> Self {
        match raw {
            RawTagRef::Object { id, name } => Self { id, name },
            RawTagRef::Id(id) => Self::bare(id),
        }
    }
}
