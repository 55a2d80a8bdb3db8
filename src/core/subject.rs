// src/core/subject.rs

//! Identities of the things the bridge translates.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// A translated artifact in its wire representation.
pub type Artifact = Bytes;

/// A cheaply clonable identity of a translation subject, e.g. `minecraft:stone`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(Arc<str>);

impl SubjectId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace before the first `:`, or `minecraft` when there is none.
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map(|(ns, _)| ns).unwrap_or("minecraft")
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl Borrow<str> for SubjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Selects the cache tier a subject is translated through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Block,
    Item,
    Entity,
}

impl SubjectKind {
    pub const ALL: [SubjectKind; 3] = [SubjectKind::Block, SubjectKind::Item, SubjectKind::Entity];

    /// The name of the cache tier backing this kind.
    pub fn tier_name(&self) -> &'static str {
        match self {
            SubjectKind::Block => "blocks",
            SubjectKind::Item => "items",
            SubjectKind::Entity => "entities",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::Block => f.write_str("block"),
            SubjectKind::Item => f.write_str("item"),
            SubjectKind::Entity => f.write_str("entity"),
        }
    }
}
