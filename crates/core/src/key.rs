//! Entity keys
//!
//! An `EntityKey` is the sole identity of a replicated entity:
//! - A partition (namespace) the key lives in
//! - A non-empty path of `(kind, name)` elements, root first
//!
//! The final element names the entity itself; earlier elements name its
//! ancestors. A key whose final element has no name is *incomplete*: the
//! caller hands it to the remote store on create and the server fills the
//! name in. Keys are never mutated once assigned; equality is structural.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Partition a key lives in
///
/// The default partition has an empty namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId {
    /// Namespace name, empty for the default partition
    pub namespace: String,
}

impl PartitionId {
    /// Create a partition for the given namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Whether this is the default partition
    pub fn is_default(&self) -> bool {
        self.namespace.is_empty()
    }
}

/// One `(kind, name)` step of a key path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathElement {
    /// Entity kind of this step
    pub kind: String,
    /// Server-assigned or caller-assigned name; `None` until assigned
    pub name: Option<String>,
}

impl PathElement {
    /// A step with a name
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: Some(name.into()),
        }
    }

    /// A step whose name the server will assign
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
        }
    }
}

/// Hierarchical, partition-scoped entity identity
///
/// The path is never empty; every constructor and deserialization
/// upholds this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawEntityKey")]
pub struct EntityKey {
    partition: PartitionId,
    path: Vec<PathElement>,
}

/// Unchecked wire form of an `EntityKey`
#[derive(Deserialize)]
struct RawEntityKey {
    partition: PartitionId,
    path: Vec<PathElement>,
}

impl TryFrom<RawEntityKey> for EntityKey {
    type Error = Error;

    fn try_from(raw: RawEntityKey) -> Result<Self> {
        EntityKey::from_path(raw.partition, raw.path)
    }
}

impl EntityKey {
    /// Top-level key whose name the server assigns on create
    pub fn incomplete(partition: PartitionId, kind: impl Into<String>) -> Self {
        Self {
            partition,
            path: vec![PathElement::incomplete(kind)],
        }
    }

    /// Top-level key with a caller-assigned name
    pub fn named(partition: PartitionId, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            partition,
            path: vec![PathElement::named(kind, name)],
        }
    }

    /// Named key nested under `parent`
    pub fn child(parent: &EntityKey, kind: impl Into<String>, name: impl Into<String>) -> Self {
        let mut path = parent.path.clone();
        path.push(PathElement::named(kind, name));
        Self {
            partition: parent.partition.clone(),
            path,
        }
    }

    /// Incomplete key nested under `parent`
    pub fn incomplete_child(parent: &EntityKey, kind: impl Into<String>) -> Self {
        let mut path = parent.path.clone();
        path.push(PathElement::incomplete(kind));
        Self {
            partition: parent.partition.clone(),
            path,
        }
    }

    /// Build a key from an explicit path
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyKeyPath` if `path` is empty.
    pub fn from_path(partition: PartitionId, path: Vec<PathElement>) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::EmptyKeyPath);
        }
        Ok(Self { partition, path })
    }

    /// Partition of this key
    pub fn partition(&self) -> &PartitionId {
        &self.partition
    }

    /// Full path, root first
    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    /// Final path element (the entity itself)
    pub fn last(&self) -> &PathElement {
        // Non-empty by construction
        &self.path[self.path.len() - 1]
    }

    /// Kind of the entity this key names
    pub fn kind(&self) -> &str {
        &self.last().kind
    }

    /// Name of the entity this key names, if assigned
    pub fn name(&self) -> Option<&str> {
        self.last().name.as_deref()
    }

    /// Whether the final element still lacks a name
    pub fn is_incomplete(&self) -> bool {
        self.last().name.is_none()
    }

    /// Key of the enclosing entity, if this key is nested
    pub fn parent(&self) -> Option<EntityKey> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Self {
            partition: self.partition.clone(),
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// Copy of this key with the final element's name set
    ///
    /// Used by the remote store when it assigns a name on create.
    pub fn complete_with(&self, name: impl Into<String>) -> Self {
        let mut completed = self.clone();
        let last = completed.path.len() - 1;
        completed.path[last].name = Some(name.into());
        completed
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.partition.is_default() {
            write!(f, "{}:", self.partition.namespace)?;
        }
        for (i, element) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match &element.name {
                Some(name) => write!(f, "{}/{}", element.kind, name)?,
                None => write!(f, "{}/?", element.kind)?,
            }
        }
        Ok(())
    }
}
