//! Metadata tree node returned by `READ_METADATA_DONE`
//!
//! The node is a plain serializable record. `size` and `modificationTime`
//! cross the wire as decimal strings like every other 64-bit field; the
//! `entries` map exists only on directories.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decimal;

/// One node of the metadata tree. The root node's name is `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataNode {
    pub is_directory: bool,
    pub name: String,
    #[serde(with = "decimal")]
    pub size: i64,
    #[serde(with = "decimal")]
    pub modification_time: i64,
    /// Child name -> node. Present iff `is_directory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<BTreeMap<String, MetadataNode>>,
}

impl MetadataNode {
    /// Creates a node. Directories start with an empty `entries` map.
    pub fn new(name: impl Into<String>, is_directory: bool, size: i64, mtime: i64) -> Self {
        Self {
            is_directory,
            name: name.into(),
            size,
            modification_time: mtime,
            entries: is_directory.then(BTreeMap::new),
        }
    }

    /// Looks up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&MetadataNode> {
        self.entries.as_ref()?.get(name)
    }
}
