//! Folding entry rows into the metadata tree
//!
//! Archives list entries flat and in no particular order: files may precede
//! the directory that contains them, and some archives carry no directory
//! rows at all. Missing parents are synthesized on the way down; when a
//! directory's own row shows up later it replaces the synthetic node but
//! keeps the children collected so far.

use std::collections::BTreeMap;

use arcmount_protocol::{MetadataNode, PATH_DELIMITER};

/// Creates the tree root. Its name is the path delimiter itself.
pub fn build_root() -> MetadataNode {
    MetadataNode::new(PATH_DELIMITER.to_string(), true, 0, 0)
}

/// Folds one `(path, size, is_dir, mtime)` row into the tree under `parent`.
pub fn insert(parent: &mut MetadataNode, path: &str, size: i64, is_directory: bool, mtime: i64) {
    debug_assert!(parent.is_directory);

    let mut components = path.split(PATH_DELIMITER).filter(|c| !c.is_empty());
    let Some(first) = components.next() else {
        return;
    };
    let rest: Vec<&str> = components.collect();

    let entries = parent.entries.get_or_insert_with(BTreeMap::new);

    if rest.is_empty() {
        // The entry itself. A directory row arriving after its contents
        // replaces the synthesized node but keeps the children.
        let mut node = MetadataNode::new(first, is_directory, size, mtime);
        if is_directory {
            if let Some(old) = entries.get(first) {
                if old.is_directory {
                    node.entries = old.entries.clone();
                }
            }
        }
        entries.insert(first.to_owned(), node);
    } else {
        // A parent on the way to the entry. Synthesize it if the archive has
        // not (or not yet) produced its row.
        let child = entries
            .entry(first.to_owned())
            .or_insert_with(|| MetadataNode::new(first, true, 0, mtime));
        let remainder = rest.join(&PATH_DELIMITER.to_string());
        insert(child, &remainder, size, is_directory, mtime);
    }
}
