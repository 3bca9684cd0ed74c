//! Named, typed arrays laid out in one arena.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::array::{ArrayKind, NumericArray};
use crate::error::{EngineError, EngineResult};

/// Directory entry for one stored array.
///
/// `offset` is expressed in the owning buffer's addressing unit (bytes for the CPU arena, elements
/// for the GPU arena).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferItem {
    pub kind: ArrayKind,
    pub offset: usize,
    pub shape: Vec<usize>,
}

impl BufferItem {
    pub fn new(kind: ArrayKind, offset: usize, shape: Vec<usize>) -> Self {
        Self {
            kind,
            offset,
            shape,
        }
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Rows of a matrix item, length of a vector item.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Columns of a matrix item. Vectors report 1.
    pub fn cols(&self) -> usize {
        match self.kind {
            ArrayKind::Vector => 1,
            _ => self.shape.last().copied().unwrap_or(0),
        }
    }
}

/// Name to item mapping. Names are unique and entries are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    items: BTreeMap<String, BufferItem>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn get(&self, name: &str) -> EngineResult<&BufferItem> {
        self.items
            .get(name)
            .ok_or_else(|| EngineError::UnknownBinding(name.to_string()))
    }

    /// Looks up `name` and checks that it stores an array of `kind`.
    pub fn get_kind(&self, name: &str, kind: ArrayKind) -> EngineResult<&BufferItem> {
        let item = self.get(name)?;
        if item.kind != kind {
            return Err(EngineError::KindMismatch {
                name: name.to_string(),
                expected: kind,
                found: item.kind,
            });
        }
        Ok(item)
    }

    /// Fails with `DuplicateBinding` when `name` is already taken.
    pub fn ensure_vacant(&self, name: &str) -> EngineResult<()> {
        if self.contains(name) {
            return Err(EngineError::DuplicateBinding(name.to_string()));
        }
        Ok(())
    }

    pub fn insert(&mut self, name: &str, item: BufferItem) -> EngineResult<()> {
        self.ensure_vacant(name)?;
        self.items.insert(name.to_string(), item);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BufferItem)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}

/// Storage shared by a computation's compile and execute phases.
///
/// `insert` appends the array to the arena and rebinds the caller's array to a shallow view of its
/// new location, so results written during execution show up through the same handle.
pub trait Buffer: Send + Sync {
    fn directory(&self) -> &Directory;

    fn insert<A: NumericArray>(&mut self, name: &str, array: &mut A) -> EngineResult<()>;

    /// Reconstructs a shallow view of a stored array.
    fn view<A: NumericArray>(&self, name: &str) -> EngineResult<A>;

    /// Size of the arena in bytes.
    fn storage_size(&self) -> usize;
}

/// Directory entries a computation was compiled against.
///
/// Compiled steps embed offsets and extents, so a computation may only run against a buffer whose
/// entries for the referenced names are identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayoutSignature {
    entries: BTreeMap<String, BufferItem>,
}

impl LayoutSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, item: &BufferItem) {
        self.entries
            .entry(name.to_string())
            .or_insert_with(|| item.clone());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BufferItem)> {
        self.entries.iter().map(|(name, item)| (name.as_str(), item))
    }

    pub fn verify(&self, directory: &Directory) -> EngineResult<()> {
        for (name, expected) in &self.entries {
            let found = directory.get(name).map_err(|_| {
                EngineError::IncompatibleBuffer(format!("binding '{name}' is missing"))
            })?;
            if found != expected {
                return Err(EngineError::IncompatibleBuffer(format!(
                    "binding '{name}' moved from {} {:?} at {} to {} {:?} at {}",
                    expected.kind,
                    expected.shape,
                    expected.offset,
                    found.kind,
                    found.shape,
                    found.offset
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_item(offset: usize, len: usize) -> BufferItem {
        BufferItem::new(ArrayKind::Vector, offset, vec![len])
    }

    #[test]
    fn directory_rejects_duplicates_and_keeps_first_entry() {
        let mut directory = Directory::new();
        directory.insert("A", vector_item(0, 3)).expect("first insert");
        let err = directory
            .insert("A", vector_item(16, 5))
            .expect_err("duplicate");
        assert_eq!(err, EngineError::DuplicateBinding("A".into()));
        assert_eq!(directory.get("A").expect("A").shape, vec![3]);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn get_kind_reports_mismatch() {
        let mut directory = Directory::new();
        directory.insert("V", vector_item(0, 2)).expect("insert");
        let err = directory
            .get_kind("V", ArrayKind::Matrix)
            .expect_err("kind mismatch");
        assert_eq!(
            err,
            EngineError::KindMismatch {
                name: "V".into(),
                expected: ArrayKind::Matrix,
                found: ArrayKind::Vector,
            }
        );
        assert!(matches!(
            directory.get("W"),
            Err(EngineError::UnknownBinding(name)) if name == "W"
        ));
    }

    #[test]
    fn signature_detects_moved_and_missing_entries() {
        let mut compiled = Directory::new();
        compiled.insert("A", vector_item(0, 3)).expect("insert");
        compiled.insert("B", vector_item(16, 3)).expect("insert");

        let mut signature = LayoutSignature::new();
        for (name, item) in compiled.iter() {
            signature.record(name, item);
        }
        signature.verify(&compiled).expect("same layout");

        let mut reordered = Directory::new();
        reordered.insert("B", vector_item(0, 3)).expect("insert");
        reordered.insert("A", vector_item(16, 3)).expect("insert");
        assert!(matches!(
            signature.verify(&reordered),
            Err(EngineError::IncompatibleBuffer(_))
        ));

        let mut partial = Directory::new();
        partial.insert("A", vector_item(0, 3)).expect("insert");
        assert!(matches!(
            signature.verify(&partial),
            Err(EngineError::IncompatibleBuffer(msg)) if msg.contains("'B'")
        ));
    }

    #[test]
    fn signature_ignores_unreferenced_extra_entries() {
        let mut directory = Directory::new();
        directory.insert("A", vector_item(0, 3)).expect("insert");
        let mut signature = LayoutSignature::new();
        signature.record("A", directory.get("A").expect("A"));
        directory.insert("Z", vector_item(16, 8)).expect("insert");
        signature.verify(&directory).expect("extra entries are fine");
    }
}
