//! Word-aligned backing storage shared between a buffer and the views it hands out.

use std::ops::Range;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Size in bytes of one arena word. Headers and `f32` elements both occupy exactly one word.
pub const WORD_BYTES: usize = 4;

/// Append-only word store.
///
/// Backing the arena with `u32` words keeps every byte offset handed out by a buffer 4-byte
/// aligned, so element regions can be reinterpreted as `f32` slices without copying.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arena {
    words: Vec<u32>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of words currently stored.
    pub fn len_words(&self) -> usize {
        self.words.len()
    }

    /// Number of bytes currently stored.
    pub fn len_bytes(&self) -> usize {
        self.words.len() * WORD_BYTES
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Grows the arena by `count` zeroed words and returns the word offset of the new region.
    pub fn append_zeroed(&mut self, count: usize) -> usize {
        let offset = self.words.len();
        self.words.resize(offset + count, 0);
        offset
    }

    pub fn words(&self, range: Range<usize>) -> &[u32] {
        &self.words[range]
    }

    pub fn write_words(&mut self, offset: usize, values: &[u32]) {
        self.words[offset..offset + values.len()].copy_from_slice(values);
    }

    /// Reinterprets `len` words starting at `offset` as `f32` elements.
    pub fn floats(&self, offset: usize, len: usize) -> &[f32] {
        bytemuck::cast_slice(&self.words[offset..offset + len])
    }

    pub fn floats_mut(&mut self, offset: usize, len: usize) -> &mut [f32] {
        bytemuck::cast_slice_mut(&mut self.words[offset..offset + len])
    }

    pub fn write_floats(&mut self, offset: usize, values: &[f32]) {
        self.floats_mut(offset, values.len()).copy_from_slice(values);
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }
}

/// Reference-counted arena handle.
///
/// Buffers own one of these and every shallow view clones it, so the arena stays alive for as long
/// as any view into it does.
#[derive(Debug, Clone, Default)]
pub struct SharedArena(Arc<RwLock<Arena>>);

impl SharedArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a view over `len` elements starting at word `offset`.
    pub fn view(&self, offset: usize, len: usize) -> ArenaView {
        ArenaView {
            arena: self.clone(),
            offset,
            len,
        }
    }

    pub fn ptr_eq(&self, other: &SharedArena) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Non-owning window of `f32` elements inside a shared arena.
#[derive(Debug, Clone)]
pub struct ArenaView {
    arena: SharedArena,
    offset: usize,
    len: usize,
}

impl ArenaView {
    /// Word offset of the first element.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn arena(&self) -> &SharedArena {
        &self.arena
    }

    pub fn with<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        let arena = self.arena.read();
        f(arena.floats(self.offset, self.len))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        let mut arena = self.arena.write();
        f(arena.floats_mut(self.offset, self.len))
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.with(|values| values.to_vec())
    }
}
