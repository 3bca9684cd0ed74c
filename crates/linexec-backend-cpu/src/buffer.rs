//! Byte-addressed buffer storing each array as `rank` header words followed by its elements.

use linexec::array::{decode_header, encode_header};
use linexec::{
    Arena, ArrayKind, Buffer, BufferItem, Directory, EngineError, EngineResult, NumericArray,
    SharedArena, WORD_BYTES,
};

#[derive(Debug, Default)]
pub struct CpuBuffer {
    arena: SharedArena,
    directory: Directory,
}

impl CpuBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arena(&self) -> &SharedArena {
        &self.arena
    }

    /// Serialized bytes of `name`: header words followed by elements.
    pub fn item_bytes(&self, name: &str) -> EngineResult<Vec<u8>> {
        let item = self.directory.get(name)?;
        let len = WORD_BYTES * (item.kind.rank() + item.element_count());
        let arena = self.arena.read();
        Ok(arena.as_bytes()[item.offset..item.offset + len].to_vec())
    }

    /// Reads the shape stored in the header at `byte_offset`.
    pub fn decode_shape(&self, kind: ArrayKind, byte_offset: usize) -> EngineResult<Vec<usize>> {
        let arena = self.arena.read();
        let header_end = byte_offset.checked_add(WORD_BYTES * kind.rank());
        if byte_offset % WORD_BYTES != 0 || header_end.map_or(true, |end| end > arena.len_bytes()) {
            return Err(EngineError::IncompatibleBuffer(format!(
                "no {kind} header at byte offset {byte_offset} of a {}-byte buffer",
                arena.len_bytes()
            )));
        }
        Ok(read_shape(&arena, kind, byte_offset))
    }
}

/// Shape stored in the header at `byte_offset`.
pub(crate) fn read_shape(arena: &Arena, kind: ArrayKind, byte_offset: usize) -> Vec<usize> {
    let word = byte_offset / WORD_BYTES;
    decode_header(arena.words(word..word + kind.rank()))
}

/// Word offset of the first element of the item whose header starts at `byte_offset`.
pub(crate) fn element_word(kind: ArrayKind, byte_offset: usize) -> usize {
    byte_offset / WORD_BYTES + kind.rank()
}

impl Buffer for CpuBuffer {
    fn directory(&self) -> &Directory {
        &self.directory
    }

    fn insert<A: NumericArray>(&mut self, name: &str, array: &mut A) -> EngineResult<()> {
        self.directory.ensure_vacant(name)?;
        let dims = array.dims();
        let header = encode_header(&dims)?;
        // Copy before locking: `array` may itself be a view into this arena.
        let elements = array.copy_elements();

        let start = {
            let mut arena = self.arena.write();
            let start = arena.append_zeroed(header.len() + elements.len());
            arena.write_words(start, &header);
            arena.write_floats(start + header.len(), &elements);
            start
        };

        let item = BufferItem::new(A::KIND, start * WORD_BYTES, dims);
        array.bind_view(self.arena.view(start + header.len(), elements.len()))?;
        self.directory.insert(name, item)
    }

    fn view<A: NumericArray>(&self, name: &str) -> EngineResult<A> {
        let item = self.directory.get_kind(name, A::KIND)?;
        let dims = self.decode_shape(item.kind, item.offset)?;
        if dims != item.shape {
            return Err(EngineError::IncompatibleBuffer(format!(
                "header of '{name}' reads {dims:?}, directory records {:?}",
                item.shape
            )));
        }
        let view = self
            .arena
            .view(element_word(item.kind, item.offset), item.element_count());
        A::from_view(&dims, view)
    }

    fn storage_size(&self) -> usize {
        self.arena.read().len_bytes()
    }
}
