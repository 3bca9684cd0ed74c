//! Element-addressed buffer mirrored to the device as one `float` storage block.

use linexec::{
    Buffer, BufferItem, Directory, EngineError, EngineResult, NumericArray, SharedArena,
};

/// Buffer whose directory offsets count `f32` elements. No headers are stored; shapes live in the
/// directory only.
#[derive(Debug, Default)]
pub struct GpuBuffer {
    arena: SharedArena,
    directory: Directory,
}

impl GpuBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arena(&self) -> &SharedArena {
        &self.arena
    }

    /// Number of `f32` elements in the arena.
    pub fn element_count(&self) -> usize {
        self.arena.read().len_words()
    }

    /// Copy of the whole arena, as submitted to a device.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.arena.read().as_bytes().to_vec()
    }

    /// Overwrites the whole arena with bytes read back from a device.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> EngineResult<()> {
        let mut arena = self.arena.write();
        if arena.len_bytes() != bytes.len() {
            return Err(EngineError::device(format!(
                "cannot load {} bytes into a {}-byte buffer",
                bytes.len(),
                arena.len_bytes()
            )));
        }
        arena.as_bytes_mut().copy_from_slice(bytes);
        Ok(())
    }
}

impl Buffer for GpuBuffer {
    fn directory(&self) -> &Directory {
        &self.directory
    }

    fn insert<A: NumericArray>(&mut self, name: &str, array: &mut A) -> EngineResult<()> {
        self.directory.ensure_vacant(name)?;
        let dims = array.dims();
        let elements = array.copy_elements();
        let offset = {
            let mut arena = self.arena.write();
            let offset = arena.append_zeroed(elements.len());
            arena.write_floats(offset, &elements);
            offset
        };
        array.bind_view(self.arena.view(offset, elements.len()))?;
        self.directory
            .insert(name, BufferItem::new(A::KIND, offset, dims))
    }

    fn view<A: NumericArray>(&self, name: &str) -> EngineResult<A> {
        let item = self.directory.get_kind(name, A::KIND)?;
        A::from_view(
            &item.shape,
            self.arena.view(item.offset, item.element_count()),
        )
    }

    fn storage_size(&self) -> usize {
        self.arena.read().len_bytes()
    }
}

#[cfg(test)]
mod tests {
    use linexec::{Matrix, Vector};

    use super::*;

    #[test]
    fn offsets_count_elements() {
        let mut buffer = GpuBuffer::new();
        let mut m = Matrix::zeros(2, 3);
        let mut v = Vector::from_vec(vec![1.0, 2.0, 3.0]);
        buffer.insert("M", &mut m).expect("insert M");
        buffer.insert("v", &mut v).expect("insert v");
        assert_eq!(buffer.directory().get("v").expect("v").offset, 6);
        assert_eq!(buffer.element_count(), 9);
        assert_eq!(buffer.storage_size(), 36);
    }

    #[test]
    fn bytes_round_trip_through_load() {
        let mut buffer = GpuBuffer::new();
        let mut v = Vector::from_vec(vec![1.0, 2.0]);
        buffer.insert("v", &mut v).expect("insert");

        let mut bytes = buffer.to_bytes();
        bytes[4..8].copy_from_slice(&7.5f32.to_ne_bytes());
        buffer.load_bytes(&bytes).expect("load");
        assert_eq!(v.to_vec(), vec![1.0, 7.5]);

        let err = buffer.load_bytes(&bytes[..4]).expect_err("short");
        assert!(matches!(err, EngineError::Device(_)));
    }
}
