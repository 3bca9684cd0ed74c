use std::fmt;

use linexec::EngineResult;

/// Opaque id of a shader compiled by a [`Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u64);

impl fmt::Display for ShaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shader#{}", self.0)
    }
}

/// Compute device holding one storage buffer.
///
/// Methods take `&self`; implementations synchronize their own state. Every failure is reported
/// as `EngineError::Device`.
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    /// Replaces the device storage buffer with `data`.
    fn submit_buffer(&self, data: &[u8]) -> EngineResult<()>;

    fn compile_shader(&self, source: &str) -> EngineResult<ShaderHandle>;

    /// Runs `workgroups` workgroups of a compiled shader against the storage buffer.
    fn execute_shader(&self, shader: ShaderHandle, workgroups: usize) -> EngineResult<()>;

    /// Copies the storage buffer into `out`, which must have the submitted size.
    fn retrieve_buffer(&self, out: &mut [u8]) -> EngineResult<()>;
}
