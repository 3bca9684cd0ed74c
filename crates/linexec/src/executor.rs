use crate::buffer::{Buffer, LayoutSignature};
use crate::desc::ComputationDesc;
use crate::error::EngineResult;

/// Backend-specific compiled artifact. Immutable once built.
pub trait Computation: Send + Sync {
    /// Number of executable steps (closures on the CPU, fused dispatches on the GPU).
    fn step_count(&self) -> usize;

    /// Source commands covered by each step, in execution order.
    fn step_commands(&self) -> Vec<Vec<&str>>;

    fn layout(&self) -> &LayoutSignature;
}

/// Compiles computation descriptions against a buffer and runs the result.
pub trait Executor: Send + Sync {
    type Buffer: Buffer;
    type Computation: Computation;

    /// Returns a short backend identifier (`"cpu"`, `"gpu"`).
    fn backend_name(&self) -> &str;

    /// Creates an empty buffer in this backend's storage layout.
    fn create_buffer(&self) -> Self::Buffer;

    /// Resolves every command of `desc` against `buffer`'s directory. Fails on the first bad
    /// command without producing a partial computation.
    fn compile(
        &self,
        buffer: &Self::Buffer,
        desc: &ComputationDesc,
    ) -> EngineResult<Self::Computation>;

    /// Runs every step in order, `iterations` times. Zero iterations leaves the buffer untouched.
    fn execute(
        &self,
        buffer: &mut Self::Buffer,
        computation: &Self::Computation,
        iterations: usize,
    ) -> EngineResult<()>;
}
