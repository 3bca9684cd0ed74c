pub mod buffer;
pub mod cpu;

pub use buffer::CpuBuffer;
pub use cpu::{CpuComputation, CpuExecutor, CpuStep};
