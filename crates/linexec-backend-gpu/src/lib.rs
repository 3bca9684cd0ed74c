pub mod buffer;
pub mod codegen;
pub mod device;
pub mod fusion;
pub mod gpu;
pub mod host_device;

pub use buffer::GpuBuffer;
pub use codegen::{render_shader, ShaderCall};
pub use device::{Device, ShaderHandle};
pub use fusion::{group_by_work_size, FusedGroup, ShaderSnippet};
pub use gpu::{GpuComputation, GpuExecutor, GpuManifest, GpuStep, StepManifest};
pub use host_device::HostDevice;
