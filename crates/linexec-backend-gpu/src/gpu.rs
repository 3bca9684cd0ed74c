use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use linexec::command::{layout_signature, resolve_desc};
use linexec::env::gpu_local_size;
use linexec::{Buffer, Computation, ComputationDesc, EngineResult, Executor, LayoutSignature};
use serde::Serialize;

use crate::buffer::GpuBuffer;
use crate::codegen::render_shader;
use crate::device::{Device, ShaderHandle};
use crate::fusion::{group_by_work_size, FusedGroup, ShaderSnippet};
use crate::host_device::HostDevice;

/// One fused dispatch.
#[derive(Debug, Clone)]
pub struct GpuStep {
    pub source: String,
    pub shader: ShaderHandle,
    pub work_size: usize,
    pub local_size: usize,
    pub workgroups: usize,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GpuComputation {
    steps: Vec<GpuStep>,
    layout: LayoutSignature,
    local_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepManifest {
    pub commands: Vec<String>,
    pub work_size: usize,
    pub workgroups: usize,
}

/// Serializable summary of a compiled GPU computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpuManifest {
    pub local_size: usize,
    pub steps: Vec<StepManifest>,
}

impl GpuComputation {
    pub fn steps(&self) -> &[GpuStep] {
        &self.steps
    }

    pub fn manifest(&self) -> GpuManifest {
        GpuManifest {
            local_size: self.local_size,
            steps: self
                .steps
                .iter()
                .map(|step| StepManifest {
                    commands: step.commands.clone(),
                    work_size: step.work_size,
                    workgroups: step.workgroups,
                })
                .collect(),
        }
    }

    pub fn manifest_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.manifest())
    }
}

impl Computation for GpuComputation {
    fn step_count(&self) -> usize {
        self.steps.len()
    }

    fn step_commands(&self) -> Vec<Vec<&str>> {
        self.steps
            .iter()
            .map(|step| step.commands.iter().map(String::as_str).collect())
            .collect()
    }

    fn layout(&self) -> &LayoutSignature {
        &self.layout
    }
}

/// Compiles descriptions into fused compute shaders and runs them on a [`Device`].
///
/// Compiled shaders are cached by source fingerprint, so recompiling a description (or another one
/// producing an identical group) reuses the device handle. Entries keep their source and a hit only
/// counts when it matches.
pub struct GpuExecutor<D: Device = HostDevice> {
    device: D,
    local_size: usize,
    shader_cache: Mutex<HashMap<u64, (String, ShaderHandle)>>,
}

impl<D: Device> GpuExecutor<D> {
    /// Uses the local size configured through `LINEXEC_GPU_LOCAL_SIZE`.
    pub fn new(device: D) -> Self {
        Self {
            device,
            local_size: gpu_local_size(),
            shader_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_local_size(mut self, local_size: usize) -> Self {
        self.local_size = local_size.max(1);
        self
    }

    pub fn local_size(&self) -> usize {
        self.local_size
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Number of distinct shaders compiled through this executor.
    pub fn cached_shaders(&self) -> usize {
        self.shader_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn get_or_compile(&self, source: &str) -> EngineResult<ShaderHandle> {
        let fingerprint = source_fingerprint(source);
        let mut cache = self
            .shader_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((cached, handle)) = cache.get(&fingerprint) {
            if cached == source {
                return Ok(*handle);
            }
            log::warn!("shader fingerprint {fingerprint:016x} collided, recompiling");
        }
        let handle = self.device.compile_shader(source)?;
        log::trace!("compiled {handle} ({fingerprint:016x}):\n{source}");
        cache.insert(fingerprint, (source.to_string(), handle));
        Ok(handle)
    }

    fn build_step(&self, group: FusedGroup) -> EngineResult<GpuStep> {
        let source = render_shader(self.local_size, &group.calls());
        let shader = self.get_or_compile(&source)?;
        Ok(GpuStep {
            shader,
            work_size: group.work_size,
            local_size: self.local_size,
            workgroups: group.work_size.div_ceil(self.local_size),
            commands: group.commands(),
            source,
        })
    }
}

impl GpuExecutor<HostDevice> {
    /// Executor backed by the in-process [`HostDevice`].
    pub fn host() -> Self {
        Self::new(HostDevice::new())
    }
}

impl Default for GpuExecutor<HostDevice> {
    fn default() -> Self {
        Self::host()
    }
}

impl<D: Device> Executor for GpuExecutor<D> {
    type Buffer = GpuBuffer;
    type Computation = GpuComputation;

    fn backend_name(&self) -> &str {
        "gpu"
    }

    fn create_buffer(&self) -> GpuBuffer {
        GpuBuffer::new()
    }

    fn compile(&self, buffer: &GpuBuffer, desc: &ComputationDesc) -> EngineResult<GpuComputation> {
        let started = Instant::now();
        let commands = resolve_desc(buffer.directory(), desc)?;
        let layout = layout_signature(&commands);
        let snippets = commands
            .iter()
            .map(ShaderSnippet::from_command)
            .collect::<EngineResult<Vec<_>>>()?;
        let groups = group_by_work_size(snippets);
        let steps = groups
            .into_iter()
            .map(|group| self.build_step(group))
            .collect::<EngineResult<Vec<_>>>()?;
        log::debug!(
            "compiled {} commands into {} gpu steps on {} in {:?}",
            commands.len(),
            steps.len(),
            self.device.name(),
            started.elapsed()
        );
        Ok(GpuComputation {
            steps,
            layout,
            local_size: self.local_size,
        })
    }

    fn execute(
        &self,
        buffer: &mut GpuBuffer,
        computation: &GpuComputation,
        iterations: usize,
    ) -> EngineResult<()> {
        computation.layout.verify(buffer.directory())?;
        let started = Instant::now();
        let mut arena = buffer.arena().write();
        self.device.submit_buffer(arena.as_bytes())?;
        for _ in 0..iterations {
            for step in &computation.steps {
                log::debug!(
                    "dispatching {} x{} for [{}]",
                    step.shader,
                    step.workgroups,
                    step.commands.join("; ")
                );
                self.device.execute_shader(step.shader, step.workgroups)?;
            }
        }
        self.device.retrieve_buffer(arena.as_bytes_mut())?;
        log::debug!(
            "executed {} gpu steps x {iterations} in {:?}",
            computation.steps.len(),
            started.elapsed()
        );
        Ok(())
    }
}

fn source_fingerprint(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}
