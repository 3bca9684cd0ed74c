//! In-process [`Device`] that interprets generated shaders on the host.
//!
//! Each dispatch runs invocation ids `0..workgroups * local_size` one after another, and every
//! invocation executes all calls of `main` in order, the same per-invocation program a GPU would
//! run. Only shaders produced by [`crate::codegen::render_shader`] are understood.

use std::sync::{Mutex, MutexGuard, PoisonError};

use linexec::{EngineError, EngineResult, WORD_BYTES};

use crate::codegen::{main_statements, parse_local_size, ShaderCall};
use crate::device::{Device, ShaderHandle};

#[derive(Debug, Clone, PartialEq)]
struct HostProgram {
    local_size: usize,
    calls: Vec<ShaderCall>,
}

impl HostProgram {
    fn parse(source: &str) -> EngineResult<Self> {
        let local_size = parse_local_size(source)
            .filter(|&size| size > 0)
            .ok_or_else(|| EngineError::device("shader does not declare a positive local size"))?;
        let statements = main_statements(source)
            .ok_or_else(|| EngineError::device("shader has no main function"))?;
        let calls = statements
            .into_iter()
            .map(|statement| {
                ShaderCall::parse(statement).ok_or_else(|| {
                    EngineError::device(format!("unsupported shader statement '{statement}'"))
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self { local_size, calls })
    }
}

#[derive(Debug, Default)]
struct HostState {
    memory: Option<Vec<f32>>,
    programs: Vec<HostProgram>,
}

#[derive(Debug, Default)]
pub struct HostDevice {
    state: Mutex<HostState>,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shaders compiled so far.
    pub fn shader_count(&self) -> usize {
        self.lock().programs.len()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Device for HostDevice {
    fn name(&self) -> &str {
        "host"
    }

    fn submit_buffer(&self, data: &[u8]) -> EngineResult<()> {
        if data.len() % WORD_BYTES != 0 {
            return Err(EngineError::device(format!(
                "submitted {} bytes, not a whole number of f32 elements",
                data.len()
            )));
        }
        let memory = bytemuck::pod_collect_to_vec::<u8, f32>(data);
        self.lock().memory = Some(memory);
        Ok(())
    }

    fn compile_shader(&self, source: &str) -> EngineResult<ShaderHandle> {
        let program = HostProgram::parse(source)?;
        let mut state = self.lock();
        state.programs.push(program);
        let handle = ShaderHandle(state.programs.len() as u64 - 1);
        log::trace!("host device compiled {handle}");
        Ok(handle)
    }

    fn execute_shader(&self, shader: ShaderHandle, workgroups: usize) -> EngineResult<()> {
        let mut state = self.lock();
        let HostState { memory, programs } = &mut *state;
        let program = usize::try_from(shader.0)
            .ok()
            .and_then(|idx| programs.get(idx))
            .ok_or_else(|| EngineError::device(format!("unknown shader handle {shader}")))?;
        let memory = memory
            .as_mut()
            .ok_or_else(|| EngineError::device("dispatch before any buffer was submitted"))?;

        if let Some(call) = program
            .calls
            .iter()
            .find(|call| call.extent() > memory.len())
        {
            return Err(EngineError::device(format!(
                "{} reaches element {} of a {}-element buffer",
                call.render(),
                call.extent(),
                memory.len()
            )));
        }

        let invocations = workgroups * program.local_size;
        for gid in 0..invocations {
            for call in &program.calls {
                invoke(call, gid, memory);
            }
        }
        Ok(())
    }

    fn retrieve_buffer(&self, out: &mut [u8]) -> EngineResult<()> {
        let state = self.lock();
        let memory = state
            .memory
            .as_ref()
            .ok_or_else(|| EngineError::device("retrieve before any buffer was submitted"))?;
        let bytes: &[u8] = bytemuck::cast_slice(memory.as_slice());
        if bytes.len() != out.len() {
            return Err(EngineError::device(format!(
                "retrieve into {} bytes, device buffer holds {}",
                out.len(),
                bytes.len()
            )));
        }
        out.copy_from_slice(bytes);
        Ok(())
    }
}

/// Body of one library routine for invocation `gid`.
fn invoke(call: &ShaderCall, gid: usize, data: &mut [f32]) {
    match *call {
        ShaderCall::MultiplyVectorScalar {
            dest,
            src,
            len,
            factor,
        } => {
            if gid < len {
                data[dest + gid] = data[src + gid] * factor;
            }
        }
        ShaderCall::MultiplyMatrixVector {
            dest,
            matrix,
            vector,
            rows,
            cols,
        } => {
            if gid < rows {
                let row = matrix + gid * cols;
                let acc = (0..cols)
                    .map(|c| data[row + c] * data[vector + c])
                    .sum::<f32>();
                data[dest + gid] = acc;
            }
        }
        ShaderCall::AddVectors {
            dest,
            lhs,
            rhs,
            len,
        } => {
            if gid < len {
                data[dest + gid] = data[lhs + gid] + data[rhs + gid];
            }
        }
    }
}
