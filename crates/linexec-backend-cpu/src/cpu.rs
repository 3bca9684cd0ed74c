use std::fmt;
use std::time::Instant;

use linexec::array::ops;
use linexec::command::{layout_signature, resolve_desc};
use linexec::{
    Arena, ArrayKind, Buffer, Computation, ComputationDesc, EngineResult, Executor,
    LayoutSignature, ResolvedCommand, ResolvedOp,
};

use crate::buffer::{element_word, read_shape, CpuBuffer};

type Kernel = Box<dyn Fn(&mut Arena) + Send + Sync>;

/// One compiled command: a closure over resolved byte offsets.
pub struct CpuStep {
    command: String,
    kernel: Kernel,
}

impl CpuStep {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn run(&self, arena: &mut Arena) {
        (self.kernel)(arena)
    }
}

impl fmt::Debug for CpuStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuStep")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct CpuComputation {
    steps: Vec<CpuStep>,
    layout: LayoutSignature,
}

impl CpuComputation {
    pub fn steps(&self) -> &[CpuStep] {
        &self.steps
    }
}

impl Computation for CpuComputation {
    fn step_count(&self) -> usize {
        self.steps.len()
    }

    fn step_commands(&self) -> Vec<Vec<&str>> {
        self.steps.iter().map(|step| vec![step.command()]).collect()
    }

    fn layout(&self) -> &LayoutSignature {
        &self.layout
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuExecutor;

impl CpuExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for CpuExecutor {
    type Buffer = CpuBuffer;
    type Computation = CpuComputation;

    fn backend_name(&self) -> &str {
        "cpu"
    }

    fn create_buffer(&self) -> CpuBuffer {
        CpuBuffer::new()
    }

    fn compile(&self, buffer: &CpuBuffer, desc: &ComputationDesc) -> EngineResult<CpuComputation> {
        let started = Instant::now();
        let commands = resolve_desc(buffer.directory(), desc)?;
        let layout = layout_signature(&commands);
        let steps = commands.into_iter().map(compile_step).collect::<Vec<_>>();
        log::debug!(
            "compiled {} cpu steps in {:?}",
            steps.len(),
            started.elapsed()
        );
        Ok(CpuComputation { steps, layout })
    }

    fn execute(
        &self,
        buffer: &mut CpuBuffer,
        computation: &CpuComputation,
        iterations: usize,
    ) -> EngineResult<()> {
        computation.layout.verify(buffer.directory())?;
        let started = Instant::now();
        let mut arena = buffer.arena().write();
        for _ in 0..iterations {
            for step in &computation.steps {
                log::debug!("executing command: {}", step.command);
                step.run(&mut arena);
            }
        }
        log::debug!(
            "executed {} cpu steps x {iterations} in {:?}",
            computation.steps.len(),
            started.elapsed()
        );
        Ok(())
    }
}

/// Element region of a stored array, located through its header at execution time.
struct Region {
    word: usize,
    shape: Vec<usize>,
}

impl Region {
    fn locate(arena: &Arena, kind: ArrayKind, byte_offset: usize) -> Self {
        Self {
            word: element_word(kind, byte_offset),
            shape: read_shape(arena, kind, byte_offset),
        }
    }

    fn len(&self) -> usize {
        self.shape.iter().product()
    }
}

fn compile_step(command: ResolvedCommand) -> CpuStep {
    log::trace!("cpu step for '{}': {:?}", command.text, command.op);
    let kernel: Kernel = match command.op {
        ResolvedOp::ScaleVector { dest, src, factor } => {
            let (dest, src) = (dest.offset(), src.offset());
            Box::new(move |arena: &mut Arena| {
                let src = Region::locate(arena, ArrayKind::Vector, src);
                let mut out = vec![0.0; src.len()];
                ops::scale(arena.floats(src.word, src.len()), factor, &mut out);
                arena.write_floats(element_word(ArrayKind::Vector, dest), &out);
            })
        }
        ResolvedOp::MatrixVector {
            dest,
            matrix,
            vector,
        } => {
            let (dest, matrix, vector) = (dest.offset(), matrix.offset(), vector.offset());
            Box::new(move |arena: &mut Arena| {
                let m = Region::locate(arena, ArrayKind::Matrix, matrix);
                let v = Region::locate(arena, ArrayKind::Vector, vector);
                let (rows, cols) = (m.shape[0], m.shape[1]);
                let mut out = vec![0.0; rows];
                ops::matvec(
                    arena.floats(m.word, m.len()),
                    rows,
                    cols,
                    arena.floats(v.word, v.len()),
                    &mut out,
                );
                arena.write_floats(element_word(ArrayKind::Vector, dest), &out);
            })
        }
        ResolvedOp::AddVectors { dest, lhs, rhs } => {
            let (dest, lhs, rhs) = (dest.offset(), lhs.offset(), rhs.offset());
            Box::new(move |arena: &mut Arena| {
                let a = Region::locate(arena, ArrayKind::Vector, lhs);
                let b = Region::locate(arena, ArrayKind::Vector, rhs);
                let mut out = vec![0.0; a.len()];
                ops::add(
                    arena.floats(a.word, a.len()),
                    arena.floats(b.word, b.len()),
                    &mut out,
                );
                arena.write_floats(element_word(ArrayKind::Vector, dest), &out);
            })
        }
    };
    CpuStep {
        command: command.text,
        kernel,
    }
}

#[cfg(test)]
mod tests {
    use linexec::{EngineError, Matrix, Vector};

    use super::*;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn one_step_per_command() {
        init_logger();
        let executor = CpuExecutor::new();
        let mut buffer = executor.create_buffer();
        let mut a = Vector::zeros(2);
        let mut b = Vector::from_vec(vec![1.0, 2.0]);
        buffer.insert("A", &mut a).expect("insert A");
        buffer.insert("B", &mut b).expect("insert B");

        let desc = ComputationDesc::parse("A = multiply B 3\nA = add A B\nA = add A A");
        let computation = executor.compile(&buffer, &desc).expect("compile");
        assert_eq!(computation.step_count(), 3);
        assert_eq!(computation.steps()[1].command(), "A = add A B");

        executor
            .execute(&mut buffer, &computation, 1)
            .expect("execute");
        assert_eq!(a.to_vec(), vec![8.0, 16.0]);
    }

    #[test]
    fn in_place_matvec_reads_before_writing() {
        init_logger();
        let executor = CpuExecutor::new();
        let mut buffer = executor.create_buffer();
        let mut m = Matrix::from_rows(&[[0.0, 1.0], [1.0, 0.0]]).expect("matrix");
        let mut v = Vector::from_vec(vec![3.0, 4.0]);
        buffer.insert("M", &mut m).expect("insert M");
        buffer.insert("V", &mut v).expect("insert V");

        let desc: ComputationDesc = ["V = multiply M V"].into_iter().collect();
        let computation = executor.compile(&buffer, &desc).expect("compile");
        executor
            .execute(&mut buffer, &computation, 1)
            .expect("execute");
        assert_eq!(v.to_vec(), vec![4.0, 3.0]);
    }

    #[test]
    fn failed_compile_reports_first_error() {
        let executor = CpuExecutor::new();
        let mut buffer = executor.create_buffer();
        let mut a = Vector::zeros(2);
        buffer.insert("A", &mut a).expect("insert");
        let desc: ComputationDesc = ["A = multiply A 2", "A = add A Missing", "A = pow A 2"]
            .into_iter()
            .collect();
        let err = executor.compile(&buffer, &desc).expect_err("bad desc");
        assert_eq!(err, EngineError::UnknownBinding("Missing".into()));
    }
}
