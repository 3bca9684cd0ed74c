//! Grouping of consecutive commands into shared dispatches.
//!
//! Commands only fuse with their immediate neighbours, and only while the work size stays the
//! same. Invocation `i` of a fused shader runs every call for index `i`, so elementwise reads of
//! earlier results are safe. A matrix-vector product reads its whole input vector from every
//! invocation; a group is therefore closed whenever that vector is written by another call of the
//! same group, and a product writing into its own input cannot be dispatched at all.

use std::ops::Range;

use linexec::{EngineError, EngineResult, ResolvedCommand, ResolvedOp};

use crate::codegen::ShaderCall;

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSnippet {
    pub command: String,
    pub call: ShaderCall,
    pub work_size: usize,
}

impl ShaderSnippet {
    /// Lowers a resolved command. GPU buffer offsets are element offsets, so they go into the
    /// call unchanged.
    pub fn from_command(command: &ResolvedCommand) -> EngineResult<Self> {
        let call = match &command.op {
            ResolvedOp::ScaleVector { dest, src, factor } => ShaderCall::MultiplyVectorScalar {
                dest: dest.offset(),
                src: src.offset(),
                len: src.len(),
                factor: *factor,
            },
            ResolvedOp::MatrixVector {
                dest,
                matrix,
                vector,
            } => ShaderCall::MultiplyMatrixVector {
                dest: dest.offset(),
                matrix: matrix.offset(),
                vector: vector.offset(),
                rows: matrix.item.rows(),
                cols: matrix.item.cols(),
            },
            ResolvedOp::AddVectors { dest, lhs, rhs } => ShaderCall::AddVectors {
                dest: dest.offset(),
                lhs: lhs.offset(),
                rhs: rhs.offset(),
                len: lhs.len(),
            },
        };
        let snippet = Self {
            command: command.text.clone(),
            call,
            work_size: command.op.work_size(),
        };
        if let Some(gathered) = snippet.call.gathered() {
            if overlaps(&gathered, &snippet.call.written()) {
                return Err(EngineError::unsupported(
                    command.op.function().name(),
                    format!(
                        "'{}' writes the vector it reads; other invocations would observe \
                         partially updated input",
                        command.text
                    ),
                ));
            }
        }
        Ok(snippet)
    }

    /// Whether this snippet cannot share a dispatch with `other` in either order.
    fn conflicts_with(&self, other: &ShaderSnippet) -> bool {
        let reads_write = |reader: &ShaderSnippet, writer: &ShaderSnippet| {
            reader
                .call
                .gathered()
                .is_some_and(|gathered| overlaps(&gathered, &writer.call.written()))
        };
        reads_write(self, other) || reads_write(other, self)
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// A run of snippets sharing one work size and free of gather hazards.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedGroup {
    pub work_size: usize,
    pub snippets: Vec<ShaderSnippet>,
}

impl FusedGroup {
    pub fn calls(&self) -> Vec<ShaderCall> {
        self.snippets.iter().map(|snippet| snippet.call.clone()).collect()
    }

    fn accepts(&self, snippet: &ShaderSnippet) -> bool {
        self.work_size == snippet.work_size
            && !self
                .snippets
                .iter()
                .any(|fused| fused.conflicts_with(snippet))
    }

    pub fn commands(&self) -> Vec<String> {
        self.snippets
            .iter()
            .map(|snippet| snippet.command.clone())
            .collect()
    }
}

pub fn group_by_work_size(snippets: impl IntoIterator<Item = ShaderSnippet>) -> Vec<FusedGroup> {
    let mut groups = Vec::new();
    let mut current: Option<FusedGroup> = None;
    for snippet in snippets {
        match current.as_mut() {
            Some(group) if group.accepts(&snippet) => group.snippets.push(snippet),
            _ => {
                groups.extend(current.take());
                current = Some(FusedGroup {
                    work_size: snippet.work_size,
                    snippets: vec![snippet],
                });
            }
        }
    }
    groups.extend(current);
    groups
}
