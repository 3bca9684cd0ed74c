//! GLSL compute-shader text for fused command groups.
//!
//! Every array lives in one `float data[]` storage block; calls address it through element
//! offsets baked into the source as `uint` literals.

use std::fmt::Write as _;
use std::ops::Range;

/// Call to one of the library routines, with resolved element offsets.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderCall {
    MultiplyVectorScalar {
        dest: usize,
        src: usize,
        len: usize,
        factor: f32,
    },
    MultiplyMatrixVector {
        dest: usize,
        matrix: usize,
        vector: usize,
        rows: usize,
        cols: usize,
    },
    AddVectors {
        dest: usize,
        lhs: usize,
        rhs: usize,
        len: usize,
    },
}

impl ShaderCall {
    pub fn routine(&self) -> &'static str {
        match self {
            ShaderCall::MultiplyVectorScalar { .. } => "multiplyVectorScalar",
            ShaderCall::MultiplyMatrixVector { .. } => "multiplyMatrixVector",
            ShaderCall::AddVectors { .. } => "addVectors",
        }
    }

    /// Renders the call expression, e.g. `addVectors(8u, 0u, 4u, 4u)`.
    pub fn render(&self) -> String {
        let args = match *self {
            ShaderCall::MultiplyVectorScalar {
                dest,
                src,
                len,
                factor,
            } => vec![uint(dest), uint(src), uint(len), float(factor)],
            ShaderCall::MultiplyMatrixVector {
                dest,
                matrix,
                vector,
                rows,
                cols,
            } => vec![uint(dest), uint(matrix), uint(vector), uint(rows), uint(cols)],
            ShaderCall::AddVectors {
                dest,
                lhs,
                rhs,
                len,
            } => vec![uint(dest), uint(lhs), uint(rhs), uint(len)],
        };
        format!("{}({})", self.routine(), args.join(", "))
    }

    /// Parses a rendered call expression (a trailing `;` is accepted).
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().trim_end_matches(';').trim_end();
        let (name, rest) = text.split_once('(')?;
        let args: Vec<&str> = rest.strip_suffix(')')?.split(',').map(str::trim).collect();
        let u = |idx: usize| args.get(idx).and_then(|arg| parse_uint(arg));
        match (name.trim(), args.len()) {
            ("multiplyVectorScalar", 4) => Some(ShaderCall::MultiplyVectorScalar {
                dest: u(0)?,
                src: u(1)?,
                len: u(2)?,
                factor: args[3].parse().ok()?,
            }),
            ("multiplyMatrixVector", 5) => Some(ShaderCall::MultiplyMatrixVector {
                dest: u(0)?,
                matrix: u(1)?,
                vector: u(2)?,
                rows: u(3)?,
                cols: u(4)?,
            }),
            ("addVectors", 4) => Some(ShaderCall::AddVectors {
                dest: u(0)?,
                lhs: u(1)?,
                rhs: u(2)?,
                len: u(3)?,
            }),
            _ => None,
        }
    }

    /// Element range the call writes. Invocation `i` only writes element `i` of it.
    pub fn written(&self) -> Range<usize> {
        match *self {
            ShaderCall::MultiplyVectorScalar { dest, len, .. }
            | ShaderCall::AddVectors { dest, len, .. } => dest..dest + len,
            ShaderCall::MultiplyMatrixVector { dest, rows, .. } => dest..dest + rows,
        }
    }

    /// Element range every invocation reads in full, i.e. the vector of a matrix-vector product.
    pub fn gathered(&self) -> Option<Range<usize>> {
        match *self {
            ShaderCall::MultiplyMatrixVector { vector, cols, .. } => Some(vector..vector + cols),
            _ => None,
        }
    }

    /// One past the highest element index the call touches.
    pub fn extent(&self) -> usize {
        match *self {
            ShaderCall::MultiplyVectorScalar { dest, src, len, .. } => (dest + len).max(src + len),
            ShaderCall::MultiplyMatrixVector {
                dest,
                matrix,
                vector,
                rows,
                cols,
            } => (dest + rows).max(matrix + rows * cols).max(vector + cols),
            ShaderCall::AddVectors {
                dest,
                lhs,
                rhs,
                len,
            } => (dest + len).max(lhs + len).max(rhs + len),
        }
    }
}

fn uint(value: usize) -> String {
    format!("{value}u")
}

fn float(value: f32) -> String {
    // `{:?}` keeps a decimal point or exponent and round-trips through `parse`.
    format!("{value:?}")
}

fn parse_uint(text: &str) -> Option<usize> {
    text.strip_suffix('u')?.parse().ok()
}

pub const SHADER_VERSION: &str = "#version 450";

pub const STORAGE_BLOCK: &str = "layout(std430, binding = 0) buffer Arena {
    float data[];
};";

/// Routines shared by every generated shader. Each one guards against invocation ids past its
/// own work size, so calls with smaller extents can share a dispatch.
pub const SHADER_LIBRARY: &str = "void multiplyVectorScalar(uint dest, uint src, uint n, float factor) {
    uint i = gl_GlobalInvocationID.x;
    if (i < n) {
        data[dest + i] = data[src + i] * factor;
    }
}

void multiplyMatrixVector(uint dest, uint m, uint v, uint rows, uint cols) {
    uint row = gl_GlobalInvocationID.x;
    if (row < rows) {
        float acc = 0.0;
        for (uint c = 0u; c < cols; ++c) {
            acc += data[m + row * cols + c] * data[v + c];
        }
        data[dest + row] = acc;
    }
}

void addVectors(uint dest, uint lhs, uint rhs, uint n) {
    uint i = gl_GlobalInvocationID.x;
    if (i < n) {
        data[dest + i] = data[lhs + i] + data[rhs + i];
    }
}";

pub fn local_size_declaration(local_size: usize) -> String {
    format!("layout(local_size_x = {local_size}, local_size_y = 1, local_size_z = 1) in;")
}

fn push_line(out: &mut String, indent: usize, line: &str) {
    let _ = writeln!(out, "{}{line}", "    ".repeat(indent));
}

/// Assembles a complete compute shader running `calls` in order inside `main`.
pub fn render_shader(local_size: usize, calls: &[ShaderCall]) -> String {
    let mut out = String::new();
    for block in [
        SHADER_VERSION,
        &local_size_declaration(local_size),
        STORAGE_BLOCK,
        SHADER_LIBRARY,
    ] {
        push_line(&mut out, 0, block);
        out.push('\n');
    }
    push_line(&mut out, 0, "void main() {");
    for call in calls {
        push_line(&mut out, 1, &format!("{};", call.render()));
    }
    push_line(&mut out, 0, "}");
    out
}

/// Local size declared by a rendered shader.
pub fn parse_local_size(source: &str) -> Option<usize> {
    let start = source.find("local_size_x")? + "local_size_x".len();
    let rest = source[start..].trim_start().strip_prefix('=')?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Statements inside the body of `main`.
pub fn main_statements(source: &str) -> Option<Vec<&str>> {
    let start = source.find("void main()")?;
    let body = &source[start..];
    let open = body.find('{')?;
    let close = body.rfind('}')?;
    if close <= open {
        return None;
    }
    Some(
        body[open + 1..close]
            .split(';')
            .map(str::trim)
            .filter(|statement| !statement.is_empty())
            .collect(),
    )
}
