//! Command tokenizer and the type-directed resolver shared by every backend.
//!
//! A command reads `dest = function operand [operand]`. Resolution looks every name up in a
//! buffer directory, picks the signature matching the operand kinds and validates shapes, so the
//! backends only ever see well-typed [`ResolvedOp`]s.

use std::fmt;

use crate::array::ArrayKind;
use crate::buffer::{BufferItem, Directory, LayoutSignature};
use crate::desc::ComputationDesc;
use crate::error::{EngineError, EngineResult};

const MAX_OPERANDS: usize = 2;

/// Splits a command into `[dest, function, operands...]`.
pub fn tokenize_command(command: &str) -> EngineResult<Vec<String>> {
    let (lhs, rhs) = command
        .split_once('=')
        .ok_or_else(|| EngineError::syntax(command, "missing '='"))?;
    let dest = lhs.trim();
    if dest.is_empty() {
        return Err(EngineError::syntax(command, "missing destination"));
    }
    let mut tokens = vec![dest.to_string()];
    tokens.extend(rhs.split_whitespace().map(str::to_string));
    if tokens.len() < 2 {
        return Err(EngineError::syntax(command, "missing function name"));
    }
    Ok(tokens)
}

/// A name bound to its directory entry at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub item: BufferItem,
}

impl Binding {
    pub fn kind(&self) -> ArrayKind {
        self.item.kind
    }

    pub fn offset(&self) -> usize {
        self.item.offset
    }

    pub fn len(&self) -> usize {
        self.item.element_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Literal(f32),
    Binding(Binding),
}

impl Token {
    /// Classifies an operand: finite numeric literals first, then directory names.
    pub fn parse(directory: &Directory, text: &str) -> EngineResult<Self> {
        if let Ok(value) = text.parse::<f32>() {
            if value.is_finite() {
                return Ok(Token::Literal(value));
            }
        }
        let item = directory.get(text)?;
        Ok(Token::Binding(Binding {
            name: text.to_string(),
            item: item.clone(),
        }))
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Token::Literal(_) => "scalar",
            Token::Binding(binding) => binding.kind().name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Multiply,
    Add,
}

impl Function {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "multiply" => Some(Function::Multiply),
            "add" => Some(Function::Add),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Multiply => "multiply",
            Function::Add => "add",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedOp {
    ScaleVector {
        dest: Binding,
        src: Binding,
        factor: f32,
    },
    MatrixVector {
        dest: Binding,
        matrix: Binding,
        vector: Binding,
    },
    AddVectors {
        dest: Binding,
        lhs: Binding,
        rhs: Binding,
    },
}

impl ResolvedOp {
    pub fn function(&self) -> Function {
        match self {
            ResolvedOp::ScaleVector { .. } | ResolvedOp::MatrixVector { .. } => Function::Multiply,
            ResolvedOp::AddVectors { .. } => Function::Add,
        }
    }

    pub fn dest(&self) -> &Binding {
        match self {
            ResolvedOp::ScaleVector { dest, .. }
            | ResolvedOp::MatrixVector { dest, .. }
            | ResolvedOp::AddVectors { dest, .. } => dest,
        }
    }

    /// Every binding the operation touches, destination first.
    pub fn bindings(&self) -> Vec<&Binding> {
        match self {
            ResolvedOp::ScaleVector { dest, src, .. } => vec![dest, src],
            ResolvedOp::MatrixVector {
                dest,
                matrix,
                vector,
            } => vec![dest, matrix, vector],
            ResolvedOp::AddVectors { dest, lhs, rhs } => vec![dest, lhs, rhs],
        }
    }

    /// Number of parallel work items: the vector length for elementwise ops, the row count for a
    /// matrix-vector product.
    pub fn work_size(&self) -> usize {
        match self {
            ResolvedOp::ScaleVector { src, .. } => src.len(),
            ResolvedOp::MatrixVector { matrix, .. } => matrix.item.rows(),
            ResolvedOp::AddVectors { lhs, .. } => lhs.len(),
        }
    }
}

/// Backend-neutral result of compiling one command.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCommand {
    pub text: String,
    pub op: ResolvedOp,
}

pub fn resolve_command(directory: &Directory, command: &str) -> EngineResult<ResolvedCommand> {
    let tokens = tokenize_command(command)?;
    let operand_texts = &tokens[2..];
    if operand_texts.len() > MAX_OPERANDS {
        return Err(EngineError::syntax(
            command,
            format!(
                "expected at most {MAX_OPERANDS} operands, found {}",
                operand_texts.len()
            ),
        ));
    }

    let function_name = tokens[1].as_str();
    let function = Function::lookup(function_name).ok_or_else(|| {
        EngineError::unsupported(function_name, "function not recognised")
    })?;

    let dest = Token::parse(directory, &tokens[0]).and_then(|token| match token {
        Token::Binding(binding) => Ok(binding),
        Token::Literal(_) => Err(EngineError::UnknownBinding(tokens[0].clone())),
    })?;

    let operands = operand_texts
        .iter()
        .map(|text| Token::parse(directory, text))
        .collect::<EngineResult<Vec<_>>>()?;

    let (op, result_len) = match function {
        Function::Multiply => resolve_multiply(dest, operands)?,
        Function::Add => resolve_add(dest, operands)?,
    };

    let dest = op.dest();
    if dest.kind() != ArrayKind::Vector {
        return Err(EngineError::unsupported(
            function.name(),
            format!("destination '{}' is a {}, expected a vector", dest.name, dest.kind()),
        ));
    }
    if dest.len() != result_len {
        return Err(EngineError::shape_mismatch(
            function.name(),
            format!(
                "destination '{}' has {} elements, result has {result_len}",
                dest.name,
                dest.len()
            ),
        ));
    }

    Ok(ResolvedCommand {
        text: command.to_string(),
        op,
    })
}

/// Resolves every command of `desc` in order, stopping at the first error.
pub fn resolve_desc(
    directory: &Directory,
    desc: &ComputationDesc,
) -> EngineResult<Vec<ResolvedCommand>> {
    desc.iter()
        .map(|command| resolve_command(directory, command))
        .collect()
}

/// Records every binding referenced by `commands`.
pub fn layout_signature(commands: &[ResolvedCommand]) -> LayoutSignature {
    let mut signature = LayoutSignature::new();
    for command in commands {
        for binding in command.op.bindings() {
            signature.record(&binding.name, &binding.item);
        }
    }
    signature
}

fn no_signature(function: Function, operands: &[Token]) -> EngineError {
    let kinds = operands
        .iter()
        .map(Token::kind_name)
        .collect::<Vec<_>>()
        .join(", ");
    EngineError::unsupported(
        function.name(),
        format!("no signature matches argument types ({kinds})"),
    )
}

fn resolve_multiply(dest: Binding, operands: Vec<Token>) -> EngineResult<(ResolvedOp, usize)> {
    match operands.as_slice() {
        [Token::Binding(src), Token::Literal(factor)] if src.kind() == ArrayKind::Vector => {
            let len = src.len();
            Ok((
                ResolvedOp::ScaleVector {
                    dest,
                    src: src.clone(),
                    factor: *factor,
                },
                len,
            ))
        }
        [Token::Binding(matrix), Token::Binding(vector)]
            if matrix.kind() == ArrayKind::Matrix && vector.kind() == ArrayKind::Vector =>
        {
            let (rows, cols) = (matrix.item.rows(), matrix.item.cols());
            if cols != vector.len() {
                return Err(EngineError::shape_mismatch(
                    Function::Multiply.name(),
                    format!(
                        "matrix '{}' has {cols} columns but vector '{}' has {} elements",
                        matrix.name,
                        vector.name,
                        vector.len()
                    ),
                ));
            }
            Ok((
                ResolvedOp::MatrixVector {
                    dest,
                    matrix: matrix.clone(),
                    vector: vector.clone(),
                },
                rows,
            ))
        }
        _ => Err(no_signature(Function::Multiply, &operands)),
    }
}

fn resolve_add(dest: Binding, operands: Vec<Token>) -> EngineResult<(ResolvedOp, usize)> {
    match operands.as_slice() {
        [Token::Binding(lhs), Token::Binding(rhs)]
            if lhs.kind() == ArrayKind::Vector && rhs.kind() == ArrayKind::Vector =>
        {
            if lhs.len() != rhs.len() {
                return Err(EngineError::shape_mismatch(
                    Function::Add.name(),
                    format!(
                        "vector '{}' has {} elements but vector '{}' has {}",
                        lhs.name,
                        lhs.len(),
                        rhs.name,
                        rhs.len()
                    ),
                ));
            }
            let len = lhs.len();
            Ok((
                ResolvedOp::AddVectors {
                    dest,
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                },
                len,
            ))
        }
        _ => Err(no_signature(Function::Add, &operands)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Directory {
        let mut directory = Directory::new();
        let entries = [
            ("M", ArrayKind::Matrix, vec![3, 4]),
            ("V", ArrayKind::Vector, vec![4]),
            ("A", ArrayKind::Vector, vec![3]),
            ("B", ArrayKind::Vector, vec![3]),
            ("W", ArrayKind::Vector, vec![5]),
            ("T", ArrayKind::Array3, vec![2, 3, 4]),
            ("N", ArrayKind::Matrix, vec![3, 3]),
        ];
        let mut offset = 0;
        for (name, kind, shape) in entries {
            let len: usize = shape.iter().product();
            directory
                .insert(name, BufferItem::new(kind, offset, shape))
                .expect("insert");
            offset += len;
        }
        directory
    }

    #[test]
    fn tokenizer_splits_on_first_equals() {
        let tokens = tokenize_command("  A =multiply   M\tV ").expect("tokens");
        assert_eq!(tokens, vec!["A", "multiply", "M", "V"]);
        let tokens = tokenize_command("A = add B=C D").expect("tokens");
        assert_eq!(tokens, vec!["A", "add", "B=C", "D"]);
    }

    #[test]
    fn tokenizer_rejects_malformed_commands() {
        for command in ["A multiply M V", " = add A B", "A =   ", ""] {
            assert!(
                matches!(tokenize_command(command), Err(EngineError::Syntax { .. })),
                "{command:?} should be a syntax error"
            );
        }
    }

    #[test]
    fn tokens_prefer_finite_literals() {
        let directory = directory();
        assert_eq!(
            Token::parse(&directory, "-2.5").expect("literal"),
            Token::Literal(-2.5)
        );
        assert_eq!(
            Token::parse(&directory, "1e3").expect("literal"),
            Token::Literal(1000.0)
        );
        assert!(matches!(
            Token::parse(&directory, "inf"),
            Err(EngineError::UnknownBinding(name)) if name == "inf"
        ));
        assert!(matches!(
            Token::parse(&directory, "V").expect("binding"),
            Token::Binding(Binding { ref name, .. }) if name == "V"
        ));
    }

    #[test]
    fn resolves_each_signature() {
        let directory = directory();
        let scale = resolve_command(&directory, "A = multiply B 2.0").expect("scale");
        assert!(matches!(
            scale.op,
            ResolvedOp::ScaleVector { factor, .. } if factor == 2.0
        ));
        assert_eq!(scale.op.work_size(), 3);

        let matvec = resolve_command(&directory, "A = multiply M V").expect("matvec");
        match &matvec.op {
            ResolvedOp::MatrixVector {
                dest,
                matrix,
                vector,
            } => {
                assert_eq!(dest.name, "A");
                assert_eq!(matrix.name, "M");
                assert_eq!(vector.name, "V");
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert_eq!(matvec.op.work_size(), 3);
        assert_eq!(matvec.op.bindings().len(), 3);

        let add = resolve_command(&directory, "A = add A B").expect("add");
        assert_eq!(add.op.function(), Function::Add);
        assert_eq!(add.text, "A = add A B");
    }

    #[test]
    fn unknown_function_is_unsupported() {
        let err = resolve_command(&directory(), "A = subtract A B").expect_err("unknown");
        assert!(matches!(
            err,
            EngineError::UnsupportedOperation { ref function, .. } if function == "subtract"
        ));
    }

    #[test]
    fn unknown_names_are_reported() {
        let directory = directory();
        assert_eq!(
            resolve_command(&directory, "X = add A B").expect_err("dest"),
            EngineError::UnknownBinding("X".into())
        );
        assert_eq!(
            resolve_command(&directory, "A = add A Q").expect_err("operand"),
            EngineError::UnknownBinding("Q".into())
        );
    }

    #[test]
    fn literal_only_and_mismatched_kinds_are_unsupported() {
        let directory = directory();
        for command in [
            "A = multiply 1.0 2.0",
            "A = multiply 2.0 B",
            "A = multiply B",
            "A = add A 1.0",
            "A = add M V",
            "A = multiply T V",
            "A = multiply V M",
        ] {
            assert!(
                matches!(
                    resolve_command(&directory, command),
                    Err(EngineError::UnsupportedOperation { .. })
                ),
                "{command:?} should be unsupported"
            );
        }
    }

    #[test]
    fn shape_errors_are_reported() {
        let directory = directory();
        for command in [
            "A = multiply N V",
            "A = add A W",
            "W = multiply M V",
            "W = multiply B 3",
        ] {
            assert!(
                matches!(
                    resolve_command(&directory, command),
                    Err(EngineError::ShapeMismatch { .. })
                ),
                "{command:?} should be a shape mismatch"
            );
        }
    }

    #[test]
    fn non_vector_destination_is_unsupported() {
        let err = resolve_command(&directory(), "M = multiply M V").expect_err("matrix dest");
        assert!(matches!(err, EngineError::UnsupportedOperation { .. }));
    }

    #[test]
    fn too_many_operands_is_syntax_error() {
        let err = resolve_command(&directory(), "A = add A B B").expect_err("three operands");
        assert!(matches!(err, EngineError::Syntax { .. }));
    }

    #[test]
    fn desc_resolution_stops_at_first_error() {
        let directory = directory();
        let desc: ComputationDesc = ["A = multiply M V", "A = bogus A", "A = add A Q"]
            .into_iter()
            .collect();
        let err = resolve_desc(&directory, &desc).expect_err("bad second command");
        assert!(matches!(err, EngineError::UnsupportedOperation { .. }));
    }

    #[test]
    fn signature_covers_referenced_bindings_once() {
        let directory = directory();
        let desc: ComputationDesc = ["A = multiply M V", "B = add A A"].into_iter().collect();
        let commands = resolve_desc(&directory, &desc).expect("resolve");
        let signature = layout_signature(&commands);
        let names: Vec<&str> = signature.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["A", "B", "M", "V"]);
        signature.verify(&directory).expect("same directory");
    }
}
