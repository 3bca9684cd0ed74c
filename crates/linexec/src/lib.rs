pub mod arena;
pub mod array;
pub mod buffer;
pub mod command;
pub mod desc;
pub mod env;
pub mod error;
pub mod executor;

pub use arena::{Arena, ArenaView, SharedArena, WORD_BYTES};
pub use array::{Array, Array3, ArrayKind, ArrayStorage, Matrix, NumericArray, Vector};
pub use buffer::{Buffer, BufferItem, Directory, LayoutSignature};
pub use command::{
    resolve_command, resolve_desc, tokenize_command, Binding, Function, ResolvedCommand,
    ResolvedOp, Token,
};
pub use desc::ComputationDesc;
pub use error::{EngineError, EngineResult};
pub use executor::{Computation, Executor};
