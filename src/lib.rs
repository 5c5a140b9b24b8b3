//! SOL25 - a tree-walking interpreter for a small pure-object language.
//!
//! The program arrives as an already-parsed AST in an XML document; the
//! interpreter registers its classes, instantiates `Main` and sends it `run`.

pub mod ast;
pub mod classes;
pub mod dispatch;
pub mod error;
pub mod eval;
pub mod frame;
pub mod intern;
pub mod methods;
pub mod parser;
pub mod value;

pub use error::{RunResult, RuntimeError};
pub use eval::{Interpreter, OutputSink};
pub use parser::parse_program;
pub use value::Value;
