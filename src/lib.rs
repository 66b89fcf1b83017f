//! `solar` library crate.
//!
//! High-level layout:
//! - frontend: `lexer` + `parser` produce the shared AST (`ast`)
//! - backend: `codegen` lowers the AST to LLVM IR
//! - `driver`: CLI options, object emission, and linking
pub mod ast;
pub mod codegen;
pub mod driver;
pub mod lexer;
pub mod parser;
pub mod token;
