//! A compiler for a small expression language in the style of Kaleidoscope:
//! everything is a double, functions are declared with `def` and `extern`,
//! and programs can define their own unary and binary operators.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod precedence;
pub mod token;
pub mod toplevel;

pub use self::error::{Error, ErrorKind};
