//! GTA3script parser: token lines in, statement tree out.

pub mod parser;

pub use parser::Parser;
