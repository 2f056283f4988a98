//! Front end for the traced language: just enough of a compiler to know
//! which lines of a source file are executable statements and which callable
//! units they belong to.

pub mod ast;
mod codegen;
pub mod lexer;
mod parser;

pub use codegen::{Codegen, CompiledSubunit, UnitKind, Walk, function_index};
pub use lexer::Lexer;
pub use parser::Parser;

use std::collections::HashMap;

use crate::error::Result;

/// Output of [`compile`].
#[derive(Debug, Clone)]
pub struct CompiledSource {
    /// Module unit, root of the subunit tree.
    pub unit: CompiledSubunit,
    /// Qualified function names to their `def` line.
    pub functions: HashMap<String, u32>,
}

/// Compile source text into its subunit tree.
pub fn compile(filename: &str, source: &str) -> Result<CompiledSource> {
    // Lexing
    let mut lexer = Lexer::new(filename, source);
    let lines = lexer.scan_lines()?;

    // Parsing
    let mut parser = Parser::new(filename, lines);
    let module = parser.parse()?;

    // Code generation
    let mut codegen = Codegen::new();
    let unit = codegen.compile(&module);
    let functions = function_index(&module);

    Ok(CompiledSource { unit, functions })
}
