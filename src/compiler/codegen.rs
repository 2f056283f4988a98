use serde::Serialize;
use std::collections::HashMap;

use crate::compiler::ast::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Module,
    Function,
    Class,
}

/// The executable representation of a source file, or of one callable block
/// nested in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledSubunit {
    pub name: String,
    pub kind: UnitKind,
    /// First line of the unit: 1 for a module, the first decorator or the
    /// `def`/`class` line otherwise.
    pub start_line: u32,
    /// The function suspends at `yield` and is re-entered.
    pub resumable: bool,
    /// Sorted, deduplicated statement lines.
    lines: Vec<u32>,
    /// Directly nested units, sorted by start line.
    children: Vec<CompiledSubunit>,
}

impl CompiledSubunit {
    pub fn new(
        name: impl Into<String>,
        kind: UnitKind,
        start_line: u32,
        mut lines: Vec<u32>,
        mut children: Vec<CompiledSubunit>,
    ) -> Self {
        lines.sort_unstable();
        lines.dedup();
        children.sort_by_key(|c| c.start_line);
        Self {
            name: name.into(),
            kind,
            start_line,
            resumable: false,
            lines,
            children,
        }
    }

    /// Legitimate statement boundaries of this unit, excluding its own
    /// header line except at module scope.
    pub fn statement_lines(&self) -> &[u32] {
        &self.lines
    }

    pub fn children(&self) -> &[CompiledSubunit] {
        &self.children
    }

    /// The directly nested unit starting at `line`.
    pub fn child_at(&self, line: u32) -> Option<&CompiledSubunit> {
        self.children
            .binary_search_by_key(&line, |c| c.start_line)
            .ok()
            .map(|i| &self.children[i])
    }

    /// This unit and every nested unit, depth first.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a CompiledSubunit>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a CompiledSubunit;

    fn next(&mut self) -> Option<Self::Item> {
        let unit = self.stack.pop()?;
        self.stack.extend(unit.children.iter().rev());
        Some(unit)
    }
}

/// Builds the compiled unit tree from a parsed module.
pub struct Codegen;

impl Codegen {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(&mut self, module: &Module) -> CompiledSubunit {
        let mut lines = Vec::new();
        let mut children = Vec::new();
        self.emit_block(&module.body, &mut lines, &mut children);
        CompiledSubunit::new("<module>", UnitKind::Module, 1, lines, children)
    }

    fn compile_def(&mut self, def: &Def) -> CompiledSubunit {
        // A function docstring is a constant, not code; class and module
        // docstrings are stored at run time.
        let body = match (def.kind, def.body.first()) {
            (
                DefKind::Function,
                Some(Stmt::Simple(SimpleStmt {
                    kind: SimpleKind::StringLiteral,
                    ..
                })),
            ) => &def.body[1..],
            _ => &def.body[..],
        };

        let mut lines = Vec::new();
        let mut children = Vec::new();
        self.emit_block(body, &mut lines, &mut children);
        if lines.is_empty() {
            // Nothing executes but the implicit return at the header.
            lines.push(def.start_line());
        }

        let kind = match def.kind {
            DefKind::Function => UnitKind::Function,
            DefKind::Class => UnitKind::Class,
        };
        let mut unit = CompiledSubunit::new(&def.name, kind, def.start_line(), lines, children);
        unit.resumable = def.kind == DefKind::Function && block_yields(&def.body);
        unit
    }

    fn emit_block(
        &mut self,
        body: &[Stmt],
        lines: &mut Vec<u32>,
        children: &mut Vec<CompiledSubunit>,
    ) {
        for stmt in body {
            match stmt {
                Stmt::Simple(simple) => {
                    if !matches!(simple.kind, SimpleKind::Pass | SimpleKind::Declaration) {
                        lines.push(simple.line);
                    }
                }
                Stmt::Compound(compound) => {
                    lines.push(compound.line);
                    self.emit_block(&compound.body, lines, children);
                    for clause in &compound.clauses {
                        if clause.keyword.generates_code() {
                            lines.push(clause.line);
                        }
                        self.emit_block(&clause.body, lines, children);
                    }
                }
                Stmt::Def(def) => {
                    // Decorators are evaluated, and the definition bound, in
                    // the enclosing unit.
                    lines.extend(&def.decorators);
                    lines.push(def.start_line());
                    children.push(self.compile_def(def));
                }
            }
        }
    }
}

impl Default for Codegen {
    fn default() -> Self {
        Self::new()
    }
}

fn block_yields(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Simple(simple) => simple.yields,
        Stmt::Compound(compound) => {
            block_yields(&compound.body) || compound.clauses.iter().any(|c| block_yields(&c.body))
        }
        Stmt::Def(_) => false,
    })
}

/// Map function and method names, qualified by their enclosing classes, to
/// the `def` line of their last definition.
///
/// Functions nested in functions are not indexed.
pub fn function_index(module: &Module) -> HashMap<String, u32> {
    let mut index = HashMap::new();
    let mut classes = Vec::new();
    index_block(&module.body, &mut classes, &mut index);
    index
}

fn index_block(body: &[Stmt], classes: &mut Vec<String>, index: &mut HashMap<String, u32>) {
    for stmt in body {
        match stmt {
            Stmt::Def(def) if def.kind == DefKind::Function => {
                let name = if classes.is_empty() {
                    def.name.clone()
                } else {
                    format!("{}.{}", classes.join("."), def.name)
                };
                let line = index.entry(name).or_insert(def.line);
                *line = (*line).max(def.line);
            }
            Stmt::Def(def) => {
                classes.push(def.name.clone());
                index_block(&def.body, classes, index);
                classes.pop();
            }
            Stmt::Compound(compound) => {
                index_block(&compound.body, classes, index);
                for clause in &compound.clauses {
                    index_block(&clause.body, classes, index);
                }
            }
            Stmt::Simple(_) => {}
        }
    }
}
