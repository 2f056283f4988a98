/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// A statement, simple or compound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Simple(SimpleStmt),
    Compound(CompoundStmt),
    Def(Def),
}

impl Stmt {
    /// Line the statement starts on (first decorator line for definitions).
    pub fn line(&self) -> u32 {
        match self {
            Stmt::Simple(s) => s.line,
            Stmt::Compound(c) => c.line,
            Stmt::Def(d) => d.start_line(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleStmt {
    pub line: u32,
    pub kind: SimpleKind,
    /// The statement contains a `yield` expression.
    pub yields: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleKind {
    /// `pass`
    Pass,
    /// `global` / `nonlocal`
    Declaration,
    /// An expression statement made of a single string literal.
    StringLiteral,
    Other,
}

/// Keywords that open a compound statement or one of its clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Elif,
    Else,
    While,
    For,
    Try,
    Except,
    Finally,
    With,
}

impl Keyword {
    /// Whether the header line itself executes.
    pub fn generates_code(self) -> bool {
        !matches!(self, Keyword::Else | Keyword::Finally)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundStmt {
    pub keyword: Keyword,
    pub line: u32,
    pub body: Vec<Stmt>,
    /// `elif` / `else` / `except` / `finally` clauses, in source order.
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub keyword: Keyword,
    pub line: u32,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefKind {
    Function,
    Class,
}

/// A `def` or `class` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Def {
    pub kind: DefKind,
    pub name: String,
    /// Line of the `def` / `class` keyword.
    pub line: u32,
    /// Decorator lines, in source order.
    pub decorators: Vec<u32>,
    pub body: Vec<Stmt>,
}

impl Def {
    pub fn start_line(&self) -> u32 {
        self.decorators.first().copied().unwrap_or(self.line)
    }
}
