use crate::compiler::ast::*;
use crate::compiler::lexer::LogicalLine;
use crate::error::{DebuggerError, Result};

/// An indentation-driven block parser over logical lines.
///
/// Statements are only classified as far as breakpoint placement needs:
/// which lines execute, where callable units start and end.
pub struct Parser<'a> {
    filename: &'a str,
    lines: Vec<LogicalLine>,
    current: usize,
    /// Indentation levels of the enclosing blocks.
    indents: Vec<usize>,
    /// Kinds of the enclosing definitions, innermost last.
    scopes: Vec<DefKind>,
}

impl<'a> Parser<'a> {
    pub fn new(filename: &'a str, lines: Vec<LogicalLine>) -> Self {
        Self {
            filename,
            lines,
            current: 0,
            indents: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn parse(&mut self) -> Result<Module> {
        if let Some(first) = self.peek()
            && first.indent != 0
        {
            return Err(self.error(first.line, "unexpected indent"));
        }
        let body = self.block(0)?;
        Ok(Module { body })
    }

    fn block(&mut self, indent: usize) -> Result<Vec<Stmt>> {
        self.indents.push(indent);
        let mut statements = Vec::new();

        while let Some(line) = self.peek() {
            if line.indent < indent {
                if !self.indents.contains(&line.indent) {
                    return Err(self.error(
                        line.line,
                        "unindent does not match any outer indentation level",
                    ));
                }
                break;
            }
            if line.indent > indent {
                return Err(self.error(line.line, "unexpected indent"));
            }
            statements.push(self.statement()?);
        }

        self.indents.pop();
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Stmt> {
        let line = self.advance();

        if line.text.starts_with('@') {
            return self.decorated(line);
        }

        let (word, rest) = split_word(&line.text);
        match word {
            "def" => self.def(&line, rest, DefKind::Function, Vec::new()),
            "class" => self.def(&line, rest, DefKind::Class, Vec::new()),
            "async" => {
                let (next, after) = split_word(rest.trim_start());
                match next {
                    "def" => self.def(&line, after, DefKind::Function, Vec::new()),
                    "for" => self.compound(&line, Keyword::For),
                    "with" => self.compound(&line, Keyword::With),
                    _ => self.simple(line.line, &line.text),
                }
            }
            "if" => self.compound(&line, Keyword::If),
            "while" => self.compound(&line, Keyword::While),
            "for" => self.compound(&line, Keyword::For),
            "try" => self.compound(&line, Keyword::Try),
            "with" => self.compound(&line, Keyword::With),
            "elif" | "else" | "except" | "finally" => Err(self.error(line.line, "invalid syntax")),
            _ => self.simple(line.line, &line.text),
        }
    }

    fn decorated(&mut self, first: LogicalLine) -> Result<Stmt> {
        let mut decorators = vec![first.line];

        loop {
            let Some(next) = self.peek() else {
                return Err(self.error(first.line, "unexpected EOF while parsing"));
            };
            if next.indent != first.indent {
                return Err(self.error(next.line, "invalid syntax"));
            }
            let next = self.advance();
            if next.text.starts_with('@') {
                decorators.push(next.line);
                continue;
            }

            let (word, rest) = split_word(&next.text);
            let (word, rest) = if word == "async" {
                split_word(rest.trim_start())
            } else {
                (word, rest)
            };
            return match word {
                "def" => self.def(&next, rest, DefKind::Function, decorators),
                "class" => self.def(&next, rest, DefKind::Class, decorators),
                _ => Err(self.error(next.line, "invalid syntax")),
            };
        }
    }

    fn def(
        &mut self,
        line: &LogicalLine,
        rest: &str,
        kind: DefKind,
        decorators: Vec<u32>,
    ) -> Result<Stmt> {
        let (name, after) = split_word(rest.trim_start());
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(self.error(line.line, "invalid syntax"));
        }
        let after = after.trim_start();
        let header_ok = match kind {
            DefKind::Function => after.starts_with('('),
            DefKind::Class => after.starts_with('(') || after.starts_with(':'),
        };
        if !header_ok {
            return Err(self.error(line.line, "invalid syntax"));
        }

        let inline = self.header_inline(line)?;
        self.scopes.push(kind);
        let body = self.suite(line, inline);
        self.scopes.pop();

        Ok(Stmt::Def(Def {
            kind,
            name: name.to_string(),
            line: line.line,
            decorators,
            body: body?,
        }))
    }

    fn compound(&mut self, line: &LogicalLine, keyword: Keyword) -> Result<Stmt> {
        let inline = self.header_inline(line)?;
        let body = self.suite(line, inline)?;

        let mut clauses: Vec<Clause> = Vec::new();
        while let Some(next) = self.peek() {
            if next.indent != line.indent {
                break;
            }
            let Some(clause) = clause_keyword(&next.text) else {
                break;
            };
            let seen = |k: Keyword| clauses.iter().any(|c| c.keyword == k);
            let allowed = match (keyword, clause) {
                (Keyword::If, Keyword::Elif | Keyword::Else) => !seen(Keyword::Else),
                (Keyword::While | Keyword::For, Keyword::Else) => !seen(Keyword::Else),
                (Keyword::Try, Keyword::Except) => {
                    !seen(Keyword::Else) && !seen(Keyword::Finally)
                }
                (Keyword::Try, Keyword::Else) => {
                    seen(Keyword::Except) && !seen(Keyword::Else) && !seen(Keyword::Finally)
                }
                (Keyword::Try, Keyword::Finally) => !seen(Keyword::Finally),
                _ => false,
            };
            if !allowed {
                break;
            }

            let next = self.advance();
            let inline = self.header_inline(&next)?;
            let clause_body = self.suite(&next, inline)?;
            clauses.push(Clause {
                keyword: clause,
                line: next.line,
                body: clause_body,
            });
        }

        if keyword == Keyword::Try
            && !clauses
                .iter()
                .any(|c| matches!(c.keyword, Keyword::Except | Keyword::Finally))
        {
            return Err(self.error(line.line, "expected 'except' or 'finally' block"));
        }

        Ok(Stmt::Compound(CompoundStmt {
            keyword,
            line: line.line,
            body,
            clauses,
        }))
    }

    /// Parse the body of a compound statement, inline or indented.
    fn suite(&mut self, header: &LogicalLine, inline: Option<String>) -> Result<Vec<Stmt>> {
        if let Some(text) = inline {
            return Ok(vec![self.simple(header.line, &text)?]);
        }

        match self.peek().map(|next| (next.indent, next.line)) {
            Some((indent, _)) if indent > header.indent => self.block(indent),
            Some((_, line)) => Err(self.error(line, "expected an indented block")),
            None => Err(self.error(header.line, "expected an indented block")),
        }
    }

    /// Text following the header colon, if the body is on the header line.
    fn header_inline(&self, line: &LogicalLine) -> Result<Option<String>> {
        let mut depth = 0usize;
        for (i, ch) in line.text.char_indices() {
            match ch {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                ':' if depth == 0 => {
                    // `:=` is an assignment expression, not the header colon.
                    if line.text[i + 1..].starts_with('=') {
                        continue;
                    }
                    let inline = line.text[i + 1..].trim();
                    return Ok((!inline.is_empty()).then(|| inline.to_string()));
                }
                _ => {}
            }
        }
        Err(self.error(line.line, "invalid syntax"))
    }

    fn simple(&self, line: u32, text: &str) -> Result<Stmt> {
        let parts: Vec<&str> = text
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let returns = parts.iter().any(|p| split_word(p).0 == "return");
        let yields = contains_word(text, "yield");
        let in_function = self.scopes.last() == Some(&DefKind::Function);
        if returns && !in_function {
            return Err(self.error(line, "'return' outside function"));
        }
        if yields && !in_function {
            return Err(self.error(line, "'yield' outside function"));
        }

        let kind = match parts.as_slice() {
            [single] => match split_word(single).0 {
                "pass" => SimpleKind::Pass,
                "global" | "nonlocal" => SimpleKind::Declaration,
                _ if is_string_literal(single) => SimpleKind::StringLiteral,
                _ => SimpleKind::Other,
            },
            _ => SimpleKind::Other,
        };

        Ok(Stmt::Simple(SimpleStmt { line, kind, yields }))
    }

    fn peek(&self) -> Option<&LogicalLine> {
        self.lines.get(self.current)
    }

    fn advance(&mut self) -> LogicalLine {
        let line = self.lines[self.current].clone();
        self.current += 1;
        line
    }

    fn error(&self, line: u32, message: &str) -> DebuggerError {
        DebuggerError::syntax(self.filename, line, message)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split off the leading identifier.
fn split_word(text: &str) -> (&str, &str) {
    let end = text
        .char_indices()
        .find(|&(_, c)| !is_ident_char(c))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text.split_at(end)
}

fn clause_keyword(text: &str) -> Option<Keyword> {
    match split_word(text).0 {
        "elif" => Some(Keyword::Elif),
        "else" => Some(Keyword::Else),
        "except" => Some(Keyword::Except),
        "finally" => Some(Keyword::Finally),
        _ => None,
    }
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !is_ident_char(c)).any(|w| w == word)
}

/// A statement made only of (possibly prefixed, possibly concatenated)
/// string literals. The lexer has already collapsed each literal to `""`.
fn is_string_literal(text: &str) -> bool {
    let mut rest = text.trim();
    if rest.is_empty() {
        return false;
    }
    while !rest.is_empty() {
        let unprefixed = rest.trim_start_matches(['r', 'R', 'b', 'B', 'u', 'U', 'f', 'F']);
        if rest.len() - unprefixed.len() > 2 {
            return false;
        }
        let Some(after) = unprefixed.strip_prefix("\"\"") else {
            return false;
        };
        rest = after.trim_start();
    }
    true
}
