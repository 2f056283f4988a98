use std::iter::Peekable;
use std::str::Chars;

use crate::error::{DebuggerError, Result};

/// One logical line of source: a simple statement or a compound header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Physical line the logical line starts on (1-based).
    pub line: u32,
    /// Indentation width of the first physical line (tabs stop every 8).
    pub indent: usize,
    /// Code with comments stripped, continuation lines joined by a space and
    /// every string literal collapsed to `""`.
    pub text: String,
}

/// Splits source text into logical lines.
///
/// Only as much of the lexical structure is recognised as is needed to know
/// where statements start: comments, string literals, bracket nesting and
/// backslash continuations.
pub struct Lexer<'a> {
    filename: &'a str,
    chars: Peekable<Chars<'a>>,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(filename: &'a str, source: &'a str) -> Self {
        Self {
            filename,
            chars: source.chars().peekable(),
            line: 1,
        }
    }

    pub fn scan_lines(&mut self) -> Result<Vec<LogicalLine>> {
        let mut lines = Vec::new();

        loop {
            let indent = self.scan_indent();
            match self.peek() {
                None => break,
                Some('\n') => {
                    self.advance();
                }
                Some('#') => self.skip_comment(),
                Some(_) => lines.push(self.scan_logical_line(indent)?),
            }
        }

        Ok(lines)
    }

    fn scan_logical_line(&mut self, indent: usize) -> Result<LogicalLine> {
        let start = self.line;
        let mut text = String::new();
        // Open brackets and the line each was opened on.
        let mut open: Vec<(char, u32)> = Vec::new();

        loop {
            match self.peek() {
                None => {
                    if let Some(&(_, line)) = open.last() {
                        return Err(self.error_at(line, "unexpected EOF while parsing"));
                    }
                    break;
                }
                Some('\n') => {
                    self.advance();
                    if open.is_empty() {
                        break;
                    }
                    text.push(' ');
                }
                Some('#') => self.skip_comment(),
                Some('\\') => {
                    self.advance();
                    while self.peek() == Some('\r') {
                        self.advance();
                    }
                    match self.advance() {
                        Some('\n') => text.push(' '),
                        None => return Err(self.error("unexpected EOF while parsing")),
                        Some(_) => {
                            return Err(self.error(
                                "unexpected character after line continuation character",
                            ));
                        }
                    }
                }
                Some(quote @ ('\'' | '"')) => {
                    self.scan_string(quote)?;
                    text.push_str("\"\"");
                }
                Some(ch @ ('(' | '[' | '{')) => {
                    open.push((ch, self.line));
                    self.advance();
                    text.push(ch);
                }
                Some(ch @ (')' | ']' | '}')) => {
                    let expected = match ch {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match open.pop() {
                        Some((opener, _)) if opener == expected => {}
                        _ => return Err(self.error(&format!("unmatched '{}'", ch))),
                    }
                    self.advance();
                    text.push(ch);
                }
                Some('\r') => {
                    self.advance();
                }
                Some(ch) => {
                    self.advance();
                    text.push(ch);
                }
            }
        }

        Ok(LogicalLine {
            line: start,
            indent,
            text: text.trim_end().to_string(),
        })
    }

    fn scan_string(&mut self, quote: char) -> Result<()> {
        let start = self.line;
        self.advance(); // opening quote

        let triple = {
            let mut ahead = self.chars.clone();
            ahead.next() == Some(quote) && ahead.next() == Some(quote)
        };
        if triple {
            self.advance();
            self.advance();
        }

        loop {
            match self.advance() {
                None if triple => {
                    return Err(
                        self.error_at(start, "EOF while scanning triple-quoted string literal")
                    );
                }
                None => return Err(self.error_at(start, "EOL while scanning string literal")),
                Some('\\') => {
                    if self.advance().is_none() {
                        return Err(self.error_at(start, "EOL while scanning string literal"));
                    }
                }
                Some('\n') if !triple => {
                    return Err(self.error_at(start, "EOL while scanning string literal"));
                }
                Some(ch) if ch == quote => {
                    if !triple {
                        return Ok(());
                    }
                    let mut ahead = self.chars.clone();
                    if ahead.next() == Some(quote) && ahead.next() == Some(quote) {
                        self.advance();
                        self.advance();
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn scan_indent(&mut self) -> usize {
        let mut width = 0;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                '\r' => {}
                _ => break,
            }
            self.advance();
        }
        width
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn error(&self, message: &str) -> DebuggerError {
        self.error_at(self.line, message)
    }

    fn error_at(&self, line: u32, message: &str) -> DebuggerError {
        DebuggerError::syntax(self.filename, line, message)
    }
}
