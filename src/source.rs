//! Source files: loading, content identity, and the compiled unit index.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::compiler::{self, CompiledSource, CompiledSubunit};
use crate::debugger::{Position, resolver};
use crate::error::{DebuggerError, Result};

/// Where source text comes from.
///
/// Loaders are shared by the debuggers of every traced thread.
pub trait SourceLoader: Send + Sync {
    fn load(&self, filename: &str) -> io::Result<String>;
}

/// Reads sources from the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn load(&self, filename: &str) -> io::Result<String> {
        fs::read_to_string(filename)
    }
}

/// In-memory sources, shared between clones.
///
/// Keep a clone after handing one to a [`Debugger`](crate::Debugger) to edit
/// the sources it sees.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn sources(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, filename: impl Into<String>, source: impl Into<String>) {
        self.sources().insert(filename.into(), source.into());
    }

    pub fn remove(&self, filename: &str) -> Option<String> {
        self.sources().remove(filename)
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, filename: &str) -> io::Result<String> {
        self.sources().get(filename).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no source for {}", filename))
        })
    }
}

/// A parsed source file: its compiled unit tree and function index.
#[derive(Debug, Clone)]
pub struct SourceUnitIndex {
    filename: String,
    fingerprint: Option<[u8; 32]>,
    compiled: Option<CompiledSource>,
}

impl SourceUnitIndex {
    /// Load and compile `filename`.
    pub fn parse(filename: &str, loader: &dyn SourceLoader) -> Result<Self> {
        let mut index = Self {
            filename: filename.to_string(),
            fingerprint: None,
            compiled: None,
        };
        index.reload(loader)?;
        Ok(index)
    }

    /// Reload the source, recompiling only when its content changed.
    ///
    /// Returns whether the unit tree was rebuilt. On error the index is left
    /// empty, and the next reload compiles from scratch.
    pub fn reload(&mut self, loader: &dyn SourceLoader) -> Result<bool> {
        let source = match loader.load(&self.filename) {
            Ok(source) => source,
            Err(e) => {
                self.invalidate();
                return Err(DebuggerError::source_error(&self.filename, e.to_string()));
            }
        };
        if source.is_empty() {
            self.invalidate();
            return Err(DebuggerError::source_error(&self.filename, "no lines"));
        }

        let fingerprint: [u8; 32] = Sha256::digest(source.as_bytes()).into();
        if self.compiled.is_some() && self.fingerprint == Some(fingerprint) {
            return Ok(false);
        }

        self.invalidate();
        let compiled = compiler::compile(&self.filename, &source)?;
        debug!(
            file = %self.filename,
            units = compiled.unit.walk().count(),
            "compiled source"
        );
        self.compiled = Some(compiled);
        self.fingerprint = Some(fingerprint);
        Ok(true)
    }

    fn invalidate(&mut self) {
        self.compiled = None;
        self.fingerprint = None;
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The module unit, if the last load succeeded.
    pub fn root(&self) -> Option<&CompiledSubunit> {
        self.compiled.as_ref().map(|c| &c.unit)
    }

    /// The innermost unit starting at `start_line`.
    pub fn subunit(&self, start_line: u32) -> Option<&CompiledSubunit> {
        self.root()?
            .walk()
            .filter(|u| u.start_line == start_line)
            .last()
    }

    pub fn valid_statement_lines(&self, start_line: u32) -> Option<&[u32]> {
        self.subunit(start_line).map(|u| u.statement_lines())
    }

    /// The `def` line of the last definition of `name`.
    pub fn function_start_line(&self, name: &str) -> Result<u32> {
        self.compiled
            .as_ref()
            .and_then(|c| c.functions.get(name).copied())
            .ok_or_else(|| DebuggerError::FunctionNotFound {
                file: self.filename.clone(),
                name: name.to_string(),
            })
    }

    /// Resolve a requested line to the actual breakpoint position.
    pub fn resolve(&self, line: u32) -> Result<Position> {
        self.root()
            .and_then(|unit| resolver::resolve(unit, line))
            .ok_or_else(|| DebuggerError::LineResolution {
                file: self.filename.clone(),
                line,
            })
    }
}

/// Canonical form of a file name.
///
/// `<...>` pseudo file names are kept as they are.
pub fn canonic(filename: &str, case_insensitive: bool) -> String {
    if filename.starts_with('<') && filename.ends_with('>') {
        return filename.to_string();
    }
    let path = std::path::absolute(filename).unwrap_or_else(|_| PathBuf::from(filename));
    let canonical = normalize(&path).to_string_lossy().into_owned();
    if case_insensitive {
        canonical.to_lowercase()
    } else {
        canonical
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            _ => normalized.push(component),
        }
    }
    normalized
}

/// Every spelling of a canonical path that a frame may report: the path
/// itself, and its forms relative to the current directory when they name an
/// existing file.
pub fn all_pathnames(canonical: &str, case_insensitive: bool) -> Vec<String> {
    let mut names = vec![canonical.to_string()];
    let Ok(cwd) = env::current_dir() else {
        return names;
    };
    let mut cwd = cwd.to_string_lossy().into_owned();
    if case_insensitive {
        cwd = cwd.to_lowercase();
    }
    if let Some(rest) = canonical.strip_prefix(cwd.as_str())
        && let Some(relative) = rest.strip_prefix(MAIN_SEPARATOR)
        && !relative.is_empty()
        && Path::new(relative).is_file()
    {
        names.push(relative.to_string());
        names.push(format!(".{}{}", MAIN_SEPARATOR, relative));
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
def f():
    x = 1
    return x

class C:
    def m(self):
        return 2

def f():
    return 3
";

    #[test]
    fn test_parse_and_resolve() {
        let loader = MemoryLoader::new();
        loader.insert("<test>", SOURCE);
        let index = SourceUnitIndex::parse("<test>", &loader).unwrap();

        assert_eq!(index.resolve(1).unwrap(), Position::new(1, 2));
        assert_eq!(index.resolve(6).unwrap(), Position::new(6, 7));
        assert!(matches!(
            index.resolve(11),
            Err(DebuggerError::LineResolution { line: 11, .. })
        ));
        assert_eq!(index.valid_statement_lines(1), Some(&[2, 3][..]));
        assert_eq!(index.valid_statement_lines(5), Some(&[6][..]));
        assert_eq!(index.valid_statement_lines(4), None);
    }

    #[test]
    fn test_function_start_line() {
        let loader = MemoryLoader::new();
        loader.insert("<test>", SOURCE);
        let index = SourceUnitIndex::parse("<test>", &loader).unwrap();

        assert_eq!(index.function_start_line("f").unwrap(), 9);
        assert_eq!(index.function_start_line("C.m").unwrap(), 6);
        assert!(matches!(
            index.function_start_line("m"),
            Err(DebuggerError::FunctionNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_and_empty_sources() {
        let loader = MemoryLoader::new();
        let err = SourceUnitIndex::parse("<missing>", &loader).unwrap_err();
        assert!(matches!(err, DebuggerError::Source { .. }));

        loader.insert("<empty>", "");
        let err = SourceUnitIndex::parse("<empty>", &loader).unwrap_err();
        assert_eq!(err.to_string(), "<empty>: no lines");
    }

    #[test]
    fn test_syntax_error() {
        let loader = MemoryLoader::new();
        loader.insert("<bad>", "def f()\n    return 1\n");
        let err = SourceUnitIndex::parse("<bad>", &loader).unwrap_err();
        assert!(matches!(err, DebuggerError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_reload_only_on_change() {
        let loader = MemoryLoader::new();
        loader.insert("<test>", SOURCE);
        let mut index = SourceUnitIndex::parse("<test>", &loader).unwrap();
        assert!(!index.reload(&loader).unwrap());

        loader.insert("<test>", "x = 1\ny = 2\n");
        assert!(index.reload(&loader).unwrap());
        assert_eq!(index.resolve(1).unwrap(), Position::new(1, 1));

        loader.remove("<test>");
        assert!(index.reload(&loader).is_err());
        assert!(index.root().is_none());
        assert!(index.resolve(1).is_err());

        // A failed reload forgets the old content, so the same text compiles again.
        loader.insert("<test>", "x = 1\ny = 2\n");
        assert!(index.reload(&loader).unwrap());
    }

    #[test]
    fn test_fs_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.py");
        fs::write(&path, "a = 1\nb = 2\n").unwrap();
        let filename = path.to_string_lossy().into_owned();
        let index = SourceUnitIndex::parse(&filename, &FsLoader).unwrap();
        assert_eq!(index.root().unwrap().statement_lines(), &[1, 2]);
    }

    #[test]
    fn test_canonic() {
        assert_eq!(canonic("<stdin>", false), "<stdin>");
        assert_eq!(canonic("/a/b/../c/./d.py", false), "/a/c/d.py");
        assert_eq!(canonic("/A/B.py", true), "/a/b.py");

        let relative = canonic("pkg/mod.py", false);
        assert!(Path::new(&relative).is_absolute());
        assert!(relative.ends_with("pkg/mod.py"));
    }

    #[test]
    fn test_all_pathnames_of_missing_file() {
        let names = all_pathnames("/nonexistent/dir/prog.py", false);
        assert_eq!(names, vec!["/nonexistent/dir/prog.py"]);
    }
}
