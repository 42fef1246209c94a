use crate::utils::{sha256_hex, LineIndex};
use ignore::WalkBuilder;
use rustpython_ast::{Mod, Stmt};
use rustpython_parser::{parse, Mode};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a unit could not be brought into the pipeline. The run continues without it.
#[derive(Error, Debug)]
pub enum UnitLoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// One source file under analysis.
///
/// The content fingerprint is known as soon as the text is read, so a cache hit never pays
/// for parsing.
#[derive(Debug, Clone)]
pub struct AnalysisUnit {
    /// Path used in diagnostics, exclusion matching and per-file ignores.
    pub path: PathBuf,
    pub source: String,
    /// SHA-256 hex of `source`.
    pub fingerprint: String,
}

/// A parsed unit: module body plus the offset-to-line mapping for its source.
pub struct ParsedUnit {
    pub body: Vec<Stmt>,
    pub line_index: LineIndex,
}

impl AnalysisUnit {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            path: path.into(),
            fingerprint: sha256_hex(source.as_bytes()),
            source,
        }
    }

    /// Reads `file` from disk; the unit is reported under `path`.
    pub fn read(file: &Path, path: PathBuf) -> Result<Self, UnitLoadError> {
        let source = fs::read_to_string(file).map_err(|source| UnitLoadError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(Self::new(path, source))
    }

    pub fn parse(&self) -> Result<ParsedUnit, UnitLoadError> {
        let source_path = self.path.to_string_lossy();
        match parse(&self.source, Mode::Module, &source_path) {
            Ok(Mod::Module(module)) => Ok(ParsedUnit {
                body: module.body,
                line_index: LineIndex::new(&self.source),
            }),
            Ok(_) => Err(UnitLoadError::Parse {
                path: self.path.clone(),
                message: "not a module".to_string(),
            }),
            Err(e) => Err(UnitLoadError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            }),
        }
    }
}

/// Something the analyzer can turn into an `AnalysisUnit`.
pub trait UnitInput: Sync {
    /// Path of the unit, known before loading.
    fn path(&self) -> &Path;

    fn load(&self) -> Result<AnalysisUnit, UnitLoadError>;
}

impl UnitInput for AnalysisUnit {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<AnalysisUnit, UnitLoadError> {
        Ok(self.clone())
    }
}

/// A `.py` file found under a target path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredFile {
    /// Location on disk.
    pub file: PathBuf,
    /// Path relative to the target directory (or the target itself for a file target).
    pub path: PathBuf,
}

impl UnitInput for DiscoveredFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<AnalysisUnit, UnitLoadError> {
        AnalysisUnit::read(&self.file, self.path.clone())
    }
}

/// Finds Python files under `target`, honouring `.gitignore` and skipping hidden entries.
///
/// Results are sorted by path so the order of units never depends on the file system.
pub fn discover(target: &Path) -> io::Result<Vec<DiscoveredFile>> {
    let metadata = fs::metadata(target)?;
    if metadata.is_file() {
        return Ok(vec![DiscoveredFile {
            file: target.to_path_buf(),
            path: target.to_path_buf(),
        }]);
    }

    let mut files: Vec<DiscoveredFile> = WalkBuilder::new(target)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "py"))
        .map(|entry| {
            let file = entry.into_path();
            let path = file
                .strip_prefix(target)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| file.clone());
            DiscoveredFile { file, path }
        })
        .collect();
    files.sort();
    Ok(files)
}
