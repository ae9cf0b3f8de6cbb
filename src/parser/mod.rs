//! # Parser Module
//!
//! Front end adapter: turns a Rust source file into a [`CompilationUnit`]
//! via the `syn` crate. The taint engine itself only ever sees parsed ASTs;
//! everything downstream of this module is parser-agnostic.

use std::path::Path;

use syn::File;

use crate::error::EngineError;

/// One parsed compilation unit, the granularity at which analysis is
/// parallelized.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    /// Path identifier for the source file.
    pub file_path: String,

    /// Raw source code content, kept for snippet extraction.
    pub source_code: String,

    /// Parsed abstract syntax tree.
    pub ast: File,
}

impl CompilationUnit {
    /// Parses source code into a unit.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedInput`] if the source contains syntax
    /// errors that prevent parsing. The caller reports this per unit and
    /// continues with the rest of the pass.
    pub fn from_source(file_path: &str, source_code: impl Into<String>) -> Result<Self, EngineError> {
        let source_code = source_code.into();
        let ast = syn::parse_file(&source_code).map_err(|e| EngineError::MalformedInput {
            unit: file_path.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            file_path: file_path.to_string(),
            source_code,
            ast,
        })
    }

    /// Reads and parses a unit from disk.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let source_code = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_source(&path.to_string_lossy(), source_code)
    }

    /// Retrieves a specific line from the source code (1-indexed).
    pub fn get_source_line(&self, line: usize) -> Option<&str> {
        self.source_code.lines().nth(line.saturating_sub(1))
    }
}
