//! Import resolution.
//!
//! The VM talks to a single [`Importer`] with one operation: given the
//! path of the importing file (empty for top-level snippets) and the
//! literal import path, produce the contents and a resolved path. The
//! resolved path is the VM-wide cache key: two imports resolving to the
//! same path share one program instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// An immutable snapshot of imported data, shared cheaply.
///
/// `import` and `importstr` require the contents to be UTF-8;
/// `importbin` takes the raw bytes.
#[derive(Clone, Debug)]
pub struct Contents {
    data: Rc<[u8]>,
}

impl Contents {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        Self {
            data: s.as_bytes().into(),
        }
    }

    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// Resolves and reads imports on behalf of a VM.
///
/// Implementations must be deterministic for the lifetime of the VM:
/// the same `(imported_from, imported_path)` pair must keep resolving to
/// the same path and contents, and two calls resolving to the same path
/// must return identical contents.
pub trait Importer {
    /// Returns the contents and the resolved path.
    ///
    /// `imported_from` is the resolved path of the importing file, or
    /// empty when the import appears in a top-level snippet, an ext-code
    /// fragment or a TLA-code fragment.
    fn import(
        &mut self,
        imported_from: &str,
        imported_path: &str,
    ) -> Result<(Contents, String), String>;
}

/// In-memory importer for embedders and tests: paths map to contents
/// verbatim, and the path itself is the resolved path.
#[derive(Default)]
pub struct MemoryImporter {
    data: HashMap<String, Contents>,
}

impl MemoryImporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, contents: Contents) {
        self.data.insert(path.into(), contents);
    }
}

impl Importer for MemoryImporter {
    fn import(
        &mut self,
        _imported_from: &str,
        imported_path: &str,
    ) -> Result<(Contents, String), String> {
        match self.data.get(imported_path) {
            Some(contents) => Ok((contents.clone(), imported_path.to_owned())),
            None => Err(format!(
                "couldn't open import {imported_path:?}: no match in memory importer"
            )),
        }
    }
}

/// Reads imports from the filesystem.
///
/// A relative path is resolved against the directory of the importing
/// file first, then against the library search paths in order. Resolved
/// paths are canonicalized, so the same file reached through different
/// relative paths shares one cache entry. File contents are read once per
/// resolved path.
#[derive(Default)]
pub struct FileImporter {
    library_paths: Vec<PathBuf>,
    cache: HashMap<PathBuf, Contents>,
}

impl FileImporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_library_path(&mut self, path: PathBuf) {
        self.library_paths.push(path);
    }

    fn resolve(&self, imported_from: &str, imported_path: &str) -> Option<PathBuf> {
        let path = Path::new(imported_path);
        if path.is_absolute() {
            return path.exists().then(|| path.to_path_buf());
        }
        let from_dir = Path::new(imported_from).parent();
        for base in from_dir
            .into_iter()
            .chain(self.library_paths.iter().map(PathBuf::as_path))
        {
            let full = base.join(path);
            if full.exists() {
                return Some(full);
            }
        }
        // A bare relative path can still be valid for a top-level file.
        if imported_from.is_empty() && path.exists() {
            return Some(path.to_path_buf());
        }
        None
    }
}

impl Importer for FileImporter {
    fn import(
        &mut self,
        imported_from: &str,
        imported_path: &str,
    ) -> Result<(Contents, String), String> {
        let Some(full_path) = self.resolve(imported_from, imported_path) else {
            return Err(format!(
                "couldn't open import {imported_path:?}: no match locally or in the library paths"
            ));
        };
        let resolved = full_path
            .canonicalize()
            .map_err(|e| format!("failed to canonicalize {full_path:?}: {e}"))?;
        if let Some(contents) = self.cache.get(&resolved) {
            return Ok((contents.clone(), resolved.to_string_lossy().into_owned()));
        }
        let data = std::fs::read(&resolved)
            .map_err(|e| format!("failed to read {resolved:?}: {e}"))?;
        let contents = Contents::from_bytes(data);
        self.cache.insert(resolved.clone(), contents.clone());
        Ok((contents, resolved.to_string_lossy().into_owned()))
    }
}
