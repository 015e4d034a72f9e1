use std::collections::BTreeMap;
use std::path::PathBuf;

use nujsonnet_lang::error::Error;
use nujsonnet_lang::import::FileImporter;
use nujsonnet_lang::vm::Vm;

/// A VM plus filesystem wiring and stderr error reporting.
///
/// Evaluation methods return `None` after printing the error, so a CLI
/// can simply bail out.
pub struct Session {
    vm: Vm,
    search_paths: Vec<PathBuf>,
    #[cfg(feature = "crossterm")]
    colored_output: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vm: Vm::new(),
            search_paths: Vec::new(),
            #[cfg(feature = "crossterm")]
            colored_output: false,
        }
    }

    /// Returns a reference to the underlying VM.
    #[must_use]
    #[inline]
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Returns a mutable reference to the underlying VM.
    #[must_use]
    #[inline]
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    #[cfg(feature = "crossterm")]
    pub fn set_colored_output(&mut self, colored_output: bool) {
        self.colored_output = colored_output;
    }

    /// Adds a library search directory (searched after the directory of
    /// the importing file).
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
        let mut importer = FileImporter::new();
        for p in &self.search_paths {
            importer.add_library_path(p.clone());
        }
        self.vm.set_importer(Box::new(importer));
    }

    pub fn evaluate_snippet(&mut self, filename: &str, src: &str) -> Option<String> {
        self.report(|vm| vm.evaluate_snippet(filename, src))
    }

    pub fn evaluate_snippet_stream(&mut self, filename: &str, src: &str) -> Option<String> {
        self.report(|vm| vm.evaluate_snippet_stream(filename, src))
    }

    pub fn evaluate_snippet_multi(
        &mut self,
        filename: &str,
        src: &str,
    ) -> Option<BTreeMap<String, String>> {
        self.report(|vm| vm.evaluate_snippet_multi(filename, src))
    }

    pub fn evaluate_file(&mut self, path: &str) -> Option<String> {
        self.report(|vm| vm.evaluate_file(path))
    }

    pub fn evaluate_file_stream(&mut self, path: &str) -> Option<String> {
        self.report(|vm| vm.evaluate_file_stream(path))
    }

    pub fn evaluate_file_multi(&mut self, path: &str) -> Option<BTreeMap<String, String>> {
        self.report(|vm| vm.evaluate_file_multi(path))
    }

    fn report<T>(&mut self, f: impl FnOnce(&mut Vm) -> Result<T, Error>) -> Option<T> {
        match f(&mut self.vm) {
            Ok(value) => Some(value),
            Err(error) => {
                self.print_eval_error(&error);
                None
            }
        }
    }

    pub fn print_error(&self, message: &str) {
        self.print_line(&format!("error: {message}"));
    }

    fn print_eval_error(&self, error: &Error) {
        self.print_line(&error.to_string());
    }

    fn print_line(&self, text: &str) {
        #[cfg(feature = "crossterm")]
        if self.colored_output {
            use crossterm::style::Stylize as _;
            if let Some((prefix, rest)) = text.split_once(':') {
                eprintln!("{}:{rest}", prefix.to_owned().red().bold());
                return;
            }
        }
        eprintln!("{text}");
    }
}
