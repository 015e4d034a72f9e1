//! The virtual machine: the embedding surface of the interpreter.
//!
//! A [`Vm`] owns the program cache, the importer, external variables and
//! top-level arguments, global bindings, the native-function table, the
//! notifier, the trace sink and the preloaded standard library. Programs
//! loaded from files (and imports) are cached by the importer-resolved
//! path, so two imports of the same path share one program instance and
//! one root thunk; anonymous snippets are never cached.
//!
//! # Example
//!
//! ```
//! let mut vm = nujsonnet_lang::vm::Vm::new();
//! let json = vm
//!     .evaluate_snippet("example.jsonnet", "{ a: 1 + 2 }")
//!     .unwrap();
//! assert_eq!(json, "{\n   \"a\": 3\n}\n");
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write as _;
use std::rc::Rc;

use crate::analyze;
use crate::ast::Visibility;
use crate::core;
use crate::desugar::desugar;
use crate::error::{Error, RuntimeError, StaticError};
use crate::import::{Contents, FileImporter, Importer};
use crate::lexer::Lexer;
use crate::notify::Notifier;
use crate::parser::Parser;
use crate::span::{SourceId, SourceMap, Span};
use crate::Name;

mod eval;
mod float;
mod format;
mod manifest;
mod parse_yaml;
mod stdlib;
mod value;

use eval::Evaluator;
use manifest::JsonFormat;
use stdlib::Builtin;
use value::{extend_object, Env, EnvData, FuncData, FuncKind, ObjData, Thunk, Value};

const STDLIB_SRC: &str = include_str!("std.libsonnet");

/// A parsed and analyzed program fragment, as used by ext-node and
/// TLA-node bindings and [`Vm::bind_global`].
#[derive(Clone)]
pub struct ProgramAst {
    expr: Rc<core::Expr>,
    src: SourceId,
}

/// A host function callable through `std.native`.
///
/// Arguments arrive fully evaluated as JSON trees; the result is turned
/// back into a Jsonnet value. Native functions must not re-enter the VM.
pub struct NativeFunction {
    pub name: String,
    pub params: Vec<String>,
    pub func: Box<dyn FnMut(&[serde_json::Value]) -> Result<serde_json::Value, String>>,
}

pub(crate) struct NativeEntry {
    pub(crate) name: Name,
    pub(crate) params: Rc<Vec<Name>>,
    func: RefCell<Box<dyn FnMut(&[serde_json::Value]) -> Result<serde_json::Value, String>>>,
}

/// One remembered native-function result, awaiting its notification.
pub(crate) struct NativeRecord {
    pub(crate) name: Name,
    pub(crate) args: Vec<serde_json::Value>,
    pub(crate) value: Value,
    pub(crate) json: serde_json::Value,
    pub(crate) notified: Cell<bool>,
}

#[derive(Clone)]
enum ExtBinding {
    Var(String),
    Code(String),
    Node(ProgramAst),
}

enum OutputMode {
    Single,
    Stream,
    Multi,
}

enum Output {
    Single(String),
    Multi(BTreeMap<String, String>),
}

pub struct Vm {
    pub(crate) source_map: SourceMap,
    pub(crate) max_stack: usize,
    pub(crate) max_trace: usize,
    string_output: bool,
    pub(crate) importer: Box<dyn Importer>,
    /// Memoized importer answers, keyed by `(imported_from, path)`.
    pub(crate) import_resolutions: HashMap<(String, String), (Contents, String)>,
    /// Loaded programs keyed by resolved path.
    pub(crate) programs: HashMap<String, (Thunk, Span)>,
    /// Resolved path each source was imported as; absent for snippets.
    pub(crate) source_origins: HashMap<SourceId, String>,
    ext_vars: HashMap<String, ExtBinding>,
    ext_thunks: HashMap<String, Thunk>,
    tlas: HashMap<String, ExtBinding>,
    globals: Vec<(Name, Thunk)>,
    pub(crate) native_funcs: HashMap<Name, Rc<NativeEntry>>,
    pub(crate) notifier: Option<Box<dyn Notifier>>,
    pub(crate) native_records: Vec<NativeRecord>,
    trace_out: Option<Box<dyn std::io::Write>>,
    obj_counter: u64,
    pub(crate) base_std: Option<Rc<ObjData>>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Self {
            source_map: SourceMap::new(),
            max_stack: 500,
            max_trace: 20,
            string_output: false,
            importer: Box::new(FileImporter::new()),
            import_resolutions: HashMap::new(),
            programs: HashMap::new(),
            source_origins: HashMap::new(),
            ext_vars: HashMap::new(),
            ext_thunks: HashMap::new(),
            tlas: HashMap::new(),
            globals: Vec::new(),
            native_funcs: HashMap::new(),
            notifier: None,
            native_records: Vec::new(),
            trace_out: None,
            obj_counter: 0,
            base_std: None,
        };
        vm.init_stdlib();
        vm
    }

    fn init_stdlib(&mut self) {
        let mut fields = Vec::with_capacity(Builtin::ALL.len());
        for &(name, builtin) in Builtin::ALL {
            fields.push((
                Name::from(name),
                Visibility::Hidden,
                Thunk::done(Value::Func(Rc::new(FuncData {
                    kind: FuncKind::Builtin(builtin),
                }))),
            ));
        }
        let native_obj = ObjData::simple(self.next_obj_id(), fields);

        let (thunk, span) = self
            .load_program_with("<std>", STDLIB_SRC, None, false)
            .expect("failed to load the standard library");
        let mut ev = Evaluator::new(self);
        let value = ev
            .force(&thunk, span)
            .expect("failed to evaluate the standard library");
        let Value::Object(jsonnet_obj) = value else {
            panic!("the standard library is not an object");
        };
        self.base_std = Some(extend_object(&jsonnet_obj, &native_obj));
    }

    pub(crate) fn next_obj_id(&mut self) -> u64 {
        self.obj_counter += 1;
        self.obj_counter
    }

    /// Replaces the importer. The default reads from the filesystem with
    /// no library paths.
    pub fn set_importer(&mut self, importer: Box<dyn Importer>) {
        self.importer = importer;
    }

    /// Sets the maximum number of call frames (default 500).
    pub fn set_max_stack(&mut self, max_stack: usize) {
        self.max_stack = max_stack;
    }

    /// Sets the number of stack trace frames kept in errors before the
    /// middle is elided (default 20).
    pub fn set_max_trace(&mut self, max_trace: usize) {
        self.max_trace = max_trace;
    }

    /// In string output mode the top-level value (or each stream/multi
    /// entry) must be a string, which is emitted verbatim.
    pub fn set_string_output(&mut self, string_output: bool) {
        self.string_output = string_output;
    }

    /// Redirects `std.trace` output (default: stderr).
    pub fn set_trace_out(&mut self, sink: Box<dyn std::io::Write>) {
        self.trace_out = Some(sink);
    }

    /// Installs an observer for native-function results.
    pub fn set_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifier = Some(notifier);
    }

    pub(crate) fn write_trace(&mut self, line: &str) {
        match &mut self.trace_out {
            Some(sink) => {
                let _ = sink.write_all(line.as_bytes());
            }
            None => eprint!("{line}"),
        }
    }

    /// Binds an external variable to a plain string value.
    pub fn ext_var(&mut self, name: &str, value: &str) {
        self.ext_vars
            .insert(name.into(), ExtBinding::Var(value.into()));
        self.ext_thunks.remove(name);
    }

    /// Binds an external variable to a Jsonnet expression, evaluated
    /// lazily on first `std.extVar` access.
    pub fn ext_code(&mut self, name: &str, code: &str) {
        self.ext_vars
            .insert(name.into(), ExtBinding::Code(code.into()));
        self.ext_thunks.remove(name);
    }

    /// Binds an external variable to a pre-parsed fragment.
    pub fn ext_node(&mut self, name: &str, ast: ProgramAst) {
        self.ext_vars.insert(name.into(), ExtBinding::Node(ast));
        self.ext_thunks.remove(name);
    }

    /// Removes all external variables.
    pub fn ext_reset(&mut self) {
        self.ext_vars.clear();
        self.ext_thunks.clear();
    }

    /// Binds a top-level argument to a plain string value.
    pub fn tla_var(&mut self, name: &str, value: &str) {
        self.tlas.insert(name.into(), ExtBinding::Var(value.into()));
    }

    /// Binds a top-level argument to a Jsonnet expression.
    pub fn tla_code(&mut self, name: &str, code: &str) {
        self.tlas.insert(name.into(), ExtBinding::Code(code.into()));
    }

    /// Binds a top-level argument to a pre-parsed fragment.
    pub fn tla_node(&mut self, name: &str, ast: ProgramAst) {
        self.tlas.insert(name.into(), ExtBinding::Node(ast));
    }

    /// Removes all top-level arguments.
    pub fn tla_reset(&mut self) {
        self.tlas.clear();
    }

    /// Makes `name` visible to every subsequently loaded program, bound
    /// to the given fragment.
    pub fn bind_global(&mut self, name: &str, ast: ProgramAst) {
        let thunk = self.ast_thunk(&ast);
        self.globals.push((name.into(), thunk));
    }

    /// Registers a native function, reachable as `std.native(name)`.
    pub fn register_native(&mut self, native: NativeFunction) {
        let name: Name = native.name.as_str().into();
        let params: Vec<Name> = native.params.iter().map(|p| Name::from(p.as_str())).collect();
        self.native_funcs.insert(
            name.clone(),
            Rc::new(NativeEntry {
                name,
                params: Rc::new(params),
                func: RefCell::new(native.func),
            }),
        );
    }

    /// Parses, desugars and checks a snippet without evaluating it.
    pub fn snippet_to_ast(&mut self, filename: &str, src: &str) -> Result<ProgramAst, Error> {
        let (expr, src_id) = self.compile(filename, src, true)?;
        Ok(ProgramAst { expr, src: src_id })
    }

    /// Evaluates an anonymous snippet into a JSON document.
    pub fn evaluate_snippet(&mut self, filename: &str, src: &str) -> Result<String, Error> {
        let root = self.load_program(filename, src, None)?;
        self.run_single(root, OutputMode::Single)
    }

    /// Evaluates an anonymous snippet into a YAML stream; the top-level
    /// value must be an array, one document per element.
    pub fn evaluate_snippet_stream(
        &mut self,
        filename: &str,
        src: &str,
    ) -> Result<String, Error> {
        let root = self.load_program(filename, src, None)?;
        self.run_single(root, OutputMode::Stream)
    }

    /// Evaluates an anonymous snippet into a filename → contents map; the
    /// top-level value must be an object.
    pub fn evaluate_snippet_multi(
        &mut self,
        filename: &str,
        src: &str,
    ) -> Result<BTreeMap<String, String>, Error> {
        let root = self.load_program(filename, src, None)?;
        self.run_multi(root)
    }

    /// Evaluates a file into a JSON document; the program is cached by
    /// its importer-resolved path.
    pub fn evaluate_file(&mut self, path: &str) -> Result<String, Error> {
        let root = self.load_file_root(path)?;
        self.run_single(root, OutputMode::Single)
    }

    /// Like [`Vm::evaluate_file`] with YAML stream output.
    pub fn evaluate_file_stream(&mut self, path: &str) -> Result<String, Error> {
        let root = self.load_file_root(path)?;
        self.run_single(root, OutputMode::Stream)
    }

    /// Like [`Vm::evaluate_file`] with multi-file output.
    pub fn evaluate_file_multi(
        &mut self,
        path: &str,
    ) -> Result<BTreeMap<String, String>, Error> {
        let root = self.load_file_root(path)?;
        self.run_multi(root)
    }

    fn run_single(&mut self, root: (Thunk, Span), mode: OutputMode) -> Result<String, Error> {
        match self.run(root, mode)? {
            Output::Single(s) => Ok(s),
            Output::Multi(_) => unreachable!(),
        }
    }

    fn run_multi(&mut self, root: (Thunk, Span)) -> Result<BTreeMap<String, String>, Error> {
        match self.run(root, OutputMode::Multi)? {
            Output::Single(_) => unreachable!(),
            Output::Multi(map) => Ok(map),
        }
    }

    fn run(&mut self, root: (Thunk, Span), mode: OutputMode) -> Result<Output, Error> {
        let tla = self.build_tla_thunks()?;
        let (thunk, span) = root;
        let mut ev = Evaluator::new(self);
        ev.run_root(thunk, span, tla, mode).map_err(Error::Runtime)
    }

    fn build_tla_thunks(&mut self) -> Result<Vec<(Name, Thunk)>, Error> {
        let bindings: Vec<(String, ExtBinding)> = self
            .tlas
            .iter()
            .map(|(name, binding)| (name.clone(), binding.clone()))
            .collect();
        let mut out = Vec::with_capacity(bindings.len());
        for (name, binding) in bindings {
            let thunk = match binding {
                ExtBinding::Var(value) => Thunk::done(Value::Str(value.as_str().into())),
                ExtBinding::Code(code) => {
                    let (thunk, _) =
                        self.load_program(&format!("<top-level-arg:{name}>"), &code, None)?;
                    thunk
                }
                ExtBinding::Node(ast) => self.ast_thunk(&ast),
            };
            out.push((Name::from(name.as_str()), thunk));
        }
        Ok(out)
    }

    fn ast_thunk(&mut self, ast: &ProgramAst) -> Thunk {
        let this_file = self.source_map.name(ast.src).to_owned();
        let env = self.root_env(&this_file);
        Thunk::pending(ast.expr.clone(), env)
    }

    fn load_file_root(&mut self, path: &str) -> Result<(Thunk, Span), Error> {
        let key = (String::new(), path.to_owned());
        let (contents, resolved) = match self.import_resolutions.get(&key) {
            Some(found) => found.clone(),
            None => {
                let found = self.importer.import("", path).map_err(|message| {
                    Error::Runtime(RuntimeError {
                        message,
                        stack: Vec::new(),
                    })
                })?;
                self.import_resolutions.insert(key, found.clone());
                found
            }
        };
        if let Some(cached) = self.programs.get(&resolved) {
            return Ok(cached.clone());
        }
        let Some(text) = contents.as_str() else {
            return Err(Error::Runtime(RuntimeError {
                message: format!("file {path:?} is not valid UTF-8"),
                stack: Vec::new(),
            }));
        };
        let text = text.to_owned();
        let root = self.load_program(&resolved, &text, Some(resolved.clone()))?;
        self.programs.insert(resolved, root.clone());
        Ok(root)
    }

    fn compile(
        &mut self,
        diag_name: &str,
        src: &str,
        with_std: bool,
    ) -> Result<(Rc<core::Expr>, SourceId), StaticError> {
        let src_id = self.source_map.add_file(diag_name, src.to_owned());
        let tokens = Lexer::new(&self.source_map, src_id).lex_to_eof()?;
        let ast = Parser::new(&self.source_map, tokens).parse_root_expr()?;
        let expr = desugar(&self.source_map, &ast)?;
        let mut names: HashSet<Name> = HashSet::new();
        if with_std {
            names.insert("std".into());
            for (name, _) in &self.globals {
                names.insert(name.clone());
            }
        }
        analyze::check(&self.source_map, &expr, &names)?;
        Ok((expr, src_id))
    }

    pub(crate) fn load_program(
        &mut self,
        diag_name: &str,
        src: &str,
        origin: Option<String>,
    ) -> Result<(Thunk, Span), StaticError> {
        self.load_program_with(diag_name, src, origin, true)
    }

    fn load_program_with(
        &mut self,
        diag_name: &str,
        src: &str,
        origin: Option<String>,
        with_std: bool,
    ) -> Result<(Thunk, Span), StaticError> {
        let (expr, src_id) = self.compile(diag_name, src, with_std)?;
        if let Some(origin) = origin {
            self.source_origins.insert(src_id, origin);
        }
        let span = expr.span;
        let env = if with_std {
            self.root_env(diag_name)
        } else {
            Env::from_data(EnvData {
                parent: None,
                vars: HashMap::new(),
                obj: None,
            })
        };
        Ok((Thunk::pending(expr, env), span))
    }

    fn make_file_std(&mut self, this_file: &str) -> Rc<ObjData> {
        let id = self.next_obj_id();
        let this_obj = ObjData::simple(
            id,
            vec![(
                Name::from("thisFile"),
                Visibility::Hidden,
                Thunk::done(Value::Str(this_file.into())),
            )],
        );
        extend_object(
            self.base_std.as_ref().expect("standard library not initialized"),
            &this_obj,
        )
    }

    fn root_env(&mut self, this_file: &str) -> Env {
        let file_std = self.make_file_std(this_file);
        let mut vars = HashMap::new();
        vars.insert(
            Name::from("std"),
            Thunk::done(Value::Object(file_std)),
        );
        for (name, thunk) in &self.globals {
            vars.insert(name.clone(), thunk.clone());
        }
        Env::from_data(EnvData {
            parent: None,
            vars,
            obj: None,
        })
    }

    /// Converts a JSON tree into a Jsonnet value (objects become plain
    /// visible-field objects).
    pub(crate) fn json_to_value(&mut self, json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.as_str().into()),
            serde_json::Value::Array(items) => {
                let items: value::ArrayData = items
                    .iter()
                    .map(|item| Thunk::done(self.json_to_value(item)))
                    .collect();
                Value::Array(Rc::new(items))
            }
            serde_json::Value::Object(map) => {
                let fields: Vec<(Name, Visibility, Thunk)> = map
                    .iter()
                    .map(|(name, item)| {
                        (
                            Name::from(name.as_str()),
                            Visibility::Default,
                            Thunk::done(self.json_to_value(item)),
                        )
                    })
                    .collect();
                Value::Object(ObjData::simple(self.next_obj_id(), fields))
            }
        }
    }
}

impl Evaluator<'_> {
    fn run_root(
        &mut self,
        thunk: Thunk,
        span: Span,
        tla: Vec<(Name, Thunk)>,
        mode: OutputMode,
    ) -> eval::EvalResult<Output> {
        let mut value = self.force(&thunk, span)?;
        if let Value::Func(func) = value.clone() {
            value = self.call_function(&func, Vec::new(), tla, span, false)?;
        } else if !tla.is_empty() {
            return Err(self.error(
                span,
                "top-level arguments provided, but the top-level value is not a function"
                    .into(),
            ));
        }

        if self.vm.notifier.is_some() {
            let mut path = Vec::new();
            self.value_to_json_notify(&value, span, &mut path)?;
        }

        let string_output = self.vm.string_output;
        let output = match mode {
            OutputMode::Single => {
                let mut out = String::new();
                self.emit_document(&value, string_output, span, &mut out)?;
                Output::Single(out)
            }
            OutputMode::Stream => {
                let Value::Array(items) = &value else {
                    return Err(self.error(
                        span,
                        format!(
                            "stream mode requires an array at the top level, got {}",
                            value.type_str()
                        ),
                    ));
                };
                let mut out = String::new();
                if !items.is_empty() {
                    for thunk in items.iter() {
                        let item = self.force(&thunk.clone(), span)?;
                        out.push_str("---\n");
                        self.emit_document(&item, string_output, span, &mut out)?;
                    }
                    out.push_str("...\n");
                }
                Output::Single(out)
            }
            OutputMode::Multi => {
                let Value::Object(obj) = &value else {
                    return Err(self.error(
                        span,
                        format!(
                            "multi mode requires an object at the top level, got {}",
                            value.type_str()
                        ),
                    ));
                };
                self.check_object_asserts(obj)?;
                let mut map = BTreeMap::new();
                for name in obj.visible_fields() {
                    let field_value = self.object_field(obj, 0, &name, span)?;
                    let mut out = String::new();
                    self.emit_document(&field_value, string_output, span, &mut out)?;
                    map.insert(name.to_string(), out);
                }
                Output::Multi(map)
            }
        };

        self.flush_notifications();
        Ok(output)
    }

    /// One manifested document with its trailing newline: the value as
    /// indented JSON, or verbatim in string output mode.
    fn emit_document(
        &mut self,
        value: &Value,
        string_output: bool,
        span: Span,
        out: &mut String,
    ) -> eval::EvalResult<()> {
        if string_output {
            let Value::Str(s) = value else {
                return Err(self.error(
                    span,
                    format!(
                        "string output mode requires a string, got {}",
                        value.type_str()
                    ),
                ));
            };
            out.push_str(s);
        } else {
            self.manifest_json(value, &JsonFormat::indented(), 0, span, out)?;
        }
        out.push('\n');
        Ok(())
    }

    /// `std.extVar`: the registered binding, built into a thunk on first
    /// use and memoized until the table is reset.
    pub(crate) fn ext_var_value(&mut self, name: &str, span: Span) -> eval::EvalResult<Value> {
        if let Some(thunk) = self.vm.ext_thunks.get(name) {
            let thunk = thunk.clone();
            return self.force(&thunk, span);
        }
        let Some(binding) = self.vm.ext_vars.get(name).cloned() else {
            return Err(self.error(span, format!("Undefined external variable: {name}")));
        };
        let thunk = match binding {
            ExtBinding::Var(value) => Thunk::done(Value::Str(value.as_str().into())),
            ExtBinding::Code(code) => {
                let diag_name = format!("<extvar:{name}>");
                match self.vm.load_program(&diag_name, &code, None) {
                    Ok((thunk, _)) => thunk,
                    Err(e) => {
                        return Err(self.error(
                            span,
                            format!(
                                "failed to load external variable {name}: {} {}",
                                e.location, e.message
                            ),
                        ));
                    }
                }
            }
            ExtBinding::Node(ast) => self.vm.ast_thunk(&ast),
        };
        self.vm.ext_thunks.insert(name.to_owned(), thunk.clone());
        self.force(&thunk, span)
    }

    /// Calls a registered native function with deeply evaluated JSON
    /// arguments, recording the result for the notifier.
    pub(crate) fn call_native(
        &mut self,
        name: &Name,
        args: &[Thunk],
        span: Span,
    ) -> eval::EvalResult<Value> {
        let mut json_args = Vec::with_capacity(args.len());
        for thunk in args {
            let value = self.force(&thunk.clone(), span)?;
            json_args.push(self.value_to_json(&value, span)?);
        }
        let entry = self
            .vm
            .native_funcs
            .get(name)
            .expect("native function vanished from the table")
            .clone();
        let result = (entry.func.borrow_mut())(&json_args);
        match result {
            Ok(json) => {
                let value = self.vm.json_to_value(&json);
                if self.vm.notifier.is_some() {
                    self.vm.native_records.push(NativeRecord {
                        name: name.clone(),
                        args: json_args,
                        value: value.clone(),
                        json,
                        notified: Cell::new(false),
                    });
                }
                Ok(value)
            }
            Err(message) => {
                Err(self.error(span, format!("native function {name} failed: {message}")))
            }
        }
    }
}
