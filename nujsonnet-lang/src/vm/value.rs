//! Runtime values, thunks, environments and the object model.
//!
//! Thunks and composites are `Rc`-shared; the only interior mutability is
//! the thunk state machine (`Pending → InProgress → Done | Failed`), the
//! per-composite memo cells, and deferred environment initialization for
//! mutually recursive bindings. Cycles between `self` and field closures
//! are cut by the `InProgress` sentinel, so no collector is needed.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Visibility;
use crate::core;
use crate::error::RuntimeError;
use crate::Name;

#[derive(Clone)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<ArrayData>),
    Object(Rc<ObjData>),
    Func(Rc<FuncData>),
}

pub(crate) type ArrayData = Vec<Thunk>;

impl Value {
    pub(crate) fn type_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Func(_) => "function",
        }
    }

    pub(crate) fn from_char(chr: char) -> Self {
        let mut buf = [0; 4];
        Self::Str((&*chr.encode_utf8(&mut buf)).into())
    }
}

/// A memoized lazy computation with identity.
#[derive(Clone)]
pub(crate) struct Thunk(Rc<ThunkData>);

pub(crate) struct ThunkData {
    state: RefCell<ThunkState>,
}

enum ThunkState {
    Pending(Pending),
    InProgress,
    Done(Value),
    Failed(RuntimeError),
}

pub(crate) enum Pending {
    Expr {
        expr: Rc<core::Expr>,
        env: Env,
    },
    /// An inherited `+:` field: `super.<name> + <expr>`.
    FieldPlus {
        expr: Rc<core::Expr>,
        name: Name,
        env: Env,
    },
    /// A suspended call with already-built argument thunks; used by lazy
    /// builtins such as `std.makeArray` and `std.map`.
    Call {
        func: Rc<FuncData>,
        args: Vec<Thunk>,
        span: crate::span::Span,
    },
}

/// What [`Thunk::begin_force`] found.
pub(crate) enum ForceState {
    Done(Value),
    Failed(RuntimeError),
    /// The thunk was pending; it is now `InProgress` and the caller must
    /// finish with [`Thunk::set_done`] or [`Thunk::set_failed`].
    Start(Pending),
    /// Already `InProgress`: the computation depends on itself.
    Cycle,
}

impl Thunk {
    #[must_use]
    pub(crate) fn done(value: Value) -> Self {
        Self(Rc::new(ThunkData {
            state: RefCell::new(ThunkState::Done(value)),
        }))
    }

    #[must_use]
    pub(crate) fn pending(expr: Rc<core::Expr>, env: Env) -> Self {
        Self(Rc::new(ThunkData {
            state: RefCell::new(ThunkState::Pending(Pending::Expr { expr, env })),
        }))
    }

    #[must_use]
    pub(crate) fn field_plus(expr: Rc<core::Expr>, name: Name, env: Env) -> Self {
        Self(Rc::new(ThunkData {
            state: RefCell::new(ThunkState::Pending(Pending::FieldPlus { expr, name, env })),
        }))
    }

    #[must_use]
    pub(crate) fn call(func: Rc<FuncData>, args: Vec<Thunk>, span: crate::span::Span) -> Self {
        Self(Rc::new(ThunkData {
            state: RefCell::new(ThunkState::Pending(Pending::Call { func, args, span })),
        }))
    }

    pub(crate) fn begin_force(&self) -> ForceState {
        let mut state = self.0.state.borrow_mut();
        match *state {
            ThunkState::Done(ref value) => ForceState::Done(value.clone()),
            ThunkState::Failed(ref e) => ForceState::Failed(e.clone()),
            ThunkState::InProgress => ForceState::Cycle,
            ThunkState::Pending(_) => {
                let ThunkState::Pending(pending) =
                    std::mem::replace(&mut *state, ThunkState::InProgress)
                else {
                    unreachable!();
                };
                ForceState::Start(pending)
            }
        }
    }

    pub(crate) fn set_done(&self, value: Value) {
        let mut state = self.0.state.borrow_mut();
        assert!(matches!(*state, ThunkState::InProgress));
        *state = ThunkState::Done(value);
    }

    pub(crate) fn set_failed(&self, error: RuntimeError) {
        let mut state = self.0.state.borrow_mut();
        assert!(matches!(*state, ThunkState::InProgress));
        *state = ThunkState::Failed(error);
    }
}

/// An immutable chain of bindings plus the distinguished `self`/`super`
/// slot. Extension shares the tail by reference.
#[derive(Clone)]
pub(crate) struct Env(Rc<EnvCell>);

struct EnvCell {
    data: OnceCell<EnvData>,
}

pub(crate) struct EnvData {
    pub(crate) parent: Option<Env>,
    pub(crate) vars: HashMap<Name, Thunk>,
    pub(crate) obj: Option<ObjCtx>,
}

/// The object context of an environment: the composite `self` entered at
/// field lookup, the layer the running field body was defined in (which
/// determines `super`), and the `$` object.
#[derive(Clone)]
pub(crate) struct ObjCtx {
    pub(crate) this: Rc<ObjData>,
    pub(crate) layer: usize,
    pub(crate) top: Rc<ObjData>,
}

impl Env {
    /// An environment whose data is supplied later, so mutually recursive
    /// bindings can capture it before it is filled.
    #[must_use]
    pub(crate) fn deferred() -> Self {
        Self(Rc::new(EnvCell {
            data: OnceCell::new(),
        }))
    }

    pub(crate) fn set_data(&self, data: EnvData) {
        if self.0.data.set(data).is_err() {
            panic!("environment data already set");
        }
    }

    #[must_use]
    pub(crate) fn from_data(data: EnvData) -> Self {
        let env = Self::deferred();
        env.set_data(data);
        env
    }

    fn data(&self) -> &EnvData {
        self.0.data.get().expect("environment used before init")
    }

    #[must_use]
    pub(crate) fn lookup(&self, name: &str) -> Option<Thunk> {
        let mut env = self.clone();
        loop {
            let data = env.data();
            if let Some(thunk) = data.vars.get(name) {
                return Some(thunk.clone());
            }
            match data.parent {
                Some(ref parent) => {
                    let parent = parent.clone();
                    env = parent;
                }
                None => return None,
            }
        }
    }

    /// The nearest object context, if evaluation is inside one.
    #[must_use]
    pub(crate) fn obj_ctx(&self) -> Option<ObjCtx> {
        let mut env = self.clone();
        loop {
            let data = env.data();
            if let Some(ref ctx) = data.obj {
                return Some(ctx.clone());
            }
            match data.parent {
                Some(ref parent) => {
                    let parent = parent.clone();
                    env = parent;
                }
                None => return None,
            }
        }
    }

    #[must_use]
    pub(crate) fn with_obj(&self, ctx: ObjCtx) -> Self {
        Self::from_data(EnvData {
            parent: Some(self.clone()),
            vars: HashMap::new(),
            obj: Some(ctx),
        })
    }
}

/// A composite object: a list of layers, right-most (most derived) first.
/// `+` concatenates layer lists; field lookup scans left to right through
/// this vector, which corresponds to right-to-left through the `+` chain.
pub(crate) struct ObjData {
    pub(crate) layers: Vec<Layer>,
    /// All field names in code-point order with their resolved visibility.
    field_order: OnceCell<Rc<Vec<(Name, bool)>>>,
    /// Set once this composite's assertions have been started, so they run
    /// at most once per composite identity.
    pub(crate) asserts_checked: Cell<bool>,
}

pub(crate) struct Layer {
    /// Stable across composite re-assembly; provenance for the notifier.
    pub(crate) id: u64,
    /// Whether this layer's literal was the syntactic `$` capture point.
    pub(crate) is_top: bool,
    /// The literal this layer came from; `None` for synthetic objects
    /// built from already-evaluated values.
    pub(crate) core: Option<Rc<core::ObjectCore>>,
    pub(crate) base_env: Option<Env>,
    /// Memoized per-composite environment binding `self` to the composite
    /// this layer currently belongs to.
    pub(crate) env: OnceCell<Env>,
    pub(crate) fields: HashMap<Name, ObjField>,
}

pub(crate) struct ObjField {
    pub(crate) visibility: Visibility,
    pub(crate) plus: bool,
    /// `None` for prefilled value fields of synthetic objects.
    pub(crate) body: Option<Rc<core::Expr>>,
    /// Per-composite memo of the field value.
    pub(crate) thunk: OnceCell<Thunk>,
}

impl ObjData {
    #[must_use]
    pub(crate) fn from_layer(layer: Layer) -> Rc<Self> {
        let no_asserts = layer
            .core
            .as_ref()
            .map_or(true, |core| core.asserts.is_empty());
        Rc::new(Self {
            layers: vec![layer],
            field_order: OnceCell::new(),
            asserts_checked: Cell::new(no_asserts),
        })
    }

    /// A synthetic single-layer object with prefilled field values.
    #[must_use]
    pub(crate) fn simple(id: u64, fields: Vec<(Name, Visibility, Thunk)>) -> Rc<Self> {
        let fields = fields
            .into_iter()
            .map(|(name, visibility, thunk)| {
                (
                    name,
                    ObjField {
                        visibility,
                        plus: false,
                        body: None,
                        thunk: OnceCell::from(thunk),
                    },
                )
            })
            .collect();
        Rc::new(Self {
            layers: vec![Layer {
                id,
                is_top: false,
                core: None,
                base_env: None,
                env: OnceCell::new(),
                fields,
            }],
            field_order: OnceCell::new(),
            asserts_checked: Cell::new(true),
        })
    }

    /// The first layer at or left of `from_layer` defining `name`.
    #[must_use]
    pub(crate) fn find_field(
        &self,
        from_layer: usize,
        name: &str,
    ) -> Option<(usize, &ObjField)> {
        for (i, layer) in self.layers.iter().enumerate().skip(from_layer) {
            if let Some(field) = layer.fields.get(name) {
                return Some((i, field));
            }
        }
        None
    }

    #[must_use]
    pub(crate) fn has_field(&self, from_layer: usize, name: &str) -> bool {
        self.find_field(from_layer, name).is_some()
    }

    /// Resolved visibility: the right-most explicit `::`/`:::` wins over
    /// `:`, and `:::` forces visibility regardless of `::` further left.
    #[must_use]
    pub(crate) fn field_visible(&self, name: &str) -> bool {
        let mut found = false;
        for layer in &self.layers {
            if let Some(field) = layer.fields.get(name) {
                found = true;
                match field.visibility {
                    Visibility::Default => {}
                    Visibility::Hidden => return false,
                    Visibility::ForceVisible => return true,
                }
            }
        }
        found
    }

    /// All field names in Unicode code-point order, each with its resolved
    /// visibility.
    #[must_use]
    pub(crate) fn field_order(&self) -> Rc<Vec<(Name, bool)>> {
        self.field_order
            .get_or_init(|| {
                let mut all = std::collections::BTreeMap::<Name, Visibility>::new();
                for layer in &self.layers {
                    for (name, field) in &layer.fields {
                        match all.entry(name.clone()) {
                            std::collections::btree_map::Entry::Vacant(entry) => {
                                entry.insert(field.visibility);
                            }
                            std::collections::btree_map::Entry::Occupied(mut entry) => {
                                if *entry.get() == Visibility::Default {
                                    entry.insert(field.visibility);
                                }
                            }
                        }
                    }
                }
                Rc::new(
                    all.into_iter()
                        .map(|(name, vis)| (name, vis != Visibility::Hidden))
                        .collect(),
                )
            })
            .clone()
    }

    #[must_use]
    pub(crate) fn visible_fields(&self) -> Vec<Name> {
        self.field_order()
            .iter()
            .filter_map(|(name, visible)| visible.then(|| name.clone()))
            .collect()
    }

    #[must_use]
    pub(crate) fn has_asserts(&self) -> bool {
        self.layers
            .iter()
            .any(|l| l.core.as_ref().is_some_and(|c| !c.asserts.is_empty()))
    }

    /// Whether every layer of `part` is also a layer of `self`, i.e.
    /// `part` was one of the objects composed into `self`.
    #[must_use]
    pub(crate) fn contains_layers_of(&self, part: &ObjData) -> bool {
        part.layers
            .iter()
            .all(|p| self.layers.iter().any(|l| l.id == p.id))
    }
}

/// Composes two objects with `+`: the right operand's layers become the
/// most derived. Layers are cloned with fresh memo cells so that field
/// values are memoized per `(composite identity, field name)`; prefilled
/// value fields keep their thunks, which are environment-independent.
#[must_use]
pub(crate) fn extend_object(lhs: &Rc<ObjData>, rhs: &Rc<ObjData>) -> Rc<ObjData> {
    fn clone_layer(layer: &Layer) -> Layer {
        Layer {
            id: layer.id,
            is_top: layer.is_top,
            core: layer.core.clone(),
            base_env: layer.base_env.clone(),
            env: OnceCell::new(),
            fields: layer
                .fields
                .iter()
                .map(|(name, field)| {
                    (
                        name.clone(),
                        ObjField {
                            visibility: field.visibility,
                            plus: field.plus,
                            body: field.body.clone(),
                            thunk: if field.body.is_some() {
                                OnceCell::new()
                            } else {
                                field.thunk.clone()
                            },
                        },
                    )
                })
                .collect(),
        }
    }

    let mut layers = Vec::with_capacity(lhs.layers.len() + rhs.layers.len());
    layers.extend(rhs.layers.iter().map(clone_layer));
    layers.extend(lhs.layers.iter().map(clone_layer));
    let obj = ObjData {
        layers,
        field_order: OnceCell::new(),
        asserts_checked: Cell::new(false),
    };
    obj.asserts_checked.set(!obj.has_asserts());
    Rc::new(obj)
}

/// The per-composite environment of a layer: its defining environment
/// plus the object context. `self` is the composite the lookup entered,
/// `super` starts just left of this layer, and `$` is the composite if
/// the layer was a capture point, otherwise inherited.
#[must_use]
pub(crate) fn layer_env(this: &Rc<ObjData>, layer_i: usize) -> Env {
    let layer = &this.layers[layer_i];
    layer
        .env
        .get_or_init(|| {
            let base = layer
                .base_env
                .clone()
                .expect("synthetic layers have no expression fields");
            let top = if layer.is_top {
                this.clone()
            } else {
                base.obj_ctx().map_or_else(|| this.clone(), |ctx| ctx.top)
            };
            base.with_obj(ObjCtx {
                this: this.clone(),
                layer: layer_i,
                top,
            })
        })
        .clone()
}

/// The memoized thunk of field `name` looked up from `from_layer`, or
/// `None` if no layer defines it.
#[must_use]
pub(crate) fn field_thunk(
    this: &Rc<ObjData>,
    from_layer: usize,
    name: &Name,
) -> Option<Thunk> {
    let (found_layer, field) = this.find_field(from_layer, name)?;
    let thunk = field.thunk.get_or_init(|| {
        let body = field
            .body
            .as_ref()
            .expect("field has neither body nor value")
            .clone();
        let env = layer_env(this, found_layer);
        if field.plus && this.has_field(found_layer + 1, name) {
            Thunk::field_plus(body, name.clone(), env)
        } else {
            Thunk::pending(body, env)
        }
    });
    Some(thunk.clone())
}

pub(crate) struct FuncData {
    pub(crate) kind: FuncKind,
}

pub(crate) enum FuncKind {
    Normal {
        /// Display name for stack traces, set when the function was bound
        /// with `local name = function ...` or method sugar.
        name: Option<Name>,
        func: Rc<core::FuncCore>,
        env: Env,
    },
    Builtin(super::stdlib::Builtin),
    Native {
        name: Name,
        params: Rc<Vec<Name>>,
    },
}

impl FuncData {
    #[must_use]
    pub(crate) fn param_count(&self) -> usize {
        match &self.kind {
            FuncKind::Normal { func, .. } => func.params.len(),
            FuncKind::Builtin(builtin) => builtin.params().len(),
            FuncKind::Native { params, .. } => params.len(),
        }
    }

    /// `function <name>` context for stack traces.
    #[must_use]
    pub(crate) fn trace_context(&self) -> String {
        match &self.kind {
            FuncKind::Normal {
                name: Some(name), ..
            } => format!("function <{name}>"),
            FuncKind::Normal { name: None, .. } => "function <anonymous>".into(),
            FuncKind::Builtin(builtin) => format!("function <{}>", builtin.name()),
            FuncKind::Native { name, .. } => format!("function <{name}>"),
        }
    }
}
