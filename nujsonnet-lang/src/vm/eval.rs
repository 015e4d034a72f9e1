//! The recursive evaluator.
//!
//! Evaluates core-AST nodes in an environment, lazily: thunks memoize,
//! the `InProgress` sentinel turns self-dependency into the "infinite
//! recursion" error, and a cooperative call-depth budget turns runaway
//! recursion into "max stack frames exceeded.". The evaluator carries the
//! stack trace: one frame per active function call or field-body forcing,
//! each recording the call site and the caller's context (`$`,
//! `function <f>` or `object <f>`).

use std::collections::HashMap;
use std::rc::Rc;

use super::value::{
    extend_object, field_thunk, layer_env, ArrayData, Env, EnvData, ForceState, FuncData,
    FuncKind, ObjData, ObjField, Pending, Thunk, Value,
};
use super::Vm;
use crate::core;
use crate::error::{RuntimeError, StackFrame};
use crate::span::Span;
use crate::Name;

pub(crate) type EvalResult<T> = Result<T, RuntimeError>;

pub(crate) struct Evaluator<'a> {
    pub(crate) vm: &'a mut Vm,
    /// Active call frames: call-site span plus the *caller's* context.
    stack: Vec<Frame>,
    /// Context of the innermost running code.
    ctx: Rc<str>,
}

struct Frame {
    span: Span,
    ctx: Rc<str>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(vm: &'a mut Vm) -> Self {
        Self {
            vm,
            stack: Vec::new(),
            ctx: "$".into(),
        }
    }

    /// Builds a [`RuntimeError`] at `span`, capturing the current stack.
    pub(crate) fn error(&self, span: Span, message: String) -> RuntimeError {
        let mut frames = Vec::with_capacity(self.stack.len() + 1);
        frames.push(StackFrame {
            location: self.vm.source_map.describe(span),
            context: self.ctx.to_string(),
        });
        for frame in self.stack.iter().rev() {
            frames.push(StackFrame {
                location: self.vm.source_map.describe(frame.span),
                context: frame.ctx.to_string(),
            });
        }

        let max = self.vm.max_trace;
        if max > 0 && frames.len() > max {
            let keep_head = max - max / 2;
            let keep_tail = max / 2;
            let marker = StackFrame {
                location: "...".into(),
                context: "...".into(),
            };
            let tail_start = frames.len() - keep_tail;
            frames.splice(keep_head..tail_start, [marker]);
        }

        RuntimeError {
            message,
            stack: frames,
        }
    }

    fn push_frame(&mut self, call_span: Span, new_ctx: Rc<str>) -> EvalResult<()> {
        if self.stack.len() >= self.vm.max_stack {
            return Err(self.error(call_span, "max stack frames exceeded.".into()));
        }
        let caller_ctx = std::mem::replace(&mut self.ctx, new_ctx);
        self.stack.push(Frame {
            span: call_span,
            ctx: caller_ctx,
        });
        Ok(())
    }

    fn pop_frame(&mut self) {
        let frame = self.stack.pop().expect("frame stack underflow");
        self.ctx = frame.ctx;
    }

    /// Forces a thunk to a value. `span` is blamed for cycles.
    pub(crate) fn force(&mut self, thunk: &Thunk, span: Span) -> EvalResult<Value> {
        match thunk.begin_force() {
            ForceState::Done(value) => Ok(value),
            ForceState::Failed(e) => Err(e),
            ForceState::Cycle => Err(self.error(span, "infinite recursion".into())),
            ForceState::Start(pending) => {
                let result = match pending {
                    Pending::Expr { expr, env } => self.eval_expr(&expr, &env),
                    Pending::FieldPlus { expr, name, env } => {
                        self.eval_field_plus(&expr, &name, &env)
                    }
                    Pending::Call {
                        func,
                        args,
                        span: call_span,
                    } => self.call_function(&func, args, Vec::new(), call_span, false),
                };
                match result {
                    Ok(value) => {
                        thunk.set_done(value.clone());
                        Ok(value)
                    }
                    Err(e) => {
                        thunk.set_failed(e.clone());
                        Err(e)
                    }
                }
            }
        }
    }

    pub(crate) fn eval_expr(&mut self, expr: &Rc<core::Expr>, env: &Env) -> EvalResult<Value> {
        let span = expr.span;
        match expr.kind {
            core::ExprKind::Null => Ok(Value::Null),
            core::ExprKind::Bool(b) => Ok(Value::Bool(b)),
            core::ExprKind::Number(n) => Ok(Value::Number(n)),
            core::ExprKind::Str(ref s) => Ok(Value::Str(s.clone())),
            core::ExprKind::SelfObj => {
                let ctx = env.obj_ctx().expect("self outside an object");
                Ok(Value::Object(ctx.this))
            }
            core::ExprKind::TopObj => {
                let ctx = env.obj_ctx().expect("$ outside an object");
                Ok(Value::Object(ctx.top))
            }
            core::ExprKind::Var(ref name) => {
                let thunk = env.lookup(name).expect("unbound variable after analysis");
                self.force(&thunk, span)
            }
            core::ExprKind::Std(ref name) => self.std_field(name, span),
            core::ExprKind::Array(ref items) => {
                let thunks: ArrayData = items
                    .iter()
                    .map(|item| make_thunk(item, env, None))
                    .collect();
                Ok(Value::Array(Rc::new(thunks)))
            }
            core::ExprKind::Object(ref object) => self.eval_object(object, env),
            core::ExprKind::Index {
                ref target,
                ref index,
            } => {
                let target = self.eval_expr(target, env)?;
                let index = self.eval_expr(index, env)?;
                self.index_value(&target, &index, span)
            }
            core::ExprKind::SuperIndex { ref index } => {
                let ctx = env.obj_ctx().expect("super outside an object");
                let index = self.eval_expr(index, env)?;
                let Value::Str(ref name) = index else {
                    return Err(self.error(
                        span,
                        format!("super index must be a string, got {}", index.type_str()),
                    ));
                };
                self.object_field(&ctx.this, ctx.layer + 1, name, span)
            }
            core::ExprKind::InSuper { ref key } => {
                let ctx = env.obj_ctx().expect("super outside an object");
                let key = self.eval_expr(key, env)?;
                let Value::Str(ref name) = key else {
                    return Err(self.error(
                        span,
                        format!("'in super' requires a string, got {}", key.type_str()),
                    ));
                };
                Ok(Value::Bool(ctx.this.has_field(ctx.layer + 1, name)))
            }
            core::ExprKind::Call {
                ref callee,
                ref positional,
                ref named,
                tailstrict,
            } => {
                let callee_value = self.eval_expr(callee, env)?;
                let Value::Func(ref func) = callee_value else {
                    return Err(self.error(
                        span,
                        format!("only functions can be called, got {}", callee_value.type_str()),
                    ));
                };
                let pos_args: Vec<Thunk> = positional
                    .iter()
                    .map(|arg| make_thunk(arg, env, None))
                    .collect();
                let named_args: Vec<(Name, Thunk)> = named
                    .iter()
                    .map(|(name, arg)| (name.clone(), make_thunk(arg, env, None)))
                    .collect();
                self.call_function(func, pos_args, named_args, span, tailstrict)
            }
            core::ExprKind::Func(ref func) => Ok(Value::Func(Rc::new(FuncData {
                kind: FuncKind::Normal {
                    name: None,
                    func: func.clone(),
                    env: env.clone(),
                },
            }))),
            core::ExprKind::Local {
                ref binds,
                ref body,
            } => {
                let env = bind_locals(binds, env);
                self.eval_expr(body, &env)
            }
            core::ExprKind::If {
                ref cond,
                ref then_body,
                ref else_body,
            } => {
                let cond_value = self.eval_expr(cond, env)?;
                match cond_value {
                    Value::Bool(true) => self.eval_expr(then_body, env),
                    Value::Bool(false) => self.eval_expr(else_body, env),
                    _ => Err(self.error(
                        cond.span,
                        format!("condition must be a boolean, got {}", cond_value.type_str()),
                    )),
                }
            }
            core::ExprKind::Binary {
                op,
                ref lhs,
                ref rhs,
            } => self.eval_binary(op, lhs, rhs, env, span),
            core::ExprKind::Unary { op, ref arg } => {
                let value = self.eval_expr(arg, env)?;
                self.unary_value(op, &value, span)
            }
            core::ExprKind::Error { ref msg } => {
                let value = self.eval_expr(msg, env)?;
                let message = self.coerce_to_string(&value, span)?;
                Err(self.error(span, message.to_string()))
            }
            core::ExprKind::Import { ref path } => self.import_code(path, span),
            core::ExprKind::ImportStr { ref path } => {
                let (contents, _) = self.resolve_import(path, span)?;
                match contents.as_str() {
                    Some(s) => Ok(Value::Str(s.into())),
                    None => {
                        Err(self.error(span, format!("import {path:?} is not valid UTF-8")))
                    }
                }
            }
            core::ExprKind::ImportBin { ref path } => {
                let (contents, _) = self.resolve_import(path, span)?;
                let items: ArrayData = contents
                    .as_bytes()
                    .iter()
                    .map(|&b| Thunk::done(Value::Number(f64::from(b))))
                    .collect();
                Ok(Value::Array(Rc::new(items)))
            }
        }
    }

    fn eval_object(&mut self, object: &Rc<core::ObjectCore>, env: &Env) -> EvalResult<Value> {
        let mut fields = HashMap::with_capacity(object.fields.len());
        for field in &object.fields {
            let name: Name = match field.name {
                core::FieldNameCore::Fixed(ref name) => name.clone(),
                core::FieldNameCore::Dyn(ref name_expr) => {
                    match self.eval_expr(name_expr, env)? {
                        Value::Str(name) => name,
                        Value::Null => continue,
                        value => {
                            return Err(self.error(
                                field.name_span,
                                format!(
                                    "field name must be a string, got {}",
                                    value.type_str()
                                ),
                            ));
                        }
                    }
                }
            };
            if fields.contains_key(&name) {
                return Err(self.error(
                    field.name_span,
                    format!("duplicate field name: \"{name}\""),
                ));
            }
            fields.insert(
                name,
                ObjField {
                    visibility: field.visibility,
                    plus: field.plus,
                    body: Some(field.body.clone()),
                    thunk: std::cell::OnceCell::new(),
                },
            );
        }
        let layer = super::value::Layer {
            id: self.vm.next_obj_id(),
            is_top: object.is_top,
            core: Some(object.clone()),
            base_env: Some(env.clone()),
            env: std::cell::OnceCell::new(),
            fields,
        };
        Ok(Value::Object(ObjData::from_layer(layer)))
    }

    /// Looks up and forces a field, entering the `object <name>` context.
    pub(crate) fn object_field(
        &mut self,
        obj: &Rc<ObjData>,
        from_layer: usize,
        name: &Name,
        span: Span,
    ) -> EvalResult<Value> {
        let Some(thunk) = field_thunk(obj, from_layer, name) else {
            return Err(self.error(span, format!("field does not exist: {name}")));
        };
        self.push_frame(span, format!("object <{name}>").into())?;
        let result = self.force(&thunk, span);
        self.pop_frame();
        result
    }

    fn eval_field_plus(
        &mut self,
        expr: &Rc<core::Expr>,
        name: &Name,
        env: &Env,
    ) -> EvalResult<Value> {
        let ctx = env.obj_ctx().expect("inherited field outside an object");
        let base = self.object_field(&ctx.this, ctx.layer + 1, name, expr.span)?;
        let value = self.eval_expr(expr, env)?;
        self.add_values(&base, &value, expr.span)
    }

    fn index_value(&mut self, target: &Value, index: &Value, span: Span) -> EvalResult<Value> {
        match (target, index) {
            (Value::Object(obj), Value::Str(name)) => self.object_field(obj, 0, name, span),
            (Value::Object(_), _) => Err(self.error(
                span,
                format!("object index must be a string, got {}", index.type_str()),
            )),
            (Value::Array(items), Value::Number(n)) => {
                let i = self.index_to_usize(*n, items.len(), span)?;
                self.force(&items[i].clone(), span)
            }
            (Value::Array(_), _) => Err(self.error(
                span,
                format!("array index must be a number, got {}", index.type_str()),
            )),
            (Value::Str(s), Value::Number(n)) => {
                let len = s.chars().count();
                let i = self.index_to_usize(*n, len, span)?;
                Ok(Value::from_char(s.chars().nth(i).unwrap()))
            }
            (Value::Str(_), _) => Err(self.error(
                span,
                format!("string index must be a number, got {}", index.type_str()),
            )),
            _ => Err(self.error(
                span,
                format!(
                    "cannot index {} with {}",
                    target.type_str(),
                    index.type_str()
                ),
            )),
        }
    }

    fn index_to_usize(&self, n: f64, len: usize, span: Span) -> EvalResult<usize> {
        if n.trunc() != n {
            return Err(self.error(span, format!("index must be an integer, got {n}")));
        }
        if n < 0.0 {
            return Err(self.error(span, format!("index must be non-negative, got {n}")));
        }
        let i = n as usize;
        if i >= len {
            return Err(self.error(span, format!("index {n} out of bounds [0, {len})")));
        }
        Ok(i)
    }

    fn eval_binary(
        &mut self,
        op: core::BinaryOp,
        lhs: &Rc<core::Expr>,
        rhs: &Rc<core::Expr>,
        env: &Env,
        span: Span,
    ) -> EvalResult<Value> {
        match op {
            core::BinaryOp::LogicAnd => {
                let l = self.eval_expr(lhs, env)?;
                match l {
                    Value::Bool(false) => Ok(Value::Bool(false)),
                    Value::Bool(true) => {
                        let r = self.eval_expr(rhs, env)?;
                        match r {
                            Value::Bool(b) => Ok(Value::Bool(b)),
                            _ => Err(self.binary_type_error(op, &l, &r, span)),
                        }
                    }
                    _ => Err(self.error(
                        span,
                        format!("binary operator && requires a boolean, got {}", l.type_str()),
                    )),
                }
            }
            core::BinaryOp::LogicOr => {
                let l = self.eval_expr(lhs, env)?;
                match l {
                    Value::Bool(true) => Ok(Value::Bool(true)),
                    Value::Bool(false) => {
                        let r = self.eval_expr(rhs, env)?;
                        match r {
                            Value::Bool(b) => Ok(Value::Bool(b)),
                            _ => Err(self.binary_type_error(op, &l, &r, span)),
                        }
                    }
                    _ => Err(self.error(
                        span,
                        format!("binary operator || requires a boolean, got {}", l.type_str()),
                    )),
                }
            }
            _ => {
                let l = self.eval_expr(lhs, env)?;
                let r = self.eval_expr(rhs, env)?;
                self.binary_values(op, &l, &r, span)
            }
        }
    }

    fn binary_type_error(
        &self,
        op: core::BinaryOp,
        lhs: &Value,
        rhs: &Value,
        span: Span,
    ) -> RuntimeError {
        self.error(
            span,
            format!(
                "binary operator {} does not operate on {} and {}",
                op.as_str(),
                lhs.type_str(),
                rhs.type_str()
            ),
        )
    }

    pub(crate) fn binary_values(
        &mut self,
        op: core::BinaryOp,
        l: &Value,
        r: &Value,
        span: Span,
    ) -> EvalResult<Value> {
        match op {
            core::BinaryOp::Add => self.add_values(l, r, span),
            core::BinaryOp::Sub | core::BinaryOp::Mul | core::BinaryOp::Div => {
                let (Value::Number(a), Value::Number(b)) = (l, r) else {
                    return Err(self.binary_type_error(op, l, r, span));
                };
                if op == core::BinaryOp::Div && *b == 0.0 {
                    return Err(self.error(span, "division by zero".into()));
                }
                let result = match op {
                    core::BinaryOp::Sub => a - b,
                    core::BinaryOp::Mul => a * b,
                    _ => a / b,
                };
                self.check_number(result, span)
            }
            core::BinaryOp::Shl
            | core::BinaryOp::Shr
            | core::BinaryOp::BitAnd
            | core::BinaryOp::BitOr
            | core::BinaryOp::BitXor => {
                let (Value::Number(a), Value::Number(b)) = (l, r) else {
                    return Err(self.binary_type_error(op, l, r, span));
                };
                let a = to_u32(*a);
                let b = to_u32(*b);
                let result = match op {
                    core::BinaryOp::Shl => a << (b & 31),
                    core::BinaryOp::Shr => a >> (b & 31),
                    core::BinaryOp::BitAnd => a & b,
                    core::BinaryOp::BitOr => a | b,
                    _ => a ^ b,
                };
                Ok(Value::Number(f64::from(result)))
            }
            core::BinaryOp::Lt | core::BinaryOp::Le | core::BinaryOp::Gt | core::BinaryOp::Ge => {
                let ord = self.cmp_values(l, r, span)?;
                Ok(Value::Bool(match op {
                    core::BinaryOp::Lt => ord.is_lt(),
                    core::BinaryOp::Le => ord.is_le(),
                    core::BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                }))
            }
            core::BinaryOp::Eq => Ok(Value::Bool(self.values_equal(l, r, span)?)),
            core::BinaryOp::Ne => Ok(Value::Bool(!self.values_equal(l, r, span)?)),
            core::BinaryOp::In => match (l, r) {
                (Value::Str(name), Value::Object(obj)) => {
                    Ok(Value::Bool(obj.has_field(0, name)))
                }
                _ => Err(self.binary_type_error(op, l, r, span)),
            },
            core::BinaryOp::LogicAnd | core::BinaryOp::LogicOr => {
                unreachable!("short-circuit operators handled in eval_binary")
            }
        }
    }

    pub(crate) fn add_values(&mut self, l: &Value, r: &Value, span: Span) -> EvalResult<Value> {
        match (l, r) {
            (Value::Number(a), Value::Number(b)) => self.check_number(a + b, span),
            (Value::Str(a), Value::Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Value::Str(s.into()))
            }
            (Value::Str(a), _) => {
                let b = self.coerce_to_string(r, span)?;
                Ok(Value::Str(format!("{a}{b}").into()))
            }
            (_, Value::Str(b)) => {
                let a = self.coerce_to_string(l, span)?;
                Ok(Value::Str(format!("{a}{b}").into()))
            }
            (Value::Array(a), Value::Array(b)) => {
                let mut items = Vec::with_capacity(a.len() + b.len());
                items.extend(a.iter().cloned());
                items.extend(b.iter().cloned());
                Ok(Value::Array(Rc::new(items)))
            }
            (Value::Object(a), Value::Object(b)) => Ok(Value::Object(extend_object(a, b))),
            _ => Err(self.binary_type_error(core::BinaryOp::Add, l, r, span)),
        }
    }

    fn unary_value(&mut self, op: core::UnaryOp, value: &Value, span: Span) -> EvalResult<Value> {
        match (op, value) {
            (core::UnaryOp::Minus, Value::Number(n)) => Ok(Value::Number(-n)),
            (core::UnaryOp::Plus, Value::Number(n)) => Ok(Value::Number(*n)),
            (core::UnaryOp::BitNot, Value::Number(n)) => {
                Ok(Value::Number(f64::from(!to_u32(*n))))
            }
            (core::UnaryOp::LogicNot, Value::Bool(b)) => Ok(Value::Bool(!b)),
            _ => Err(self.error(
                span,
                format!(
                    "unary operator {} does not operate on {}",
                    op.as_str(),
                    value.type_str()
                ),
            )),
        }
    }

    pub(crate) fn check_number(&self, n: f64, span: Span) -> EvalResult<Value> {
        if n.is_nan() {
            Err(self.error(span, "not a number".into()))
        } else if n.is_infinite() {
            Err(self.error(span, "numeric overflow".into()))
        } else {
            Ok(Value::Number(n))
        }
    }

    /// Structural equality. Functions never compare; NaN is unequal to
    /// itself; arrays and objects force their elements / visible fields.
    pub(crate) fn values_equal(&mut self, l: &Value, r: &Value, span: Span) -> EvalResult<bool> {
        match (l, r) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Number(a), Value::Number(b)) => Ok(a == b),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Array(a), Value::Array(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    let x = self.force(&x.clone(), span)?;
                    let y = self.force(&y.clone(), span)?;
                    if !self.values_equal(&x, &y, span)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Object(a), Value::Object(b)) => {
                let a_fields = a.visible_fields();
                let b_fields = b.visible_fields();
                if a_fields != b_fields {
                    return Ok(false);
                }
                for name in &a_fields {
                    let x = self.object_field(a, 0, name, span)?;
                    let y = self.object_field(b, 0, name, span)?;
                    if !self.values_equal(&x, &y, span)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Func(_), _) | (_, Value::Func(_)) => {
                Err(self.error(span, "cannot test equality of functions".into()))
            }
            _ => Ok(false),
        }
    }

    /// Total order on numbers, strings and arrays (lexicographic);
    /// everything else is an error.
    pub(crate) fn cmp_values(
        &mut self,
        l: &Value,
        r: &Value,
        span: Span,
    ) -> EvalResult<std::cmp::Ordering> {
        match (l, r) {
            (Value::Number(a), Value::Number(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| self.error(span, "cannot compare NaN".into())),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => {
                let common = a.len().min(b.len());
                for i in 0..common {
                    let x = self.force(&a[i].clone(), span)?;
                    let y = self.force(&b[i].clone(), span)?;
                    let ord = self.cmp_values(&x, &y, span)?;
                    if ord.is_ne() {
                        return Ok(ord);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => {
                if l.type_str() == r.type_str() {
                    Err(self.error(span, format!("cannot compare {}", l.type_str())))
                } else {
                    Err(self.error(
                        span,
                        format!("cannot compare {} with {}", l.type_str(), r.type_str()),
                    ))
                }
            }
        }
    }

    /// A string rendition of any manifestable value: strings verbatim,
    /// everything else compact JSON.
    pub(crate) fn coerce_to_string(&mut self, value: &Value, span: Span) -> EvalResult<Rc<str>> {
        if let Value::Str(s) = value {
            Ok(s.clone())
        } else {
            let mut out = String::new();
            self.manifest_json(value, &super::manifest::JsonFormat::compact(), 0, span, &mut out)?;
            Ok(out.into())
        }
    }

    pub(crate) fn call_function(
        &mut self,
        func: &Rc<FuncData>,
        pos_args: Vec<Thunk>,
        named_args: Vec<(Name, Thunk)>,
        span: Span,
        tailstrict: bool,
    ) -> EvalResult<Value> {
        match &func.kind {
            FuncKind::Normal {
                func: func_core,
                env,
                ..
            } => {
                let func_core = func_core.clone();
                let env = env.clone();
                let (call_env, arg_thunks) =
                    self.bind_args(&func_core.params, &env, pos_args, named_args, span)?;
                if tailstrict {
                    for thunk in &arg_thunks {
                        self.force(thunk, span)?;
                    }
                }
                self.push_frame(span, func.trace_context().into())?;
                let result = self.eval_expr(&func_core.body, &call_env);
                self.pop_frame();
                result
            }
            FuncKind::Builtin(builtin) => {
                let builtin = *builtin;
                let args =
                    self.bind_flat_args(builtin.params(), pos_args, named_args, span)?;
                self.push_frame(span, func.trace_context().into())?;
                let result = self.call_builtin(builtin, &args, span);
                self.pop_frame();
                result
            }
            FuncKind::Native { name, params } => {
                let name = name.clone();
                let params: Vec<&str> = params.iter().map(|p| &**p).collect();
                let args = self.bind_flat_args(&params, pos_args, named_args, span)?;
                self.push_frame(span, func.trace_context().into())?;
                let result = self.call_native(&name, &args, span);
                self.pop_frame();
                result
            }
        }
    }

    /// Binds positional and named arguments against a parameter list with
    /// defaults. Defaults are thunks in the call environment itself, so
    /// they see the other parameters (and evaluate lazily).
    fn bind_args(
        &mut self,
        params: &[(Name, Option<Rc<core::Expr>>)],
        closure_env: &Env,
        pos_args: Vec<Thunk>,
        named_args: Vec<(Name, Thunk)>,
        span: Span,
    ) -> EvalResult<(Env, Vec<Thunk>)> {
        if pos_args.len() > params.len() {
            return Err(self.error(
                span,
                format!(
                    "too many arguments, function has {} parameter(s)",
                    params.len()
                ),
            ));
        }
        let call_env = Env::deferred();
        let mut vars = HashMap::with_capacity(params.len());
        for (i, thunk) in pos_args.into_iter().enumerate() {
            vars.insert(params[i].0.clone(), thunk);
        }
        for (name, thunk) in named_args {
            if !params.iter().any(|(p, _)| *p == name) {
                return Err(self.error(span, format!("function has no parameter {name}")));
            }
            if vars.insert(name.clone(), thunk).is_some() {
                return Err(self.error(span, format!("duplicate argument: {name}")));
            }
        }
        for (name, default) in params {
            if !vars.contains_key(name) {
                match default {
                    Some(default) => {
                        vars.insert(
                            name.clone(),
                            Thunk::pending(default.clone(), call_env.clone()),
                        );
                    }
                    None => {
                        return Err(self.error(span, format!("Missing argument: {name}")));
                    }
                }
            }
        }
        let arg_thunks: Vec<Thunk> = params
            .iter()
            .map(|(name, _)| vars[name].clone())
            .collect();
        call_env.set_data(EnvData {
            parent: Some(closure_env.clone()),
            vars,
            obj: None,
        });
        Ok((call_env, arg_thunks))
    }

    /// Binds arguments for builtin and native functions: no defaults, all
    /// parameters required, result in declaration order.
    fn bind_flat_args(
        &mut self,
        params: &[&str],
        pos_args: Vec<Thunk>,
        named_args: Vec<(Name, Thunk)>,
        span: Span,
    ) -> EvalResult<Vec<Thunk>> {
        if pos_args.len() > params.len() {
            return Err(self.error(
                span,
                format!(
                    "too many arguments, function has {} parameter(s)",
                    params.len()
                ),
            ));
        }
        let mut slots: Vec<Option<Thunk>> = vec![None; params.len()];
        for (i, thunk) in pos_args.into_iter().enumerate() {
            slots[i] = Some(thunk);
        }
        for (name, thunk) in named_args {
            let Some(i) = params.iter().position(|p| **p == *name) else {
                return Err(self.error(span, format!("function has no parameter {name}")));
            };
            if slots[i].is_some() {
                return Err(self.error(span, format!("duplicate argument: {name}")));
            }
            slots[i] = Some(thunk);
        }
        let mut args = Vec::with_capacity(params.len());
        for (i, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(thunk) => args.push(thunk),
                None => {
                    return Err(
                        self.error(span, format!("Missing argument: {}", params[i]))
                    );
                }
            }
        }
        Ok(args)
    }

    /// Evaluates every assertion of every constituent of `obj`, once per
    /// composite identity.
    pub(crate) fn check_object_asserts(&mut self, obj: &Rc<ObjData>) -> EvalResult<()> {
        if obj.asserts_checked.get() {
            return Ok(());
        }
        obj.asserts_checked.set(true);
        for layer_i in 0..obj.layers.len() {
            let Some(object_core) = obj.layers[layer_i].core.clone() else {
                continue;
            };
            if object_core.asserts.is_empty() {
                continue;
            }
            let env = layer_env(obj, layer_i);
            for assert in &object_core.asserts {
                self.eval_expr(assert, &env)?;
            }
        }
        Ok(())
    }

    /// A field of the standard library object, bypassing user scope; used
    /// by desugar-generated calls and by the `std` root binding.
    pub(crate) fn std_field(&mut self, name: &Name, span: Span) -> EvalResult<Value> {
        let std_obj = self
            .vm
            .base_std
            .clone()
            .expect("standard library not initialized");
        self.object_field(&std_obj, 0, name, span)
    }

    fn resolve_import(
        &mut self,
        path: &str,
        span: Span,
    ) -> EvalResult<(crate::import::Contents, String)> {
        let from = self
            .vm
            .source_origins
            .get(&span.src)
            .cloned()
            .unwrap_or_default();
        let key = (from, path.to_owned());
        if let Some(found) = self.vm.import_resolutions.get(&key) {
            return Ok(found.clone());
        }
        match self.vm.importer.import(&key.0, path) {
            Ok(found) => {
                self.vm.import_resolutions.insert(key, found.clone());
                Ok(found)
            }
            Err(message) => Err(self.error(span, message)),
        }
    }

    fn import_code(&mut self, path: &str, span: Span) -> EvalResult<Value> {
        let (contents, resolved) = self.resolve_import(path, span)?;
        if let Some((thunk, _)) = self.vm.programs.get(&resolved) {
            let thunk = thunk.clone();
            return self.force(&thunk, span);
        }
        let Some(text) = contents.as_str() else {
            return Err(self.error(span, format!("import {path:?} is not valid UTF-8")));
        };
        let text = text.to_owned();
        let (thunk, root_span) = self
            .vm
            .load_program(&resolved, &text, Some(resolved.clone()))
            .map_err(|e| self.error(span, format!("{} {}", e.location, e.message)))?;
        self.vm.programs.insert(resolved, (thunk.clone(), root_span));
        self.force(&thunk, span)
    }
}

/// Converts a f64 to the 32-bit integer domain of the bitwise operators:
/// truncate toward zero, then wrap to `u32`.
fn to_u32(n: f64) -> u32 {
    (n.trunc() as i64) as u32
}

/// Builds a thunk for an expression, folding literal values and naming
/// function values after the binding they came from.
pub(crate) fn make_thunk(expr: &Rc<core::Expr>, env: &Env, name: Option<Name>) -> Thunk {
    match expr.kind {
        core::ExprKind::Null => Thunk::done(Value::Null),
        core::ExprKind::Bool(b) => Thunk::done(Value::Bool(b)),
        core::ExprKind::Number(n) => Thunk::done(Value::Number(n)),
        core::ExprKind::Str(ref s) => Thunk::done(Value::Str(s.clone())),
        core::ExprKind::Func(ref func) => Thunk::done(Value::Func(Rc::new(FuncData {
            kind: FuncKind::Normal {
                name,
                func: func.clone(),
                env: env.clone(),
            },
        }))),
        _ => Thunk::pending(expr.clone(), env.clone()),
    }
}

/// Extends `env` with mutually recursive bindings.
pub(crate) fn bind_locals(binds: &[(Name, Rc<core::Expr>)], env: &Env) -> Env {
    let new_env = Env::deferred();
    let mut vars = HashMap::with_capacity(binds.len());
    for (name, value) in binds {
        vars.insert(
            name.clone(),
            make_thunk(value, &new_env, Some(name.clone())),
        );
    }
    new_env.set_data(EnvData {
        parent: Some(env.clone()),
        vars,
        obj: None,
    });
    new_env
}
