//! Surface AST → core AST.
//!
//! Rewrites, per the language definition: comprehensions, slices, `%`,
//! statement asserts, `if` without `else`, method and function-bind sugar,
//! object-level locals (wrapped into every field and assert body), and
//! field-access sugar. Also performs the structural checks that need the
//! surface forms: `self`/`super`/`$` outside objects, duplicate locals,
//! fields and parameters, positional-after-named arguments, and import
//! path validation.

use std::collections::hash_map::Entry as HashMapEntry;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast;
use crate::core;
use crate::error::StaticError;
use crate::span::{SourceMap, Span};
use crate::token::StrKind;
use crate::Name;

pub(crate) fn desugar(
    map: &SourceMap,
    expr: &ast::Expr,
) -> Result<Rc<core::Expr>, StaticError> {
    Desugarer { map }.expr(expr, false)
}

struct Desugarer<'a> {
    map: &'a SourceMap,
}

impl Desugarer<'_> {
    fn err(&self, span: Span, message: String) -> StaticError {
        StaticError::new(self.map, span, message)
    }

    fn mk(&self, span: Span, kind: core::ExprKind) -> Rc<core::Expr> {
        Rc::new(core::Expr { span, kind })
    }

    fn std_call(
        &self,
        span: Span,
        name: &str,
        positional: Vec<Rc<core::Expr>>,
    ) -> Rc<core::Expr> {
        let callee = self.mk(span, core::ExprKind::Std(name.into()));
        self.mk(
            span,
            core::ExprKind::Call {
                callee,
                positional,
                named: Vec::new(),
                tailstrict: false,
            },
        )
    }

    fn expr(&self, expr: &ast::Expr, in_obj: bool) -> Result<Rc<core::Expr>, StaticError> {
        let span = expr.span;
        let kind = match expr.kind {
            ast::ExprKind::Null => core::ExprKind::Null,
            ast::ExprKind::True => core::ExprKind::Bool(true),
            ast::ExprKind::False => core::ExprKind::Bool(false),
            ast::ExprKind::SelfObj => {
                if !in_obj {
                    return Err(self.err(span, "can't use self outside of an object".into()));
                }
                core::ExprKind::SelfObj
            }
            ast::ExprKind::Dollar => {
                if !in_obj {
                    return Err(self.err(span, "can't use $ outside of an object".into()));
                }
                core::ExprKind::TopObj
            }
            ast::ExprKind::Str(ref value, _) => core::ExprKind::Str(value.as_str().into()),
            ast::ExprKind::Number(value) => core::ExprKind::Number(value),
            ast::ExprKind::Paren(ref inner) => return self.expr(inner, in_obj),
            ast::ExprKind::Object(ref inside) => {
                return self.obj_inside(inside, in_obj, span);
            }
            ast::ExprKind::Array(ref items) => {
                let items = items
                    .iter()
                    .map(|item| self.expr(item, in_obj))
                    .collect::<Result<Vec<_>, _>>()?;
                core::ExprKind::Array(items)
            }
            ast::ExprKind::ArrayComp(ref body, ref comp_spec) => {
                let body = self.expr(body, in_obj)?;
                let seed = self.mk(span, core::ExprKind::Array(vec![body]));
                return self.fold_comp_spec(seed, comp_spec, in_obj);
            }
            ast::ExprKind::Field(ref target, ref field) => {
                let target = self.expr(target, in_obj)?;
                let index = self.mk(field.span, core::ExprKind::Str(field.name.clone()));
                core::ExprKind::Index { target, index }
            }
            ast::ExprKind::Index(ref target, ref index) => {
                let target = self.expr(target, in_obj)?;
                let index = self.expr(index, in_obj)?;
                core::ExprKind::Index { target, index }
            }
            ast::ExprKind::Slice(ref target, ref start, ref end, ref step) => {
                let target = self.expr(target, in_obj)?;
                let mut args = vec![target];
                for part in [start, end, step] {
                    args.push(match part {
                        Some(e) => self.expr(e, in_obj)?,
                        None => self.mk(span, core::ExprKind::Null),
                    });
                }
                return Ok(self.std_call(span, "slice", args));
            }
            ast::ExprKind::SuperField(super_span, ref field) => {
                if !in_obj {
                    return Err(
                        self.err(super_span, "can't use super outside of an object".into())
                    );
                }
                let index = self.mk(field.span, core::ExprKind::Str(field.name.clone()));
                core::ExprKind::SuperIndex { index }
            }
            ast::ExprKind::SuperIndex(super_span, ref index) => {
                if !in_obj {
                    return Err(
                        self.err(super_span, "can't use super outside of an object".into())
                    );
                }
                let index = self.expr(index, in_obj)?;
                core::ExprKind::SuperIndex { index }
            }
            ast::ExprKind::Call {
                ref callee,
                ref args,
                tailstrict,
            } => {
                let callee = self.expr(callee, in_obj)?;
                let mut positional = Vec::new();
                let mut named = Vec::new();
                for arg in args {
                    match arg {
                        ast::Arg::Positional(value) => {
                            if !named.is_empty() {
                                return Err(self.err(
                                    value.span,
                                    "positional argument after a named argument is not allowed"
                                        .into(),
                                ));
                            }
                            positional.push(self.expr(value, in_obj)?);
                        }
                        ast::Arg::Named(name, value) => {
                            named.push((name.name.clone(), self.expr(value, in_obj)?));
                        }
                    }
                }
                core::ExprKind::Call {
                    callee,
                    positional,
                    named,
                    tailstrict,
                }
            }
            ast::ExprKind::Var(ref ident) => core::ExprKind::Var(ident.name.clone()),
            ast::ExprKind::Local(ref binds, ref body) => {
                self.check_duplicate_binds(binds)?;
                let binds = binds
                    .iter()
                    .map(|bind| {
                        Ok((bind.name.name.clone(), self.bind_value(bind, in_obj)?))
                    })
                    .collect::<Result<Vec<_>, StaticError>>()?;
                let body = self.expr(body, in_obj)?;
                core::ExprKind::Local { binds, body }
            }
            ast::ExprKind::If(ref cond, ref then_body, ref else_body) => {
                let cond = self.expr(cond, in_obj)?;
                let then_body = self.expr(then_body, in_obj)?;
                let else_body = match else_body {
                    Some(e) => self.expr(e, in_obj)?,
                    None => self.mk(span, core::ExprKind::Null),
                };
                core::ExprKind::If {
                    cond,
                    then_body,
                    else_body,
                }
            }
            ast::ExprKind::Binary(ref lhs, op, ref rhs) => {
                let lhs = self.expr(lhs, in_obj)?;
                let rhs = self.expr(rhs, in_obj)?;
                let op = match op {
                    ast::BinaryOp::Rem => {
                        return Ok(self.std_call(span, "mod", vec![lhs, rhs]));
                    }
                    ast::BinaryOp::Add => core::BinaryOp::Add,
                    ast::BinaryOp::Sub => core::BinaryOp::Sub,
                    ast::BinaryOp::Mul => core::BinaryOp::Mul,
                    ast::BinaryOp::Div => core::BinaryOp::Div,
                    ast::BinaryOp::Shl => core::BinaryOp::Shl,
                    ast::BinaryOp::Shr => core::BinaryOp::Shr,
                    ast::BinaryOp::Lt => core::BinaryOp::Lt,
                    ast::BinaryOp::Le => core::BinaryOp::Le,
                    ast::BinaryOp::Gt => core::BinaryOp::Gt,
                    ast::BinaryOp::Ge => core::BinaryOp::Ge,
                    ast::BinaryOp::Eq => core::BinaryOp::Eq,
                    ast::BinaryOp::Ne => core::BinaryOp::Ne,
                    ast::BinaryOp::In => core::BinaryOp::In,
                    ast::BinaryOp::BitAnd => core::BinaryOp::BitAnd,
                    ast::BinaryOp::BitOr => core::BinaryOp::BitOr,
                    ast::BinaryOp::BitXor => core::BinaryOp::BitXor,
                    ast::BinaryOp::LogicAnd => core::BinaryOp::LogicAnd,
                    ast::BinaryOp::LogicOr => core::BinaryOp::LogicOr,
                };
                core::ExprKind::Binary { op, lhs, rhs }
            }
            ast::ExprKind::Unary(op, ref arg) => {
                let arg = self.expr(arg, in_obj)?;
                let op = match op {
                    ast::UnaryOp::Minus => core::UnaryOp::Minus,
                    ast::UnaryOp::Plus => core::UnaryOp::Plus,
                    ast::UnaryOp::BitNot => core::UnaryOp::BitNot,
                    ast::UnaryOp::LogicNot => core::UnaryOp::LogicNot,
                };
                core::ExprKind::Unary { op, arg }
            }
            ast::ExprKind::ObjExt(ref base, ref inside) => {
                let lhs = self.expr(base, in_obj)?;
                let rhs = self.obj_inside(inside, in_obj, span)?;
                core::ExprKind::Binary {
                    op: core::BinaryOp::Add,
                    lhs,
                    rhs,
                }
            }
            ast::ExprKind::Func(ref params, ref body) => {
                core::ExprKind::Func(self.func_core(params, body, in_obj)?)
            }
            ast::ExprKind::Assert(ref assert, ref rest) => {
                let cond = self.expr(&assert.cond, in_obj)?;
                let rest = self.expr(rest, in_obj)?;
                let else_body = self.assert_failure(assert, in_obj)?;
                core::ExprKind::If {
                    cond,
                    then_body: rest,
                    else_body,
                }
            }
            ast::ExprKind::Error(ref msg) => {
                let msg = self.expr(msg, in_obj)?;
                core::ExprKind::Error { msg }
            }
            ast::ExprKind::Import(ref path) => core::ExprKind::Import {
                path: self.import_path(path)?,
            },
            ast::ExprKind::ImportStr(ref path) => core::ExprKind::ImportStr {
                path: self.import_path(path)?,
            },
            ast::ExprKind::ImportBin(ref path) => core::ExprKind::ImportBin {
                path: self.import_path(path)?,
            },
            ast::ExprKind::InSuper(ref lhs, super_span) => {
                if !in_obj {
                    return Err(
                        self.err(super_span, "can't use super outside of an object".into())
                    );
                }
                let key = self.expr(lhs, in_obj)?;
                core::ExprKind::InSuper { key }
            }
        };
        Ok(self.mk(span, kind))
    }

    fn import_path(&self, path: &ast::Expr) -> Result<String, StaticError> {
        match path.kind {
            ast::ExprKind::Str(ref value, kind) => {
                if kind == StrKind::Block {
                    Err(self.err(
                        path.span,
                        "cannot use text blocks in import statements".into(),
                    ))
                } else {
                    Ok(value.clone())
                }
            }
            _ => Err(self.err(path.span, "computed imports are not allowed".into())),
        }
    }

    /// `error msg` (or `error "Assertion failed"`) for a failing assert.
    fn assert_failure(
        &self,
        assert: &ast::Assert,
        in_obj: bool,
    ) -> Result<Rc<core::Expr>, StaticError> {
        let msg = match assert.msg {
            Some(ref msg) => self.expr(msg, in_obj)?,
            None => self.mk(assert.span, core::ExprKind::Str("Assertion failed".into())),
        };
        Ok(self.mk(assert.span, core::ExprKind::Error { msg }))
    }

    fn check_duplicate_binds(&self, binds: &[ast::Bind]) -> Result<(), StaticError> {
        let mut seen = HashMap::<Name, Span>::new();
        for bind in binds {
            match seen.entry(bind.name.name.clone()) {
                HashMapEntry::Occupied(_) => {
                    return Err(self.err(
                        bind.name.span,
                        format!("duplicate local var: {}", bind.name.name),
                    ));
                }
                HashMapEntry::Vacant(entry) => {
                    entry.insert(bind.name.span);
                }
            }
        }
        Ok(())
    }

    fn bind_value(&self, bind: &ast::Bind, in_obj: bool) -> Result<Rc<core::Expr>, StaticError> {
        if let Some(ref params) = bind.params {
            let func = self.func_core(params, &bind.value, in_obj)?;
            Ok(self.mk(bind.value.span, core::ExprKind::Func(func)))
        } else {
            self.expr(&bind.value, in_obj)
        }
    }

    fn func_core(
        &self,
        params: &[ast::Param],
        body: &ast::Expr,
        in_obj: bool,
    ) -> Result<Rc<core::FuncCore>, StaticError> {
        let mut seen = HashMap::<Name, Span>::new();
        for param in params {
            match seen.entry(param.name.name.clone()) {
                HashMapEntry::Occupied(_) => {
                    return Err(self.err(
                        param.name.span,
                        format!("duplicate parameter: {}", param.name.name),
                    ));
                }
                HashMapEntry::Vacant(entry) => {
                    entry.insert(param.name.span);
                }
            }
        }
        let params = params
            .iter()
            .map(|param| {
                let default = param
                    .default
                    .as_ref()
                    .map(|d| self.expr(d, in_obj))
                    .transpose()?;
                Ok((param.name.name.clone(), default))
            })
            .collect::<Result<Vec<_>, StaticError>>()?;
        let body = self.expr(body, in_obj)?;
        Ok(Rc::new(core::FuncCore { params, body }))
    }

    /// Folds a comprehension spec around `seed` (an array expression
    /// mentioning the comprehension variables), producing nested
    /// `std.flatMap` calls and `if` filters.
    fn fold_comp_spec(
        &self,
        seed: Rc<core::Expr>,
        comp_spec: &[ast::CompSpecPart],
        in_obj: bool,
    ) -> Result<Rc<core::Expr>, StaticError> {
        let mut acc = seed;
        for part in comp_spec.iter().rev() {
            match part {
                ast::CompSpecPart::For(for_spec) => {
                    let inner = self.expr(&for_spec.inner, in_obj)?;
                    let func = Rc::new(core::FuncCore {
                        params: vec![(for_spec.var.name.clone(), None)],
                        body: acc.clone(),
                    });
                    let func = self.mk(for_spec.inner.span, core::ExprKind::Func(func));
                    acc = self.std_call(for_spec.inner.span, "flatMap", vec![func, inner]);
                }
                ast::CompSpecPart::If(if_spec) => {
                    let cond = self.expr(&if_spec.cond, in_obj)?;
                    let empty = self.mk(if_spec.cond.span, core::ExprKind::Array(Vec::new()));
                    acc = self.mk(
                        if_spec.cond.span,
                        core::ExprKind::If {
                            cond,
                            then_body: acc.clone(),
                            else_body: empty,
                        },
                    );
                }
            }
        }
        Ok(acc)
    }

    /// Wraps `body` in `local <locals> in body` when the object carries
    /// locals, so field and assert bodies see them (and they see `self`).
    fn wrap_locals(
        &self,
        locals: &[(Name, Rc<core::Expr>)],
        body: Rc<core::Expr>,
    ) -> Rc<core::Expr> {
        if locals.is_empty() {
            body
        } else {
            self.mk(
                body.span,
                core::ExprKind::Local {
                    binds: locals.to_vec(),
                    body,
                },
            )
        }
    }

    fn desugar_obj_locals(
        &self,
        locals: &[&ast::ObjLocal],
    ) -> Result<Vec<(Name, Rc<core::Expr>)>, StaticError> {
        let mut seen = HashMap::<Name, Span>::new();
        for local in locals {
            match seen.entry(local.bind.name.name.clone()) {
                HashMapEntry::Occupied(_) => {
                    return Err(self.err(
                        local.bind.name.span,
                        format!("duplicate local var: {}", local.bind.name.name),
                    ));
                }
                HashMapEntry::Vacant(entry) => {
                    entry.insert(local.bind.name.span);
                }
            }
        }
        locals
            .iter()
            .map(|local| {
                Ok((
                    local.bind.name.name.clone(),
                    self.bind_value(&local.bind, true)?,
                ))
            })
            .collect()
    }

    fn obj_inside(
        &self,
        inside: &ast::ObjInside,
        in_obj: bool,
        span: Span,
    ) -> Result<Rc<core::Expr>, StaticError> {
        match *inside {
            ast::ObjInside::Members(ref members) => {
                let local_members: Vec<&ast::ObjLocal> = members
                    .iter()
                    .filter_map(|m| match m {
                        ast::Member::Local(local) => Some(local),
                        _ => None,
                    })
                    .collect();
                let locals = self.desugar_obj_locals(&local_members)?;

                let mut fields = Vec::<core::FieldCore>::new();
                let mut asserts = Vec::new();
                let mut fixed_names = HashMap::<Name, Span>::new();
                for member in members {
                    match member {
                        ast::Member::Local(_) => {}
                        ast::Member::Assert(assert) => {
                            let cond = self.expr(&assert.cond, true)?;
                            let else_body = self.assert_failure(assert, true)?;
                            let body = self.mk(
                                assert.span,
                                core::ExprKind::If {
                                    cond,
                                    then_body: self.mk(assert.span, core::ExprKind::Null),
                                    else_body,
                                },
                            );
                            asserts.push(self.wrap_locals(&locals, body));
                        }
                        ast::Member::Field(field) => {
                            let (name, name_span) = match field.name {
                                ast::FieldName::Ident(ref ident) => (
                                    core::FieldNameCore::Fixed(ident.name.clone()),
                                    ident.span,
                                ),
                                ast::FieldName::Str(ref value, name_span) => (
                                    core::FieldNameCore::Fixed(value.as_str().into()),
                                    name_span,
                                ),
                                ast::FieldName::Computed(ref name, name_span) => (
                                    core::FieldNameCore::Dyn(self.expr(name, in_obj)?),
                                    name_span,
                                ),
                            };
                            if let core::FieldNameCore::Fixed(ref name) = name {
                                match fixed_names.entry(name.clone()) {
                                    HashMapEntry::Occupied(_) => {
                                        return Err(self.err(
                                            name_span,
                                            format!("duplicate field: \"{name}\""),
                                        ));
                                    }
                                    HashMapEntry::Vacant(entry) => {
                                        entry.insert(name_span);
                                    }
                                }
                            }

                            let body = if let Some(ref params) = field.params {
                                let func = self.func_core(params, &field.value, true)?;
                                self.mk(field.value.span, core::ExprKind::Func(func))
                            } else {
                                self.expr(&field.value, true)?
                            };
                            fields.push(core::FieldCore {
                                name,
                                name_span,
                                plus: field.plus,
                                visibility: field.visibility,
                                body: self.wrap_locals(&locals, body),
                            });
                        }
                    }
                }

                Ok(self.mk(
                    span,
                    core::ExprKind::Object(Rc::new(core::ObjectCore {
                        is_top: !in_obj,
                        fields,
                        asserts,
                    })),
                ))
            }
            ast::ObjInside::Comp {
                ref locals1,
                ref name,
                name_span,
                ref body,
                ref locals2,
                ref comp_spec,
            } => {
                let local_members: Vec<&ast::ObjLocal> =
                    locals1.iter().chain(locals2.iter()).collect();
                let locals = self.desugar_obj_locals(&local_members)?;

                let field_name = self.expr(name, in_obj)?;
                let field_body = self.wrap_locals(&locals, self.expr(body, true)?);
                let singleton = self.mk(
                    span,
                    core::ExprKind::Object(Rc::new(core::ObjectCore {
                        is_top: !in_obj,
                        fields: vec![core::FieldCore {
                            name: core::FieldNameCore::Dyn(field_name),
                            name_span,
                            plus: false,
                            visibility: ast::Visibility::Default,
                            body: field_body,
                        }],
                        asserts: Vec::new(),
                    })),
                );

                let seed = self.mk(span, core::ExprKind::Array(vec![singleton]));
                let array = self.fold_comp_spec(seed, comp_spec, in_obj)?;
                Ok(self.std_call(span, "objectFlatMerge", vec![array]))
            }
        }
    }
}
