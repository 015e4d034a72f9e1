//! Static analysis over the core AST.
//!
//! Rejects references to variables that are neither bound in the enclosing
//! lexical scope nor registered as globals by the embedder. Runs after
//! desugaring, so comprehension variables and object locals have already
//! been lowered to ordinary binders.

use std::collections::HashSet;
use std::rc::Rc;

use crate::core;
use crate::error::StaticError;
use crate::span::SourceMap;
use crate::Name;

pub(crate) fn check(
    map: &SourceMap,
    expr: &Rc<core::Expr>,
    env: &HashSet<Name>,
) -> Result<(), StaticError> {
    let mut analyzer = Analyzer {
        map,
        scope: env.iter().cloned().collect(),
    };
    analyzer.check_expr(expr)
}

struct Analyzer<'a> {
    map: &'a SourceMap,
    /// Stack of visible bindings; lookup scans from the end.
    scope: Vec<Name>,
}

impl Analyzer<'_> {
    fn check_expr(&mut self, expr: &Rc<core::Expr>) -> Result<(), StaticError> {
        match expr.kind {
            core::ExprKind::Null
            | core::ExprKind::Bool(_)
            | core::ExprKind::Number(_)
            | core::ExprKind::Str(_)
            | core::ExprKind::SelfObj
            | core::ExprKind::TopObj
            | core::ExprKind::Std(_)
            | core::ExprKind::Import { .. }
            | core::ExprKind::ImportStr { .. }
            | core::ExprKind::ImportBin { .. } => Ok(()),
            core::ExprKind::Var(ref name) => {
                if self.scope.iter().rev().any(|n| n == name) {
                    Ok(())
                } else {
                    Err(StaticError::new(
                        self.map,
                        expr.span,
                        format!("Unknown variable: {name}"),
                    ))
                }
            }
            core::ExprKind::Array(ref items) => {
                for item in items {
                    self.check_expr(item)?;
                }
                Ok(())
            }
            core::ExprKind::Object(ref object) => {
                for field in &object.fields {
                    if let core::FieldNameCore::Dyn(ref name) = field.name {
                        self.check_expr(name)?;
                    }
                    self.check_expr(&field.body)?;
                }
                for assert in &object.asserts {
                    self.check_expr(assert)?;
                }
                Ok(())
            }
            core::ExprKind::Index {
                ref target,
                ref index,
            } => {
                self.check_expr(target)?;
                self.check_expr(index)
            }
            core::ExprKind::SuperIndex { ref index } => self.check_expr(index),
            core::ExprKind::InSuper { ref key } => self.check_expr(key),
            core::ExprKind::Call {
                ref callee,
                ref positional,
                ref named,
                tailstrict: _,
            } => {
                self.check_expr(callee)?;
                for arg in positional {
                    self.check_expr(arg)?;
                }
                for (_, arg) in named {
                    self.check_expr(arg)?;
                }
                Ok(())
            }
            core::ExprKind::Func(ref func) => self.check_func(func),
            core::ExprKind::Local {
                ref binds,
                ref body,
            } => {
                let depth = self.scope.len();
                for (name, _) in binds {
                    self.scope.push(name.clone());
                }
                let mut result = Ok(());
                for (_, value) in binds {
                    result = self.check_expr(value);
                    if result.is_err() {
                        break;
                    }
                }
                if result.is_ok() {
                    result = self.check_expr(body);
                }
                self.scope.truncate(depth);
                result
            }
            core::ExprKind::If {
                ref cond,
                ref then_body,
                ref else_body,
            } => {
                self.check_expr(cond)?;
                self.check_expr(then_body)?;
                self.check_expr(else_body)
            }
            core::ExprKind::Binary {
                ref lhs, ref rhs, ..
            } => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)
            }
            core::ExprKind::Unary { ref arg, .. } => self.check_expr(arg),
            core::ExprKind::Error { ref msg } => self.check_expr(msg),
        }
    }

    fn check_func(&mut self, func: &core::FuncCore) -> Result<(), StaticError> {
        let depth = self.scope.len();
        for (name, _) in &func.params {
            self.scope.push(name.clone());
        }
        let mut result = Ok(());
        for (_, default) in &func.params {
            if let Some(default) = default {
                result = self.check_expr(default);
                if result.is_err() {
                    break;
                }
            }
        }
        if result.is_ok() {
            result = self.check_expr(&func.body);
        }
        self.scope.truncate(depth);
        result
    }
}
