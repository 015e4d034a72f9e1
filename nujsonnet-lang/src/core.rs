//! The core AST, produced by the desugarer.
//!
//! Comprehensions, slices, field-access sugar, object-level locals,
//! statement asserts and `%` are gone; `$` and desugar-introduced
//! standard-library references are dedicated nodes. Nodes are `Rc`-shared
//! so thunks and closures can hold subtrees without cloning.

use std::rc::Rc;

use crate::ast::Visibility;
use crate::span::Span;
use crate::Name;

#[derive(Debug)]
pub(crate) struct Expr {
    pub(crate) span: Span,
    pub(crate) kind: ExprKind,
}

#[derive(Debug)]
pub(crate) enum ExprKind {
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    SelfObj,
    /// `$`, the outermost object at this syntactic position.
    TopObj,
    Var(Name),
    /// A reference to a standard-library field that bypasses user scope;
    /// only the desugarer emits these.
    Std(Name),
    Array(Vec<Rc<Expr>>),
    Object(Rc<ObjectCore>),
    Index {
        target: Rc<Expr>,
        index: Rc<Expr>,
    },
    SuperIndex {
        index: Rc<Expr>,
    },
    InSuper {
        key: Rc<Expr>,
    },
    Call {
        callee: Rc<Expr>,
        positional: Vec<Rc<Expr>>,
        named: Vec<(Name, Rc<Expr>)>,
        tailstrict: bool,
    },
    Func(Rc<FuncCore>),
    Local {
        binds: Vec<(Name, Rc<Expr>)>,
        body: Rc<Expr>,
    },
    If {
        cond: Rc<Expr>,
        then_body: Rc<Expr>,
        else_body: Rc<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Rc<Expr>,
        rhs: Rc<Expr>,
    },
    Unary {
        op: UnaryOp,
        arg: Rc<Expr>,
    },
    Error {
        msg: Rc<Expr>,
    },
    Import {
        path: String,
    },
    ImportStr {
        path: String,
    },
    ImportBin {
        path: String,
    },
}

#[derive(Debug)]
pub(crate) struct ObjectCore {
    /// Whether this object literal is the syntactically outermost one, i.e.
    /// the capture point for `$`.
    pub(crate) is_top: bool,
    pub(crate) fields: Vec<FieldCore>,
    /// Assertion bodies; each evaluates to `null` or raises.
    pub(crate) asserts: Vec<Rc<Expr>>,
}

#[derive(Debug)]
pub(crate) struct FieldCore {
    pub(crate) name: FieldNameCore,
    pub(crate) name_span: Span,
    pub(crate) plus: bool,
    pub(crate) visibility: Visibility,
    pub(crate) body: Rc<Expr>,
}

#[derive(Debug)]
pub(crate) enum FieldNameCore {
    Fixed(Name),
    /// Evaluated when the object literal is; `null` drops the field.
    Dyn(Rc<Expr>),
}

#[derive(Debug)]
pub(crate) struct FuncCore {
    /// Parameter order matters: positional arguments bind left to right.
    pub(crate) params: Vec<(Name, Option<Rc<Expr>>)>,
    pub(crate) body: Rc<Expr>,
}

/// Binary operators surviving desugar (`%` becomes a `std.mod` call).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    In,
    BitAnd,
    BitOr,
    BitXor,
    LogicAnd,
    LogicOr,
}

impl BinaryOp {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::In => "in",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::LogicAnd => "&&",
            Self::LogicOr => "||",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Minus,
    Plus,
    BitNot,
    LogicNot,
}

impl UnaryOp {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Minus => "-",
            Self::Plus => "+",
            Self::BitNot => "~",
            Self::LogicNot => "!",
        }
    }
}
