//! The surface syntax tree, as produced by the [parser](crate::parser).
//!
//! This is the pre-desugar representation: comprehensions, slices,
//! object-level locals and asserts, `$`, and method sugar are all still
//! present. Every node carries a [`Span`].

use crate::span::Span;
use crate::token::StrKind;
use crate::Name;

#[derive(Clone, Debug, PartialEq)]
pub struct Ident {
    pub name: Name,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Null,
    True,
    False,
    SelfObj,
    Dollar,
    Str(String, StrKind),
    Number(f64),
    Paren(Box<Expr>),
    Object(ObjInside),
    Array(Vec<Expr>),
    ArrayComp(Box<Expr>, Vec<CompSpecPart>),
    Field(Box<Expr>, Ident),
    Index(Box<Expr>, Box<Expr>),
    Slice(
        Box<Expr>,
        Option<Box<Expr>>,
        Option<Box<Expr>>,
        Option<Box<Expr>>,
    ),
    SuperField(Span, Ident),
    SuperIndex(Span, Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
        tailstrict: bool,
    },
    Var(Ident),
    Local(Vec<Bind>, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    /// `base { ... }`, i.e. object application without an explicit `+`.
    ObjExt(Box<Expr>, ObjInside),
    Func(Vec<Param>, Box<Expr>),
    Assert(Box<Assert>, Box<Expr>),
    Error(Box<Expr>),
    Import(Box<Expr>),
    ImportStr(Box<Expr>),
    ImportBin(Box<Expr>),
    InSuper(Box<Expr>, Span),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObjInside {
    Members(Vec<Member>),
    Comp {
        locals1: Vec<ObjLocal>,
        name: Box<Expr>,
        name_span: Span,
        body: Box<Expr>,
        locals2: Vec<ObjLocal>,
        comp_spec: Vec<CompSpecPart>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Member {
    Local(ObjLocal),
    Assert(Assert),
    Field(Field),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: FieldName,
    /// Parameter list when the field uses method sugar.
    pub params: Option<Vec<Param>>,
    pub plus: bool,
    pub visibility: Visibility,
    pub value: Expr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// `:`
    Default,
    /// `::`
    Hidden,
    /// `:::`
    ForceVisible,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldName {
    Ident(Ident),
    Str(String, Span),
    /// `[expr]`
    Computed(Expr, Span),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjLocal {
    pub bind: Bind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompSpecPart {
    For(ForSpec),
    If(IfSpec),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForSpec {
    pub var: Ident,
    pub inner: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfSpec {
    pub cond: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assert {
    pub span: Span,
    pub cond: Expr,
    pub msg: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bind {
    pub name: Ident,
    /// Parameter list when the bind uses function sugar
    /// (`local f(x) = ...`).
    pub params: Option<Vec<Param>>,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Positional(Expr),
    Named(Ident, Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub default: Option<Expr>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
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

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    BitNot,
    LogicNot,
}
