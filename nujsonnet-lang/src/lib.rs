#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![allow(clippy::too_many_arguments, clippy::type_complexity)]
#![forbid(unsafe_code)]

//! Library to parse and evaluate Jsonnet programs.
//!
//! The [`lexer`], [`parser`] and [`ast`] modules cover parsing. The [`vm`]
//! module is the embedding surface: it owns the program cache, external
//! bindings, the importer and the standard library, and turns sources into
//! manifested JSON (or a YAML stream, or a file map).

use std::rc::Rc;

pub mod ast;
pub mod error;
pub mod import;
pub mod lexer;
pub mod notify;
pub mod parser;
pub mod span;
pub mod token;
pub mod vm;

mod analyze;
mod core;
mod desugar;

/// An identifier or field name. Cheap to clone, compares by content.
pub type Name = Rc<str>;
