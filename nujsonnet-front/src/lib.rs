#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

//! Embedder conveniences on top of [`nujsonnet_lang`]: a [`Session`] that
//! owns a VM, wires the filesystem importer, and prints errors to stderr.

mod session;

pub use session::Session;
