//! Top-level install and generate orchestration.
//!
//! These are the library entry points the CLI dispatches to; they own the
//! per-run [`Session`](crate::session::Session), drive the walker, and
//! decide what happens to the resulting component list (fetching content for
//! install, writing the mirrored output tree for generate).

pub mod generate;
pub mod install;

pub use generate::generate;
pub use install::install;
