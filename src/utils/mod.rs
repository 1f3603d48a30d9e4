//! Small cross-cutting helpers: filesystem operations used by the fetchers
//! and writers, and the URL → filesystem path normalisation used to derive
//! deterministic on-disk slots for remote coordinates.

pub mod fs;
pub mod urls;

pub use fs::{copy_dir, ensure_dir, remove_dir_idempotent};
pub use urls::to_path;
