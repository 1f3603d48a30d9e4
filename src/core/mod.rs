//! Core types shared across the crate: the error enum and the serialization
//! format tracked for round-trip reads and writes of component and config
//! files.

pub mod error;

pub use error::FabrikateError;

/// On-disk serialization format of a component or config file.
///
/// Fabrikate prefers YAML but accepts JSON; whichever format a file was read
/// in is remembered so writes preserve it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Serialization {
    /// `component.yaml` / `config/<env>.yaml`
    #[default]
    Yaml,
    /// `component.json` / `config/<env>.json`
    Json,
}

impl Serialization {
    /// File extension for this format, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }
}
