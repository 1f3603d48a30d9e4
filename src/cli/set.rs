//! `fabrikate set` — set config values for an environment.
//!
//! Paths are dotted (`data.replicas=4`); segments containing literal dots
//! can be double-quoted (`"storage.class".name=fast`). A YAML file can be
//! flattened into path/value pairs with `--file`.

use anyhow::{Context, Result};
use clap::Args;
use serde_yaml::{Mapping, Value};

use crate::config::ComponentConfig;
use crate::core::FabrikateError;

/// Sets config values for the component in the current directory.
///
/// Example:
///
/// `fabrikate set --environment prod data.replicas=4 username=ops`
#[derive(Args)]
pub struct SetCommand {
    /// `path=value` pairs to set.
    pairs: Vec<String>,

    /// Environment to set the config in.
    #[arg(long, default_value = "common")]
    environment: String,

    /// Dotted subcomponent path to set the config on.
    #[arg(long, default_value = "")]
    subcomponent: String,

    /// Fail instead of creating keys that do not exist yet.
    #[arg(long)]
    no_new_config_keys: bool,

    /// YAML file to flatten into path/value pairs.
    #[arg(long, default_value = "")]
    file: String,
}

impl SetCommand {
    pub fn execute(self) -> Result<()> {
        let subcomponent_path: Vec<String> = if self.subcomponent.is_empty() {
            Vec::new()
        } else {
            self.subcomponent.split('.').map(str::to_string).collect()
        };

        let mut pairs: Vec<(Vec<String>, Value)> = Vec::new();

        if !self.file.is_empty() {
            let contents = std::fs::read_to_string(&self.file)
                .with_context(|| format!("failed to read input file {}", self.file))?;
            let mapping: Mapping = serde_yaml::from_str(&contents)
                .with_context(|| format!("failed to parse input file {}", self.file))?;
            flatten_mapping(&mapping, &mut Vec::new(), &mut pairs)?;
        }

        for pair in &self.pairs {
            let Some((path, value)) = pair.split_once('=') else {
                return Err(FabrikateError::Validation {
                    reason: format!("'{pair}' is not a properly formatted path=value pair"),
                }
                .into());
            };
            pairs.push((
                split_path_parts(path)?,
                Value::String(value.to_string()),
            ));
        }

        if pairs.is_empty() {
            return Err(FabrikateError::Validation {
                reason: "set takes one or more path=value pairs (or --file)".to_string(),
            }
            .into());
        }

        let mut config = ComponentConfig::new(".");
        config.load(&self.environment)?;

        for (path, value) in pairs {
            if self.no_new_config_keys {
                let existing = config
                    .subcomponent_config(&subcomponent_path)
                    .filter(|sub| sub.has_component_config(&path));
                if existing.is_none() {
                    return Err(FabrikateError::UnknownConfigKey {
                        key: path.join("."),
                    }
                    .into());
                }
            }

            config.set_config(&subcomponent_path, &path, value)?;
        }

        config.write(&self.environment)
    }
}

/// Splits a dotted config path, honoring double-quoted segments.
fn split_path_parts(path: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for character in path.chars() {
        match character {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => parts.push(std::mem::take(&mut current)),
            _ => current.push(character),
        }
    }
    parts.push(current);

    if in_quotes || parts.iter().any(String::is_empty) {
        return Err(FabrikateError::Validation {
            reason: format!("'{path}' is not a properly formatted configuration path"),
        }
        .into());
    }

    Ok(parts)
}

/// Flattens a nested mapping into `(path, value)` pairs; scalar leaves keep
/// their YAML type.
fn flatten_mapping(
    mapping: &Mapping,
    prefix: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, Value)>,
) -> Result<()> {
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            return Err(FabrikateError::Validation {
                reason: "config keys must be strings".to_string(),
            }
            .into());
        };

        prefix.push(key.to_string());
        if let Value::Mapping(nested) = value {
            flatten_mapping(nested, prefix, out)?;
        } else {
            out.push((prefix.clone(), value.clone()));
        }
        prefix.pop();
    }
    Ok(())
}
