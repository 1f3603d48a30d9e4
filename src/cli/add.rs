//! `fabrikate add` — add (or replace) a subcomponent of the current
//! component.

use anyhow::Result;
use clap::Args;

use crate::component::Component;
use crate::core::Serialization;

/// Adds a subcomponent to the component in the current directory.
///
/// Example:
///
/// `fabrikate add cloud-native --source https://github.com/microsoft/fabrikate-definitions --path definitions/fabrikate-cloud-native`
#[derive(Args)]
pub struct AddCommand {
    /// Name of the subcomponent.
    name: String,

    /// Where the component lives (local path or remote endpoint).
    #[arg(long, default_value = "")]
    source: String,

    /// Method used to fetch the component.
    #[arg(long, default_value = "git")]
    method: String,

    /// Git branch to use.
    #[arg(long, default_value = "master")]
    branch: String,

    /// Path inside the source to the component or chart.
    #[arg(long, default_value = "")]
    path: String,

    /// Type of the component: component, helm, or static.
    #[arg(long = "type", default_value = "component")]
    component_type: String,
}

impl AddCommand {
    pub fn execute(self) -> Result<()> {
        let subcomponent = Component {
            name: self.name,
            source: self.source,
            method: self.method,
            branch: self.branch,
            path: self.path,
            component_type: self.component_type,
            ..Component::default()
        };
        add(subcomponent)
    }
}

/// Upserts `subcomponent` into the component at `./`, creating a fresh
/// definition named after the current directory when none exists yet.
pub fn add(subcomponent: Component) -> Result<()> {
    let loader = Component {
        physical_path: "./".into(),
        ..Component::default()
    };

    let mut component = match loader.load() {
        Ok(component) => component,
        Err(_) => {
            let current_dir = std::env::current_dir()?;
            let name = current_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "definition".to_string());
            Component {
                name,
                serialization: Serialization::Yaml,
                physical_path: "./".into(),
                ..Component::default()
            }
        }
    };

    component.add_subcomponent(subcomponent);
    component.write()
}
