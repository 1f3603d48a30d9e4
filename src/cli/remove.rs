//! `fabrikate remove` — remove a subcomponent of the current component.

use anyhow::Result;
use clap::Args;

use crate::component::Component;

/// Removes a subcomponent from the component in the current directory.
#[derive(Args)]
pub struct RemoveCommand {
    /// Name of the subcomponent to remove.
    name: String,
}

impl RemoveCommand {
    pub fn execute(self) -> Result<()> {
        let loader = Component {
            physical_path: "./".into(),
            ..Component::default()
        };

        let mut component = loader.load()?;
        component.remove_subcomponent(&self.name);
        component.write()
    }
}
