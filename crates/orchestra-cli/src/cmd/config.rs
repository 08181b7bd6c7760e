use anyhow::{Context, Result};
use orchestra_core::Config;

use crate::output::OutputMode;

/// Print the effective configuration with the API token masked.
pub fn run_config(config: &Config, output: OutputMode) -> Result<()> {
    let shown = config.redacted();
    if output.is_json() {
        println!("{}", serde_json::to_string_pretty(&shown)?);
    } else {
        let text = toml::to_string_pretty(&shown).context("failed to render config as TOML")?;
        print!("{text}");
    }
    Ok(())
}
