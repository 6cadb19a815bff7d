//! Config command

use anyhow::Result;
use dr_shared::DrConfig;

pub fn config(config: &DrConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
