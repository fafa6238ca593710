use anyhow::Result;
use clap::Parser;
use kong_utils::Settings;

/// Print the settings read from `KONG_` environment variables, with defaults filled in.
#[derive(Debug, Parser)]
pub(crate) struct ShowSettings {}

impl ShowSettings {
    pub(crate) fn run(self, settings: Settings) -> Result<()> {
        println!("{}", settings);
        Ok(())
    }
}
