use std::fs;

use anyhow::Context;
use clap::Parser;
use esim::ui::{make_sim, EsimArgs};

pub fn main() -> anyhow::Result<()> {
    env_logger::init();

    let argv = EsimArgs::parse();
    let config = match &argv.config_path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?,
        None => String::new(),
    };

    let mut sim = make_sim(&config, Some(&argv))?;
    let summary = sim.simulate();
    let json = serde_json::to_string_pretty(&summary).context("cannot serialize report")?;
    match &sim.config().report {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
