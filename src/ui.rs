use std::path::PathBuf;

use clap::Parser;

use crate::sim::config::TopConfig;
use crate::sim::top::MemSim;
use crate::traffic::AddressPattern;

#[derive(Parser, Debug, Default)]
#[command(version, about)]
pub struct EsimArgs {
    #[arg(help = "Path to config.toml; built-in defaults when omitted")]
    pub config_path: Option<PathBuf>,
    #[arg(long, help = "Override the cycle limit")]
    pub max_cycles: Option<u64>,
    #[arg(long, help = "Override number of accesses per client")]
    pub accesses: Option<u64>,
    #[arg(long, help = "Override the address pattern (sequential, strided, random)")]
    pub pattern: Option<AddressPattern>,
    #[arg(long, help = "Override the replacement and traffic seed")]
    pub seed: Option<u64>,
    #[arg(long, help = "Write the JSON report to this file")]
    pub report: Option<PathBuf>,
}

/// Make a MemSim from the TOML configuration.
/// If `cli_args` is given, override TOML options with CLI arguments.
pub fn make_sim(toml_string: &str, cli_args: Option<&EsimArgs>) -> anyhow::Result<MemSim> {
    let mut config = TopConfig::parse(toml_string)?;

    // override toml configs with CLI args
    if let Some(args) = cli_args {
        config.sim.max_cycles = args.max_cycles.unwrap_or(config.sim.max_cycles);
        config.traffic.accesses = args.accesses.unwrap_or(config.traffic.accesses);
        config.traffic.pattern = args.pattern.unwrap_or(config.traffic.pattern);
        if let Some(seed) = args.seed {
            config.mem.seed = seed;
            config.traffic.seed = seed;
        }
        if args.report.is_some() {
            config.sim.report = args.report.clone();
        }
    }

    MemSim::new(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_toml() {
        let args = EsimArgs {
            max_cycles: Some(42),
            accesses: Some(3),
            pattern: Some(AddressPattern::Strided),
            report: Some(PathBuf::from("out.json")),
            ..EsimArgs::default()
        };
        let sim = make_sim("[sim]\nmax_cycles = 7\n", Some(&args)).unwrap();
        assert_eq!(42, sim.config().max_cycles);
        assert_eq!(Some(PathBuf::from("out.json")), sim.config().report);
    }

    #[test]
    fn pattern_flag_is_parsed_by_name() {
        let args = EsimArgs::try_parse_from(["esim", "--pattern", "random"]).unwrap();
        assert_eq!(Some(AddressPattern::Random), args.pattern);
        assert!(EsimArgs::try_parse_from(["esim", "--pattern", "tiled"]).is_err());
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let sim = make_sim("", None).unwrap();
        assert_eq!(10_000_000, sim.config().max_cycles);
        assert_eq!(4, sim.mem_ref().modules().len());
    }
}
