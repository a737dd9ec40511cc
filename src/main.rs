use std::path::PathBuf;
use clap::Parser;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::FmtSubscriber;
use config::{parse_override, RawConfig, RunConfig};
use report::PerformanceReporter;
use solver::direct::DirectProjector;

mod boundary;
mod coefficients;
mod config;
mod domain;
mod driver;
mod error;
mod init;
mod io;
mod orchestrator;
mod report;
mod solver;

/// Multi-level nodal projection test harness
#[derive(Parser, Debug)]
#[command(name = "nodal-proj")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Times a nodal projection over the level hierarchies it is given", long_about = None)]
struct Cli {
    /// JSON inputs file
    #[arg(short, long)]
    inputs: Option<PathBuf>,

    /// Inputs overrides such as `stencil=cross nrep=3 file=grids.json`;
    /// `file` may be repeated
    #[arg(value_name = "KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, Value)>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = RunConfig::from_raw(RawConfig::load(cli.inputs.as_deref(), &cli.overrides)?)?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if !config.sleep.is_zero() {
        info!(
            "going to sleep for {}s, debug pid = {}",
            config.sleep.as_secs(),
            std::process::id()
        );
        std::thread::sleep(config.sleep);
    }
    info!("nrep = {}, pcode = {}, tol = {:e}", config.nrep, config.pcode, config.tol);
    info!("stencil = {}, dim = {}", config.stencil, config.dim);

    let report = match config.dim {
        2 => driver::run::<2, _, _>(&config, DirectProjector::<2>::construct)?,
        _ => driver::run::<3, _, _>(&config, DirectProjector::<3>::construct)?,
    };
    if let Some(path) = &config.report {
        PerformanceReporter::write(&report, path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaseInput;

    #[test]
    fn test_cli_overrides() -> Result<(), Box<dyn std::error::Error>> {
        let cli = Cli::try_parse_from([
            "nodal-proj",
            "-i",
            "inputs.json",
            "stencil=terrain",
            "nrep=3",
            "file=a.json",
            "file=b.json",
        ])?;
        assert_eq!(cli.inputs, Some(PathBuf::from("inputs.json")));
        assert_eq!(cli.overrides.len(), 4);
        assert_eq!(cli.overrides[1], ("nrep".to_string(), Value::from(3)));

        let config = RunConfig::from_raw(RawConfig::load(None, &cli.overrides)?)?;
        assert_eq!(config.nrep, 3);
        assert_eq!(config.input, CaseInput::Files(vec![PathBuf::from("a.json"), PathBuf::from("b.json")]));
        Ok(())
    }

    #[test]
    fn test_cli_rejects_bare_word() {
        assert!(Cli::try_parse_from(["nodal-proj", "stencil"]).is_err());
    }
}
