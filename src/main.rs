use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use fog_coalsim::error::Result;
use fog_coalsim::experiment::CoalitionFormationExperiment;
use fog_coalsim::logger::StdoutLogger;
use fog_coalsim::options::Options;
use fog_coalsim::scenario;
use fog_coalsim::simulator::Simulator;

fn run(opts: &Options) -> Result<()> {
    opts.validate()?;

    let scen = scenario::load_scenario(&opts.scenario)?;
    info!(
        "Scenario: {} providers, {} FN categories, {} service categories",
        scen.num_fps, scen.num_fn_categories, scen.num_svc_categories
    );

    let mut experiment = CoalitionFormationExperiment::new(scen, opts)?;
    Simulator::new(opts.rng_seed)
        .with_max_replications(opts.max_replications())
        .with_max_replication_duration(opts.max_replication_length())
        .run(&mut experiment)
}

fn main() -> ExitCode {
    let opts = Options::parse();
    if StdoutLogger::init(opts.verbosity).is_err() {
        eprintln!("cannot install the logger");
        return ExitCode::FAILURE;
    }

    match run(&opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
