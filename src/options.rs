//! Command line interface and derived runtime options.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormationStrategy {
    /// Keep only Nash-stable coalition structures.
    Nash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PayoffDivision {
    /// Divide coalition values with the Shapley value.
    Shapley,
}

/// Coalition formation simulator for federations of fog providers.
#[derive(Debug, Parser)]
#[command(name = "fog-coalsim", version, about)]
pub struct Options {
    /// Scenario file describing providers, fog nodes and services.
    #[arg(long)]
    pub scenario: PathBuf,

    /// Coalition formation strategy.
    #[arg(long, value_enum, default_value_t = FormationStrategy::Nash)]
    pub formation: FormationStrategy,

    /// Time between two coalition formation triggers, in simulated seconds.
    #[arg(long = "formation-interval")]
    pub formation_interval: f64,

    /// Payoff division rule.
    #[arg(long, value_enum, default_value_t = PayoffDivision::Shapley)]
    pub payoff: PayoffDivision,

    /// Keep every stable coalition structure instead of only the best one.
    #[arg(long = "find-all-parts")]
    pub find_all_partitions: bool,

    /// Relative optimality gap of the allocation solver; 0 or less means
    /// exact.
    #[arg(long = "optim-reltol", default_value_t = 0.0)]
    pub optim_relative_tolerance: f64,

    /// Time limit of one allocation run in seconds; 0 or less means none.
    #[arg(long = "optim-tilim", default_value_t = -1.0)]
    pub optim_time_limit: f64,

    /// Output CSV file with per-trigger profit statistics.
    #[arg(long = "out-stats-file")]
    pub output_stats_file: Option<PathBuf>,

    /// Output CSV file tracing the selected coalition structures.
    #[arg(long = "out-trace-file")]
    pub output_trace_file: Option<PathBuf>,

    /// Output JSON file with the end-of-simulation estimates.
    #[arg(long = "out-summary-file")]
    pub output_summary_file: Option<PathBuf>,

    /// Seed of the random number stream.
    #[arg(long = "rng-seed", default_value_t = 5489)]
    pub rng_seed: u64,

    /// Tolerance used when comparing service delays.
    #[arg(long = "service-delay-tol", default_value_t = 1e-5)]
    pub service_delay_tolerance: f64,

    /// Confidence level of the output analysis.
    #[arg(long = "ci-level", default_value_t = 0.95)]
    pub ci_level: f64,

    /// Relative precision at which the confidence intervals are tight
    /// enough to stop.
    #[arg(long = "ci-rel-precision", default_value_t = 0.04)]
    pub ci_rel_precision: f64,

    /// Maximum number of replications; 0 means unlimited.
    #[arg(long = "sim-max-num-rep", default_value_t = 0)]
    pub max_num_replications: u64,

    /// Maximum length of one replication in simulated seconds; 0 or less
    /// means unlimited.
    #[arg(long = "sim-max-rep-len", default_value_t = 0.0)]
    pub max_replication_duration: f64,

    /// Log verbosity, from 0 (errors only) to 9 (everything).
    #[arg(long, default_value_t = 0)]
    pub verbosity: u8,
}

impl Options {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.formation_interval > 0.0) {
            return Err(Error::Options(
                "--formation-interval must be positive".into(),
            ));
        }
        if !(self.ci_level > 0.0 && self.ci_level < 1.0) {
            return Err(Error::Options("--ci-level must be in (0, 1)".into()));
        }
        if !(self.ci_rel_precision > 0.0) {
            return Err(Error::Options("--ci-rel-precision must be positive".into()));
        }
        if !(self.service_delay_tolerance > 0.0) {
            return Err(Error::Options(
                "--service-delay-tol must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn max_replications(&self) -> Option<u64> {
        if self.max_num_replications > 0 {
            Some(self.max_num_replications)
        } else {
            None
        }
    }

    pub fn max_replication_length(&self) -> Option<f64> {
        if self.max_replication_duration > 0.0 {
            Some(self.max_replication_duration)
        } else {
            None
        }
    }
}
