//! Error taxonomy for the simulator.

use thiserror::Error;

/// Errors surfaced while loading a scenario file.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("cannot open scenario file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: malformed entry '{text}'")]
    Malformed { line: usize, text: String },
    #[error("line {line}: unknown key '{key}'")]
    UnknownKey { line: usize, key: String },
    #[error("line {line}: invalid value for '{key}': {reason}")]
    InvalidValue {
        line: usize,
        key: String,
        reason: String,
    },
    #[error("scenario inconsistency: {0}")]
    Inconsistent(String),
}

/// Errors raised by the coalition-formation engine.
#[derive(Error, Debug)]
pub enum FormationError {
    #[error("coalition {0} was never evaluated during the subset walk")]
    UnvisitedCoalition(String),
    #[error("game value for coalition {0} set more than once")]
    ValueAlreadySet(String),
    #[error("coalition analysis failed: {0}")]
    Analysis(String),
}

/// Unexpected internal failures of the allocation solver.
#[derive(Error, Debug)]
#[error("allocation solver failure: {0}")]
pub struct SolverError(pub String);

/// Top-level error type of the crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Formation(#[from] FormationError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("invalid option: {0}")]
    Options(String),
    #[error("output error: {0}")]
    Output(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
