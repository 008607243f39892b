//! Discrete-event simulator of coalition formation among fog providers.
//!
//! Providers own fog nodes and run services with bursty workloads. At
//! periodic triggers the simulator sizes each service's VM demand from the
//! observed arrival rates, values every possible coalition of providers by
//! solving its cost-minimal VM allocation, divides coalition profits with
//! the Shapley value and keeps the Nash-stable coalition structures. Profits
//! are estimated across independent replications until the confidence
//! intervals are tight enough.

pub mod allocation;
pub mod combinatorics;
pub mod error;
pub mod experiment;
pub mod float_cmp;
pub mod formation;
pub mod game;
pub mod logger;
pub mod lp;
pub mod options;
pub mod queueing;
pub mod report;
pub mod scenario;
pub mod simulator;
pub mod statistics;
pub mod workload;
