use std::fs;
use std::path::PathBuf;

use clap::Parser;

use fog_coalsim::experiment::CoalitionFormationExperiment;
use fog_coalsim::options::Options;
use fog_coalsim::scenario::load_scenario;
use fog_coalsim::simulator::Simulator;

fn scenario_path(file_name: &str) -> String {
    format!("test-scenarios/{}", file_name)
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fog-coalsim-e2e-{}-{}", std::process::id(), name))
}

fn options(args: &[&str]) -> Options {
    Options::parse_from(["fog-coalsim"].into_iter().chain(args.iter().copied()))
}

#[test]
fn test_end_to_end_two_provider_run() {
    let scen_file = scenario_path("two_providers.txt");
    let stats_file = temp_path("stats.csv");
    let trace_file = temp_path("trace.csv");
    let summary_file = temp_path("summary.json");

    let opts = options(&[
        "--scenario",
        &scen_file,
        "--formation-interval",
        "300",
        "--sim-max-num-rep",
        "3",
        "--sim-max-rep-len",
        "1200",
        "--out-stats-file",
        stats_file.to_str().unwrap(),
        "--out-trace-file",
        trace_file.to_str().unwrap(),
        "--out-summary-file",
        summary_file.to_str().unwrap(),
    ]);
    opts.validate().unwrap();

    let scen = load_scenario(&opts.scenario).unwrap();
    let mut experiment = CoalitionFormationExperiment::new(scen, &opts).unwrap();
    Simulator::new(opts.rng_seed)
        .with_max_replications(opts.max_replications())
        .with_max_replication_duration(opts.max_replication_length())
        .run(&mut experiment)
        .unwrap();

    let stats = fs::read_to_string(&stats_file).unwrap();
    let trace = fs::read_to_string(&trace_file).unwrap();
    let summary = fs::read_to_string(&summary_file).unwrap();
    fs::remove_file(&stats_file).ok();
    fs::remove_file(&trace_file).ok();
    fs::remove_file(&summary_file).ok();

    // Deterministic workload: replications are identical, so the CI
    // converges after two of them. Three triggers per replication.
    let stats_lines: Vec<&str> = stats.lines().collect();
    assert!(stats_lines[0].starts_with("\"Timestamp\""));
    assert!(stats_lines[0].contains("\"FP 1 - Coalition Profit vs. Alone Profit\""));
    assert_eq!(stats_lines.len() - 1, 2 * 3);

    let trace_lines: Vec<&str> = trace.lines().collect();
    assert!(trace_lines[0].contains("\"Coalition Structure\""));
    // The cheap-electricity provider hosts everything: the grand coalition
    // wins every interval.
    for line in &trace_lines[1..] {
        assert!(line.contains("\"{{0,1}}\""), "line: {}", line);
    }

    assert!(summary.contains("\"CoalitionProfit_0\""));
    assert!(summary.contains("\"AloneProfit_1\""));
    assert!(summary.contains("\"num_replications\": 2"));
}

#[test]
fn test_missing_scenario_file_fails_before_simulating() {
    let opts = options(&[
        "--scenario",
        "test-scenarios/does_not_exist.txt",
        "--formation-interval",
        "300",
    ]);
    assert!(load_scenario(&opts.scenario).is_err());
}

#[test]
fn test_find_all_partitions_traces_every_stable_structure() {
    let scen_file = scenario_path("two_providers.txt");
    let trace_file = temp_path("trace-all.csv");

    let opts = options(&[
        "--scenario",
        &scen_file,
        "--formation-interval",
        "300",
        "--find-all-parts",
        "--sim-max-num-rep",
        "1",
        "--sim-max-rep-len",
        "400",
        "--out-trace-file",
        trace_file.to_str().unwrap(),
    ]);

    let scen = load_scenario(&opts.scenario).unwrap();
    let mut experiment = CoalitionFormationExperiment::new(scen, &opts).unwrap();
    Simulator::new(opts.rng_seed)
        .with_max_replications(opts.max_replications())
        .with_max_replication_duration(opts.max_replication_length())
        .run(&mut experiment)
        .unwrap();

    let trace = fs::read_to_string(&trace_file).unwrap();
    fs::remove_file(&trace_file).ok();

    // One trigger fired; with this price asymmetry only the grand
    // coalition is stable, so exactly one structure is traced.
    let trace_lines: Vec<&str> = trace.lines().collect();
    assert_eq!(trace_lines.len() - 1, 1);
    assert!(trace_lines[1].contains("\"{{0,1}}\""));
}
