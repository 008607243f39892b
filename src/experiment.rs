//! The coalition formation experiment: workload bursts drive periodic
//! formation triggers, each trigger sizes the VM demand from the observed
//! arrival rates and runs the formation engine, and profits are folded into
//! per-provider confidence intervals across replications.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use log::info;
use serde::Serialize;

use crate::allocation::{AllocationSolver, BranchAndBoundSolver};
use crate::error::{Error, Result};
use crate::formation::{analyze_coalitions, FormationConfig, ServiceDemand};
use crate::options::Options;
use crate::queueing::MmcQueue;
use crate::report::{unix_timestamp, StatsWriter, TraceWriter};
use crate::scenario::{Scenario, Topology};
use crate::simulator::{Experiment, SimContext};
use crate::statistics::{CiMeanEstimator, MeanEstimator};
use crate::workload::{MultistepWorkloadGenerator, WorkloadGenerator};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    /// Arrivals to `service` at `rate` for the next `duration` seconds.
    ArrivalBurstStart {
        service: usize,
        duration: f64,
        rate: f64,
    },
    ArrivalBurstStop { service: usize },
    /// Closes the formation interval `[start_time, stop_time]`.
    FormationTrigger { start_time: f64, stop_time: f64 },
}

#[derive(Debug, Clone, Copy)]
struct BurstRecord {
    start: f64,
    stop: f64,
    rate: f64,
}

#[derive(Debug, Serialize)]
struct EstimateSummary {
    name: String,
    mean: f64,
    half_width: f64,
    converged: bool,
}

/// End-of-simulation results, dumped as JSON when requested.
#[derive(Debug, Serialize)]
struct SimulationSummary {
    num_replications: u64,
    coalition_profits: Vec<EstimateSummary>,
    alone_profits: Vec<EstimateSummary>,
}

pub struct CoalitionFormationExperiment {
    scen: Scenario,
    topo: Topology,
    formation_interval: f64,
    delay_tol: f64,
    find_all_partitions: bool,
    solver: Box<dyn AllocationSolver>,

    /// Workload generator templates, by service category.
    wkl_gens: Vec<Box<dyn WorkloadGenerator>>,
    /// Per-replication generator state, by service category.
    rep_wkl_gens: Vec<Box<dyn WorkloadGenerator>>,

    fn_power_states: Vec<bool>,
    svc_bursts: Vec<Vec<BurstRecord>>,

    rep_coal_profit: Vec<MeanEstimator>,
    rep_alone_profit: Vec<MeanEstimator>,
    ci_coal_profit: Vec<CiMeanEstimator>,
    ci_alone_profit: Vec<CiMeanEstimator>,
    num_replications: u64,

    stats_writer: Option<StatsWriter>,
    trace_writer: Option<TraceWriter>,
    summary_path: Option<PathBuf>,
}

impl CoalitionFormationExperiment {
    pub fn new(scen: Scenario, opts: &Options) -> Result<Self> {
        let topo = Topology::from_scenario(&scen);
        let num_fps = scen.num_fps;

        let wkl_gens: Vec<Box<dyn WorkloadGenerator>> = scen
            .svc_workloads
            .iter()
            .map(|steps| {
                Box::new(MultistepWorkloadGenerator::new(steps.clone()))
                    as Box<dyn WorkloadGenerator>
            })
            .collect();

        let stats_writer = match &opts.output_stats_file {
            Some(path) => Some(StatsWriter::create(path, num_fps)?),
            None => None,
        };
        let trace_writer = match &opts.output_trace_file {
            Some(path) => Some(TraceWriter::create(path, num_fps)?),
            None => None,
        };

        let ci_coal_profit = (0..num_fps)
            .map(|fp| {
                CiMeanEstimator::new(
                    format!("CoalitionProfit_{}", fp),
                    opts.ci_level,
                    opts.ci_rel_precision,
                )
            })
            .collect();
        let ci_alone_profit = (0..num_fps)
            .map(|fp| {
                CiMeanEstimator::new(
                    format!("AloneProfit_{}", fp),
                    opts.ci_level,
                    opts.ci_rel_precision,
                )
            })
            .collect();

        Ok(Self {
            topo,
            formation_interval: opts.formation_interval,
            delay_tol: opts.service_delay_tolerance,
            find_all_partitions: opts.find_all_partitions,
            solver: Box::new(BranchAndBoundSolver::new(
                opts.optim_relative_tolerance,
                opts.optim_time_limit,
            )),
            rep_wkl_gens: wkl_gens.clone(),
            wkl_gens,
            fn_power_states: Vec::new(),
            svc_bursts: Vec::new(),
            rep_coal_profit: vec![MeanEstimator::new(); num_fps],
            rep_alone_profit: vec![MeanEstimator::new(); num_fps],
            ci_coal_profit,
            ci_alone_profit,
            num_replications: 0,
            stats_writer,
            trace_writer,
            summary_path: opts.output_summary_file.clone(),
            scen,
        })
    }

    /// Drops bursts that ended before the interval and returns the maximum
    /// arrival rate among those overlapping it. Bursts spilling past the
    /// interval stay recorded for the next one.
    fn max_rate_in_interval(&mut self, svc: usize, start: f64, stop: f64) -> f64 {
        let bursts = &mut self.svc_bursts[svc];
        let mut max_rate = 0.0;
        let mut b = 0;
        while b < bursts.len() {
            let rec = bursts[b];
            if rec.stop <= start {
                bursts.remove(b);
            } else if rec.start < stop {
                if max_rate < rec.rate {
                    max_rate = rec.rate;
                }
                if rec.stop < stop {
                    bursts.remove(b);
                } else {
                    b += 1;
                }
            } else {
                // Bursts are recorded in start order; the rest belong to a
                // later interval.
                break;
            }
        }
        max_rate
    }

    /// Sizes the VM demand of every service from the arrival rates seen in
    /// the closing interval.
    fn build_demand(&mut self, start: f64, stop: f64) -> ServiceDemand {
        let mut demand = ServiceDemand::default();
        for svc in 0..self.topo.num_svcs {
            let cat = self.topo.svc_categories[svc];
            let rate = self.max_rate_in_interval(svc, start, stop);
            let mut queue = MmcQueue::new(
                rate,
                self.scen.svc_vm_service_rates[cat],
                self.scen.svc_max_delays[cat],
                self.delay_tol,
            );
            let num_vms = queue.min_servers();
            for _ in 0..num_vms {
                demand.vm_to_svcs.push(svc);
            }
            demand.svc_predicted_delays.push(queue.delays().to_vec());
        }
        demand
    }

    fn handle_trigger(
        &mut self,
        start_time: f64,
        stop_time: f64,
        ctx: &mut SimContext<Event>,
    ) -> Result<()> {
        let duration = stop_time - start_time;
        let demand = self.build_demand(start_time, stop_time);

        let outcome = analyze_coalitions(
            &self.scen,
            &self.topo,
            &demand,
            &self.fn_power_states,
            duration,
            self.solver.as_ref(),
            &FormationConfig {
                tol: self.delay_tol,
                find_all_partitions: self.find_all_partitions,
            },
        )?;

        let num_fps = self.scen.num_fps;
        let timestamp = unix_timestamp();
        let alone = outcome.alone_profits.clone();
        let mut coal = vec![f64::NAN; num_fps];

        if self.find_all_partitions {
            // Average each provider's payoff over every stable structure;
            // one trace row per structure.
            let mut means = vec![MeanEstimator::new(); num_fps];
            for part in &outcome.best_partitions {
                let mut part_coal = vec![f64::NAN; num_fps];
                for (&fp, &payoff) in &part.payoffs {
                    part_coal[fp] = payoff;
                    means[fp].collect(payoff);
                }
                if let Some(writer) = &mut self.trace_writer {
                    writer.write_row(
                        timestamp,
                        start_time,
                        duration,
                        &part.structure(),
                        &alone,
                        &part_coal,
                    )?;
                }
            }
            for fp in 0..num_fps {
                coal[fp] = means[fp].mean();
            }
        } else if let Some(best) = outcome.best_partition() {
            for (&fp, &payoff) in &best.payoffs {
                coal[fp] = payoff;
            }
            if let Some(writer) = &mut self.trace_writer {
                writer.write_row(
                    timestamp,
                    start_time,
                    duration,
                    &best.structure(),
                    &alone,
                    &coal,
                )?;
            }
        }

        // The winning structure decides which nodes stay on for the next
        // interval.
        if let Some(best) = outcome.best_partition() {
            outcome.apply_power_states(best, &mut self.fn_power_states);
            info!(
                "t = {}: structure {} selected with value {}",
                ctx.time,
                best.structure(),
                best.value
            );
        } else {
            info!("t = {}: no stable coalition structure", ctx.time);
        }

        for fp in 0..num_fps {
            self.rep_coal_profit[fp].collect(coal[fp]);
            self.rep_alone_profit[fp].collect(alone[fp]);
        }
        if let Some(writer) = &mut self.stats_writer {
            writer.write_row(timestamp, start_time, duration, &coal, &alone)?;
        }

        ctx.schedule_in(
            self.formation_interval,
            Event::FormationTrigger {
                start_time: ctx.time,
                stop_time: ctx.time + self.formation_interval,
            },
        );
        Ok(())
    }

    fn estimate_summaries(estimators: &[CiMeanEstimator]) -> Vec<EstimateSummary> {
        estimators
            .iter()
            .map(|e| EstimateSummary {
                name: e.name().to_string(),
                mean: e.estimate(),
                half_width: e.half_width(),
                converged: e.done(),
            })
            .collect()
    }
}

impl Experiment for CoalitionFormationExperiment {
    type Event = Event;

    fn on_replication_start(&mut self, ctx: &mut SimContext<Event>) -> Result<()> {
        // All nodes start powered on; formation decisions take over from the
        // first trigger.
        self.fn_power_states = vec![true; self.topo.num_fns];
        self.svc_bursts = vec![Vec::new(); self.topo.num_svcs];
        for est in self.rep_coal_profit.iter_mut() {
            est.reset();
        }
        for est in self.rep_alone_profit.iter_mut() {
            est.reset();
        }
        self.rep_wkl_gens = self.wkl_gens.clone();

        for svc in 0..self.topo.num_svcs {
            let cat = self.topo.svc_categories[svc];
            let burst = self.rep_wkl_gens[cat].next_burst(&mut ctx.rng);
            ctx.schedule_at(
                ctx.time,
                Event::ArrivalBurstStart {
                    service: svc,
                    duration: burst.duration,
                    rate: burst.rate,
                },
            );
        }
        ctx.schedule_in(
            self.formation_interval,
            Event::FormationTrigger {
                start_time: ctx.time,
                stop_time: ctx.time + self.formation_interval,
            },
        );
        Ok(())
    }

    fn handle_event(&mut self, event: Event, ctx: &mut SimContext<Event>) -> Result<()> {
        match event {
            Event::ArrivalBurstStart {
                service,
                duration,
                rate,
            } => {
                let stop = ctx.time + duration;
                self.svc_bursts[service].push(BurstRecord {
                    start: ctx.time,
                    stop,
                    rate,
                });
                ctx.schedule_at(stop, Event::ArrivalBurstStop { service });
            }
            Event::ArrivalBurstStop { service } => {
                let cat = self.topo.svc_categories[service];
                let burst = self.rep_wkl_gens[cat].next_burst(&mut ctx.rng);
                ctx.schedule_at(
                    ctx.time,
                    Event::ArrivalBurstStart {
                        service,
                        duration: burst.duration,
                        rate: burst.rate,
                    },
                );
            }
            Event::FormationTrigger {
                start_time,
                stop_time,
            } => self.handle_trigger(start_time, stop_time, ctx)?,
        }
        Ok(())
    }

    fn on_replication_end(&mut self, ctx: &mut SimContext<Event>) -> Result<()> {
        self.num_replications = ctx.replication;
        for fp in 0..self.scen.num_fps {
            self.ci_coal_profit[fp].collect(self.rep_coal_profit[fp].mean());
            self.ci_alone_profit[fp].collect(self.rep_alone_profit[fp].mean());
            info!(
                "Replication {}: FP {} coalition profit {} (CI mean {}, hw {}), alone profit {}",
                ctx.replication,
                fp,
                self.rep_coal_profit[fp].mean(),
                self.ci_coal_profit[fp].estimate(),
                self.ci_coal_profit[fp].half_width(),
                self.rep_alone_profit[fp].mean(),
            );
        }
        Ok(())
    }

    fn simulation_done(&mut self) -> bool {
        self.ci_coal_profit
            .iter()
            .all(|est| est.done() || est.unstable())
    }

    fn on_simulation_end(&mut self) -> Result<()> {
        let summary = SimulationSummary {
            num_replications: self.num_replications,
            coalition_profits: Self::estimate_summaries(&self.ci_coal_profit),
            alone_profits: Self::estimate_summaries(&self.ci_alone_profit),
        };
        for est in summary
            .coalition_profits
            .iter()
            .chain(summary.alone_profits.iter())
        {
            info!(
                "{}: {} +/- {} ({})",
                est.name,
                est.mean,
                est.half_width,
                if est.converged { "converged" } else { "not converged" }
            );
        }
        if let Some(path) = &self.summary_path {
            let file = File::create(path).map_err(Error::Io)?;
            serde_json::to_writer_pretty(BufWriter::new(file), &summary)
                .map_err(|e| Error::Output(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::parse_scenario;
    use crate::simulator::Simulator;
    use clap::Parser;

    const SCENARIO: &str = r#"
num_fps = 2
num_fn_categories = 1
num_svc_categories = 1
num_vm_categories = 1
svc.max_delays = [1.0]
svc.vm_categories = [0]
svc.vm_service_rates = [5.0]
svc.workloads = [[[400 2.0] [200 6.0]]]
fp.num_svcs = [[1] [1]]
fp.num_fns = [[1] [1]]
fp.electricity_costs = [0.01 1.0]
fp.fn_asleep_costs = [[0.0] [0.0]]
fp.fn_awake_costs = [[0.0] [0.0]]
fp.svc_revenues = [[100.0] [100.0]]
fp.svc_penalties = [[50.0] [50.0]]
fn.min_powers = [100.0]
fn.max_powers = [200.0]
vm.cpu_requirements = [[0.4]]
vm.ram_requirements = [[0.3]]
"#;

    fn options(extra: &[&str]) -> Options {
        Options::parse_from(
            [
                "fog-coalsim",
                "--scenario",
                "unused",
                "--formation-interval",
                "300",
            ]
            .into_iter()
            .chain(extra.iter().copied()),
        )
    }

    fn experiment(extra: &[&str]) -> CoalitionFormationExperiment {
        let scen = parse_scenario(SCENARIO).unwrap();
        CoalitionFormationExperiment::new(scen, &options(extra)).unwrap()
    }

    #[test]
    fn runs_a_replication_and_collects_profits() {
        let mut exp = experiment(&[]);
        Simulator::new(5489)
            .with_max_replications(Some(1))
            .with_max_replication_duration(Some(1000.0))
            .run(&mut exp)
            .unwrap();

        // One observation per provider, not yet converged.
        for fp in 0..2 {
            assert_eq!(exp.ci_coal_profit[fp].count(), 1);
            assert_eq!(exp.ci_alone_profit[fp].count(), 1);
            assert!(exp.ci_coal_profit[fp].estimate().is_finite());
            assert!(exp.ci_alone_profit[fp].estimate().is_finite());
        }
        assert_eq!(exp.num_replications, 1);
        assert!(!exp.simulation_done());
    }

    #[test]
    fn deterministic_workload_converges_quickly() {
        let mut exp = experiment(&[]);
        Simulator::new(5489)
            .with_max_replications(Some(100))
            .with_max_replication_duration(Some(1000.0))
            .run(&mut exp)
            .unwrap();
        // Identical replications: the CI collapses after two of them.
        assert_eq!(exp.num_replications, 2);
        assert!(exp.simulation_done());
    }

    #[test]
    fn winning_structure_updates_power_states() {
        let mut exp = experiment(&[]);
        Simulator::new(5489)
            .with_max_replications(Some(1))
            .with_max_replication_duration(Some(1000.0))
            .run(&mut exp)
            .unwrap();
        // Provider 1 pays 100x more per Wh: the merged structure serves
        // everything from provider 0's node and powers the other one off.
        assert_eq!(exp.fn_power_states, vec![true, false]);
    }

    #[test]
    fn interval_picks_the_peak_rate_and_prunes_expired_bursts() {
        let mut exp = experiment(&[]);
        exp.svc_bursts = vec![Vec::new(); 2];
        exp.svc_bursts[0] = vec![
            BurstRecord {
                start: 0.0,
                stop: 100.0,
                rate: 9.0,
            },
            BurstRecord {
                start: 100.0,
                stop: 350.0,
                rate: 2.0,
            },
            BurstRecord {
                start: 350.0,
                stop: 500.0,
                rate: 7.0,
            },
        ];
        // Interval [300, 600]: the first burst expired, both others overlap.
        let rate = exp.max_rate_in_interval(0, 300.0, 600.0);
        assert_eq!(rate, 7.0);
        // Nothing spills past the interval, so nothing survives.
        assert_eq!(exp.svc_bursts[0].len(), 0);
    }

    #[test]
    fn spilling_burst_stays_recorded() {
        let mut exp = experiment(&[]);
        exp.svc_bursts = vec![Vec::new(); 2];
        exp.svc_bursts[0] = vec![BurstRecord {
            start: 100.0,
            stop: 900.0,
            rate: 3.0,
        }];
        let rate = exp.max_rate_in_interval(0, 300.0, 600.0);
        assert_eq!(rate, 3.0);
        assert_eq!(exp.svc_bursts[0].len(), 1);
    }
}
