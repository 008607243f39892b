//! Coalition formation analysis: values every coalition of providers by
//! solving its VM allocation problem, divides profits with the Shapley
//! value, and keeps the Nash-stable coalition structures.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::allocation::{AllocationRequest, AllocationSolver, VmAllocation};
use crate::combinatorics::{partitions, subsets};
use crate::error::{Error, FormationError};
use crate::float_cmp;
use crate::game::{CoalitionId, CooperativeGame, VALUE_SENTINEL};
use crate::scenario::{Scenario, Topology};

/// Knobs of one formation analysis.
#[derive(Debug, Clone)]
pub struct FormationConfig {
    /// Tolerance of the floating point comparisons (payoff dominance, core
    /// membership).
    pub tol: f64,
    /// Keep every Nash-stable coalition structure instead of only the one
    /// with the highest total value.
    pub find_all_partitions: bool,
}

/// VM demand of the current formation interval, sized from the observed
/// workloads.
#[derive(Debug, Clone, Default)]
pub struct ServiceDemand {
    /// Service run by each demanded VM, by VM id.
    pub vm_to_svcs: Vec<usize>,
    /// Predicted delay by service id and number of allocated VMs (entry 0
    /// is infinity).
    pub svc_predicted_delays: Vec<Vec<f64>>,
}

/// Everything learnt about one coalition of providers.
#[derive(Debug, Clone)]
pub struct CoalitionInfo {
    pub cid: CoalitionId,
    /// Global ids of the fog nodes pooled by the members.
    pub fns: Vec<usize>,
    /// Ids of the demanded VMs served by the members.
    pub vms: Vec<usize>,
    /// None when the allocation problem has no usable solution.
    pub allocation: Option<VmAllocation>,
    /// Coalition value: net profit over the formation interval.
    pub value: f64,
    pub core_empty: bool,
    /// Shapley payoff by member provider; empty when unsolvable.
    pub payoffs: BTreeMap<usize, f64>,
    /// Whether the Shapley payoffs lie in the (non-empty) core.
    pub payoffs_in_core: bool,
}

/// One coalition structure: a partition of the providers.
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    /// Sum of the member coalition values.
    pub value: f64,
    pub coalitions: BTreeSet<CoalitionId>,
    /// Payoff by provider; NaN when the hosting coalition has none.
    pub payoffs: BTreeMap<usize, f64>,
}

impl PartitionInfo {
    /// Structure rendered as nested member sets, e.g. `{{0},{1,2}}`.
    pub fn structure(&self) -> String {
        let mut out = String::from("{");
        for (k, cid) in self.coalitions.iter().enumerate() {
            if k > 0 {
                out.push(',');
            }
            out.push_str(&cid.to_string());
        }
        out.push('}');
        out
    }
}

/// Result of one formation analysis.
#[derive(Debug, Clone)]
pub struct FormationOutcome {
    /// Every coalition visited, keyed by id.
    pub coalitions: BTreeMap<CoalitionId, CoalitionInfo>,
    /// The selected coalition structures: all Nash-stable ones when
    /// configured so, otherwise at most the best one. Empty when no stable
    /// structure exists.
    pub best_partitions: Vec<PartitionInfo>,
    /// Profit each provider would make on its own; NaN when its singleton
    /// allocation is unsolvable.
    pub alone_profits: Vec<f64>,
}

impl FormationOutcome {
    /// The highest-valued selected structure.
    pub fn best_partition(&self) -> Option<&PartitionInfo> {
        self.best_partitions
            .iter()
            .max_by(|a, b| a.value.total_cmp(&b.value))
    }

    /// Writes the power states decided for `partition` back into the global
    /// per-FN state table.
    pub fn apply_power_states(&self, partition: &PartitionInfo, states: &mut [bool]) {
        for cid in &partition.coalitions {
            let info = &self.coalitions[cid];
            if let Some(alloc) = &info.allocation {
                for (pos, &fn_id) in info.fns.iter().enumerate() {
                    states[fn_id] = alloc.fn_power_states[pos];
                }
            }
        }
    }
}

/// Values every coalition of providers and selects the Nash-stable
/// coalition structures.
///
/// `duration` is the length of the formation interval the profits refer to;
/// `fn_power_states` is the current per-FN power state, which prices the
/// switching decisions of each allocation.
pub fn analyze_coalitions(
    scen: &Scenario,
    topo: &Topology,
    demand: &ServiceDemand,
    fn_power_states: &[bool],
    duration: f64,
    solver: &dyn AllocationSolver,
    cfg: &FormationConfig,
) -> Result<FormationOutcome, Error> {
    let num_fps = scen.num_fps;
    let mut game = CooperativeGame::new(num_fps);
    let mut coalitions: BTreeMap<CoalitionId, CoalitionInfo> = BTreeMap::new();
    let mut alone_profits = vec![f64::NAN; num_fps];

    // Proper subsets come before their supersets in mask order, so subgames
    // always find every sub-coalition already valued.
    for mask in subsets(num_fps) {
        let cid = CoalitionId::from_mask(mask);
        let members = cid.members();

        let fns: Vec<usize> = (0..topo.num_fns)
            .filter(|&f| cid.contains(topo.fn_fps[f]))
            .collect();
        let vms: Vec<usize> = (0..demand.vm_to_svcs.len())
            .filter(|&j| cid.contains(topo.svc_fps[demand.vm_to_svcs[j]]))
            .collect();

        let req = AllocationRequest {
            fns: &fns,
            vms: &vms,
            fn_to_fps: &topo.fn_fps,
            fn_categories: &topo.fn_categories,
            fn_power_states,
            fn_cat_min_powers: &scen.fn_min_powers,
            fn_cat_max_powers: &scen.fn_max_powers,
            vm_to_svcs: &demand.vm_to_svcs,
            svc_cat_vm_categories: &scen.svc_vm_categories,
            vm_cpu_specs: &scen.vm_cpu_requirements,
            vm_ram_specs: &scen.vm_ram_requirements,
            svc_to_fps: &topo.svc_fps,
            svc_categories: &topo.svc_categories,
            svc_cat_max_delays: &scen.svc_max_delays,
            svc_predicted_delays: &demand.svc_predicted_delays,
            fp_svc_cat_penalties: &scen.fp_svc_penalties,
            fp_electricity_costs: &scen.fp_electricity_costs,
            fp_fn_cat_asleep_costs: &scen.fp_fn_asleep_costs,
            fp_fn_cat_awake_costs: &scen.fp_fn_awake_costs,
        };

        let info = match solver.solve(&req)? {
            Some(alloc) => {
                let revenue: f64 = (0..topo.num_svcs)
                    .filter(|&s| cid.contains(topo.svc_fps[s]))
                    .map(|s| scen.fp_svc_revenues[topo.svc_fps[s]][topo.svc_categories[s]])
                    .sum();
                let mut cost = alloc.objective_value;
                if members.len() > 1 {
                    for &fp in &members {
                        cost -= scen.fp_coalition_costs[fp];
                    }
                }
                let value = (revenue - cost) * duration;
                game.set_value(cid, value)?;
                if members.len() == 1 {
                    alone_profits[members[0]] = value;
                }

                let sub = game.subgame(cid)?;
                let core = sub.find_core(cfg.tol)?;
                let shapley = sub.shapley_value()?;
                let payoffs: BTreeMap<usize, f64> = sub
                    .players()
                    .iter()
                    .copied()
                    .zip(shapley.iter().copied())
                    .collect();
                let payoffs_in_core = match core {
                    Some(_) => sub.belongs_to_core(&shapley, cfg.tol)?,
                    None => false,
                };

                debug!(
                    "Coalition {}: value = {}, core empty = {}",
                    cid,
                    value,
                    core.is_none()
                );

                CoalitionInfo {
                    cid,
                    fns,
                    vms,
                    allocation: Some(alloc),
                    value,
                    core_empty: core.is_none(),
                    payoffs,
                    payoffs_in_core,
                }
            }
            None => {
                warn!("Coalition {} has no usable allocation", cid);
                game.set_value(cid, VALUE_SENTINEL)?;
                CoalitionInfo {
                    cid,
                    fns,
                    vms,
                    allocation: None,
                    value: VALUE_SENTINEL,
                    core_empty: true,
                    payoffs: BTreeMap::new(),
                    payoffs_in_core: false,
                }
            }
        };
        coalitions.insert(cid, info);
    }

    let mut stable = Vec::new();
    for blocks in partitions(num_fps) {
        let cids: BTreeSet<CoalitionId> = blocks
            .iter()
            .map(|b| CoalitionId::from_members(b))
            .collect();

        let mut value = 0.0;
        let mut payoffs = BTreeMap::new();
        for cid in &cids {
            let info = coalitions
                .get(cid)
                .ok_or_else(|| FormationError::UnvisitedCoalition(cid.to_string()))?;
            value += info.value;
            for &fp in &cid.members() {
                payoffs.insert(fp, info.payoffs.get(&fp).copied().unwrap_or(f64::NAN));
            }
        }
        let partition = PartitionInfo {
            value,
            coalitions: cids,
            payoffs,
        };

        if is_nash_stable(&partition, &coalitions, cfg.tol)? {
            debug!("Stable structure {} with value {}", partition.structure(), value);
            stable.push(partition);
        }
    }

    let best_partitions = if cfg.find_all_partitions {
        stable
    } else {
        stable
            .into_iter()
            .max_by(|a, b| a.value.total_cmp(&b.value))
            .into_iter()
            .collect()
    };

    Ok(FormationOutcome {
        coalitions,
        best_partitions,
        alone_profits,
    })
}

/// Nash stability: no provider can strictly improve its payoff by moving
/// alone into another coalition of the structure or by going solo. A
/// provider without a payoff in its own coalition disqualifies the
/// structure.
fn is_nash_stable(
    partition: &PartitionInfo,
    coalitions: &BTreeMap<CoalitionId, CoalitionInfo>,
    tol: f64,
) -> Result<bool, FormationError> {
    let lookup = |cid: CoalitionId| -> Result<&CoalitionInfo, FormationError> {
        coalitions
            .get(&cid)
            .ok_or_else(|| FormationError::UnvisitedCoalition(cid.to_string()))
    };

    for cid1 in &partition.coalitions {
        for fp in cid1.members() {
            let current = match lookup(*cid1)?.payoffs.get(&fp) {
                Some(&p) => p,
                None => return Ok(false),
            };

            for cid2 in &partition.coalitions {
                if cid2 == cid1 {
                    continue;
                }
                let aug = cid2.with(fp);
                match lookup(aug)?.payoffs.get(&fp) {
                    Some(&p) if !float_cmp::definitely_greater(p, current, tol) => {}
                    _ => return Ok(false),
                }
            }

            // Going solo is always an option, own singleton included (which
            // compares the payoff to itself and never rejects).
            let solo = CoalitionId::singleton(fp);
            match lookup(solo)?.payoffs.get(&fp) {
                Some(&p) if !float_cmp::definitely_greater(p, current, tol) => {}
                _ => return Ok(false),
            }
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::BranchAndBoundSolver;
    use crate::queueing::MmcQueue;
    use crate::scenario::parse_scenario;

    const TOL: f64 = 1e-5;

    /// Two symmetric providers, one service and one fog node each. Pooling
    /// saves nothing on paper but nothing costs anything either, so both
    /// structures are feasible.
    fn two_provider_scenario(electricity: (f64, f64)) -> Scenario {
        let text = format!(
            r#"
num_fps = 2
num_fn_categories = 1
num_svc_categories = 1
num_vm_categories = 1
svc.max_delays = [1.0]
svc.vm_categories = [0]
svc.vm_service_rates = [5.0]
svc.workloads = [[[100 2.0]]]
fp.num_svcs = [[1] [1]]
fp.num_fns = [[1] [1]]
fp.electricity_costs = [{} {}]
fp.fn_asleep_costs = [[0.0] [0.0]]
fp.fn_awake_costs = [[0.0] [0.0]]
fp.svc_revenues = [[100.0] [100.0]]
fp.svc_penalties = [[50.0] [50.0]]
fn.min_powers = [100.0]
fn.max_powers = [200.0]
vm.cpu_requirements = [[0.4]]
vm.ram_requirements = [[0.3]]
"#,
            electricity.0, electricity.1
        );
        parse_scenario(&text).unwrap()
    }

    fn demand_for(scen: &Scenario, topo: &Topology, rates: &[f64]) -> ServiceDemand {
        let mut demand = ServiceDemand::default();
        for svc in 0..topo.num_svcs {
            let cat = topo.svc_categories[svc];
            let mut queue = MmcQueue::new(
                rates[svc],
                scen.svc_vm_service_rates[cat],
                scen.svc_max_delays[cat],
                TOL,
            );
            let n = queue.min_servers();
            for _ in 0..n {
                demand.vm_to_svcs.push(svc);
            }
            demand.svc_predicted_delays.push(queue.delays().to_vec());
        }
        demand
    }

    fn analyze(scen: &Scenario, find_all: bool) -> FormationOutcome {
        let topo = Topology::from_scenario(scen);
        let demand = demand_for(scen, &topo, &vec![2.0; topo.num_svcs]);
        let states = vec![true; topo.num_fns];
        let solver = BranchAndBoundSolver::new(0.0, -1.0);
        analyze_coalitions(
            scen,
            &topo,
            &demand,
            &states,
            300.0,
            &solver,
            &FormationConfig {
                tol: TOL,
                find_all_partitions: find_all,
            },
        )
        .unwrap()
    }

    #[test]
    fn visits_every_coalition() {
        let scen = two_provider_scenario((0.1, 0.1));
        let outcome = analyze(&scen, true);
        assert_eq!(outcome.coalitions.len(), 3);
        for info in outcome.coalitions.values() {
            assert!(info.allocation.is_some());
            assert!(info.value.is_finite());
        }
        assert!(outcome.alone_profits.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn symmetric_providers_split_the_grand_value_evenly() {
        let scen = two_provider_scenario((0.1, 0.1));
        let outcome = analyze(&scen, true);
        let grand = CoalitionId::from_members(&[0, 1]);
        let info = &outcome.coalitions[&grand];
        let p0 = info.payoffs[&0];
        let p1 = info.payoffs[&1];
        assert!((p0 - p1).abs() < 1e-9);
        assert!((p0 + p1 - info.value).abs() < 1e-6);
    }

    #[test]
    fn pooling_wins_when_one_provider_has_cheap_electricity() {
        // Provider 0 pays far less per Wh: merging moves both VMs onto its
        // node and powers the expensive one off.
        let scen = two_provider_scenario((0.01, 1.0));
        let outcome = analyze(&scen, false);

        let grand = CoalitionId::from_members(&[0, 1]);
        let split: f64 = outcome.coalitions[&CoalitionId::singleton(0)].value
            + outcome.coalitions[&CoalitionId::singleton(1)].value;
        assert!(outcome.coalitions[&grand].value > split);

        let best = outcome.best_partition().expect("a stable structure exists");
        assert!(best.coalitions.contains(&grand));
        assert_eq!(best.structure(), "{{0,1}}");

        // Writing the decision back powers the idle node off.
        let topo = Topology::from_scenario(&scen);
        let mut states = vec![true; topo.num_fns];
        outcome.apply_power_states(best, &mut states);
        assert!(states.iter().any(|&on| !on));
    }

    #[test]
    fn selected_structures_are_nash_stable() {
        let scen = two_provider_scenario((0.01, 1.0));
        let outcome = analyze(&scen, true);
        assert!(!outcome.best_partitions.is_empty());
        for part in &outcome.best_partitions {
            assert!(is_nash_stable(part, &outcome.coalitions, TOL).unwrap());
            // Payoffs cover every provider.
            assert_eq!(part.payoffs.len(), 2);
        }
    }

    #[test]
    fn structure_string_lists_sorted_members() {
        let part = PartitionInfo {
            value: 0.0,
            coalitions: [
                CoalitionId::from_members(&[1, 2]),
                CoalitionId::singleton(0),
            ]
            .into_iter()
            .collect(),
            payoffs: BTreeMap::new(),
        };
        assert_eq!(part.structure(), "{{0},{1,2}}");
    }
}
