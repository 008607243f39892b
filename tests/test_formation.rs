use fog_coalsim::allocation::BranchAndBoundSolver;
use fog_coalsim::formation::{analyze_coalitions, FormationConfig, ServiceDemand};
use fog_coalsim::game::CoalitionId;
use fog_coalsim::queueing::MmcQueue;
use fog_coalsim::scenario::{parse_scenario, Scenario, Topology};

const TOL: f64 = 1e-5;
const INTERVAL: f64 = 300.0;

fn scenario(body: &str) -> Scenario {
    parse_scenario(body).unwrap()
}

fn demand_for(scen: &Scenario, topo: &Topology, rate: f64) -> ServiceDemand {
    let mut demand = ServiceDemand::default();
    for svc in 0..topo.num_svcs {
        let cat = topo.svc_categories[svc];
        let mut queue = MmcQueue::new(
            rate,
            scen.svc_vm_service_rates[cat],
            scen.svc_max_delays[cat],
            TOL,
        );
        let num_vms = queue.min_servers();
        for _ in 0..num_vms {
            demand.vm_to_svcs.push(svc);
        }
        demand.svc_predicted_delays.push(queue.delays().to_vec());
    }
    demand
}

fn analyze(scen: &Scenario, find_all: bool) -> fog_coalsim::formation::FormationOutcome {
    let topo = Topology::from_scenario(scen);
    let demand = demand_for(scen, &topo, 2.0);
    let states = vec![true; topo.num_fns];
    let solver = BranchAndBoundSolver::new(0.0, -1.0);
    analyze_coalitions(
        scen,
        &topo,
        &demand,
        &states,
        INTERVAL,
        &solver,
        &FormationConfig {
            tol: TOL,
            find_all_partitions: find_all,
        },
    )
    .unwrap()
}

/// Providers with different electricity prices: pooling lets the cheap one
/// host everything.
const ASYMMETRIC: &str = r#"
num_fps = 2
num_fn_categories = 1
num_svc_categories = 1
num_vm_categories = 1
svc.max_delays = [1.0]
svc.vm_categories = [0]
svc.vm_service_rates = [5.0]
svc.workloads = [[[400 2.0]]]
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

#[test]
fn test_merge_beats_staying_alone_under_price_asymmetry() {
    let scen = scenario(ASYMMETRIC);
    let outcome = analyze(&scen, false);

    let grand = CoalitionId::from_members(&[0, 1]);
    let sum_alone: f64 = outcome.alone_profits.iter().sum();
    assert!(outcome.coalitions[&grand].value > sum_alone);

    let best = outcome.best_partition().expect("a stable structure exists");
    assert_eq!(best.structure(), "{{0,1}}");
    // Both providers end up at least as well off as alone.
    for fp in 0..2 {
        assert!(best.payoffs[&fp] >= outcome.alone_profits[fp] - 1e-9);
    }
}

#[test]
fn test_grand_payoffs_distribute_the_grand_value() {
    let scen = scenario(ASYMMETRIC);
    let outcome = analyze(&scen, false);
    let grand = CoalitionId::from_members(&[0, 1]);
    let info = &outcome.coalitions[&grand];
    let total: f64 = info.payoffs.values().sum();
    assert!((total - info.value).abs() < 1e-6);
    assert!(!info.core_empty);
    assert!(info.payoffs_in_core);
}

/// Provider 0's single node hosts one VM while its service needs two: alone
/// it stays feasible but pays SLA penalties. Provider 1 has nodes to spare,
/// so pooling serves everything within the delay targets.
const CAPACITY: &str = r#"
num_fps = 2
num_fn_categories = 1
num_svc_categories = 1
num_vm_categories = 1
svc.max_delays = [0.25]
svc.vm_categories = [0]
svc.vm_service_rates = [5.0]
svc.workloads = [[[400 2.0]]]
fp.num_svcs = [[1] [1]]
fp.num_fns = [[1] [3]]
fp.electricity_costs = [0.1 0.1]
fp.fn_asleep_costs = [[0.0] [0.0]]
fp.fn_awake_costs = [[0.0] [0.0]]
fp.svc_revenues = [[100.0] [100.0]]
fp.svc_penalties = [[50.0] [50.0]]
fn.min_powers = [100.0]
fn.max_powers = [200.0]
vm.cpu_requirements = [[0.6]]
vm.ram_requirements = [[0.3]]
"#;

#[test]
fn test_capacity_starved_provider_merges_into_the_grand_coalition() {
    let scen = scenario(CAPACITY);
    let outcome = analyze(&scen, false);

    // At rate 2 each service needs two VMs (one VM gives 1/3 > 0.25). Alone,
    // provider 0 places a single VM and eats the penalty; the problem stays
    // solvable and its solo profit finite.
    let solo = CoalitionId::singleton(0);
    assert!(outcome.coalitions[&solo].allocation.is_some());
    assert!(outcome.alone_profits[0].is_finite());

    let grand = CoalitionId::from_members(&[0, 1]);
    let sum_alone: f64 = outcome.alone_profits.iter().sum();
    assert!(outcome.coalitions[&grand].value > sum_alone);

    let best = outcome.best_partition().expect("a stable structure exists");
    assert_eq!(best.structure(), "{{0,1}}");
    for fp in 0..2 {
        assert!(best.payoffs[&fp] >= outcome.alone_profits[fp] - 1e-9);
    }
}

/// Identical providers whose VMs cannot share a node: pooling changes
/// nothing and the game is additive.
const ADDITIVE: &str = r#"
num_fps = 2
num_fn_categories = 1
num_svc_categories = 1
num_vm_categories = 1
svc.max_delays = [1.0]
svc.vm_categories = [0]
svc.vm_service_rates = [5.0]
svc.workloads = [[[400 2.0]]]
fp.num_svcs = [[1] [1]]
fp.num_fns = [[1] [1]]
fp.electricity_costs = [0.1 0.1]
fp.fn_asleep_costs = [[0.0] [0.0]]
fp.fn_awake_costs = [[0.0] [0.0]]
fp.svc_revenues = [[100.0] [100.0]]
fp.svc_penalties = [[50.0] [50.0]]
fn.min_powers = [100.0]
fn.max_powers = [200.0]
vm.cpu_requirements = [[0.6]]
vm.ram_requirements = [[0.3]]
"#;

#[test]
fn test_additive_game_keeps_every_structure_stable() {
    let scen = scenario(ADDITIVE);
    let outcome = analyze(&scen, true);

    let grand = CoalitionId::from_members(&[0, 1]);
    let sum_alone: f64 = outcome.alone_profits.iter().sum();
    assert!((outcome.coalitions[&grand].value - sum_alone).abs() < 1e-6);

    // Nobody strictly gains by moving, so both structures survive.
    assert_eq!(outcome.best_partitions.len(), 2);
    for part in &outcome.best_partitions {
        for fp in 0..2 {
            assert!((part.payoffs[&fp] - outcome.alone_profits[fp]).abs() < 1e-6);
        }
    }
}

/// Provider 1's node is too small for any VM, so its singleton coalition
/// has no usable allocation.
const CRIPPLED: &str = r#"
num_fps = 2
num_fn_categories = 2
num_svc_categories = 1
num_vm_categories = 1
svc.max_delays = [1.0]
svc.vm_categories = [0]
svc.vm_service_rates = [5.0]
svc.workloads = [[[400 2.0]]]
fp.num_svcs = [[1] [1]]
fp.num_fns = [[1 0] [0 1]]
fp.electricity_costs = [0.1 0.1]
fp.fn_asleep_costs = [[0.0 0.0] [0.0 0.0]]
fp.fn_awake_costs = [[0.0 0.0] [0.0 0.0]]
fp.svc_revenues = [[100.0] [100.0]]
fp.svc_penalties = [[50.0] [50.0]]
fn.min_powers = [100.0 100.0]
fn.max_powers = [200.0 200.0]
vm.cpu_requirements = [[0.4 1.5]]
vm.ram_requirements = [[0.3 0.3]]
"#;

#[test]
fn test_unsolvable_singleton_disqualifies_every_structure() {
    let scen = scenario(CRIPPLED);
    let outcome = analyze(&scen, true);

    let solo = CoalitionId::singleton(1);
    assert!(outcome.coalitions[&solo].allocation.is_none());
    assert!(outcome.coalitions[&solo].payoffs.is_empty());
    assert!(outcome.alone_profits[1].is_nan());

    // The grand coalition is solvable on provider 0's node, but provider
    // 1's solo deviation has no payoff data, which disqualifies every
    // candidate structure.
    let grand = CoalitionId::from_members(&[0, 1]);
    assert!(outcome.coalitions[&grand].allocation.is_some());
    assert!(outcome.best_partitions.is_empty());
}
