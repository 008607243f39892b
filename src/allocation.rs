//! Minimum-cost allocation of service VMs onto the pooled fog nodes of a
//! coalition.
//!
//! The underlying 0/1 program decides which fog nodes to power on (`x_i`)
//! and which node hosts each VM (`y_ij`), subject to per-node CPU and RAM
//! capacity, and minimizes electricity cost, power-state switching cost and
//! SLA violation penalties. Missing VMs are allowed; they show up as a
//! higher predicted delay and hence a higher SLA penalty.

use std::time::{Duration, Instant};

use log::warn;

use crate::error::SolverError;

/// Input of one allocation run. Entity ids (`fns`, `vms`, services, fog
/// providers) index the global tables; `fns` and `vms` select the pool
/// contributed by the coalition under evaluation.
#[derive(Debug, Clone)]
pub struct AllocationRequest<'a> {
    /// Global ids of the pooled fog nodes.
    pub fns: &'a [usize],
    /// Global ids of the demanded VMs.
    pub vms: &'a [usize],
    /// Fog provider owning each fog node, by global FN id.
    pub fn_to_fps: &'a [usize],
    /// Category of each fog node, by global FN id.
    pub fn_categories: &'a [usize],
    /// Current power state of each fog node, by global FN id.
    pub fn_power_states: &'a [bool],
    /// Idle power draw by FN category (W).
    pub fn_cat_min_powers: &'a [f64],
    /// Full-load power draw by FN category (W).
    pub fn_cat_max_powers: &'a [f64],
    /// Service run by each VM, by global VM id.
    pub vm_to_svcs: &'a [usize],
    /// VM category demanded by each service category.
    pub svc_cat_vm_categories: &'a [usize],
    /// CPU share taken by a VM, by VM category and FN category.
    pub vm_cpu_specs: &'a [Vec<f64>],
    /// RAM share taken by a VM, by VM category and FN category.
    pub vm_ram_specs: &'a [Vec<f64>],
    /// Fog provider owning each service, by global service id.
    pub svc_to_fps: &'a [usize],
    /// Category of each service, by global service id.
    pub svc_categories: &'a [usize],
    /// Maximum tolerated delay by service category.
    pub svc_cat_max_delays: &'a [f64],
    /// Predicted delay by global service id and number of allocated VMs
    /// (entry 0 is infinity).
    pub svc_predicted_delays: &'a [Vec<f64>],
    /// SLA penalty by fog provider and service category.
    pub fp_svc_cat_penalties: &'a [Vec<f64>],
    /// Electricity price by fog provider ($/Wh).
    pub fp_electricity_costs: &'a [f64],
    /// Cost of powering a node off, by fog provider and FN category.
    pub fp_fn_cat_asleep_costs: &'a [Vec<f64>],
    /// Cost of powering a node on, by fog provider and FN category.
    pub fp_fn_cat_awake_costs: &'a [Vec<f64>],
}

/// Solution of one allocation run. Indices are positions into the pooled
/// `fns` / `vms` lists of the request.
#[derive(Debug, Clone)]
pub struct VmAllocation {
    /// False when the search was cut short by the time limit and the
    /// incumbent is only known to be feasible.
    pub optimal: bool,
    pub objective_value: f64,
    /// `fn_vm_allocations[i][j]` is true when pooled VM j runs on pooled
    /// FN i.
    pub fn_vm_allocations: Vec<Vec<bool>>,
    /// Decided power state of each pooled FN.
    pub fn_power_states: Vec<bool>,
}

/// Narrow seam between the formation engine and the optimizer backend.
/// `Ok(None)` means the problem admits no usable solution.
pub trait AllocationSolver {
    fn solve(&self, req: &AllocationRequest) -> Result<Option<VmAllocation>, SolverError>;
}

/// Exact branch-and-bound backend.
///
/// The search branches on the host of each VM in turn ("unplaced" is the
/// last option), prunes with an admissible lower bound, and closes empty
/// nodes with whichever power decision is cheaper. A positive `time_limit`
/// turns the solver into an anytime one: on expiry the incumbent is
/// returned as feasible-but-not-proven-optimal.
pub struct BranchAndBoundSolver {
    rel_tol: f64,
    time_limit: Option<Duration>,
}

impl BranchAndBoundSolver {
    /// `rel_tol <= 0` disables the optimality gap, `time_limit_secs <= 0`
    /// disables the time limit.
    pub fn new(rel_tol: f64, time_limit_secs: f64) -> Self {
        Self {
            rel_tol: rel_tol.max(0.0),
            time_limit: if time_limit_secs > 0.0 {
                Some(Duration::from_secs_f64(time_limit_secs))
            } else {
                None
            },
        }
    }
}

impl AllocationSolver for BranchAndBoundSolver {
    fn solve(&self, req: &AllocationRequest) -> Result<Option<VmAllocation>, SolverError> {
        let mut search = Search::new(req, self.rel_tol, self.time_limit)?;
        search.run();

        if search.timed_out && search.incumbent.is_none() {
            warn!("Allocation search hit the time limit without a feasible incumbent");
            return Ok(None);
        }

        match search.incumbent.take() {
            Some(inc) if inc.objective.is_finite() => {
                if search.timed_out {
                    warn!(
                        "Allocation search stopped at the time limit; best objective {}",
                        inc.objective
                    );
                }
                Ok(Some(search.build_solution(inc, !search.timed_out)))
            }
            // An all-unplaced assignment always exists, so an infinite
            // incumbent means every assignment violates some SLA beyond
            // recovery. Treat it as unsolvable.
            _ => {
                warn!("Allocation problem has no solution with a finite cost");
                Ok(None)
            }
        }
    }
}

struct Incumbent {
    objective: f64,
    hosts: Vec<usize>, // per pooled VM; == nfns means unplaced
}

struct Search<'a> {
    req: &'a AllocationRequest<'a>,
    rel_tol: f64,
    deadline: Option<Instant>,
    timed_out: bool,

    nfns: usize,
    nvms: usize,
    svcs: Vec<usize>, // distinct global service ids of the pooled VMs

    // Per pooled FN, precomputed from the owner and category tables.
    fn_energy_price: Vec<f64>, // electricity price of the owner
    fn_min_power: Vec<f64>,
    fn_power_span: Vec<f64>, // max - min power
    fn_awake_cost: Vec<f64>, // 0 when already on
    fn_asleep_cost: Vec<f64>, // 0 when already off
    fn_idle_floor: Vec<f64>, // cheapest cost of a FN hosting no VM

    // Per pooled VM and pooled FN.
    vm_cpu: Vec<Vec<f64>>,
    vm_ram: Vec<Vec<f64>>,
    vm_svc_pos: Vec<usize>, // position into svcs

    // Mutable DFS state.
    hosts: Vec<usize>,
    fn_cpu: Vec<f64>,
    fn_ram: Vec<f64>,
    fn_load: Vec<usize>,     // VMs currently on each FN
    svc_placed: Vec<usize>,  // placed VMs per service position
    svc_pending: Vec<usize>, // still-unassigned VMs per service position

    incumbent: Option<Incumbent>,
    nodes_since_clock: u32,
}

impl<'a> Search<'a> {
    fn new(
        req: &'a AllocationRequest<'a>,
        rel_tol: f64,
        time_limit: Option<Duration>,
    ) -> Result<Self, SolverError> {
        let nfns = req.fns.len();
        let nvms = req.vms.len();

        let mut svcs: Vec<usize> = req.vms.iter().map(|&vm| req.vm_to_svcs[vm]).collect();
        svcs.sort_unstable();
        svcs.dedup();

        let mut fn_energy_price = Vec::with_capacity(nfns);
        let mut fn_min_power = Vec::with_capacity(nfns);
        let mut fn_power_span = Vec::with_capacity(nfns);
        let mut fn_awake_cost = Vec::with_capacity(nfns);
        let mut fn_asleep_cost = Vec::with_capacity(nfns);
        let mut fn_idle_floor = Vec::with_capacity(nfns);
        for &fn_id in req.fns {
            let fp = req.fn_to_fps[fn_id];
            let cat = req.fn_categories[fn_id];
            let on = req.fn_power_states[fn_id];
            let price = req.fp_electricity_costs[fp];
            let span = req.fn_cat_max_powers[cat] - req.fn_cat_min_powers[cat];
            if span < 0.0 {
                return Err(SolverError(format!(
                    "FN category {} has max power below min power",
                    cat
                )));
            }
            let awake = if on {
                0.0
            } else {
                req.fp_fn_cat_awake_costs[fp][cat]
            };
            let asleep = if on {
                req.fp_fn_cat_asleep_costs[fp][cat]
            } else {
                0.0
            };
            let idle_on = req.fn_cat_min_powers[cat] * price + awake;
            fn_energy_price.push(price);
            fn_min_power.push(req.fn_cat_min_powers[cat]);
            fn_power_span.push(span);
            fn_awake_cost.push(awake);
            fn_asleep_cost.push(asleep);
            fn_idle_floor.push(idle_on.min(asleep));
        }

        let mut vm_cpu = Vec::with_capacity(nvms);
        let mut vm_ram = Vec::with_capacity(nvms);
        let mut vm_svc_pos = Vec::with_capacity(nvms);
        for &vm_id in req.vms {
            let svc = req.vm_to_svcs[vm_id];
            let svc_cat = req.svc_categories[svc];
            let vm_cat = req.svc_cat_vm_categories[svc_cat];
            let cpu: Vec<f64> = req
                .fns
                .iter()
                .map(|&f| req.vm_cpu_specs[vm_cat][req.fn_categories[f]])
                .collect();
            let ram: Vec<f64> = req
                .fns
                .iter()
                .map(|&f| req.vm_ram_specs[vm_cat][req.fn_categories[f]])
                .collect();
            vm_cpu.push(cpu);
            vm_ram.push(ram);
            let pos = svcs
                .binary_search(&svc)
                .map_err(|_| SolverError(format!("VM {} maps to unknown service {}", vm_id, svc)))?;
            vm_svc_pos.push(pos);
        }

        let nsvcs = svcs.len();
        let mut svc_pending = vec![0usize; nsvcs];
        for &pos in &vm_svc_pos {
            svc_pending[pos] += 1;
        }

        Ok(Self {
            req,
            rel_tol,
            deadline: time_limit.map(|lim| Instant::now() + lim),
            timed_out: false,
            nfns,
            nvms,
            svcs,
            fn_energy_price,
            fn_min_power,
            fn_power_span,
            fn_awake_cost,
            fn_asleep_cost,
            fn_idle_floor,
            vm_cpu,
            vm_ram,
            vm_svc_pos,
            hosts: vec![0; nvms],
            fn_cpu: vec![0.0; nfns],
            fn_ram: vec![0.0; nfns],
            fn_load: vec![0; nfns],
            svc_placed: vec![0; nsvcs],
            svc_pending,
            incumbent: None,
            nodes_since_clock: 0,
        })
    }

    fn run(&mut self) {
        self.dfs(0);
    }

    fn dfs(&mut self, j: usize) {
        if self.timed_out {
            return;
        }
        self.nodes_since_clock += 1;
        if self.nodes_since_clock >= 1024 {
            self.nodes_since_clock = 0;
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    self.timed_out = true;
                    return;
                }
            }
        }

        if j == self.nvms {
            let objective = self.leaf_objective();
            let better = match &self.incumbent {
                None => true,
                Some(inc) => objective < inc.objective,
            };
            if better {
                self.incumbent = Some(Incumbent {
                    objective,
                    hosts: self.hosts.clone(),
                });
            }
            return;
        }

        if self.prunable(self.lower_bound(j)) {
            return;
        }

        // Identical VMs of the same service are interchangeable: force
        // non-decreasing host choices among them to break the symmetry.
        let min_choice = if j > 0 && self.vm_svc_pos[j] == self.vm_svc_pos[j - 1] {
            self.hosts[j - 1]
        } else {
            0
        };

        for i in min_choice..self.nfns {
            let cpu = self.vm_cpu[j][i];
            let ram = self.vm_ram[j][i];
            if self.fn_cpu[i] + cpu > 1.0 + 1e-12 || self.fn_ram[i] + ram > 1.0 + 1e-12 {
                continue;
            }
            self.hosts[j] = i;
            self.fn_cpu[i] += cpu;
            self.fn_ram[i] += ram;
            self.fn_load[i] += 1;
            let pos = self.vm_svc_pos[j];
            self.svc_placed[pos] += 1;
            self.svc_pending[pos] -= 1;

            self.dfs(j + 1);

            self.svc_pending[pos] += 1;
            self.svc_placed[pos] -= 1;
            self.fn_load[i] -= 1;
            self.fn_ram[i] -= ram;
            self.fn_cpu[i] -= cpu;
        }

        // Leave the VM unplaced.
        self.hosts[j] = self.nfns;
        let pos = self.vm_svc_pos[j];
        self.svc_pending[pos] -= 1;
        self.dfs(j + 1);
        self.svc_pending[pos] += 1;
    }

    fn prunable(&self, bound: f64) -> bool {
        match &self.incumbent {
            None => false,
            // Objectives are non-negative; a node within the relative gap
            // of the incumbent cannot improve it meaningfully.
            Some(inc) => bound >= inc.objective * (1.0 - self.rel_tol),
        }
    }

    /// Admissible lower bound on any completion of the partial assignment:
    /// loaded nodes pay their current energy and wake-up bill, idle nodes
    /// pay their cheapest closing decision, and each service is granted all
    /// of its still-unassigned VMs when pricing the SLA.
    fn lower_bound(&self, _next_vm: usize) -> f64 {
        let mut bound = 0.0;
        for i in 0..self.nfns {
            if self.fn_load[i] > 0 {
                bound += (self.fn_min_power[i] + self.fn_power_span[i] * self.fn_cpu[i])
                    * self.fn_energy_price[i]
                    + self.fn_awake_cost[i];
            } else {
                bound += self.fn_idle_floor[i];
            }
        }
        for pos in 0..self.svcs.len() {
            bound += self.sla_cost(pos, self.svc_placed[pos] + self.svc_pending[pos]);
        }
        bound
    }

    fn leaf_objective(&self) -> f64 {
        let mut objective = 0.0;
        for i in 0..self.nfns {
            if self.fn_load[i] > 0 {
                objective += (self.fn_min_power[i] + self.fn_power_span[i] * self.fn_cpu[i])
                    * self.fn_energy_price[i]
                    + self.fn_awake_cost[i];
            } else {
                objective += self.fn_idle_floor[i];
            }
        }
        for pos in 0..self.svcs.len() {
            objective += self.sla_cost(pos, self.svc_placed[pos]);
        }
        objective
    }

    /// SLA violation cost of a service served by `num_vms` VMs.
    fn sla_cost(&self, pos: usize, num_vms: usize) -> f64 {
        let svc = self.svcs[pos];
        let fp = self.req.svc_to_fps[svc];
        let svc_cat = self.req.svc_categories[svc];
        let penalty = self.req.fp_svc_cat_penalties[fp][svc_cat];
        let curve = &self.req.svc_predicted_delays[svc];
        let idx = num_vms.min(curve.len() - 1);
        let delay = curve[idx];
        let max_delay = self.req.svc_cat_max_delays[svc_cat];
        ((delay / max_delay).max(1.0) - 1.0) * penalty
    }

    fn build_solution(&self, inc: Incumbent, optimal: bool) -> VmAllocation {
        let mut fn_vm_allocations = vec![vec![false; self.nvms]; self.nfns];
        let mut fn_power_states = vec![false; self.nfns];
        let mut fn_loaded = vec![false; self.nfns];
        for (j, &host) in inc.hosts.iter().enumerate() {
            if host < self.nfns {
                fn_vm_allocations[host][j] = true;
                fn_loaded[host] = true;
            }
        }
        for i in 0..self.nfns {
            // Empty nodes keep whichever closing decision priced the leaf.
            let idle_on = self.fn_min_power[i] * self.fn_energy_price[i] + self.fn_awake_cost[i];
            fn_power_states[i] = fn_loaded[i] || idle_on < self.fn_asleep_cost[i];
        }
        VmAllocation {
            optimal,
            objective_value: inc.objective,
            fn_vm_allocations,
            fn_power_states,
        }
    }
}
