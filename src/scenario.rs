//! Scenario files: the static description of providers, fog nodes,
//! services and prices that a simulation runs against.
//!
//! The format is line oriented: `#` starts a comment, every other
//! non-empty line is `key = value` with case-insensitive keys. Values are
//! scalars, bracketed vectors (`[a b c]`) or bracketed matrices
//! (`[[a b] [c d]]`); commas are treated as blanks. Counts (`num_*`) must
//! appear before the arrays they size.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::ScenarioError;
use crate::workload::Burst;

/// Parsed scenario. Dimensions: `fp` ranges over providers, `fnc` over FN
/// categories, `svcc` over service categories and `vmc` over VM categories.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Scenario {
    pub num_fps: usize,
    pub num_fn_categories: usize,
    pub num_svc_categories: usize,
    pub num_vm_categories: usize,
    /// Max tolerated delay by service category.
    pub svc_max_delays: Vec<f64>,
    /// VM category demanded by each service category.
    pub svc_vm_categories: Vec<usize>,
    /// Service rate of one VM by service category.
    pub svc_vm_service_rates: Vec<f64>,
    /// Workload steps by service category.
    pub svc_workloads: Vec<Vec<Burst>>,
    /// Services run by each provider, by service category.
    pub fp_num_svcs: Vec<Vec<usize>>,
    /// Fog nodes owned by each provider, by FN category.
    pub fp_num_fns: Vec<Vec<usize>>,
    /// Electricity price by provider ($/Wh).
    pub fp_electricity_costs: Vec<f64>,
    /// Cost of powering a node off, by provider and FN category.
    pub fp_fn_asleep_costs: Vec<Vec<f64>>,
    /// Cost of powering a node on, by provider and FN category.
    pub fp_fn_awake_costs: Vec<Vec<f64>>,
    /// Fee paid by each provider for taking part in a coalition.
    pub fp_coalition_costs: Vec<f64>,
    /// Revenue by provider and service category.
    pub fp_svc_revenues: Vec<Vec<f64>>,
    /// SLA penalty by provider and service category.
    pub fp_svc_penalties: Vec<Vec<f64>>,
    /// Idle power draw by FN category (W).
    pub fn_min_powers: Vec<f64>,
    /// Full-load power draw by FN category (W).
    pub fn_max_powers: Vec<f64>,
    /// CPU share taken by a VM, by VM category and FN category.
    pub vm_cpu_requirements: Vec<Vec<f64>>,
    /// RAM share taken by a VM, by VM category and FN category.
    pub vm_ram_requirements: Vec<Vec<f64>>,
}

/// Entities derived from a scenario: the concrete fog nodes and service
/// instances, laid out provider-major and category-minor so that ids are
/// stable across runs.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub num_fns: usize,
    pub num_svcs: usize,
    /// Provider owning each fog node, by FN id.
    pub fn_fps: Vec<usize>,
    /// Category of each fog node, by FN id.
    pub fn_categories: Vec<usize>,
    /// Provider owning each service, by service id.
    pub svc_fps: Vec<usize>,
    /// Category of each service, by service id.
    pub svc_categories: Vec<usize>,
}

impl Topology {
    pub fn from_scenario(scen: &Scenario) -> Self {
        let mut topo = Topology::default();
        for fp in 0..scen.num_fps {
            for fnc in 0..scen.num_fn_categories {
                for _ in 0..scen.fp_num_fns[fp][fnc] {
                    topo.fn_fps.push(fp);
                    topo.fn_categories.push(fnc);
                }
            }
        }
        for fp in 0..scen.num_fps {
            for svcc in 0..scen.num_svc_categories {
                for _ in 0..scen.fp_num_svcs[fp][svcc] {
                    topo.svc_fps.push(fp);
                    topo.svc_categories.push(svcc);
                }
            }
        }
        topo.num_fns = topo.fn_fps.len();
        topo.num_svcs = topo.svc_fps.len();
        topo
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_scenario(&text)
}

pub fn parse_scenario(text: &str) -> Result<Scenario, ScenarioError> {
    let mut s = Scenario::default();
    let mut seen_coalition_costs = false;

    for (idx, raw_line) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key_part, value_part) = line.split_once('=').ok_or_else(|| {
            ScenarioError::Malformed {
                line: lineno,
                text: line.to_string(),
            }
        })?;
        let key = key_part.trim().to_ascii_lowercase();
        let mut cur = Cursor::new(value_part, lineno, &key);

        match key.as_str() {
            "num_fps" => s.num_fps = cur.scalar_usize()?,
            "num_fn_categories" => s.num_fn_categories = cur.scalar_usize()?,
            "num_svc_categories" => s.num_svc_categories = cur.scalar_usize()?,
            "num_vm_categories" => s.num_vm_categories = cur.scalar_usize()?,
            "svc.max_delays" => s.svc_max_delays = cur.vector_f64(s.num_svc_categories)?,
            "svc.vm_categories" => s.svc_vm_categories = cur.vector_usize(s.num_svc_categories)?,
            "svc.vm_service_rates" => {
                s.svc_vm_service_rates = cur.vector_f64(s.num_svc_categories)?
            }
            "svc.workloads" => s.svc_workloads = cur.workloads(s.num_svc_categories)?,
            "fp.num_svcs" => s.fp_num_svcs = cur.matrix_usize(s.num_fps, s.num_svc_categories)?,
            "fp.num_fns" => s.fp_num_fns = cur.matrix_usize(s.num_fps, s.num_fn_categories)?,
            "fp.electricity_costs" => s.fp_electricity_costs = cur.vector_f64(s.num_fps)?,
            "fp.fn_asleep_costs" => {
                s.fp_fn_asleep_costs = cur.matrix_f64(s.num_fps, s.num_fn_categories)?
            }
            "fp.fn_awake_costs" => {
                s.fp_fn_awake_costs = cur.matrix_f64(s.num_fps, s.num_fn_categories)?
            }
            "fp.coalition_costs" => {
                s.fp_coalition_costs = cur.vector_f64(s.num_fps)?;
                seen_coalition_costs = true;
            }
            "fp.svc_revenues" => {
                s.fp_svc_revenues = cur.matrix_f64(s.num_fps, s.num_svc_categories)?
            }
            "fp.svc_penalties" => {
                s.fp_svc_penalties = cur.matrix_f64(s.num_fps, s.num_svc_categories)?
            }
            "fn.min_powers" => s.fn_min_powers = cur.vector_f64(s.num_fn_categories)?,
            "fn.max_powers" => s.fn_max_powers = cur.vector_f64(s.num_fn_categories)?,
            "vm.cpu_requirements" => {
                s.vm_cpu_requirements = cur.matrix_f64(s.num_vm_categories, s.num_fn_categories)?
            }
            "vm.ram_requirements" => {
                s.vm_ram_requirements = cur.matrix_f64(s.num_vm_categories, s.num_fn_categories)?
            }
            _ => {
                return Err(ScenarioError::UnknownKey {
                    line: lineno,
                    key: key_part.trim().to_string(),
                })
            }
        }
    }

    // Taking part in a coalition is free unless the scenario says otherwise.
    if !seen_coalition_costs {
        s.fp_coalition_costs = vec![0.0; s.num_fps];
    }

    validate(&s)?;

    Ok(s)
}

fn validate(s: &Scenario) -> Result<(), ScenarioError> {
    fn check(cond: bool, what: &str) -> Result<(), ScenarioError> {
        if cond {
            Ok(())
        } else {
            Err(ScenarioError::Inconsistent(what.to_string()))
        }
    }

    check(s.num_fps > 0, "num_fps must be positive")?;
    check(s.num_fn_categories > 0, "num_fn_categories must be positive")?;
    check(
        s.num_svc_categories > 0,
        "num_svc_categories must be positive",
    )?;
    check(s.num_vm_categories > 0, "num_vm_categories must be positive")?;

    check(
        s.svc_max_delays.len() == s.num_svc_categories,
        "svc.max_delays must have one entry per service category",
    )?;
    check(
        s.svc_vm_categories.len() == s.num_svc_categories,
        "svc.vm_categories must have one entry per service category",
    )?;
    check(
        s.svc_vm_categories.iter().all(|&c| c < s.num_vm_categories),
        "svc.vm_categories entries must be valid VM categories",
    )?;
    check(
        s.svc_vm_service_rates.len() == s.num_svc_categories,
        "svc.vm_service_rates must have one entry per service category",
    )?;
    check(
        s.svc_workloads.len() == s.num_svc_categories
            && s.svc_workloads.iter().all(|w| !w.is_empty()),
        "svc.workloads must have at least one step per service category",
    )?;
    check(
        s.fp_num_svcs.len() == s.num_fps,
        "fp.num_svcs must have one row per FP",
    )?;
    check(
        s.fp_num_fns.len() == s.num_fps,
        "fp.num_fns must have one row per FP",
    )?;
    check(
        s.fp_electricity_costs.len() == s.num_fps,
        "fp.electricity_costs must have one entry per FP",
    )?;
    check(
        s.fp_fn_asleep_costs.len() == s.num_fps,
        "fp.fn_asleep_costs must have one row per FP",
    )?;
    check(
        s.fp_fn_awake_costs.len() == s.num_fps,
        "fp.fn_awake_costs must have one row per FP",
    )?;
    check(
        s.fp_coalition_costs.len() == s.num_fps,
        "fp.coalition_costs must have one entry per FP",
    )?;
    check(
        s.fp_svc_revenues.len() == s.num_fps,
        "fp.svc_revenues must have one row per FP",
    )?;
    check(
        s.fp_svc_penalties.len() == s.num_fps,
        "fp.svc_penalties must have one row per FP",
    )?;
    check(
        s.fn_min_powers.len() == s.num_fn_categories,
        "fn.min_powers must have one entry per FN category",
    )?;
    check(
        s.fn_max_powers.len() == s.num_fn_categories,
        "fn.max_powers must have one entry per FN category",
    )?;
    check(
        s.fn_min_powers
            .iter()
            .zip(&s.fn_max_powers)
            .all(|(lo, hi)| lo <= hi),
        "fn.max_powers must dominate fn.min_powers",
    )?;
    check(
        s.vm_cpu_requirements.len() == s.num_vm_categories,
        "vm.cpu_requirements must have one row per VM category",
    )?;
    check(
        s.vm_ram_requirements.len() == s.num_vm_categories,
        "vm.ram_requirements must have one row per VM category",
    )?;

    Ok(())
}

/// Character cursor over the value side of a `key = value` line.
struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    key: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, line: usize, key: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line,
            key,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ScenarioError {
        ScenarioError::InvalidValue {
            line: self.line,
            key: self.key.to_string(),
            reason: reason.into(),
        }
    }

    fn skip_blanks(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            self.chars.next();
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), ScenarioError> {
        self.skip_blanks();
        match self.chars.next() {
            Some(c) if c == wanted => Ok(()),
            _ => Err(self.invalid(format!("'{}' expected", wanted))),
        }
    }

    fn token(&mut self) -> Result<String, ScenarioError> {
        self.skip_blanks();
        let mut tok = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == ',' || c == '[' || c == ']' {
                break;
            }
            tok.push(c);
            self.chars.next();
        }
        if tok.is_empty() {
            return Err(self.invalid("value expected"));
        }
        Ok(tok)
    }

    fn scalar_usize(&mut self) -> Result<usize, ScenarioError> {
        let tok = self.token()?;
        tok.parse()
            .map_err(|_| self.invalid(format!("'{}' is not a valid count", tok)))
    }

    fn number(&mut self) -> Result<f64, ScenarioError> {
        let tok = self.token()?;
        // Scenario files spell unbounded delays as "inf".
        match tok.as_str() {
            "inf" | "+inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            _ => tok
                .parse()
                .map_err(|_| self.invalid(format!("'{}' is not a valid number", tok))),
        }
    }

    fn vector_f64(&mut self, n: usize) -> Result<Vec<f64>, ScenarioError> {
        self.expect('[')?;
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(self.number()?);
        }
        Ok(v)
    }

    fn vector_usize(&mut self, n: usize) -> Result<Vec<usize>, ScenarioError> {
        self.expect('[')?;
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            let tok = self.token()?;
            v.push(
                tok.parse()
                    .map_err(|_| self.invalid(format!("'{}' is not a valid index", tok)))?,
            );
        }
        Ok(v)
    }

    fn matrix_f64(&mut self, rows: usize, cols: usize) -> Result<Vec<Vec<f64>>, ScenarioError> {
        self.expect('[')?;
        let mut m = Vec::with_capacity(rows);
        for _ in 0..rows {
            self.expect('[')?;
            let mut row = Vec::with_capacity(cols);
            for _ in 0..cols {
                row.push(self.number()?);
            }
            self.expect(']')?;
            m.push(row);
        }
        Ok(m)
    }

    fn matrix_usize(&mut self, rows: usize, cols: usize) -> Result<Vec<Vec<usize>>, ScenarioError> {
        self.expect('[')?;
        let mut m = Vec::with_capacity(rows);
        for _ in 0..rows {
            self.expect('[')?;
            let mut row = Vec::with_capacity(cols);
            for _ in 0..cols {
                let tok = self.token()?;
                row.push(
                    tok.parse()
                        .map_err(|_| self.invalid(format!("'{}' is not a valid count", tok)))?,
                );
            }
            self.expect(']')?;
            m.push(row);
        }
        Ok(m)
    }

    /// `[[d r][d r]...]` per service category, each inner pair one step.
    fn workloads(&mut self, n: usize) -> Result<Vec<Vec<Burst>>, ScenarioError> {
        self.expect('[')?;
        let mut all = Vec::with_capacity(n);
        for _ in 0..n {
            self.expect('[')?;
            let mut steps = Vec::new();
            loop {
                self.skip_blanks();
                match self.chars.peek() {
                    Some(']') => {
                        self.chars.next();
                        break;
                    }
                    Some('[') => {
                        self.chars.next();
                        let duration = self.number()?;
                        let rate = self.number()?;
                        self.expect(']')?;
                        steps.push(Burst { duration, rate });
                    }
                    _ => return Err(self.invalid("'[' or ']' expected in workload list")),
                }
            }
            all.push(steps);
        }
        Ok(all)
    }
}
