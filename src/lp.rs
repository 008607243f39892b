//! Dense two-phase simplex for small linear programs.
//!
//! Solves `min c.x  s.t.  A x >= b` with free variables. Problem sizes here
//! are tiny (one constraint per sub-coalition of a handful of providers), so
//! a dense tableau with Bland's anti-cycling rule is plenty.

const EPS: f64 = 1e-9;

/// Outcome of a solve.
#[derive(Debug, Clone, PartialEq)]
pub enum LpStatus {
    /// Optimal point and objective value.
    Optimal(Vec<f64>, f64),
    Infeasible,
    Unbounded,
}

/// A linear constraint `coeffs . x >= rhs`.
#[derive(Debug, Clone)]
pub struct GeConstraint {
    pub coeffs: Vec<f64>,
    pub rhs: f64,
}

/// Minimizes `objective . x` subject to `constraints`, with every `x[j]`
/// unrestricted in sign.
pub fn minimize(objective: &[f64], constraints: &[GeConstraint]) -> LpStatus {
    let n = objective.len();
    let m = constraints.len();
    if m == 0 {
        // Unconstrained: bounded only for a zero objective.
        if objective.iter().all(|&c| c.abs() <= EPS) {
            return LpStatus::Optimal(vec![0.0; n], 0.0);
        }
        return LpStatus::Unbounded;
    }

    // Standard form: each free x[j] splits into u[j] - w[j] with u, w >= 0,
    // each >= constraint gets a surplus variable, and each row gets an
    // artificial variable forming the initial basis.
    //
    // Column layout: [u(n) | w(n) | surplus(m) | artificial(m) | rhs]
    let num_cols = 2 * n + 2 * m + 1;
    let art_base = 2 * n + m;
    let rhs_col = num_cols - 1;

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(m);
    for (i, con) in constraints.iter().enumerate() {
        let mut row = vec![0.0; num_cols];
        // a.x - s = b, sign-flipped when b < 0 so the artificial basis
        // starts feasible.
        let flip = if con.rhs < 0.0 { -1.0 } else { 1.0 };
        for j in 0..n {
            row[j] = flip * con.coeffs[j];
            row[n + j] = -flip * con.coeffs[j];
        }
        row[2 * n + i] = -flip;
        row[art_base + i] = 1.0;
        row[rhs_col] = flip * con.rhs;
        rows.push(row);
    }

    let mut basis: Vec<usize> = (0..m).map(|i| art_base + i).collect();

    // Phase 1: minimize the sum of artificials. The reduced-cost row is the
    // negated sum of the constraint rows over non-artificial columns.
    let mut cost = vec![0.0; num_cols];
    for row in &rows {
        for j in 0..art_base {
            cost[j] -= row[j];
        }
        cost[rhs_col] -= row[rhs_col];
    }
    if !run_simplex(&mut rows, &mut basis, &mut cost, art_base) {
        // Phase 1 of this formulation cannot be unbounded.
        return LpStatus::Infeasible;
    }
    if -cost[rhs_col] > EPS {
        return LpStatus::Infeasible;
    }

    // Drive leftover artificials out of the basis.
    for i in 0..m {
        if basis[i] >= art_base {
            if let Some(j) = (0..art_base).find(|&j| rows[i][j].abs() > EPS) {
                pivot(&mut rows, &mut basis, &mut cost, i, j);
            }
            // A fully zero row is redundant; its artificial stays basic at
            // zero and never re-enters.
        }
    }

    // Phase 2: original objective on the split variables, priced out over
    // the current basis.
    let mut cost2 = vec![0.0; num_cols];
    for j in 0..n {
        cost2[j] = objective[j];
        cost2[n + j] = -objective[j];
    }
    for i in 0..m {
        let bj = basis[i];
        let cb = cost2[bj];
        if cb != 0.0 {
            for j in 0..num_cols {
                cost2[j] -= cb * rows[i][j];
            }
        }
    }
    if !run_simplex(&mut rows, &mut basis, &mut cost2, art_base) {
        return LpStatus::Unbounded;
    }

    let mut x = vec![0.0; n];
    for i in 0..m {
        let bj = basis[i];
        let val = rows[i][rhs_col];
        if bj < n {
            x[bj] += val;
        } else if bj < 2 * n {
            x[bj - n] -= val;
        }
    }
    let obj: f64 = objective.iter().zip(&x).map(|(c, v)| c * v).sum();
    LpStatus::Optimal(x, obj)
}

/// Runs simplex iterations with Bland's rule until optimality (true) or an
/// unbounded direction (false). Artificial columns are never re-entered.
fn run_simplex(
    rows: &mut [Vec<f64>],
    basis: &mut [usize],
    cost: &mut [f64],
    art_base: usize,
) -> bool {
    let rhs_col = cost.len() - 1;
    loop {
        let entering = (0..art_base).find(|&j| cost[j] < -EPS);
        let j = match entering {
            Some(j) => j,
            None => return true,
        };

        let mut leave: Option<(usize, f64)> = None;
        for i in 0..rows.len() {
            let a = rows[i][j];
            if a > EPS {
                let ratio = rows[i][rhs_col] / a;
                let better = match leave {
                    None => true,
                    // Bland: on ties, prefer the smaller basis index.
                    Some((li, lr)) => {
                        ratio < lr - EPS || (ratio < lr + EPS && basis[i] < basis[li])
                    }
                };
                if better {
                    leave = Some((i, ratio));
                }
            }
        }
        let i = match leave {
            Some((i, _)) => i,
            None => return false,
        };

        pivot(rows, basis, cost, i, j);
    }
}

fn pivot(rows: &mut [Vec<f64>], basis: &mut [usize], cost: &mut [f64], i: usize, j: usize) {
    let num_cols = cost.len();
    let piv = rows[i][j];
    for col in 0..num_cols {
        rows[i][col] /= piv;
    }
    rows[i][j] = 1.0;
    for r in 0..rows.len() {
        if r != i {
            let factor = rows[r][j];
            if factor != 0.0 {
                for col in 0..num_cols {
                    rows[r][col] -= factor * rows[i][col];
                }
                rows[r][j] = 0.0;
            }
        }
    }
    let factor = cost[j];
    if factor != 0.0 {
        for col in 0..num_cols {
            cost[col] -= factor * rows[i][col];
        }
        cost[j] = 0.0;
    }
    basis[i] = j;
}
