//! Cooperative game with transferable utility: coalition values, Shapley
//! payoff division, and core membership tests.

use std::collections::HashMap;
use std::fmt;

use crate::error::FormationError;
use crate::float_cmp;
use crate::lp::{self, GeConstraint, LpStatus};

/// Value recorded for a coalition whose resource allocation turned out to
/// be infeasible. Large, finite and negative so that any feasible coalition
/// dominates it under ordinary comparisons.
pub const VALUE_SENTINEL: f64 = -1e300;

/// A coalition of players encoded as a bit mask over player positions.
/// The encoding is canonical: member order never matters and two coalitions
/// with the same members always compare equal. Valid for games of at most
/// 32 players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoalitionId(u32);

impl CoalitionId {
    pub const EMPTY: CoalitionId = CoalitionId(0);

    pub fn from_mask(mask: u32) -> Self {
        CoalitionId(mask)
    }

    pub fn singleton(player: usize) -> Self {
        CoalitionId(1 << player)
    }

    pub fn from_members(members: &[usize]) -> Self {
        let mut mask = 0u32;
        for &p in members {
            mask |= 1 << p;
        }
        CoalitionId(mask)
    }

    pub fn mask(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, player: usize) -> bool {
        self.0 & (1 << player) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn num_players(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn with(&self, player: usize) -> Self {
        CoalitionId(self.0 | (1 << player))
    }

    pub fn without(&self, player: usize) -> Self {
        CoalitionId(self.0 & !(1 << player))
    }

    pub fn union(&self, other: CoalitionId) -> Self {
        CoalitionId(self.0 | other.0)
    }

    pub fn is_subset_of(&self, other: CoalitionId) -> bool {
        self.0 & !other.0 == 0
    }

    /// Member positions in increasing order.
    pub fn members(&self) -> Vec<usize> {
        (0..32).filter(|i| self.0 & (1 << i) != 0).collect()
    }
}

impl fmt::Display for CoalitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for p in self.members() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", p)?;
            first = false;
        }
        write!(f, "}}")
    }
}

/// A cooperative game: a player list plus a write-once map from coalitions
/// to their characteristic value.
///
/// Player positions (bit indices of [`CoalitionId`]) are local to the game;
/// `players()` maps each position back to the caller's identifier, which
/// matters for subgames.
#[derive(Debug, Clone)]
pub struct CooperativeGame {
    players: Vec<usize>,
    values: HashMap<CoalitionId, f64>,
}

impl CooperativeGame {
    /// Game over players identified by `0..n-1`.
    pub fn new(n: usize) -> Self {
        assert!(n > 0 && n <= 32, "number of players must be in 1..=32");
        Self {
            players: (0..n).collect(),
            values: HashMap::new(),
        }
    }

    pub fn num_players(&self) -> usize {
        self.players.len()
    }

    /// Caller-side identifiers, indexed by player position.
    pub fn players(&self) -> &[usize] {
        &self.players
    }

    pub fn grand_coalition(&self) -> CoalitionId {
        CoalitionId::from_mask(if self.players.len() == 32 {
            u32::MAX
        } else {
            (1u32 << self.players.len()) - 1
        })
    }

    /// Characteristic value of a coalition; the empty coalition is worth 0.
    pub fn value(&self, cid: CoalitionId) -> Option<f64> {
        if cid.is_empty() {
            return Some(0.0);
        }
        self.values.get(&cid).copied()
    }

    pub fn is_set(&self, cid: CoalitionId) -> bool {
        cid.is_empty() || self.values.contains_key(&cid)
    }

    /// Records the value of a coalition. Each coalition can be valued at
    /// most once.
    pub fn set_value(&mut self, cid: CoalitionId, value: f64) -> Result<(), FormationError> {
        if cid.is_empty() || !cid.is_subset_of(self.grand_coalition()) {
            return Err(FormationError::Analysis(format!(
                "coalition {} is not valid for a {}-player game",
                cid,
                self.players.len()
            )));
        }
        if self.values.contains_key(&cid) {
            return Err(FormationError::ValueAlreadySet(cid.to_string()));
        }
        self.values.insert(cid, value);
        Ok(())
    }

    /// Restriction of the game to the members of `cid`. Player position k
    /// of the subgame corresponds to the k-th member (ascending); every
    /// sub-coalition value is copied from this game and must already be set.
    pub fn subgame(&self, cid: CoalitionId) -> Result<CooperativeGame, FormationError> {
        let members = cid.members();
        if members.is_empty() || !cid.is_subset_of(self.grand_coalition()) {
            return Err(FormationError::Analysis(format!(
                "cannot build a subgame for coalition {}",
                cid
            )));
        }

        let mut sub = CooperativeGame {
            players: members.iter().map(|&p| self.players[p]).collect(),
            values: HashMap::new(),
        };

        let m = members.len();
        for local_mask in 1..(1u32 << m) {
            let mut parent_mask = 0u32;
            for (k, &p) in members.iter().enumerate() {
                if local_mask & (1 << k) != 0 {
                    parent_mask |= 1 << p;
                }
            }
            let parent_cid = CoalitionId::from_mask(parent_mask);
            let value = self
                .value(parent_cid)
                .ok_or_else(|| FormationError::UnvisitedCoalition(parent_cid.to_string()))?;
            sub.values.insert(CoalitionId::from_mask(local_mask), value);
        }

        Ok(sub)
    }

    /// Shapley payoff of each player, by the exact predecessor-subset
    /// formula with weights `|S|! (n - |S| - 1)! / n!`. Every coalition
    /// value must be set.
    pub fn shapley_value(&self) -> Result<Vec<f64>, FormationError> {
        let n = self.players.len();
        let fact: Vec<f64> = {
            let mut f = vec![1.0; n + 1];
            for i in 1..=n {
                f[i] = f[i - 1] * i as f64;
            }
            f
        };

        let full = self.grand_coalition().mask();
        let mut payoffs = vec![0.0; n];
        for i in 0..n {
            let others = full & !(1u32 << i);
            // Walk every subset S of N \ {i}, empty set included.
            let mut s = others;
            loop {
                let cid = CoalitionId::from_mask(s);
                let with_i = cid.with(i);
                let v_s = self
                    .value(cid)
                    .ok_or_else(|| FormationError::UnvisitedCoalition(cid.to_string()))?;
                let v_si = self
                    .value(with_i)
                    .ok_or_else(|| FormationError::UnvisitedCoalition(with_i.to_string()))?;
                let k = cid.num_players();
                let weight = fact[k] * fact[n - k - 1] / fact[n];
                payoffs[i] += weight * (v_si - v_s);

                if s == 0 {
                    break;
                }
                s = (s - 1) & others;
            }
        }

        Ok(payoffs)
    }

    /// Whether the payoff vector lies in the core: it distributes exactly
    /// the grand-coalition value and no sub-coalition is paid less than its
    /// own value.
    pub fn belongs_to_core(&self, payoffs: &[f64], tol: f64) -> Result<bool, FormationError> {
        let n = self.players.len();
        assert_eq!(payoffs.len(), n, "payoff vector size does not match");

        let grand = self.grand_coalition();
        let v_grand = self
            .value(grand)
            .ok_or_else(|| FormationError::UnvisitedCoalition(grand.to_string()))?;
        let total: f64 = payoffs.iter().sum();
        if !float_cmp::essentially_equal(total, v_grand, tol) {
            return Ok(false);
        }

        for mask in 1..grand.mask() {
            let cid = CoalitionId::from_mask(mask);
            let v = self
                .value(cid)
                .ok_or_else(|| FormationError::UnvisitedCoalition(cid.to_string()))?;
            let paid: f64 = cid.members().iter().map(|&p| payoffs[p]).sum();
            if float_cmp::definitely_less(paid, v, tol) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Searches for a core imputation by linear programming: minimize the
    /// total payout subject to every proper sub-coalition receiving at
    /// least its own value. The core is non-empty exactly when the optimum
    /// does not exceed the grand-coalition value; the returned point is
    /// re-balanced so it distributes that value exactly.
    pub fn find_core(&self, tol: f64) -> Result<Option<Vec<f64>>, FormationError> {
        let n = self.players.len();
        let grand = self.grand_coalition();
        let v_grand = self
            .value(grand)
            .ok_or_else(|| FormationError::UnvisitedCoalition(grand.to_string()))?;

        let mut constraints = Vec::with_capacity(grand.mask() as usize - 1);
        for mask in 1..grand.mask() {
            let cid = CoalitionId::from_mask(mask);
            let v = self
                .value(cid)
                .ok_or_else(|| FormationError::UnvisitedCoalition(cid.to_string()))?;
            let mut coeffs = vec![0.0; n];
            for p in cid.members() {
                coeffs[p] = 1.0;
            }
            constraints.push(GeConstraint { coeffs, rhs: v });
        }

        let objective = vec![1.0; n];
        match lp::minimize(&objective, &constraints) {
            LpStatus::Optimal(mut x, obj) => {
                if float_cmp::essentially_less_equal(obj, v_grand, tol) {
                    let slack = (v_grand - x.iter().sum::<f64>()) / n as f64;
                    for xi in &mut x {
                        *xi += slack;
                    }
                    Ok(Some(x))
                } else {
                    Ok(None)
                }
            }
            LpStatus::Infeasible => Ok(None),
            LpStatus::Unbounded => Err(FormationError::Analysis(
                "core search program is unbounded".into(),
            )),
        }
    }
}
