//! M/M/c queueing model used to size the virtual machines of a service.
//!
//! The average response time of an M/M/c queue with arrival rate lambda and
//! per-server service rate mu is `C(c, lambda/mu) / (c mu - lambda) + 1/mu`,
//! where C is the Erlang-C waiting probability.

use log::warn;

use crate::float_cmp;

/// Hard cap on the number of servers probed while searching for the
/// smallest c meeting the delay target.
pub const MAX_SERVERS: usize = 10_000;

pub struct MmcQueue {
    lambda: f64,
    mu: f64,
    target_delay: f64,
    tol: f64,
    delays: Vec<f64>,
}

impl MmcQueue {
    /// Model for arrival rate `lambda`, service rate `mu` and a response
    /// time target `max_delay`. No c can beat the service time `1/mu`, so a
    /// tighter target is clamped up to it.
    pub fn new(lambda: f64, mu: f64, max_delay: f64, tol: f64) -> Self {
        let min_delay = 1.0 / mu;
        let target_delay = if float_cmp::definitely_less(max_delay, min_delay, tol) {
            warn!(
                "Target delay {} is below the service time {}: clamping",
                max_delay, min_delay
            );
            min_delay
        } else {
            max_delay
        };
        Self {
            lambda,
            mu,
            target_delay,
            tol,
            delays: Vec::new(),
        }
    }

    pub fn arrival_rate(&self) -> f64 {
        self.lambda
    }

    pub fn service_rate(&self) -> f64 {
        self.mu
    }

    pub fn target_delay(&self) -> f64 {
        self.target_delay
    }

    /// Erlang-C waiting probability with c servers, by the iterative
    /// Erlang-B recurrence. Returns 1 for a saturated queue.
    pub fn queue_probability(&self, c: usize) -> f64 {
        let rho = self.lambda / self.mu;
        let util = rho / c as f64;
        if float_cmp::essentially_greater_equal(util, 1.0, self.tol) {
            return 1.0;
        }
        let mut pb = 1.0;
        for j in 1..=c {
            pb = (rho * pb) / (j as f64 + rho * pb);
        }
        pb / (1.0 - util + util * pb)
    }

    /// Same probability through the textbook recursive Erlang-B definition.
    /// Recursion depth equals c, so [`queue_probability`](Self::queue_probability)
    /// is the one used by the sizing loop.
    pub fn queue_probability_recursive(&self, c: usize) -> f64 {
        fn erlang_b(rho: f64, c: usize) -> f64 {
            if c == 0 {
                return 1.0;
            }
            let prev = erlang_b(rho, c - 1);
            rho * prev / (c as f64 + rho * prev)
        }

        let rho = self.lambda / self.mu;
        let util = rho / c as f64;
        if float_cmp::essentially_greater_equal(util, 1.0, self.tol) {
            return 1.0;
        }
        let pb = erlang_b(rho, c);
        pb / (1.0 - util + util * pb)
    }

    /// Average response time with c servers; infinite when the queue is
    /// saturated.
    pub fn average_response_time(&self, c: usize) -> f64 {
        let util = self.lambda / (self.mu * c as f64);
        if float_cmp::essentially_greater_equal(util, 1.0, self.tol) {
            return f64::INFINITY;
        }
        let pq = self.queue_probability(c);
        pq / (c as f64 * self.mu - self.lambda) + 1.0 / self.mu
    }

    /// Smallest number of servers whose average response time meets the
    /// target, capped at [`MAX_SERVERS`]. Also records the delay curve
    /// retrievable through [`delays`](Self::delays).
    pub fn min_servers(&mut self) -> usize {
        // Index 0 stands for "no server": unbounded delay.
        self.delays = vec![f64::INFINITY];

        let mut c = 0;
        loop {
            c += 1;
            let delay = self.average_response_time(c);
            self.delays.push(delay);
            if !float_cmp::definitely_greater(delay, self.target_delay, self.tol) {
                return c;
            }
            if c >= MAX_SERVERS {
                warn!(
                    "Delay target {} not met with {} servers (lambda = {}, mu = {})",
                    self.target_delay, MAX_SERVERS, self.lambda, self.mu
                );
                return c;
            }
        }
    }

    /// Delay-vs-server-count curve built by the last
    /// [`min_servers`](Self::min_servers) call; entry c is the average
    /// response time with c servers and entry 0 is infinity.
    pub fn delays(&self) -> &[f64] {
        &self.delays
    }
}
