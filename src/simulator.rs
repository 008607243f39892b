//! Replicated discrete-event simulation core: a time-ordered event queue
//! and the replication loop driving an [`Experiment`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Result;

/// An event scheduled at a point in simulated time. Ties are broken by
/// insertion order.
#[derive(Debug)]
pub struct ScheduledEvent<E> {
    pub time: f64,
    seq: u64,
    pub event: E,
}

impl<E> PartialEq for ScheduledEvent<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for ScheduledEvent<E> {}

impl<E> PartialOrd for ScheduledEvent<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for ScheduledEvent<E> {
    // Reversed so that the std max-heap pops the earliest event first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Future event list.
#[derive(Debug)]
pub struct EventQueue<E> {
    heap: BinaryHeap<ScheduledEvent<E>>,
    next_seq: u64,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: f64, event: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { time, seq, event });
    }

    pub fn pop(&mut self) -> Option<ScheduledEvent<E>> {
        self.heap.pop()
    }

    pub fn next_time(&self) -> Option<f64> {
        self.heap.peek().map(|ev| ev.time)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

/// Per-replication state handed to the experiment hooks: the clock, the
/// future event list and the random stream. The stream is seeded once per
/// simulation and runs through all replications.
pub struct SimContext<E> {
    pub time: f64,
    /// 1-based replication number.
    pub replication: u64,
    pub rng: StdRng,
    queue: EventQueue<E>,
}

impl<E> SimContext<E> {
    pub fn schedule_at(&mut self, time: f64, event: E) {
        self.queue.push(time, event);
    }

    pub fn schedule_in(&mut self, delay: f64, event: E) {
        self.queue.push(self.time + delay, event);
    }
}

/// A replicated experiment: the simulator owns the loop, the experiment
/// owns the model state and the stopping rules.
pub trait Experiment {
    type Event;

    fn on_simulation_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Resets the model state and schedules the initial events.
    fn on_replication_start(&mut self, ctx: &mut SimContext<Self::Event>) -> Result<()>;

    fn handle_event(&mut self, event: Self::Event, ctx: &mut SimContext<Self::Event>)
        -> Result<()>;

    /// Extra per-replication stopping rule, checked after every event.
    fn replication_done(&mut self, _ctx: &SimContext<Self::Event>) -> bool {
        false
    }

    fn on_replication_end(&mut self, ctx: &mut SimContext<Self::Event>) -> Result<()>;

    /// Whether the collected output is good enough to stop replicating.
    fn simulation_done(&mut self) -> bool;

    fn on_simulation_end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Replication loop. A replication ends when its event queue runs dry, when
/// the clock passes the configured length, or when the experiment says so;
/// the simulation ends when the experiment is satisfied or the replication
/// cap is hit.
pub struct Simulator {
    seed: u64,
    max_replications: Option<u64>,
    max_replication_duration: Option<f64>,
}

impl Simulator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_replications: None,
            max_replication_duration: None,
        }
    }

    pub fn with_max_replications(mut self, cap: Option<u64>) -> Self {
        self.max_replications = cap;
        self
    }

    pub fn with_max_replication_duration(mut self, duration: Option<f64>) -> Self {
        self.max_replication_duration = duration;
        self
    }

    pub fn run<X: Experiment>(&self, experiment: &mut X) -> Result<()> {
        let mut ctx = SimContext {
            time: 0.0,
            replication: 0,
            rng: StdRng::seed_from_u64(self.seed),
            queue: EventQueue::new(),
        };

        experiment.on_simulation_start()?;

        loop {
            ctx.replication += 1;
            ctx.time = 0.0;
            ctx.queue.clear();
            experiment.on_replication_start(&mut ctx)?;

            while let Some(next_time) = ctx.queue.next_time() {
                if let Some(max) = self.max_replication_duration {
                    if next_time >= max {
                        break;
                    }
                }
                // Queue is non-empty, checked right above.
                if let Some(scheduled) = ctx.queue.pop() {
                    ctx.time = scheduled.time;
                    experiment.handle_event(scheduled.event, &mut ctx)?;
                }
                if experiment.replication_done(&ctx) {
                    break;
                }
            }

            experiment.on_replication_end(&mut ctx)?;
            info!(
                "Replication {} finished at simulated time {}",
                ctx.replication, ctx.time
            );

            if experiment.simulation_done() {
                break;
            }
            if let Some(cap) = self.max_replications {
                if ctx.replication >= cap {
                    info!("Replication cap {} reached", cap);
                    break;
                }
            }
        }

        experiment.on_simulation_end()
    }
}
