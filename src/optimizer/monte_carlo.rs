use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, info_span, warn, Span};
use uuid::Uuid;

use crate::error::{Error, ErrorKind};
use crate::optimizer::request::{RequestLimits, SimulationRequest};
use crate::optimizer::schedule::{PreparedRequest, ScheduleOptimizer, Selection};
use crate::parallel::{batch_ranges, WorkerPool};

/// Number of progress-reporting batches for simulate-with-progress.
pub const SIMULATE_PROGRESS_BATCH_COUNT: usize = 20;

/// Seed for run `index`: `base_seed + index` when a base seed was given (0 included),
/// otherwise `index + 1`.
pub fn run_seed(base_seed: Option<u64>, index: usize) -> u64 {
    match base_seed {
        Some(base) => base.wrapping_add(index as u64),
        None => index as u64 + 1,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Success { selection: Selection },
    Failure { kind: ErrorKind, message: String },
}

impl RunOutcome {
    pub fn selection(&self) -> Option<&Selection> {
        match self {
            Self::Success { selection } => Some(selection),
            Self::Failure { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRun {
    pub index: usize,
    pub seed: u64,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemProbability {
    pub id: u32,
    pub selection_count: usize,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleProbability {
    /// Selected ids, ascending. Empty for a run that selected nothing.
    pub member_ids: Vec<u32>,
    pub count: usize,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub simulation_id: Uuid,
    /// One entry per requested item, in request order.
    pub per_item: Vec<ItemProbability>,
    /// Most frequent schedule first; equal counts keep the order they first appeared in.
    pub per_schedule: Vec<ScheduleProbability>,
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
    /// Every run in seed order.
    pub runs: Vec<SimulationRun>,
}

/// Reduce finished runs into selection and schedule probabilities.
/// `runs` must be in index order; the result does not depend on which run finished first.
pub fn aggregate(
    simulation_id: Uuid,
    item_ids: &[u32],
    runs: Vec<SimulationRun>,
) -> AggregateResult {
    let mut item_counts: HashMap<u32, usize> = item_ids.iter().map(|&id| (id, 0)).collect();
    let mut schedules: HashMap<Vec<u32>, (usize, usize)> = HashMap::new();
    let mut failures_by_kind: BTreeMap<ErrorKind, usize> = BTreeMap::new();
    let mut successful_runs = 0usize;

    for (position, run) in runs.iter().enumerate() {
        match &run.outcome {
            RunOutcome::Success { selection } => {
                successful_runs += 1;
                let members = selection.selected_ids();
                for id in &members {
                    if let Some(count) = item_counts.get_mut(id) {
                        *count += 1;
                    }
                }
                schedules.entry(members).or_insert((0, position)).0 += 1;
            }
            RunOutcome::Failure { kind, .. } => {
                *failures_by_kind.entry(*kind).or_default() += 1;
            }
        }
    }

    let probability = |count: usize| {
        if successful_runs == 0 {
            0.0
        } else {
            count as f64 / successful_runs as f64
        }
    };

    let per_item = item_ids
        .iter()
        .map(|&id| {
            let selection_count = item_counts.get(&id).copied().unwrap_or(0);
            ItemProbability {
                id,
                selection_count,
                probability: probability(selection_count),
            }
        })
        .collect();

    let mut ordered: Vec<(Vec<u32>, usize, usize)> = schedules
        .into_iter()
        .map(|(members, (count, first_seen))| (members, count, first_seen))
        .collect();
    ordered.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.2.cmp(&right.2)));
    let per_schedule = ordered
        .into_iter()
        .map(|(member_ids, count, _)| ScheduleProbability {
            member_ids,
            count,
            probability: probability(count),
        })
        .collect();

    let total_runs = runs.len();
    AggregateResult {
        simulation_id,
        per_item,
        per_schedule,
        total_runs,
        successful_runs,
        failed_runs: total_runs - successful_runs,
        failures_by_kind,
        runs,
    }
}

/// Repeats single-shot solves over a range of seeds and aggregates the outcomes.
#[derive(Debug, Clone)]
pub struct MonteCarloAggregator {
    optimizer: ScheduleOptimizer,
    pool: WorkerPool,
    limits: RequestLimits,
}

impl MonteCarloAggregator {
    pub fn new(optimizer: ScheduleOptimizer) -> Self {
        Self {
            optimizer,
            pool: WorkerPool::default(),
            limits: RequestLimits::default(),
        }
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_limits(mut self, limits: RequestLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn optimizer(&self) -> &ScheduleOptimizer {
        &self.optimizer
    }

    /// Run every seed in one parallel sweep.
    pub fn simulate(&self, request: &SimulationRequest) -> Result<AggregateResult, Error> {
        self.simulate_batched(request, 1, |_, _| {})
    }

    /// Like [MonteCarloAggregator::simulate] but runs in batches and invokes
    /// `on_progress(done, total)` after each one.
    pub fn simulate_with_progress<F>(
        &self,
        request: &SimulationRequest,
        on_progress: F,
    ) -> Result<AggregateResult, Error>
    where
        F: FnMut(usize, usize),
    {
        self.simulate_batched(request, SIMULATE_PROGRESS_BATCH_COUNT, on_progress)
    }

    fn simulate_batched<F>(
        &self,
        request: &SimulationRequest,
        num_batches: usize,
        mut on_progress: F,
    ) -> Result<AggregateResult, Error>
    where
        F: FnMut(usize, usize),
    {
        request.validate(&self.limits)?;
        let prepared = self
            .optimizer
            .prepare(&request.items, &request.fixed_items)?;

        let simulation_id = Uuid::new_v4();
        let span = info_span!("simulation", id = %simulation_id);
        let _entered = span.enter();

        let total = request.num_runs;
        on_progress(0, total);
        let mut runs = Vec::with_capacity(total);
        for (start, end) in batch_ranges(total, num_batches) {
            let batch: Vec<SimulationRun> = self.pool.install(|| {
                (start..end)
                    .into_par_iter()
                    .map(|index| self.run_one(&span, &prepared, request, index))
                    .collect()
            });
            runs.extend(batch);
            on_progress(end, total);
        }

        let item_ids: Vec<u32> = request.items.iter().map(|item| item.id).collect();
        let result = aggregate(simulation_id, &item_ids, runs);
        info!(
            total_runs = result.total_runs,
            successful_runs = result.successful_runs,
            failed_runs = result.failed_runs,
            schedules = result.per_schedule.len(),
            "simulation finished"
        );
        Ok(result)
    }

    fn run_one(
        &self,
        span: &Span,
        prepared: &PreparedRequest<'_>,
        request: &SimulationRequest,
        index: usize,
    ) -> SimulationRun {
        let _entered = span.enter();
        let seed = run_seed(request.base_seed, index);
        let outcome = match self.optimizer.solve_prepared(
            prepared,
            request.budget,
            request.max_credit_weight,
            seed,
        ) {
            Ok(selection) => RunOutcome::Success { selection },
            Err(err) => {
                warn!(run = index, seed, error = %err, "simulation run failed");
                RunOutcome::Failure {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        };
        SimulationRun {
            index,
            seed,
            outcome,
        }
    }
}
