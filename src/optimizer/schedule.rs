//! Single-shot schedule optimisation: resolve courses, price them for a seed, solve the binary
//! program and check the returned assignment before handing it out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::conflict::TokenCache;
use crate::data::catalog::CourseCatalog;
use crate::data::course::Course;
use crate::data::registry::DataRegistry;
use crate::error::{Error, SolverError};
use crate::optimizer::model::{BinaryProgram, PreparedCourse};
use crate::optimizer::request::{CourseUtility, OptimizationRequest};
use crate::optimizer::solver::{MicroLpSolver, MilpSolution, MilpSolver, SolveStatus};
use crate::pricing::PriceModel;

/// One requested course in a solved schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedItem {
    pub id: u32,
    pub price: f64,
    pub credit_weight: f64,
    pub utility: f64,
    pub selected: bool,
}

/// Outcome of one solve. Items keep request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub seed: u64,
    pub status: SolveStatus,
    pub items: Vec<SelectedItem>,
    pub total_cost: f64,
    pub total_credit_weight: f64,
    pub total_utility: f64,
    /// Σ utility × credit weight over the selected items.
    pub objective_value: f64,
}

impl Selection {
    /// Ids of selected items, ascending. This is the schedule key used by the aggregator.
    pub fn selected_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .items
            .iter()
            .filter(|item| item.selected)
            .map(|item| item.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn selected_count(&self) -> usize {
        self.items.iter().filter(|item| item.selected).count()
    }
}

/// Seed-independent part of a request: resolved courses and their conflict tokens.
/// Built once and reused for every seed of a simulation.
#[derive(Debug, Clone)]
pub struct PreparedRequest<'a> {
    courses: Vec<&'a Course>,
    prepared: Vec<PreparedCourse>,
}

impl PreparedRequest<'_> {
    pub fn len(&self) -> usize {
        self.prepared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prepared.is_empty()
    }

    pub fn courses(&self) -> &[PreparedCourse] {
        &self.prepared
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleOptimizer {
    catalog: Arc<CourseCatalog>,
    prices: PriceModel,
    tokens: Arc<TokenCache>,
    solver: Arc<dyn MilpSolver>,
    timeout: Option<Duration>,
    /// Deadline-bound solver threads that have not returned yet. Shared by clones.
    solver_threads: Arc<AtomicUsize>,
}

/// Decrements the running-thread count when the solver thread ends, panics included.
struct ThreadSlot(Arc<AtomicUsize>);

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScheduleOptimizer {
    /// Optimizer over the registry's data with the default MILP backend and no deadline.
    pub fn new(registry: &DataRegistry) -> Self {
        Self::from_parts(
            Arc::clone(registry.catalog()),
            registry.price_model().clone(),
            Arc::clone(registry.tokens()),
        )
    }

    pub fn from_parts(
        catalog: Arc<CourseCatalog>,
        prices: PriceModel,
        tokens: Arc<TokenCache>,
    ) -> Self {
        Self {
            catalog,
            prices,
            tokens,
            solver: Arc::new(MicroLpSolver),
            timeout: None,
            solver_threads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_solver(mut self, solver: Arc<dyn MilpSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Per-solve deadline. `None` waits for the solver indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Solver threads still running, including ones abandoned after a timeout.
    pub fn running_solver_threads(&self) -> usize {
        self.solver_threads.load(Ordering::SeqCst)
    }

    pub fn catalog(&self) -> &CourseCatalog {
        &self.catalog
    }

    pub fn price_model(&self) -> &PriceModel {
        &self.prices
    }

    /// Validate, then solve for `request.seed`.
    pub fn optimize(&self, request: &OptimizationRequest) -> Result<Selection, Error> {
        request.validate()?;
        let prepared = self.prepare(&request.items, &request.fixed_items)?;
        self.solve_prepared(
            &prepared,
            request.budget,
            request.max_credit_weight,
            request.seed,
        )
    }

    /// Resolve ids against the catalog and attach tokens. Does not validate the request.
    pub fn prepare(
        &self,
        items: &[CourseUtility],
        fixed_items: &[u32],
    ) -> Result<PreparedRequest<'_>, Error> {
        let ids: Vec<u32> = items.iter().map(|item| item.id).collect();
        let courses = self.catalog.lookup(&ids)?;
        let prepared = courses
            .iter()
            .zip(items)
            .map(|(course, item)| PreparedCourse {
                id: course.id,
                group_id: course.group_id.clone(),
                credit_weight: course.credit_weight,
                utility: item.utility,
                tokens: self.tokens.tokens_for(course),
                fixed: fixed_items.contains(&course.id),
            })
            .collect();
        Ok(PreparedRequest { courses, prepared })
    }

    /// Price the prepared courses with `seed` and solve.
    pub fn solve_prepared(
        &self,
        request: &PreparedRequest<'_>,
        budget: f64,
        max_credit_weight: f64,
        seed: u64,
    ) -> Result<Selection, Error> {
        let prices = request
            .courses
            .iter()
            .map(|course| self.prices.price(course, seed))
            .collect::<Result<Vec<f64>, _>>()?;

        let program =
            BinaryProgram::formulate(&request.prepared, &prices, budget, max_credit_weight);
        let solution = self.run_solver(program.clone())?;
        if solution.values.len() != program.num_vars() {
            return Err(SolverError::InvalidSolution(format!(
                "expected {} values, got {}",
                program.num_vars(),
                solution.values.len()
            ))
            .into());
        }

        let values = if solution.status.is_optimal() {
            let broken = program.violations(&solution.values);
            if !broken.is_empty() {
                let names: Vec<String> = broken.iter().map(|c| c.kind.to_string()).collect();
                return Err(SolverError::InvalidSolution(names.join(", ")).into());
            }
            solution.values
        } else {
            vec![false; program.num_vars()]
        };

        let selection = build_selection(seed, solution.status, &request.prepared, &prices, &values);
        debug!(
            seed,
            status = %selection.status,
            selected = selection.selected_count(),
            total_cost = selection.total_cost,
            "solved schedule"
        );
        Ok(selection)
    }

    fn run_solver(&self, program: BinaryProgram) -> Result<MilpSolution, SolverError> {
        let Some(limit) = self.timeout else {
            return self.solver.solve(&program);
        };

        let solver = Arc::clone(&self.solver);
        let (tx, rx) = mpsc::channel();
        self.solver_threads.fetch_add(1, Ordering::SeqCst);
        let slot = ThreadSlot(Arc::clone(&self.solver_threads));
        thread::Builder::new()
            .name("milp-solve".to_string())
            .spawn(move || {
                let _slot = slot;
                let _ = tx.send(solver.solve(&program));
            })
            .map_err(|err| SolverError::Backend(format!("failed to start solver thread: {err}")))?;

        // On timeout the solver thread is left to finish on its own; its result is dropped.
        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    running = self.running_solver_threads(),
                    "solve exceeded its deadline; solver thread left running"
                );
                Err(SolverError::Timeout(limit))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SolverError::WorkerLost),
        }
    }
}

fn build_selection(
    seed: u64,
    status: SolveStatus,
    courses: &[PreparedCourse],
    prices: &[f64],
    values: &[bool],
) -> Selection {
    let items: Vec<SelectedItem> = courses
        .iter()
        .zip(prices)
        .zip(values)
        .map(|((course, &price), &selected)| SelectedItem {
            id: course.id,
            price,
            credit_weight: course.credit_weight,
            utility: course.utility,
            selected,
        })
        .collect();

    let chosen = || courses.iter().zip(&items).filter(|(_, item)| item.selected);
    Selection {
        seed,
        status,
        total_cost: chosen().map(|(_, item)| item.price).sum(),
        total_credit_weight: chosen().map(|(_, item)| item.credit_weight).sum(),
        total_utility: chosen().map(|(_, item)| item.utility).sum(),
        objective_value: chosen().map(|(course, _)| course.objective_coefficient()).sum(),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::data::catalog::parse_csv;
    use crate::data::course::GroupMapping;
    use crate::data::z_table::ZScoreTable;
    use crate::error::ErrorKind;

    const CSV: &str = "\
uniqueid,primary_section_id,part_of_term,days_code,start_time_24hr,stop_time_24hr,credit_unit,price_predicted,resid_mean,resid_stdev
1,FNCE1010001,F,MW,08:30,10:00,1.0,1000,0,0
2,FNCE1010002,F,TR,10:15,11:45,1.0,900,0,0
3,MGMT2000001,F,MW,08:30,10:00,1.0,800,0,0
4,MKTG3000001,S,F,12:00,15:00,0.5,300,0,0
";

    fn optimizer() -> ScheduleOptimizer {
        let courses = parse_csv(CSV.as_bytes(), &GroupMapping::empty()).unwrap();
        let registry = DataRegistry::from_parts(
            CourseCatalog::new(courses),
            ZScoreTable::synthetic(1..=5, 4, 0),
            &Settings::default(),
        );
        ScheduleOptimizer::new(&registry)
    }

    fn request(items: &[(u32, f64)], budget: f64) -> OptimizationRequest {
        OptimizationRequest {
            budget,
            max_credit_weight: 5.0,
            seed: 1,
            items: items
                .iter()
                .map(|&(id, utility)| CourseUtility { id, utility })
                .collect(),
            fixed_items: Vec::new(),
        }
    }

    #[test]
    fn selection_respects_groups_and_time_slots() {
        let selection = optimizer()
            .optimize(&request(&[(1, 90.0), (2, 80.0), (3, 70.0), (4, 60.0)], 10_000.0))
            .unwrap();

        assert_eq!(selection.status, SolveStatus::Optimal);
        assert_eq!(selection.selected_ids(), vec![2, 3, 4]);
        assert_eq!(selection.total_cost, 2000.0);
        assert_eq!(selection.total_credit_weight, 2.5);
        assert_eq!(selection.total_utility, 210.0);
        assert_eq!(selection.objective_value, 180.0);
    }

    #[test]
    fn fixed_course_overrides_a_better_alternative() {
        let mut req = request(&[(1, 90.0), (2, 80.0), (3, 70.0)], 10_000.0);
        req.fixed_items = vec![1];
        let selection = optimizer().optimize(&req).unwrap();
        assert_eq!(selection.selected_ids(), vec![1]);
    }

    #[test]
    fn unknown_course_is_a_data_error() {
        let err = optimizer()
            .optimize(&request(&[(1, 90.0), (42, 10.0)], 1000.0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn invalid_request_is_rejected_before_solving() {
        let err = optimizer().optimize(&request(&[(1, 90.0), (1, 10.0)], 1000.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[derive(Debug)]
    struct Stalled;

    impl MilpSolver for Stalled {
        fn solve(&self, program: &BinaryProgram) -> Result<MilpSolution, SolverError> {
            thread::sleep(Duration::from_millis(200));
            Ok(MilpSolution::without_assignment(SolveStatus::Optimal, program.num_vars()))
        }
    }

    #[derive(Debug)]
    struct Greedy;

    impl MilpSolver for Greedy {
        fn solve(&self, program: &BinaryProgram) -> Result<MilpSolution, SolverError> {
            Ok(MilpSolution {
                status: SolveStatus::Optimal,
                values: vec![true; program.num_vars()],
            })
        }
    }

    #[test]
    fn deadline_turns_slow_solves_into_timeouts() {
        let optimizer = optimizer()
            .with_solver(Arc::new(Stalled))
            .with_timeout(Some(Duration::from_millis(10)));
        let err = optimizer.optimize(&request(&[(1, 90.0)], 5000.0)).unwrap_err();
        assert!(matches!(err, Error::Solver(SolverError::Timeout(_))));
    }

    #[test]
    fn abandoned_solver_threads_are_counted_until_they_finish() {
        let optimizer = optimizer()
            .with_solver(Arc::new(Stalled))
            .with_timeout(Some(Duration::from_millis(10)));
        assert_eq!(optimizer.running_solver_threads(), 0);

        assert!(optimizer.optimize(&request(&[(1, 90.0)], 5000.0)).is_err());
        assert_eq!(optimizer.clone().running_solver_threads(), 1);

        thread::sleep(Duration::from_millis(600));
        assert_eq!(optimizer.running_solver_threads(), 0);
    }

    #[test]
    fn solves_without_a_deadline_stay_on_the_calling_thread() {
        let optimizer = optimizer().with_solver(Arc::new(Stalled));
        let selection = optimizer.optimize(&request(&[(1, 90.0)], 5000.0)).unwrap();
        assert_eq!(selection.status, SolveStatus::Optimal);
        assert_eq!(optimizer.running_solver_threads(), 0);
    }

    #[test]
    fn infeasible_assignments_from_the_backend_are_refused() {
        let optimizer = optimizer().with_solver(Arc::new(Greedy));
        let err = optimizer
            .optimize(&request(&[(1, 90.0), (2, 80.0)], 5000.0))
            .unwrap_err();
        match err {
            Error::Solver(SolverError::InvalidSolution(message)) => {
                assert!(message.contains("group FNCE1010"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
