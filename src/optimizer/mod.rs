//! Schedule optimisation: request validation, binary program formulation, the MILP seam,
//! single-shot solving and the Monte Carlo sweep on top of it.

pub mod model;
pub mod monte_carlo;
pub mod request;
pub mod schedule;
pub mod solver;

pub use model::{BinaryProgram, PreparedCourse};
pub use monte_carlo::{run_seed, AggregateResult, MonteCarloAggregator, RunOutcome, SimulationRun};
pub use request::{CourseUtility, OptimizationRequest, RequestLimits, SimulationRequest};
pub use schedule::{ScheduleOptimizer, SelectedItem, Selection};
pub use solver::{MicroLpSolver, MilpSolution, MilpSolver, SolveStatus};
