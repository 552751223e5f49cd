//! MILP backend seam. The schedule optimizer only sees [MilpSolver]; [MicroLpSolver] is the
//! default implementation on top of `good_lp` with the pure-Rust microlp engine.

use std::fmt;

use good_lp::solvers::microlp::microlp;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SolverError;
use crate::optimizer::model::{Bound, BinaryProgram};

/// Terminal state of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Undefined,
    NotSolved,
    /// Any status label the backend reports that is not one of the above.
    #[serde(other)]
    Unknown,
}

impl SolveStatus {
    /// Map a backend status label; anything unrecognised is [SolveStatus::Unknown].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace([' ', '_'], "").as_str() {
            "optimal" => Self::Optimal,
            "infeasible" => Self::Infeasible,
            "unbounded" => Self::Unbounded,
            "undefined" => Self::Undefined,
            "notsolved" => Self::NotSolved,
            _ => Self::Unknown,
        }
    }

    pub fn is_optimal(self) -> bool {
        self == Self::Optimal
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Optimal => "Optimal",
            Self::Infeasible => "Infeasible",
            Self::Unbounded => "Unbounded",
            Self::Undefined => "Undefined",
            Self::NotSolved => "NotSolved",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Assignment and status from one solve. `values` is all-false unless the status is Optimal.
#[derive(Debug, Clone, PartialEq)]
pub struct MilpSolution {
    pub status: SolveStatus,
    pub values: Vec<bool>,
}

impl MilpSolution {
    pub fn without_assignment(status: SolveStatus, num_vars: usize) -> Self {
        Self {
            status,
            values: vec![false; num_vars],
        }
    }
}

/// A black-box 0/1 program solver. Implementations must be shareable across worker threads.
pub trait MilpSolver: Send + Sync + fmt::Debug {
    fn solve(&self, program: &BinaryProgram) -> Result<MilpSolution, SolverError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLpSolver;

impl MilpSolver for MicroLpSolver {
    fn solve(&self, program: &BinaryProgram) -> Result<MilpSolution, SolverError> {
        let num_vars = program.num_vars();
        if num_vars == 0 {
            return Ok(MilpSolution::without_assignment(SolveStatus::Optimal, 0));
        }

        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = (0..num_vars)
            .map(|_| problem.add(variable().binary()))
            .collect();

        let objective: Expression = program
            .objective
            .iter()
            .zip(&vars)
            .map(|(&coefficient, &var)| coefficient * var)
            .sum();
        let mut model = problem.maximise(objective).using(microlp);
        for linear in &program.constraints {
            let lhs: Expression = linear
                .terms
                .iter()
                .map(|&(idx, coefficient)| coefficient * vars[idx])
                .sum();
            model = match linear.bound {
                Bound::AtMost(rhs) => model.with(constraint!(lhs <= rhs)),
                Bound::Exactly(rhs) => model.with(constraint!(lhs == rhs)),
            };
        }

        match model.solve() {
            Ok(solution) => Ok(MilpSolution {
                status: SolveStatus::Optimal,
                values: vars.iter().map(|&var| solution.value(var) > 0.5).collect(),
            }),
            Err(err) => {
                let status = status_for_resolution_error(err)?;
                Ok(MilpSolution::without_assignment(status, num_vars))
            }
        }
    }
}

/// Non-optimal outcome of a `good_lp` solve. Static labels are terminal statuses and go through
/// [SolveStatus::from_label]; free-form messages are backend failures.
fn status_for_resolution_error(err: ResolutionError) -> Result<SolveStatus, SolverError> {
    match err {
        ResolutionError::Infeasible => Ok(SolveStatus::Infeasible),
        ResolutionError::Unbounded => Ok(SolveStatus::Unbounded),
        ResolutionError::Other(label) => {
            let status = SolveStatus::from_label(label);
            if status == SolveStatus::Unknown {
                warn!(label, "solver reported an unrecognised status");
            }
            Ok(status)
        }
        other => Err(SolverError::Backend(other.to_string())),
    }
}
